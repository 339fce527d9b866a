use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::database::{MetadataRepository, NewMetadata, SnapshotItem};
use crate::error::{FsdError, Result};
use crate::fs_watch::WatchRegistrar;
use crate::ipc::{FsdOp, Message, Subscription};
use crate::tasks::gate::{GateRefusal, SnapshotGate};
use crate::tasks::{Task, TaskContext, TaskKind};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;

/// Keeps the `metadata` table in step with the tree under the root.
///
/// The sampler snapshots the whole tree every interval. The event loop
/// extends the watch set on `Create`, drops rows on `Remove` and applies
/// time-based retention on `Compact`.
pub struct MetadataTask {
    root: PathBuf,
    subscription: Subscription,
    watcher: Arc<dyn WatchRegistrar>,
    repo: MetadataRepository,
    update_interval: Duration,
    compaction_interval: Duration,
    gate: Arc<SnapshotGate>,
}

impl fmt::Debug for MetadataTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataTask")
            .field("root", &self.root)
            .field("subscription", &self.subscription)
            .field("update_interval", &self.update_interval)
            .field("compaction_interval", &self.compaction_interval)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl MetadataTask {
    pub fn new(ctx: &TaskContext, subscription: Subscription) -> Self {
        Self {
            root: ctx.root.clone(),
            subscription,
            watcher: Arc::clone(&ctx.watcher),
            repo: ctx.db.metadata(),
            update_interval: ctx.settings.metadata_update_interval,
            compaction_interval: ctx.settings.compaction_interval,
            gate: SnapshotGate::new(ctx.settings.metadata_update_interval),
        }
    }

    async fn handle_message(&self, msg: Message) {
        match msg.operation {
            FsdOp::Create => self.extend_watch_set(&msg.name).await,
            FsdOp::Remove => {
                self.watcher.forget(Path::new(&msg.name));
                match self.repo.delete_by_path(&msg.name).await {
                    Ok(removed) => debug!(path = %msg.name, removed, "metadata rows removed"),
                    Err(err) => error!(path = %msg.name, "failed to delete metadata rows: {}", err),
                }
            }
            FsdOp::Compact => {
                let cutoff = compaction_cutoff(Utc::now(), self.compaction_interval);
                match self.repo.delete_older_than(cutoff).await {
                    Ok(removed) => info!(removed, %cutoff, "metadata compacted"),
                    Err(err) => error!("metadata compaction failed: {}", err),
                }
            }
            FsdOp::Write | FsdOp::Rename | FsdOp::Chmod | FsdOp::Invalid => {}
        }
    }

    async fn extend_watch_set(&self, path: &str) {
        let path = PathBuf::from(path);
        let watcher = Arc::clone(&self.watcher);
        let outcome =
            tokio::task::spawn_blocking(move || add_directories(watcher.as_ref(), &path)).await;
        match outcome {
            Ok(added) if added > 0 => debug!(added, "watch set extended"),
            Ok(_) => {}
            Err(err) => error!("watch extension task failed: {}", err),
        }
    }

    fn launch_snapshot(&self, cancel: &CancellationToken) {
        let permit = match self.gate.try_begin() {
            Ok(permit) => permit,
            Err(GateRefusal::Overlap { elapsed }) => {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "metadata update overlap, skipping snapshot"
                );
                return;
            }
            Err(GateRefusal::Stalled { elapsed }) => {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "metadata snapshot still running after two intervals, abandoning new attempt"
                );
                return;
            }
        };

        let root = self.root.clone();
        let repo = self.repo.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let _permit = permit;
            match snapshot(&root, &repo, cancel).await {
                Ok(rows) => debug!(rows, "metadata snapshot committed"),
                Err(FsdError::Cancelled(_)) => debug!("metadata snapshot cancelled"),
                Err(err) => error!("metadata snapshot failed: {}", err),
            }
        });
    }
}

#[async_trait]
impl Task for MetadataTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Metadata
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) {
        info!(task = %self.kind(), root = %self.root.display(), "task started");

        let mut ticker = tokio::time::interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.subscription.recv() => {
                    let Some(msg) = msg else {
                        debug!(task = %self.kind(), "subscription closed");
                        break;
                    };
                    self.handle_message(msg).await;
                }
                _ = ticker.tick() => self.launch_snapshot(&cancel),
            }
        }

        info!(task = %self.kind(), "task stopped");
    }
}

pub(crate) fn compaction_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(retention) {
        Ok(retention) => now - retention,
        Err(_) => DateTime::<Utc>::MIN_UTC,
    }
}

/// Walk `root` once and insert one row per entry, all in one transaction.
pub async fn snapshot(
    root: &Path,
    repo: &MetadataRepository,
    cancel: CancellationToken,
) -> Result<u64> {
    let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
    let root = root.to_path_buf();
    let walker = tokio::task::spawn_blocking(move || walk_into(&root, &tx, &cancel));

    let inserted = repo.insert_snapshot(rx).await;
    if let Err(err) = walker.await {
        return Err(FsdError::Internal(format!("snapshot walker failed: {err}")));
    }
    inserted
}

fn walk_into(
    root: &Path,
    tx: &mpsc::Sender<Result<SnapshotItem>>,
    cancel: &CancellationToken,
) {
    for entry in WalkDir::new(root) {
        if cancel.is_cancelled() {
            let _ = tx.blocking_send(Err(FsdError::Cancelled("metadata snapshot".into())));
            return;
        }

        let item = entry
            .map_err(FsdError::from)
            .and_then(|entry| metadata_from_entry(&entry))
            .map(SnapshotItem::Row);
        let failed = item.is_err();
        if tx.blocking_send(item).is_err() || failed {
            return;
        }
    }
    let _ = tx.blocking_send(Ok(SnapshotItem::Done));
}

fn metadata_from_entry(entry: &DirEntry) -> Result<NewMetadata> {
    let md = entry.metadata()?;
    let modified_at = md
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(NewMetadata {
        full_path: entry.path().to_string_lossy().into_owned(),
        size_bytes: md.len(),
        file_mode: permission_bits(&md),
        is_directory: md.is_dir(),
        created_at: Utc::now(),
        modified_at,
    })
}

#[cfg(unix)]
fn permission_bits(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(md: &fs::Metadata) -> u32 {
    if md.permissions().readonly() { 0o444 } else { 0o666 }
}

/// Add every directory at or under `path` to the watch set and return how
/// many were not tracked before. Failures are logged per entry.
fn add_directories(watcher: &dyn WatchRegistrar, path: &Path) -> usize {
    let mut added = 0;
    for entry in WalkDir::new(path) {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => match watcher.add(entry.path()) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(err) => warn!(path = %entry.path().display(), "failed to watch directory: {}", err),
            },
            Ok(_) => {}
            Err(err) => warn!(path = %path.display(), "walk failed while extending watch set: {}", err),
        }
    }
    added
}
