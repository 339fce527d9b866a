use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::database::DiskStatsRepository;
use crate::disk::DiskUsage;
use crate::error::Result;
use crate::ipc::{FsdOp, Subscription};
use crate::tasks::{Task, TaskContext, TaskKind};

/// Records usage of the filesystem holding the root.
pub struct FsTask {
    root: PathBuf,
    subscription: Subscription,
    repo: DiskStatsRepository,
    sample_interval: Duration,
    retain: u32,
}

impl fmt::Debug for FsTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsTask")
            .field("root", &self.root)
            .field("subscription", &self.subscription)
            .field("sample_interval", &self.sample_interval)
            .field("retain", &self.retain)
            .finish()
    }
}

impl FsTask {
    pub fn new(ctx: &TaskContext, subscription: Subscription) -> Self {
        Self {
            root: ctx.root.clone(),
            subscription,
            repo: ctx.db.disk_stats(),
            sample_interval: ctx.settings.disk_stats_interval,
            retain: ctx.settings.disk_stats_retain,
        }
    }

    async fn record_usage(&self) -> Result<i64> {
        let usage = DiskUsage::sample(&self.root)?;
        self.repo.insert(&usage, Utc::now()).await
    }

    async fn sample(&self) {
        if let Err(err) = self.record_usage().await {
            error!(root = %self.root.display(), "failed to record disk usage: {}", err);
        }
    }

    async fn compact(&self) {
        match self.repo.retain_newest(self.retain).await {
            Ok(removed) => info!(removed, kept = self.retain, "disk stats compacted"),
            Err(err) => error!("disk stats compaction failed: {}", err),
        }
    }
}

#[async_trait]
impl Task for FsTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Fs
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) {
        info!(task = %self.kind(), root = %self.root.display(), "task started");
        self.sample().await;

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.sample_interval,
            self.sample_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.subscription.recv() => {
                    let Some(msg) = msg else {
                        debug!(task = %self.kind(), "subscription closed");
                        break;
                    };
                    if msg.operation == FsdOp::Compact {
                        self.compact().await;
                    } else {
                        self.sample().await;
                    }
                }
                _ = ticker.tick() => self.sample().await,
            }
        }

        info!(task = %self.kind(), "task stopped");
    }
}
