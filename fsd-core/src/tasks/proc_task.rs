use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::database::{ProcRepository, ProcResultRow, ProcRow};
use crate::error::Result;
use crate::ipc::Subscription;
use crate::procs::{ProcSpec, execute};
use crate::tasks::{Task, TaskContext, TaskKind};

/// Upper bound on waiting for in-flight workers after cancellation.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// What a single worker did with its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// This worker won the claim, ran the command and stored its result.
    Executed { success: bool },
    /// Another worker claimed the row first.
    AlreadyClaimed,
}

/// Claim `row`, run its command and persist the captured output.
///
/// The claim happens before execution so a row is never run twice, even if
/// the process dies between execution and result insertion.
pub async fn run_proc_worker(
    repo: &ProcRepository,
    row: ProcRow,
    cancel: &CancellationToken,
) -> Result<WorkerOutcome> {
    if !repo.claim(row.id).await? {
        trace!(proc_id = row.id, "proc already claimed");
        return Ok(WorkerOutcome::AlreadyClaimed);
    }

    let spec = ProcSpec::from_stored(&row.command, &row.args);
    info!(proc_id = row.id, command = %spec, "running proc");
    let outcome = execute(&spec, cancel).await;
    if let Some(err) = &outcome.error {
        warn!(proc_id = row.id, "proc finished with error: {}", err);
    }

    repo.insert_result(&ProcResultRow {
        id: row.id,
        stdout: outcome.stdout.clone(),
        stderr: outcome.stderr_with_error(),
        created_at: row.created_at,
    })
    .await?;

    Ok(WorkerOutcome::Executed {
        success: outcome.is_success(),
    })
}

/// Polls the `proc` table and runs each pending row in its own worker.
pub struct ProcTask {
    subscription: Subscription,
    repo: ProcRepository,
    poll_interval: Duration,
    workers: JoinSet<()>,
}

impl fmt::Debug for ProcTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcTask")
            .field("subscription", &self.subscription)
            .field("poll_interval", &self.poll_interval)
            .field("in_flight", &self.workers.len())
            .finish()
    }
}

impl ProcTask {
    pub fn new(ctx: &TaskContext, subscription: Subscription) -> Self {
        Self {
            subscription,
            repo: ctx.db.procs(),
            poll_interval: ctx.settings.proc_poll_interval,
            workers: JoinSet::new(),
        }
    }

    async fn poll(&mut self, cancel: &CancellationToken) {
        let pending = match self.repo.pending().await {
            Ok(rows) => rows,
            Err(err) => {
                error!("failed to query pending procs: {}", err);
                return;
            }
        };

        for row in pending {
            let repo = self.repo.clone();
            let cancel = cancel.child_token();
            self.workers.spawn(async move {
                let id = row.id;
                if let Err(err) = run_proc_worker(&repo, row, &cancel).await {
                    error!(proc_id = id, "proc worker failed: {}", err);
                }
            });
        }
    }

    async fn drain_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        debug!(in_flight = self.workers.len(), "waiting for proc workers");
        let drained = tokio::time::timeout(WORKER_DRAIN_TIMEOUT, async {
            while self.workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("proc workers did not finish in time, aborting");
            self.workers.abort_all();
        }
    }
}

#[async_trait]
impl Task for ProcTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Proc
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) {
        info!(task = %self.kind(), "task started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut draining = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll(&cancel).await,
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    if let Err(err) = joined {
                        error!("proc worker panicked: {}", err);
                    }
                }
                msg = self.subscription.recv(), if draining => match msg {
                    Some(msg) => trace!(message = %msg, "ignored by proc task"),
                    None => draining = false,
                },
            }
        }

        self.drain_workers().await;
        info!(task = %self.kind(), "task stopped");
    }
}
