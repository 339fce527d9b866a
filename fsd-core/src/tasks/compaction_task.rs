use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::ipc::{Broadcaster, Message, Subscription};
use crate::tasks::{Task, TaskContext, TaskKind};

/// Publishes a `Compact` message every compaction interval.
pub struct CompactionTask {
    subscription: Subscription,
    broadcaster: Arc<Broadcaster>,
    period: Duration,
}

impl fmt::Debug for CompactionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactionTask")
            .field("subscription", &self.subscription)
            .field("period", &self.period)
            .finish()
    }
}

impl CompactionTask {
    pub fn new(ctx: &TaskContext, subscription: Subscription) -> Self {
        Self {
            subscription,
            broadcaster: Arc::clone(&ctx.broadcaster),
            period: ctx.settings.compaction_interval,
        }
    }
}

#[async_trait]
impl Task for CompactionTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Compaction
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) {
        info!(task = %self.kind(), period = ?self.period, "task started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut draining = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.broadcaster.broadcast(Message::compact()).await;
                    debug!(delivered = outcome.delivered, dropped = outcome.dropped, "compaction requested");
                }
                msg = self.subscription.recv(), if draining => match msg {
                    Some(msg) => trace!(message = %msg, "discarding"),
                    None => draining = false,
                },
            }
        }

        info!(task = %self.kind(), "task stopped");
    }
}
