use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::ipc::Broadcaster;
use crate::tasks::{
    CompactionTask, FsTask, MetadataTask, ProcTask, Task, TaskContext, TaskKind,
};

/// Name-keyed set of constructed, subscribed, not yet running tasks.
pub struct TaskRegistry {
    broadcaster: Arc<Broadcaster>,
    tasks: BTreeMap<TaskKind, Box<dyn Task>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

impl TaskRegistry {
    /// Build one task per kind, each subscribed under its own name.
    /// Repeated kinds are ignored.
    pub async fn init(ctx: &TaskContext, kinds: &[TaskKind]) -> Result<Self> {
        let mut tasks: BTreeMap<TaskKind, Box<dyn Task>> = BTreeMap::new();

        for &kind in kinds {
            if tasks.contains_key(&kind) {
                continue;
            }
            let subscription = ctx.broadcaster.subscribe(kind.name()).await?;
            let task: Box<dyn Task> = match kind {
                TaskKind::Fs => Box::new(FsTask::new(ctx, subscription)),
                TaskKind::Metadata => Box::new(MetadataTask::new(ctx, subscription)),
                TaskKind::Compaction => Box::new(CompactionTask::new(ctx, subscription)),
                TaskKind::Proc => Box::new(ProcTask::new(ctx, subscription)),
            };
            tasks.insert(kind, task);
        }

        Ok(Self {
            broadcaster: Arc::clone(&ctx.broadcaster),
            tasks,
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.keys().map(TaskKind::name).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Launch every task on its own tokio task. Each one unsubscribes from
    /// the bus once its loop returns.
    pub fn run(self, cancel: &CancellationToken) -> JoinSet<TaskKind> {
        let mut set = JoinSet::new();
        for (kind, task) in self.tasks {
            info!(task = %kind, "starting task");
            let broadcaster = Arc::clone(&self.broadcaster);
            let cancel = cancel.child_token();
            set.spawn(async move {
                task.run(cancel).await;
                broadcaster.unsubscribe(kind.name()).await;
                kind
            });
        }
        set
    }
}
