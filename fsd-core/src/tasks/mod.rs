//! Long-lived workers wired to the event bus.
//!
//! Every task is a value with a single `run(cancel)` entry point. Tasks only
//! talk to each other through the [`Broadcaster`] and the database.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::database::Database;
use crate::fs_watch::WatchRegistrar;
use crate::ipc::Broadcaster;

pub mod compaction_task;
pub mod fs_task;
pub mod gate;
pub mod metadata_task;
pub mod proc_task;
pub mod registry;

pub use compaction_task::CompactionTask;
pub use fs_task::FsTask;
pub use gate::{GateRefusal, SnapshotGate, SnapshotPermit};
pub use metadata_task::MetadataTask;
pub use proc_task::{ProcTask, WorkerOutcome, run_proc_worker};
pub use registry::TaskRegistry;

/// Well-known task identities. The name doubles as the bus subscriber name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Fs,
    Metadata,
    Compaction,
    Proc,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Fs,
        TaskKind::Metadata,
        TaskKind::Compaction,
        TaskKind::Proc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Fs => "FsTask",
            TaskKind::Metadata => "MetadataTask",
            TaskKind::Compaction => "CompactionTask",
            TaskKind::Proc => "ProcTask",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait]
pub trait Task: Send + fmt::Debug {
    fn kind(&self) -> TaskKind;

    /// Run the event loop until `cancel` fires or the subscription closes.
    async fn run(self: Box<Self>, cancel: CancellationToken);
}

/// Timing knobs for the task runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub metadata_update_interval: Duration,
    pub compaction_interval: Duration,
    pub disk_stats_interval: Duration,
    pub disk_stats_retain: u32,
    pub proc_poll_interval: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            metadata_update_interval: Duration::from_millis(500),
            compaction_interval: Duration::from_secs(60),
            disk_stats_interval: Duration::from_secs(5),
            disk_stats_retain: 5,
            proc_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Everything a task may need at construction time.
#[derive(Clone)]
pub struct TaskContext {
    pub root: PathBuf,
    pub broadcaster: Arc<Broadcaster>,
    pub db: Database,
    pub watcher: Arc<dyn WatchRegistrar>,
    pub settings: RuntimeSettings,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("root", &self.root)
            .field("broadcaster", &self.broadcaster)
            .field("db", &self.db)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
