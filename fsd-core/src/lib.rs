//! Core of the fsd daemon: event bus, filesystem watcher, SQLite store,
//! proc execution and the task runtime that ties them together.

pub mod database;
pub mod disk;
pub mod error;
pub mod fs_watch;
pub mod ipc;
pub mod procs;
pub mod tasks;

pub use database::Database;
pub use disk::DiskUsage;
pub use error::{FsdError, Result};
pub use fs_watch::{FsWatcher, WatchRegistrar, WatchStreams, run_ingest};
pub use ipc::{BroadcastOutcome, Broadcaster, FsdOp, Message, OpSet, Subscription};
pub use tasks::{RuntimeSettings, TaskContext, TaskKind, TaskRegistry};
