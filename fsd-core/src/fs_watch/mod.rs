//! Filesystem watcher adapter.
//!
//! Wraps a `notify` watcher and exposes its callbacks as two tokio streams,
//! one for events and one for errors. The watch set is per-directory
//! (non-recursive); new subdirectories are added explicitly as they appear.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{FsdError, Result};

pub mod ingest;

pub use ingest::{messages_from_event, run_ingest};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Anything that can extend the watch set.
pub trait WatchRegistrar: Send + Sync {
    /// Watch `path`. Returns `true` when the path was not already tracked.
    fn add(&self, path: &Path) -> Result<bool>;

    /// Drop `path` and everything below it from the tracked set.
    fn forget(&self, _path: &Path) {}
}

/// Receiving ends of the watcher callbacks.
#[derive(Debug)]
pub struct WatchStreams {
    pub events: mpsc::Receiver<Event>,
    pub errors: mpsc::Receiver<notify::Error>,
}

struct WatchState {
    watcher: Option<RecommendedWatcher>,
    watched: BTreeSet<PathBuf>,
}

/// Process-wide filesystem watcher.
pub struct FsWatcher {
    state: Mutex<WatchState>,
}

impl fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FsWatcher");
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("open", &state.watcher.is_some())
                    .field("watch_count", &state.watched.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl FsWatcher {
    pub fn new() -> Result<(Self, WatchStreams)> {
        let (event_tx, event_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel::<notify::Error>(ERROR_CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(err) = event_tx.blocking_send(event) {
                        debug!("fs watch event dropped, ingest gone: {}", err);
                    }
                }
                Err(err) => {
                    if let Err(err) = error_tx.blocking_send(err) {
                        debug!("fs watch error dropped, ingest gone: {}", err);
                    }
                }
            },
            NotifyConfig::default(),
        )?;

        let watcher = Self {
            state: Mutex::new(WatchState {
                watcher: Some(watcher),
                watched: BTreeSet::new(),
            }),
        };

        Ok((
            watcher,
            WatchStreams {
                events: event_rx,
                errors: error_rx,
            },
        ))
    }

    /// Start watching `path` (a single directory level).
    ///
    /// The platform watch is always (re)installed: a directory that was
    /// deleted and recreated under the same name loses its kernel watch even
    /// though the path is still tracked here. Returns `true` when the path
    /// was not tracked before.
    pub fn add(&self, path: &Path) -> Result<bool> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| FsdError::Internal("watcher state lock poisoned".into()))?;

        let watcher = state
            .watcher
            .as_mut()
            .ok_or_else(|| FsdError::Internal("watcher already closed".into()))?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;

        let added = state.watched.insert(path.to_path_buf());
        if added {
            debug!(path = %path.display(), "added to watch set");
        }
        Ok(added)
    }

    /// Stop tracking `path` and its descendants. The kernel drops watches on
    /// deleted directories by itself, so only the bookkeeping changes.
    pub fn forget(&self, path: &Path) {
        match self.state.lock() {
            Ok(mut state) => {
                let before = state.watched.len();
                state.watched.retain(|watched| !watched.starts_with(path));
                let dropped = before - state.watched.len();
                if dropped > 0 {
                    debug!(path = %path.display(), dropped, "removed from watch set");
                }
            }
            Err(_) => warn!("watcher state lock poisoned during forget"),
        }
    }

    /// Snapshot of the current watch set, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        match self.state.lock() {
            Ok(state) => state.watched.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Stop the platform watcher. Dropping it closes both streams, which in
    /// turn ends ingest.
    pub fn close(&self) {
        match self.state.lock() {
            Ok(mut state) => {
                state.watcher.take();
                state.watched.clear();
            }
            Err(_) => warn!("watcher state lock poisoned during close"),
        }
    }
}

impl WatchRegistrar for FsWatcher {
    fn add(&self, path: &Path) -> Result<bool> {
        FsWatcher::add(self, path)
    }

    fn forget(&self, path: &Path) {
        FsWatcher::forget(self, path)
    }
}
