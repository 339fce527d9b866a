use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsd_config::Config;
use fsd_core::Database;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    /// Absolute, prepared watch root. Proc paths are resolved against it.
    pub root: PathBuf,
}

impl AppState {
    pub fn new(db: Database, config: Arc<Config>, root: PathBuf) -> Self {
        Self { db, config, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("root", &self.root)
            .field("listen_addr", &self.config.listen_addr)
            .finish_non_exhaustive()
    }
}
