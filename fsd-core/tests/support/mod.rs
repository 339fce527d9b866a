//! Shared harness for core integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use fsd_core::fs_watch::WatchRegistrar;
use fsd_core::{Broadcaster, Database, RuntimeSettings, TaskContext};

/// Temporary root plus a schema-initialized database living next to it.
pub struct Harness {
    pub root_dir: TempDir,
    pub db_dir: TempDir,
    pub db: Database,
    pub broadcaster: Arc<Broadcaster>,
}

impl Harness {
    pub async fn new(depth: usize) -> Result<Self> {
        let root_dir = TempDir::new().context("root tempdir")?;
        let db_dir = TempDir::new().context("db tempdir")?;
        let db = Database::open(&db_dir.path().join("fsd.db")).await?;
        db.initialize_schema().await?;
        Ok(Self {
            root_dir,
            db_dir,
            db,
            broadcaster: Arc::new(Broadcaster::new(depth)),
        })
    }

    pub fn root(&self) -> PathBuf {
        self.root_dir.path().to_path_buf()
    }

    pub fn context(
        &self,
        watcher: Arc<dyn WatchRegistrar>,
        settings: RuntimeSettings,
    ) -> TaskContext {
        TaskContext {
            root: self.root(),
            broadcaster: Arc::clone(&self.broadcaster),
            db: self.db.clone(),
            watcher,
            settings,
        }
    }
}

/// Registrar that accepts every path without watching anything.
#[derive(Debug, Default)]
pub struct NullRegistrar;

impl WatchRegistrar for NullRegistrar {
    fn add(&self, _path: &std::path::Path) -> fsd_core::Result<bool> {
        Ok(true)
    }
}

/// Settings with every periodic source pushed far into the future.
pub fn quiet_settings() -> RuntimeSettings {
    let hour = Duration::from_secs(3600);
    RuntimeSettings {
        metadata_update_interval: hour,
        compaction_interval: hour,
        disk_stats_interval: hour,
        disk_stats_retain: 5,
        proc_poll_interval: hour,
    }
}

/// Re-evaluate `check` every 25ms until it returns true or `limit` passes.
pub async fn wait_for<F, Fut>(limit: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {:?}", limit);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
