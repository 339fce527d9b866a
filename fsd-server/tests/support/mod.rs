#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use axum_test::TestServer;
use fsd_config::{Config, ConfigPaths};
use fsd_core::Database;
use fsd_server::{AppState, routes::create_router};
use tempfile::TempDir;

/// Router over a throwaway database and watch root.
pub struct TestApp {
    pub server: TestServer,
    pub db: Database,
    pub root: PathBuf,
    _dir: TempDir,
}

pub fn test_config(base: &Path) -> Config {
    let mut config = Config::with_defaults(ConfigPaths {
        base_dir: base.to_path_buf(),
        config_file: base.join("config.toml"),
        db_path: base.join("fsd.db"),
    });
    config.watch_dir = base.join("root");
    config.listen_addr = "127.0.0.1:0".into();
    config
}

pub async fn build_test_app() -> Result<TestApp> {
    let dir = TempDir::new()?;
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.watch_dir)?;

    let db = Database::open(config.db_path()).await?;
    db.initialize_schema().await?;

    let root = config.watch_dir.clone();
    let state = AppState::new(db.clone(), Arc::new(config), root.clone());
    let server = TestServer::new(create_router(state))?;

    Ok(TestApp {
        server,
        db,
        root,
        _dir: dir,
    })
}
