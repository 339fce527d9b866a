//! # fsd
//!
//! Filesystem daemon. Watches one root directory, keeps a time-stamped
//! history of per-path metadata and disk usage in SQLite, runs queued procs
//! and serves the collected state over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fsd_config::{ConfigLoad, ConfigLoader, ConfigOverrides};
use fsd_server::runtime::{Daemon, shutdown_signal};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "fsd")]
#[command(about = "Filesystem watch daemon with metadata history and queued procs")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// How often the metadata snapshot runs (e.g. 500ms)
    #[arg(long, env = "FSD_METADATA_UPDATE_INTERVAL", value_parser = humantime::parse_duration)]
    metadata_update_interval: Option<Duration>,

    /// How often a compaction message is published (e.g. 1m)
    #[arg(long, env = "FSD_COMPACTION_INTERVAL", value_parser = humantime::parse_duration)]
    compaction_interval: Option<Duration>,

    /// Per-subscriber queue depth on the event bus
    #[arg(long, env = "FSD_BROADCAST_BUFFER_DEPTH")]
    broadcast_buffer_depth: Option<usize>,

    /// HTTP listen address (host:port)
    #[arg(long, env = "FSD_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Root directory to watch
    #[arg(long, env = "FSD_WATCH_DIR")]
    watch_dir: Option<PathBuf>,

    /// Base directory for config.toml and fsd.db (defaults to ~/.fsd)
    #[arg(long, env = "FSD_HOME")]
    home: Option<PathBuf>,

    /// Load configuration from this file instead of the base directory
    #[arg(long, env = "FSD_CONFIG")]
    config: Option<PathBuf>,

    /// Place the database here instead of the base directory
    #[arg(long, env = "FSD_DB_PATH")]
    db_path: Option<PathBuf>,
}

impl ServeArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            metadata_update_interval: self.metadata_update_interval,
            compaction_interval: self.compaction_interval,
            broadcast_buffer_depth: self.broadcast_buffer_depth,
            listen_addr: self.listen_addr.clone(),
            watch_dir: self.watch_dir.clone(),
        }
    }

    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new().with_overrides(self.overrides());
        if let Some(home) = &self.home {
            loader = loader.with_home(home);
        }
        if let Some(config) = &self.config {
            loader = loader.with_config_path(config);
        }
        if let Some(db_path) = &self.db_path {
            loader = loader.with_db_path(db_path);
        }
        loader
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ConfigLoad {
        config,
        warnings,
        created_default,
    } = cli
        .serve
        .loader()
        .load()
        .context("failed to load configuration")?;

    if created_default {
        info!(path = %config.paths.config_file.display(), "created default configuration");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    info!(
        metadata_update_interval = %humantime::format_duration(config.metadata_update_interval),
        compaction_interval = %humantime::format_duration(config.compaction_interval),
        broadcast_buffer_depth = config.broadcast_buffer_depth,
        listen_addr = %config.listen_addr,
        watch_dir = %config.watch_dir.display(),
        db_path = %config.db_path().display(),
        "configuration in effect"
    );

    let daemon = Daemon::start(Arc::new(config))
        .await
        .context("failed to start fsd")?;
    daemon
        .run_until(shutdown_signal())
        .await
        .context("fsd stopped with an error")?;

    info!("Shutting down");
    Ok(())
}
