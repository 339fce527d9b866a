use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::HumanDuration;

pub const DEFAULT_METADATA_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BROADCAST_BUFFER_DEPTH: usize = 1000;
pub const DEFAULT_LISTEN_ADDR: &str = "localhost:16000";
pub const DEFAULT_WATCH_DIR: &str = "/tmp/fsd";

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "fsd.db";
pub const BASE_DIR_NAME: &str = ".fsd";

/// Fully resolved daemon configuration. Built once at startup and shared
/// read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub metadata_update_interval: Duration,
    pub compaction_interval: Duration,
    pub broadcast_buffer_depth: usize,
    pub listen_addr: String,
    pub watch_dir: PathBuf,
    pub paths: ConfigPaths,
}

/// Where the config file and the database live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    pub db_path: PathBuf,
}

impl Config {
    pub fn with_defaults(paths: ConfigPaths) -> Self {
        Self {
            metadata_update_interval: DEFAULT_METADATA_UPDATE_INTERVAL,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
            broadcast_buffer_depth: DEFAULT_BROADCAST_BUFFER_DEPTH,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            watch_dir: PathBuf::from(DEFAULT_WATCH_DIR),
            paths,
        }
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.paths.db_path
    }
}

/// Raw configuration as written in `config.toml`. Every field is optional;
/// missing fields fall back to defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_update_interval: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_interval: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_buffer_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_dir: Option<PathBuf>,
}

impl FileConfig {
    /// The file written on first start.
    pub fn defaults() -> Self {
        Self {
            metadata_update_interval: Some(DEFAULT_METADATA_UPDATE_INTERVAL.into()),
            compaction_interval: Some(DEFAULT_COMPACTION_INTERVAL.into()),
            broadcast_buffer_depth: Some(DEFAULT_BROADCAST_BUFFER_DEPTH),
            listen_addr: Some(DEFAULT_LISTEN_ADDR.to_string()),
            watch_dir: Some(PathBuf::from(DEFAULT_WATCH_DIR)),
        }
    }
}

/// Values supplied on the command line or through the environment. These
/// win over the file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub metadata_update_interval: Option<Duration>,
    pub compaction_interval: Option<Duration>,
    pub broadcast_buffer_depth: Option<usize>,
    pub listen_addr: Option<String>,
    pub watch_dir: Option<PathBuf>,
}
