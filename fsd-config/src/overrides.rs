use crate::models::{
    Config, ConfigOverrides, ConfigPaths, DEFAULT_BROADCAST_BUFFER_DEPTH,
    DEFAULT_COMPACTION_INTERVAL, DEFAULT_LISTEN_ADDR, DEFAULT_METADATA_UPDATE_INTERVAL,
    DEFAULT_WATCH_DIR, FileConfig,
};

/// Merge in precedence order: override, then file, then default.
pub fn compose(file: FileConfig, overrides: &ConfigOverrides, paths: ConfigPaths) -> Config {
    let FileConfig {
        metadata_update_interval,
        compaction_interval,
        broadcast_buffer_depth,
        listen_addr,
        watch_dir,
    } = file;

    Config {
        metadata_update_interval: overrides
            .metadata_update_interval
            .or(metadata_update_interval.map(Into::into))
            .unwrap_or(DEFAULT_METADATA_UPDATE_INTERVAL),
        compaction_interval: overrides
            .compaction_interval
            .or(compaction_interval.map(Into::into))
            .unwrap_or(DEFAULT_COMPACTION_INTERVAL),
        broadcast_buffer_depth: overrides
            .broadcast_buffer_depth
            .or(broadcast_buffer_depth)
            .unwrap_or(DEFAULT_BROADCAST_BUFFER_DEPTH),
        listen_addr: overrides
            .listen_addr
            .clone()
            .or(listen_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        watch_dir: overrides
            .watch_dir
            .clone()
            .or(watch_dir)
            .unwrap_or_else(|| DEFAULT_WATCH_DIR.into()),
        paths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn paths() -> ConfigPaths {
        ConfigPaths {
            base_dir: PathBuf::from("/b"),
            config_file: PathBuf::from("/b/config.toml"),
            db_path: PathBuf::from("/b/fsd.db"),
        }
    }

    #[test]
    fn override_beats_file_beats_default() {
        let file = FileConfig {
            compaction_interval: Some(Duration::from_secs(30).into()),
            listen_addr: Some("0.0.0.0:9000".into()),
            ..FileConfig::default()
        };
        let overrides = ConfigOverrides {
            listen_addr: Some("127.0.0.1:1".into()),
            ..ConfigOverrides::default()
        };

        let config = compose(file, &overrides, paths());
        assert_eq!(config.listen_addr, "127.0.0.1:1");
        assert_eq!(config.compaction_interval, Duration::from_secs(30));
        assert_eq!(config.metadata_update_interval, DEFAULT_METADATA_UPDATE_INTERVAL);
        assert_eq!(config.watch_dir, PathBuf::from(DEFAULT_WATCH_DIR));
    }
}
