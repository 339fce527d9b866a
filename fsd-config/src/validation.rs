use crate::models::{
    Config, DEFAULT_BROADCAST_BUFFER_DEPTH, DEFAULT_COMPACTION_INTERVAL, DEFAULT_LISTEN_ADDR,
    DEFAULT_METADATA_UPDATE_INTERVAL,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Replace values the runtime cannot work with by their defaults.
pub fn apply_guard_rails(config: &mut Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();

    if config.metadata_update_interval.is_zero() {
        config.metadata_update_interval = DEFAULT_METADATA_UPDATE_INTERVAL;
        warnings.push_with_hint(
            "metadata_update_interval must be non-zero; using default",
            "set metadata_update_interval to a value such as \"500ms\"",
        );
    }

    if config.compaction_interval.is_zero() {
        config.compaction_interval = DEFAULT_COMPACTION_INTERVAL;
        warnings.push_with_hint(
            "compaction_interval must be non-zero; using default",
            "set compaction_interval to a value such as \"1m\"",
        );
    }

    if config.broadcast_buffer_depth == 0 {
        config.broadcast_buffer_depth = DEFAULT_BROADCAST_BUFFER_DEPTH;
        warnings.push("broadcast_buffer_depth must be at least 1; using default");
    }

    if config.listen_addr.trim().is_empty() {
        config.listen_addr = DEFAULT_LISTEN_ADDR.to_string();
        warnings.push("listen_addr is empty; using default");
    }

    if config.watch_dir.as_os_str().is_empty() {
        config.watch_dir = crate::models::DEFAULT_WATCH_DIR.into();
        warnings.push("watch_dir is empty; using default");
    }

    warnings
}
