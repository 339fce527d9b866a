use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::models::{
    BASE_DIR_NAME, CONFIG_FILE_NAME, Config, ConfigOverrides, ConfigPaths, DB_FILE_NAME,
    FileConfig,
};
use crate::overrides::compose;
use crate::validation::{ConfigWarnings, apply_guard_rails};

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    /// Base directory holding `config.toml` and `fsd.db`. Defaults to
    /// `$HOME/.fsd`.
    pub home: Option<PathBuf>,
    /// Explicit config file. Must exist when given.
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
    /// Set when the loader wrote a fresh default file.
    pub created_default: bool,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("could not determine the home directory; set FSD_HOME")]
    NoHomeDirectory,
    #[error("configuration file {path} not found")]
    MissingConfig { path: PathBuf },
    #[error("failed to create configuration directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write default configuration to {path}")]
    WriteDefaults {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize default configuration")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to read configuration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_home<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.home = Some(path.into());
        self
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_db_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.db_path = Some(path.into());
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.options.overrides = overrides;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let paths = self.resolve_paths()?;
        let mut warnings = ConfigWarnings::default();
        let mut created_default = false;

        let file = if paths.config_file.exists() {
            read_file_config(&paths.config_file, &mut warnings)?
        } else if self.options.config_path.is_some() {
            return Err(ConfigLoadError::MissingConfig {
                path: paths.config_file,
            });
        } else {
            write_default_file(&paths)?;
            created_default = true;
            FileConfig::defaults()
        };

        let mut config = compose(file, &self.options.overrides, paths);
        warnings.extend(apply_guard_rails(&mut config));

        Ok(ConfigLoad {
            config,
            warnings,
            created_default,
        })
    }

    fn resolve_paths(&self) -> Result<ConfigPaths, ConfigLoadError> {
        let base_dir = match &self.options.home {
            Some(home) => home.clone(),
            None => dirs::home_dir()
                .ok_or(ConfigLoadError::NoHomeDirectory)?
                .join(BASE_DIR_NAME),
        };
        let config_file = self
            .options
            .config_path
            .clone()
            .unwrap_or_else(|| base_dir.join(CONFIG_FILE_NAME));
        let db_path = self
            .options
            .db_path
            .clone()
            .unwrap_or_else(|| base_dir.join(DB_FILE_NAME));

        Ok(ConfigPaths {
            base_dir,
            config_file,
            db_path,
        })
    }
}

fn read_file_config(
    path: &Path,
    warnings: &mut ConfigWarnings,
) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match toml::from_str::<FileConfig>(&contents) {
        Ok(file) => Ok(file),
        Err(err) => {
            warnings.push_with_hint(
                format!("failed to parse {}: {}; using defaults", path.display(), err.message()),
                "fix the file or delete it to have defaults written on next start",
            );
            Ok(FileConfig::default())
        }
    }
}

fn write_default_file(paths: &ConfigPaths) -> Result<(), ConfigLoadError> {
    create_private_dir(&paths.base_dir)?;
    let rendered = toml::to_string_pretty(&FileConfig::defaults())?;
    fs::write(&paths.config_file, rendered).map_err(|source| ConfigLoadError::WriteDefaults {
        path: paths.config_file.clone(),
        source,
    })?;
    info!(path = %paths.config_file.display(), "wrote default configuration");
    Ok(())
}

fn create_private_dir(path: &Path) -> Result<(), ConfigLoadError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path)
        .map_err(|source| ConfigLoadError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}
