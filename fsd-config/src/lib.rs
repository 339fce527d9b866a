//! Configuration for the fsd daemon.
//!
//! The loader reads `config.toml` from the base directory (writing one with
//! defaults on first start), merges command-line overrides on top and returns
//! an immutable [`Config`] along with any warnings worth logging.

pub mod duration;
pub mod loader;
pub mod models;
pub mod overrides;
pub mod validation;

pub use duration::HumanDuration;
pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{Config, ConfigOverrides, ConfigPaths, FileConfig};
pub use validation::{ConfigWarning, ConfigWarnings};
