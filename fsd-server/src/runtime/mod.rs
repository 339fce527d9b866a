pub mod lifecycle;
pub mod signal;

pub use lifecycle::{Daemon, StartupError, prepare_root};
pub use signal::shutdown_signal;
