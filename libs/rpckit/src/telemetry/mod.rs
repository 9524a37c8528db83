//! Logging setup and log-rate helpers.

pub mod config;
pub mod init;
pub mod throttled_log;

pub use config::{LogFormat, LoggingConfig};
pub use init::init_logging;
pub use throttled_log::ThrottledLog;
