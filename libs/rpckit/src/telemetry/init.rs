//! Global `tracing` subscriber installation.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use super::config::{LogFormat, LoggingConfig};

/// Installs a `tracing-subscriber` fmt subscriber as the global default.
///
/// `RUST_LOG` wins over `cfg.level` when set.
///
/// # Errors
/// Fails if the filter directive is invalid or a global subscriber is already
/// installed.
pub fn init_logging(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .with_context(|| format!("invalid log level directive '{}'", cfg.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cfg.with_target);

    let installed = match cfg.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::debug!(level = %cfg.level, format = ?cfg.format, "logging initialized");
    Ok(())
}
