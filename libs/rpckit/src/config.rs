//! Typed configuration sections.
//!
//! Two loaders, mirroring how modules treat their sections:
//!
//! 1. **Strict** ([`load_section`]): the section must exist and deserialize.
//! 2. **Lenient** ([`load_section_or_default`]): a missing section yields
//!    `T::default()`, a present but malformed one is still an error.

use figment::Figment;
use serde::de::DeserializeOwned;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config section '{section}' not found")]
    MissingSection { section: String },

    #[error("invalid config section '{section}': {source}")]
    InvalidSection {
        section: String,
        #[source]
        source: Box<figment::Error>,
    },
}

/// Extracts `section` (a dotted key path) from `figment`.
///
/// # Errors
/// - [`ConfigError::MissingSection`] if the section is absent
/// - [`ConfigError::InvalidSection`] if it cannot be deserialized into `T`
pub fn load_section<T: DeserializeOwned>(figment: &Figment, section: &str) -> Result<T, ConfigError> {
    if !figment.contains(section) {
        return Err(ConfigError::MissingSection {
            section: section.to_owned(),
        });
    }
    extract(figment, section)
}

/// Like [`load_section`] but falls back to `T::default()` when the section is
/// absent.
///
/// # Errors
/// Returns [`ConfigError::InvalidSection`] if the section exists but cannot be
/// deserialized.
pub fn load_section_or_default<T: DeserializeOwned + Default>(
    figment: &Figment,
    section: &str,
) -> Result<T, ConfigError> {
    if !figment.contains(section) {
        tracing::debug!(section, "config section absent, using defaults");
        return Ok(T::default());
    }
    extract(figment, section)
}

fn extract<T: DeserializeOwned>(figment: &Figment, section: &str) -> Result<T, ConfigError> {
    figment
        .extract_inner::<T>(section)
        .map_err(|e| ConfigError::InvalidSection {
            section: section.to_owned(),
            source: Box::new(e),
        })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::telemetry::{LogFormat, LoggingConfig};
    use figment::providers::{Format, Yaml};

    fn figment(yaml: &str) -> Figment {
        Figment::new().merge(Yaml::string(yaml))
    }

    #[test]
    fn strict_loader_reads_present_section() {
        let fig = figment(
            r"
logging:
  level: debug
  format: json
",
        );
        let cfg: LoggingConfig = load_section(&fig, "logging").unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(cfg.with_target);
    }

    #[test]
    fn strict_loader_rejects_missing_section() {
        let fig = figment("other: {}\n");
        let err = load_section::<LoggingConfig>(&fig, "logging").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection { ref section } if section == "logging"));
    }

    #[test]
    fn lenient_loader_defaults_missing_section() {
        let fig = figment("other: {}\n");
        let cfg: LoggingConfig = load_section_or_default(&fig, "logging").unwrap();
        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn lenient_loader_still_rejects_malformed_section() {
        let fig = figment(
            r"
logging:
  format: xml
",
        );
        let err = load_section_or_default::<LoggingConfig>(&fig, "logging").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSection { .. }));
        assert!(err.to_string().contains("logging"));
    }

    #[test]
    fn nested_sections_use_dotted_paths() {
        let fig = figment(
            r"
server:
  logging:
    level: warn
",
        );
        let cfg: LoggingConfig = load_section(&fig, "server.logging").unwrap();
        assert_eq!(cfg.level, "warn");
    }
}
