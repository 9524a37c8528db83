//! Registry configuration.

use std::time::Duration;

use figment::Figment;
use figment::providers::Env;
use rpckit::config::{ConfigError, load_section_or_default};
use serde::{Deserialize, Serialize};

/// Config section read by [`RegistryConfig::from_figment`].
pub const SECTION: &str = "registry";

/// Environment variable prefix overriding the section, e.g.
/// `RPCKIT_REGISTRY_ADDRESS`.
pub const ENV_PREFIX: &str = "RPCKIT_REGISTRY_";

/// Connection and behavior settings of one registry instance.
///
/// Identical configs map to one live registry in the registry factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Backend alias, resolved through the extension loader.
    pub protocol: String,
    pub address: String,
    /// Publish providers. When `false`, `register` is a logged no-op.
    pub register: bool,
    /// Subscribe consumers. When `false`, `subscribe` returns an empty
    /// snapshot.
    pub subscribe: bool,
    /// Root path under which services are laid out.
    pub root: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Connection attempts before `start` gives up.
    pub connect_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            protocol: "memory".to_owned(),
            address: "local".to_owned(),
            register: true,
            subscribe: true,
            root: "/rpc".to_owned(),
            connect_timeout: Duration::from_secs(3),
            connect_retries: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl RegistryConfig {
    pub fn new(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    #[must_use]
    pub fn with_register(mut self, register: bool) -> Self {
        self.register = register;
        self
    }

    #[must_use]
    pub fn with_subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Reads the `registry` section of `figment`, overridden by
    /// `RPCKIT_REGISTRY_*` variables. Missing keys take defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidSection`] if a present value cannot be
    /// deserialized.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let layered = figment.clone().merge(
            Env::prefixed(ENV_PREFIX).map(|key| format!("{SECTION}.{}", key.as_str()).into()),
        );
        load_section_or_default(&layered, SECTION)
    }
}
