//! Interface-level and consumer override configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rpckit::Capability;

use crate::api::Registry;
use crate::error::RegistryError;
use crate::listener::ConfigListener;
use crate::models::{ConsumerConfig, ServiceKey};

/// Dynamic configuration on top of a registry's config channel.
///
/// Keeps a local cache of the latest attributes per service key and per
/// overridden consumer so callers can read configuration without waiting for
/// a notification. Each configer holds its own subscriptions; configers
/// sharing a registry never cancel each other's listeners.
#[async_trait]
pub trait DynamicConfiger: Send + Sync {
    /// Subscribes `listener` to the attributes of `key` and returns them.
    ///
    /// # Errors
    /// Propagates the registry's `subscribe_config` errors.
    async fn subscribe_interface_config(
        &self,
        key: &ServiceKey,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError>;

    /// # Errors
    /// Propagates the registry's `unsubscribe_config` errors.
    async fn unsubscribe_config(&self, key: &ServiceKey) -> Result<(), RegistryError>;

    /// Subscribes `listener` to the overrides pushed for `consumer`'s service
    /// and returns the current ones.
    ///
    /// # Errors
    /// Propagates the registry's `subscribe_config` errors.
    async fn subscribe_override(
        &self,
        consumer: &ConsumerConfig,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError>;

    /// # Errors
    /// Propagates the registry's `unsubscribe_config` errors.
    async fn unsubscribe_override(&self, consumer: &ConsumerConfig) -> Result<(), RegistryError>;

    /// Latest cached attributes of `key`.
    fn cached_attrs(&self, key: &ServiceKey) -> Option<BTreeMap<String, String>>;

    /// Latest cached overrides of `consumer`.
    fn cached_overrides(&self, consumer: &ConsumerConfig) -> Option<BTreeMap<String, String>>;

    /// Drops every cached attribute and override map.
    fn clear_config_cache(&self);
}

impl Capability for dyn DynamicConfiger {
    const NAME: &'static str = "dynamic-configer";
    type Args = Arc<dyn Registry>;
}
