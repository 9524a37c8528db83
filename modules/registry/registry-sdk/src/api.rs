//! Public API trait for service registries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rpckit::Capability;
use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::listener::ConfigListener;
use crate::models::{ConfigSubscription, ConsumerConfig, ProviderConfig, ProviderGroup};

/// Lifecycle of a registry. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    Created,
    Initialized,
    Started,
    Destroyed,
}

impl fmt::Display for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Destroyed => "destroyed",
        })
    }
}

/// Publish/subscribe of service endpoints and configuration attributes
/// against a coordination store.
///
/// Implementations are registered as extensions of `dyn Registry` under
/// their protocol name and resolved with a [`RegistryConfig`]:
///
/// ```ignore
/// let loader = factory.get_loader::<dyn Registry>()?;
/// let registry = loader.get_extension_with(&config.protocol, &config)?;
/// registry.init()?;
/// registry.start().await?;
/// ```
#[async_trait]
pub trait Registry: Send + Sync {
    fn config(&self) -> &RegistryConfig;

    fn state(&self) -> RegistryState;

    /// Wires local resources. No network I/O.
    ///
    /// # Errors
    /// `State` unless the registry is `Created`.
    fn init(&self) -> Result<(), RegistryError>;

    /// Establishes the store session. Idempotent once started.
    ///
    /// # Errors
    /// - `State` if not initialized or already destroyed
    /// - `Connection` when retries are exhausted
    async fn start(&self) -> Result<(), RegistryError>;

    /// Releases the session and every subscription. Safe to call repeatedly.
    async fn destroy(&self);

    /// Publishes one endpoint per server binding of `config`.
    ///
    /// # Errors
    /// `State` if not started, `Operation` for malformed configs or store
    /// rejections.
    async fn register(&self, config: &ProviderConfig) -> Result<(), RegistryError>;

    /// Removes every endpoint previously published for `config`.
    ///
    /// # Errors
    /// `State` if not started, `Operation` on store rejection.
    async fn unregister(&self, config: &ProviderConfig) -> Result<(), RegistryError>;

    /// # Errors
    /// Same as [`unregister`](Self::unregister).
    async fn batch_unregister(&self, configs: &[ProviderConfig]) -> Result<(), RegistryError>;

    /// Starts a live subscription and returns the snapshot known now.
    ///
    /// The caller folds the snapshot into its listener; later changes arrive
    /// through `config.listener`.
    ///
    /// # Errors
    /// `State` if not started, `Operation` for malformed configs or a missing
    /// listener.
    async fn subscribe(&self, config: &ConsumerConfig) -> Result<Vec<ProviderGroup>, RegistryError>;

    /// Cancels the subscription of `config.consumer_id`.
    ///
    /// # Errors
    /// `State` if not started.
    async fn unsubscribe(&self, config: &ConsumerConfig) -> Result<(), RegistryError>;

    /// # Errors
    /// Same as [`unsubscribe`](Self::unsubscribe).
    async fn batch_unsubscribe(&self, configs: &[ConsumerConfig]) -> Result<(), RegistryError>;

    /// Subscribes `listener` to the configuration node named by
    /// `subscription` and returns its current attributes.
    ///
    /// Every subscription on a node receives each diff. Subscribing again
    /// with the same `subscription_id` replaces only that listener.
    ///
    /// # Errors
    /// `State` if not started, `Operation` for a malformed key or a store
    /// rejection.
    async fn subscribe_config(
        &self,
        subscription: &ConfigSubscription,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError>;

    /// Cancels one config subscription; others on the same node keep
    /// receiving.
    ///
    /// # Errors
    /// `State` if not started.
    async fn unsubscribe_config(
        &self,
        subscription: &ConfigSubscription,
    ) -> Result<(), RegistryError>;
}

impl Capability for dyn Registry {
    const NAME: &'static str = "registry";
    type Args = RegistryConfig;
}
