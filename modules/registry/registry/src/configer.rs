//! Dynamic configuration backed by a registry's config subscriptions.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use registry_sdk::{
    ConfigListener, ConfigSubscription, ConsumerConfig, DynamicConfiger, Registry, RegistryError,
    ServiceKey,
};
use uuid::Uuid;

/// Alias of the registry-backed configer.
pub const ALIAS: &str = "registry";

type AttrCache<K> = Arc<DashMap<K, BTreeMap<String, String>>>;

/// [`DynamicConfiger`] that keeps the last known attributes per key and the
/// last known overrides per consumer.
///
/// Interface subscriptions are made under the configer's own id, so two
/// configers on one registry hold separate listeners on the same node.
pub struct RegistryDynamicConfiger {
    registry: Arc<dyn Registry>,
    subscription_id: Uuid,
    interfaces: AttrCache<ServiceKey>,
    overrides: AttrCache<Uuid>,
}

impl RegistryDynamicConfiger {
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            subscription_id: Uuid::new_v4(),
            interfaces: Arc::new(DashMap::new()),
            overrides: Arc::new(DashMap::new()),
        }
    }

    /// Extension constructor.
    ///
    /// # Errors
    /// Never fails; the signature is fixed by the extension catalog.
    pub fn create(registry: &Arc<dyn Registry>) -> anyhow::Result<Arc<dyn DynamicConfiger>> {
        Ok(Arc::new(Self::new(Arc::clone(registry))))
    }

    fn interface_subscription(&self, key: &ServiceKey) -> ConfigSubscription {
        ConfigSubscription::interface(self.subscription_id, key.clone())
    }

    async fn subscribe_cached<K>(
        &self,
        subscription: ConfigSubscription,
        cache: &AttrCache<K>,
        cache_key: K,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let caching = Arc::new(CachingListener {
            key: cache_key.clone(),
            cache: Arc::clone(cache),
            inner: listener,
        });
        let attrs = self.registry.subscribe_config(&subscription, caching).await?;
        cache.insert(cache_key, attrs.clone());
        Ok(attrs)
    }
}

/// Keeps the cache current, then forwards to the caller's listener.
struct CachingListener<K> {
    key: K,
    cache: AttrCache<K>,
    inner: Arc<dyn ConfigListener>,
}

impl<K> ConfigListener for CachingListener<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn attr_updated(&self, changed: &BTreeMap<String, String>) {
        self.cache.entry(self.key.clone()).or_default().extend(
            changed
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        self.inner.attr_updated(changed);
    }

    fn config_changed(&self, all: &BTreeMap<String, String>) {
        self.cache.insert(self.key.clone(), all.clone());
        self.inner.config_changed(all);
    }
}

#[async_trait]
impl DynamicConfiger for RegistryDynamicConfiger {
    async fn subscribe_interface_config(
        &self,
        key: &ServiceKey,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError> {
        self.subscribe_cached(
            self.interface_subscription(key),
            &self.interfaces,
            key.clone(),
            listener,
        )
        .await
    }

    async fn unsubscribe_config(&self, key: &ServiceKey) -> Result<(), RegistryError> {
        self.interfaces.remove(key);
        self.registry
            .unsubscribe_config(&self.interface_subscription(key))
            .await
    }

    async fn subscribe_override(
        &self,
        consumer: &ConsumerConfig,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError> {
        self.subscribe_cached(
            ConfigSubscription::overrides(consumer),
            &self.overrides,
            consumer.consumer_id,
            listener,
        )
        .await
    }

    async fn unsubscribe_override(&self, consumer: &ConsumerConfig) -> Result<(), RegistryError> {
        self.overrides.remove(&consumer.consumer_id);
        self.registry
            .unsubscribe_config(&ConfigSubscription::overrides(consumer))
            .await
    }

    fn cached_attrs(&self, key: &ServiceKey) -> Option<BTreeMap<String, String>> {
        self.interfaces.get(key).map(|entry| entry.value().clone())
    }

    fn cached_overrides(&self, consumer: &ConsumerConfig) -> Option<BTreeMap<String, String>> {
        self.overrides
            .get(&consumer.consumer_id)
            .map(|entry| entry.value().clone())
    }

    fn clear_config_cache(&self) {
        self.interfaces.clear();
        self.overrides.clear();
    }
}
