use std::sync::Arc;

use dashmap::DashMap;
use registry_sdk::{Registry, RegistryConfig, RegistryError, RegistryState};
use rpckit::ExtensionLoaderFactory;

/// Hands out one initialized registry per distinct [`RegistryConfig`].
///
/// Backends are resolved through the extension loader of `dyn Registry`
/// under `config.protocol`. A cached registry that has been destroyed is
/// replaced on the next request.
pub struct RegistryFactory {
    loaders: Arc<ExtensionLoaderFactory>,
    registries: DashMap<RegistryConfig, Arc<dyn Registry>>,
}

impl RegistryFactory {
    #[must_use]
    pub fn new(loaders: Arc<ExtensionLoaderFactory>) -> Self {
        Self {
            loaders,
            registries: DashMap::new(),
        }
    }

    /// Factory over the process-wide extension catalog.
    ///
    /// # Errors
    /// Propagates catalog failures as [`RegistryError::Extension`].
    pub fn from_global() -> Result<Self, RegistryError> {
        Ok(Self::new(ExtensionLoaderFactory::global()?))
    }

    /// Returns the registry for `config`, creating and initializing it once.
    ///
    /// # Errors
    /// - `Extension(NotFound)` when no backend is registered for the protocol
    /// - `Extension(Instantiation)` when the backend constructor fails
    #[tracing::instrument(skip_all, fields(protocol = %config.protocol, address = %config.address))]
    pub fn get_registry(&self, config: &RegistryConfig) -> Result<Arc<dyn Registry>, RegistryError> {
        if let Some(existing) = self.registries.get(config)
            && existing.state() != RegistryState::Destroyed
        {
            return Ok(Arc::clone(existing.value()));
        }

        let mut entry = self.registries.entry(config.clone()).or_try_insert_with(|| {
            self.create(config)
        })?;
        if entry.state() == RegistryState::Destroyed {
            *entry = self.create(config)?;
        }
        Ok(Arc::clone(entry.value()))
    }

    fn create(&self, config: &RegistryConfig) -> Result<Arc<dyn Registry>, RegistryError> {
        let registry = self
            .loaders
            .get_loader::<dyn Registry>()?
            .get_extension_with(&config.protocol, config)?;
        registry.init()?;
        tracing::info!("registry created");
        Ok(registry)
    }

    /// Every registry handed out so far that is not destroyed.
    #[must_use]
    pub fn registries(&self) -> Vec<Arc<dyn Registry>> {
        self.registries
            .iter()
            .filter(|entry| entry.state() != RegistryState::Destroyed)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Destroys and forgets every cached registry.
    pub async fn destroy_all(&self) {
        let registries: Vec<Arc<dyn Registry>> = self
            .registries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.registries.clear();
        for registry in registries {
            registry.destroy().await;
        }
        tracing::info!("all registries destroyed");
    }
}
