use std::any::Any;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::capability::{Capability, CapabilityKey};
use super::catalog::{Catalog, InventorySource};
use super::error::{CatalogError, ExtensionError};
use super::loader::ExtensionLoader;

type ErasedLoader = Arc<dyn Any + Send + Sync>;

static GLOBAL: ArcSwapOption<ExtensionLoaderFactory> = ArcSwapOption::const_empty();
static GLOBAL_INIT: Mutex<()> = parking_lot::const_mutex(());

/// Cache of one [`ExtensionLoader`] per capability type.
pub struct ExtensionLoaderFactory {
    catalog: Arc<Catalog>,
    loaders: DashMap<CapabilityKey, ErasedLoader>,
}

impl ExtensionLoaderFactory {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            loaders: DashMap::new(),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the loader for capability `T`, creating it on first use.
    ///
    /// Concurrent first callers are serialized on the map entry, so at most
    /// one loader is ever created per type.
    ///
    /// # Errors
    /// Returns [`ExtensionError::TypeMismatch`] if the cached loader is not an
    /// `ExtensionLoader<T>`.
    pub fn get_loader<T: Capability + ?Sized>(
        &self,
    ) -> Result<Arc<ExtensionLoader<T>>, ExtensionError> {
        let key = CapabilityKey::of::<T>();
        if let Some(existing) = self.loaders.get(&key) {
            return downcast_loader::<T>(Arc::clone(existing.value()));
        }

        let erased = Arc::clone(
            self.loaders
                .entry(key)
                .or_insert_with(|| {
                    tracing::debug!(capability = T::NAME, "creating extension loader");
                    Arc::new(ExtensionLoader::<T>::new(&self.catalog)) as ErasedLoader
                })
                .value(),
        );
        downcast_loader::<T>(erased)
    }

    /// Number of loaders created so far.
    #[must_use]
    pub fn loader_count(&self) -> usize {
        self.loaders.len()
    }

    /// Process-wide factory, built from the inventory table on first use.
    ///
    /// # Errors
    /// Returns [`ExtensionError::Catalog`] if the compiled-in registrations
    /// are inconsistent.
    pub fn global() -> Result<Arc<Self>, ExtensionError> {
        if let Some(factory) = GLOBAL.load_full() {
            return Ok(factory);
        }

        let _guard = GLOBAL_INIT.lock();
        if let Some(factory) = GLOBAL.load_full() {
            return Ok(factory);
        }

        let catalog = Catalog::build(&InventorySource)?;
        tracing::info!(extensions = catalog.len(), "extension catalog initialized");
        let factory = Arc::new(Self::new(Arc::new(catalog)));
        GLOBAL.store(Some(Arc::clone(&factory)));
        Ok(factory)
    }

    /// Replaces the process-wide factory with one over `catalog`.
    pub fn install_global(catalog: Catalog) -> Arc<Self> {
        let _guard = GLOBAL_INIT.lock();
        let factory = Arc::new(Self::new(Arc::new(catalog)));
        GLOBAL.store(Some(Arc::clone(&factory)));
        factory
    }

    /// Drops the process-wide factory; the next [`global`](Self::global)
    /// call rebuilds it. Intended for test harnesses.
    pub fn reset_global() {
        let _guard = GLOBAL_INIT.lock();
        GLOBAL.store(None);
    }
}

impl std::fmt::Debug for ExtensionLoaderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionLoaderFactory")
            .field("extensions", &self.catalog.len())
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

fn downcast_loader<T: Capability + ?Sized>(
    erased: ErasedLoader,
) -> Result<Arc<ExtensionLoader<T>>, ExtensionError> {
    erased
        .downcast::<ExtensionLoader<T>>()
        .map_err(|_| ExtensionError::TypeMismatch {
            capability: T::NAME,
            alias: String::new(),
        })
}

/// Builds the catalog from the compiled-in registrations and installs it as
/// the process-wide factory. Call once at startup.
///
/// # Errors
/// Returns [`CatalogError`] on duplicate or empty aliases.
pub fn bootstrap() -> Result<Arc<ExtensionLoaderFactory>, CatalogError> {
    let catalog = Catalog::build(&InventorySource)?;
    tracing::info!(extensions = catalog.len(), "extension catalog bootstrapped");
    Ok(ExtensionLoaderFactory::install_global(catalog))
}

/// Resolves `alias` of capability `T` through the process-wide factory.
///
/// # Errors
/// See [`ExtensionLoader::get_extension_with`].
pub fn resolve<T: Capability<Args = ()> + ?Sized>(alias: &str) -> Result<Arc<T>, ExtensionError> {
    ExtensionLoaderFactory::global()?
        .get_loader::<T>()?
        .get_extension(alias)
}

/// Resolves `alias` of capability `T` with constructor arguments.
///
/// # Errors
/// See [`ExtensionLoader::get_extension_with`].
pub fn resolve_with<T: Capability + ?Sized>(
    alias: &str,
    args: &T::Args,
) -> Result<Arc<T>, ExtensionError> {
    ExtensionLoaderFactory::global()?
        .get_loader::<T>()?
        .get_extension_with(alias, args)
}
