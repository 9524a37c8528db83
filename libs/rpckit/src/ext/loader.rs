//! Per-capability resolver.
//!
//! Hot path for singletons is a `OnceLock` read; the single-flight mutex is
//! only touched while no instance exists yet.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};

use super::capability::{Capability, CapabilityKey, Scope};
use super::catalog::{Catalog, ConstructError, ExtensionDescriptor};
use super::error::ExtensionError;

/// Resolves aliases of capability `T` to instances.
///
/// Obtained from [`ExtensionLoaderFactory::get_loader`](super::ExtensionLoaderFactory::get_loader);
/// one loader exists per capability type and factory.
pub struct ExtensionLoader<T: Capability + ?Sized> {
    capability: CapabilityKey,
    descriptors: HashMap<&'static str, ExtensionDescriptor>,
    listing: Vec<&'static str>,
    singletons: HashMap<&'static str, SingletonSlot<T>>,
}

impl<T: Capability + ?Sized> ExtensionLoader<T> {
    /// Copies the descriptors of `T` out of the catalog.
    #[must_use]
    pub fn new(catalog: &Catalog) -> Self {
        let ordered = catalog.descriptors::<T>();
        let listing = ordered.iter().map(|d| d.alias).collect();
        let singletons = ordered
            .iter()
            .filter(|d| d.scope == Scope::Singleton)
            .map(|d| (d.alias, SingletonSlot::new()))
            .collect();
        let descriptors = ordered.into_iter().map(|d| (d.alias, d)).collect();

        Self {
            capability: CapabilityKey::of::<T>(),
            descriptors,
            listing,
            singletons,
        }
    }

    /// Resolves `alias`, passing `args` to the constructor when one runs.
    ///
    /// For a singleton only the arguments of the call that actually constructs
    /// the instance are used; later calls get the cached instance.
    ///
    /// # Errors
    /// - [`ExtensionError::NotFound`] for an unknown alias
    /// - [`ExtensionError::Instantiation`] when the constructor fails
    /// - [`ExtensionError::ArgumentMismatch`] / [`ExtensionError::TypeMismatch`]
    ///   when the registration does not match `T`
    pub fn get_extension_with(&self, alias: &str, args: &T::Args) -> Result<Arc<T>, ExtensionError> {
        let descriptor = self.descriptor(alias)?;
        match descriptor.scope {
            Scope::PerResolution => self.construct(descriptor, args),
            Scope::Singleton => {
                let slot = self.singletons.get(descriptor.alias).ok_or_else(|| {
                    ExtensionError::NotFound {
                        capability: self.capability.name(),
                        alias: alias.to_owned(),
                    }
                })?;
                slot.get_or_construct(|| self.construct(descriptor, args))
            }
        }
    }

    /// Whether `alias` is registered for `T`.
    #[must_use]
    pub fn has_extension(&self, alias: &str) -> bool {
        self.descriptors.contains_key(alias)
    }

    /// Registered aliases, ordered by registration `order` then alias.
    #[must_use]
    pub fn aliases(&self) -> &[&'static str] {
        &self.listing
    }

    /// Scope of a registered alias.
    #[must_use]
    pub fn scope_of(&self, alias: &str) -> Option<Scope> {
        self.descriptors.get(alias).map(|d| d.scope)
    }

    fn descriptor(&self, alias: &str) -> Result<&ExtensionDescriptor, ExtensionError> {
        self.descriptors.get(alias).ok_or_else(|| {
            tracing::debug!(
                capability = self.capability.name(),
                alias = alias,
                "extension not found"
            );
            ExtensionError::NotFound {
                capability: self.capability.name(),
                alias: alias.to_owned(),
            }
        })
    }

    fn construct(
        &self,
        descriptor: &ExtensionDescriptor,
        args: &T::Args,
    ) -> Result<Arc<T>, ExtensionError> {
        let capability = self.capability.name();
        let alias = descriptor.alias;

        let erased = (descriptor.construct)(args).map_err(|e| match e {
            ConstructError::ArgumentMismatch { expected } => ExtensionError::ArgumentMismatch {
                capability,
                alias: alias.to_owned(),
                expected,
            },
            ConstructError::Failed(cause) => {
                tracing::warn!(
                    capability,
                    alias,
                    error = %cause,
                    "extension instantiation failed"
                );
                ExtensionError::instantiation(capability, alias, cause)
            }
        })?;

        let instance = erased
            .downcast::<T>()
            .ok_or_else(|| ExtensionError::TypeMismatch {
                capability,
                alias: alias.to_owned(),
            })?;

        tracing::debug!(capability, alias, scope = %descriptor.scope, "extension instantiated");
        Ok(instance)
    }
}

impl<T: Capability<Args = ()> + ?Sized> ExtensionLoader<T> {
    /// Resolves `alias` for capabilities whose constructors take no arguments.
    ///
    /// # Errors
    /// Same as [`get_extension_with`](Self::get_extension_with).
    pub fn get_extension(&self, alias: &str) -> Result<Arc<T>, ExtensionError> {
        self.get_extension_with(alias, &())
    }
}

impl<T: Capability + ?Sized> fmt::Debug for ExtensionLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("capability", &self.capability)
            .field("aliases", &self.listing)
            .finish_non_exhaustive()
    }
}

/// Cached singleton plus the single-flight state guarding its construction.
struct SingletonSlot<T: ?Sized> {
    instance: OnceLock<Arc<T>>,
    flight: Mutex<Flight>,
    landed: Condvar,
}

#[derive(Default)]
struct Flight {
    in_progress: bool,
    generation: u64,
    failure: Option<(u64, ExtensionError)>,
}

impl<T: ?Sized> SingletonSlot<T> {
    fn new() -> Self {
        Self {
            instance: OnceLock::new(),
            flight: Mutex::new(Flight::default()),
            landed: Condvar::new(),
        }
    }

    fn get_or_construct(
        &self,
        build: impl FnOnce() -> Result<Arc<T>, ExtensionError>,
    ) -> Result<Arc<T>, ExtensionError> {
        if let Some(instance) = self.instance.get() {
            return Ok(Arc::clone(instance));
        }

        let generation = {
            let mut flight = self.flight.lock();
            loop {
                if let Some(instance) = self.instance.get() {
                    return Ok(Arc::clone(instance));
                }
                if !flight.in_progress {
                    break;
                }

                let awaited = flight.generation;
                while flight.in_progress && flight.generation == awaited {
                    self.landed.wait(&mut flight);
                }
                if let Some((failed, error)) = &flight.failure
                    && *failed == awaited
                {
                    return Err(error.clone());
                }
            }
            flight.in_progress = true;
            flight.generation += 1;
            flight.generation
        };

        let _landing = Landing { slot: self };
        let outcome = build();

        let mut flight = self.flight.lock();
        match &outcome {
            Ok(instance) => {
                flight.failure = None;
                // Only one flight runs at a time, so the slot is still empty here.
                let _ = self.instance.set(Arc::clone(instance));
            }
            Err(error) => flight.failure = Some((generation, error.clone())),
        }
        drop(flight);

        outcome
    }
}

/// Clears the in-flight flag and wakes waiters, also when `build` panics.
struct Landing<'a, T: ?Sized> {
    slot: &'a SingletonSlot<T>,
}

impl<T: ?Sized> Drop for Landing<'_, T> {
    fn drop(&mut self) {
        self.slot.flight.lock().in_progress = false;
        self.slot.landed.notify_all();
    }
}
