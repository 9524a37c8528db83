use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::capability::{Capability, CapabilityKey, Scope};
use super::error::CatalogError;

/// Type-erased constructor stored in the catalog.
///
/// Receives the capability's `Args` behind `dyn Any` and returns the built
/// `Arc<dyn Capability>` behind an [`ErasedInstance`].
pub type ConstructFn = fn(&(dyn Any + Send + Sync)) -> Result<ErasedInstance, ConstructError>;

/// Why a type-erased constructor did not produce an instance.
#[derive(Debug, thiserror::Error)]
pub enum ConstructError {
    #[error("constructor expects arguments of type {expected}")]
    ArgumentMismatch { expected: &'static str },

    #[error(transparent)]
    Failed(anyhow::Error),
}

/// An `Arc<T>` for some capability `T`, boxed as `Any`.
pub struct ErasedInstance(Box<dyn Any + Send + Sync>);

impl ErasedInstance {
    #[must_use]
    pub fn new<T: Capability + ?Sized>(instance: Arc<T>) -> Self {
        Self(Box::new(instance))
    }

    /// Recovers the typed instance, `None` if it holds another capability.
    #[must_use]
    pub fn downcast<T: Capability + ?Sized>(self) -> Option<Arc<T>> {
        self.0.downcast::<Arc<T>>().ok().map(|boxed| *boxed)
    }
}

/// Adapts a typed constructor to a [`ConstructFn`].
///
/// Used by the [`extension!`](crate::extension) macro.
///
/// # Errors
/// Returns [`ConstructError::ArgumentMismatch`] when `args` is not a `T::Args`
/// and [`ConstructError::Failed`] when the constructor itself fails.
pub fn erase<T: Capability + ?Sized>(
    args: &(dyn Any + Send + Sync),
    constructor: fn(&T::Args) -> anyhow::Result<Arc<T>>,
) -> Result<ErasedInstance, ConstructError> {
    let args = args
        .downcast_ref::<T::Args>()
        .ok_or(ConstructError::ArgumentMismatch {
            expected: std::any::type_name::<T::Args>(),
        })?;
    let instance = constructor(args).map_err(ConstructError::Failed)?;
    Ok(ErasedInstance::new::<T>(instance))
}

/// A compile-time registration of one implementation under one alias.
///
/// Built with [`extension!`](crate::extension), which keeps it usable in
/// `const` position so it can be submitted to the inventory table.
#[derive(Clone, Copy)]
pub struct ExtensionRegistration {
    pub capability: fn() -> CapabilityKey,
    pub alias: &'static str,
    pub scope: Scope,
    /// Listing order only; never used to pick an implementation.
    pub order: i32,
    pub construct: ConstructFn,
}

inventory::collect!(ExtensionRegistration);

impl fmt::Debug for ExtensionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistration")
            .field("capability", &(self.capability)())
            .field("alias", &self.alias)
            .field("scope", &self.scope)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Immutable descriptor of a registered implementation.
#[derive(Clone, Copy)]
pub struct ExtensionDescriptor {
    pub capability: CapabilityKey,
    pub alias: &'static str,
    pub scope: Scope,
    pub order: i32,
    pub construct: ConstructFn,
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("capability", &self.capability)
            .field("alias", &self.alias)
            .field("scope", &self.scope)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Where catalog registrations come from.
pub trait CatalogSource {
    fn registrations(&self) -> Vec<ExtensionRegistration>;
}

/// Registrations submitted through [`register_extension!`](crate::register_extension).
#[derive(Debug, Default, Clone, Copy)]
pub struct InventorySource;

impl CatalogSource for InventorySource {
    fn registrations(&self) -> Vec<ExtensionRegistration> {
        inventory::iter::<ExtensionRegistration>
            .into_iter()
            .copied()
            .collect()
    }
}

/// An explicit list of registrations, for tests and embedders.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    registrations: Vec<ExtensionRegistration>,
}

impl StaticSource {
    pub fn new(registrations: impl IntoIterator<Item = ExtensionRegistration>) -> Self {
        Self {
            registrations: registrations.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with(mut self, registration: ExtensionRegistration) -> Self {
        self.registrations.push(registration);
        self
    }
}

impl CatalogSource for StaticSource {
    fn registrations(&self) -> Vec<ExtensionRegistration> {
        self.registrations.clone()
    }
}

/// Read-only table of (capability type, alias) → descriptor.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<CapabilityKey, HashMap<&'static str, ExtensionDescriptor>>,
}

impl Catalog {
    /// Populates a catalog from `source`.
    ///
    /// # Errors
    /// Returns [`CatalogError`] on an empty or duplicate alias.
    pub fn build(source: &dyn CatalogSource) -> Result<Self, CatalogError> {
        Self::from_registrations(source.registrations())
    }

    /// # Errors
    /// Returns [`CatalogError`] on an empty or duplicate alias.
    pub fn from_registrations(
        registrations: impl IntoIterator<Item = ExtensionRegistration>,
    ) -> Result<Self, CatalogError> {
        let mut entries: HashMap<CapabilityKey, HashMap<&'static str, ExtensionDescriptor>> =
            HashMap::new();

        for registration in registrations {
            let capability = (registration.capability)();
            if registration.alias.is_empty() {
                return Err(CatalogError::EmptyAlias {
                    capability: capability.name(),
                });
            }

            let by_alias = entries.entry(capability).or_default();
            if by_alias.contains_key(registration.alias) {
                tracing::error!(
                    capability = capability.name(),
                    alias = registration.alias,
                    "duplicate extension alias"
                );
                return Err(CatalogError::DuplicateAlias {
                    capability: capability.name(),
                    alias: registration.alias,
                });
            }

            tracing::debug!(
                capability = capability.name(),
                alias = registration.alias,
                scope = %registration.scope,
                "extension registered"
            );
            by_alias.insert(
                registration.alias,
                ExtensionDescriptor {
                    capability,
                    alias: registration.alias,
                    scope: registration.scope,
                    order: registration.order,
                    construct: registration.construct,
                },
            );
        }

        Ok(Self { entries })
    }

    /// Finds the descriptor for `alias` of capability `T`.
    #[must_use]
    pub fn lookup<T: Capability + ?Sized>(&self, alias: &str) -> Option<&ExtensionDescriptor> {
        self.entries
            .get(&CapabilityKey::of::<T>())
            .and_then(|by_alias| by_alias.get(alias))
    }

    /// All descriptors registered for capability `T`, in listing order.
    #[must_use]
    pub fn descriptors<T: Capability + ?Sized>(&self) -> Vec<ExtensionDescriptor> {
        let mut out: Vec<ExtensionDescriptor> = self
            .entries
            .get(&CapabilityKey::of::<T>())
            .map(|by_alias| by_alias.values().copied().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.alias.cmp(b.alias)));
        out
    }

    /// Aliases registered for capability `T`, ordered by `order` then alias.
    #[must_use]
    pub fn aliases<T: Capability + ?Sized>(&self) -> Vec<&'static str> {
        self.descriptors::<T>().iter().map(|d| d.alias).collect()
    }

    /// Total number of registered implementations across all capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    trait Codec: Send + Sync {
        fn name(&self) -> &'static str;
    }

    impl Capability for dyn Codec {
        const NAME: &'static str = "codec";
        type Args = ();
    }

    struct Json;
    impl Codec for Json {
        fn name(&self) -> &'static str {
            "json"
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    fn json(_: &()) -> anyhow::Result<Arc<dyn Codec>> {
        Ok(Arc::new(Json))
    }

    const JSON: ExtensionRegistration = crate::extension! {
        capability: dyn Codec,
        alias: "json",
        scope: Singleton,
        constructor: json,
        order: 20,
    };

    const HESSIAN: ExtensionRegistration = crate::extension! {
        capability: dyn Codec,
        alias: "hessian",
        scope: PerResolution,
        constructor: json,
        order: 10,
    };

    const PROTOBUF: ExtensionRegistration = crate::extension! {
        capability: dyn Codec,
        alias: "protobuf",
        scope: Singleton,
        constructor: json,
    };

    #[test]
    fn lookup_finds_registered_alias() {
        let catalog = Catalog::build(&StaticSource::new([JSON, HESSIAN])).unwrap();

        let descriptor = catalog.lookup::<dyn Codec>("json").unwrap();
        assert_eq!(descriptor.alias, "json");
        assert_eq!(descriptor.scope, Scope::Singleton);
        assert!(catalog.lookup::<dyn Codec>("kryo").is_none());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn aliases_follow_order_then_name() {
        let catalog = Catalog::build(&StaticSource::new([JSON, HESSIAN, PROTOBUF])).unwrap();
        assert_eq!(
            catalog.aliases::<dyn Codec>(),
            vec!["protobuf", "hessian", "json"]
        );
    }

    #[test]
    #[traced_test]
    fn duplicate_alias_is_rejected() {
        let err = Catalog::build(&StaticSource::new([JSON, HESSIAN, JSON])).unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateAlias {
                capability: "codec",
                alias: "json"
            }
        );
        assert!(logs_contain("duplicate extension alias"));
    }

    #[test]
    fn empty_alias_is_rejected() {
        let mut nameless = JSON;
        nameless.alias = "";
        let err = Catalog::build(&StaticSource::default().with(nameless)).unwrap_err();
        assert_eq!(err, CatalogError::EmptyAlias { capability: "codec" });
    }

    #[test]
    fn erased_constructor_checks_argument_type() {
        let wrong: u32 = 7;
        let err = (JSON.construct)(&wrong).err().unwrap();
        assert!(matches!(err, ConstructError::ArgumentMismatch { .. }));

        let instance = (JSON.construct)(&()).ok().unwrap();
        let codec = instance.downcast::<dyn Codec>().unwrap();
        assert_eq!(codec.name(), "json");
    }
}
