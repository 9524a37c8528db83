//! Named, scoped implementations of capability interfaces.
//!
//! A *capability* is a trait object type (`dyn Registry`, `dyn LoadBalancer`)
//! that implements [`Capability`]. Implementations are registered under an
//! alias through [`register_extension!`](crate::register_extension) and
//! collected at link time into the process-wide [`Catalog`].
//!
//! Resolution goes through one [`ExtensionLoader`] per capability type, handed
//! out by the [`ExtensionLoaderFactory`]:
//! - unknown aliases fail fast with [`ExtensionError::NotFound`];
//! - `Singleton` aliases are constructed once, concurrent first callers share
//!   one construction attempt;
//! - `PerResolution` aliases are constructed on every call.

mod capability;
mod catalog;
mod error;
mod factory;
mod loader;
mod macros;

pub use capability::{Capability, CapabilityKey, Scope};
pub use catalog::{
    Catalog, CatalogSource, ConstructError, ConstructFn, ErasedInstance, ExtensionDescriptor,
    ExtensionRegistration, InventorySource, StaticSource, erase,
};
pub use error::{CatalogError, ExtensionError};
pub use factory::{ExtensionLoaderFactory, bootstrap, resolve, resolve_with};
pub use loader::ExtensionLoader;
