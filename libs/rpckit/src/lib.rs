//! `RpcKit` core library.
//!
//! Hosts the extension machinery used to swap capability implementations by
//! name (registries, load balancers, serializers, fault-tolerance setters)
//! plus the small amount of shared runtime plumbing every module needs:
//! logging setup and typed configuration sections.
//!
//! ```ignore
//! use rpckit::ext::{Capability, ExtensionLoaderFactory};
//!
//! let factory = rpckit::ext::bootstrap()?;
//! let balancer = factory.get_loader::<dyn LoadBalancer>()?.get_extension("random")?;
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod ext;
pub mod telemetry;

pub use ext::{
    Capability, Catalog, CatalogError, ExtensionError, ExtensionLoader, ExtensionLoaderFactory,
    ExtensionRegistration, Scope,
};

#[doc(hidden)]
pub use inventory;
