//! Registry module.
//!
//! Store-backed registry client, the in-process `memory` coordination store,
//! a factory that deduplicates registries by configuration, and the registry
//! backed dynamic configer. Built-in backends are submitted to the extension
//! catalog from [`extensions`].
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod configer;
pub mod domain;
pub mod extensions;
pub mod factory;
pub mod memory;

pub use configer::RegistryDynamicConfiger;
pub use domain::service::StoreRegistry;
pub use extensions::builtin_extensions;
pub use factory::RegistryFactory;
pub use memory::{MemoryServer, MemoryStore};
