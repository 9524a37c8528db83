//! `memory` registry backend.
//!
//! A coordination store that lives in process memory with the semantics of a
//! ZooKeeper-style service: ephemeral nodes, persistent child and data
//! watches, session expiry and re-establishment. Used for local runs and
//! tests.

mod server;
mod store;

use std::sync::Arc;

use registry_sdk::{Registry, RegistryConfig};

pub use server::MemoryServer;
pub use store::MemoryStore;

use crate::domain::service::StoreRegistry;

/// Alias of the memory backend.
pub const PROTOCOL: &str = "memory";

/// Extension constructor: a registry over the shared server at
/// `config.address`.
///
/// # Errors
/// Fails when the address is empty.
pub fn create_registry(config: &RegistryConfig) -> anyhow::Result<Arc<dyn Registry>> {
    if config.address.trim().is_empty() {
        anyhow::bail!("memory registry address must not be empty");
    }
    let store = MemoryStore::new(MemoryServer::shared(&config.address));
    Ok(Arc::new(StoreRegistry::new(config.clone(), Arc::new(store))))
}
