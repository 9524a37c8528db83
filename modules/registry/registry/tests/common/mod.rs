#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

//! Common test utilities for registry integration tests

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use registry::{MemoryServer, MemoryStore, RegistryFactory, builtin_extensions, memory};
use registry_sdk::{
    ConsumerConfig, CoordinationStore, ProjectionListener, ProviderConfig, ProviderInfoListener,
    Registry, RegistryConfig, ServerConfig, StoreEvent, StoreWatcher,
};
use rpckit::{Catalog, ExtensionLoaderFactory, ext::StaticSource};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(2);

/// A server address no other test uses.
pub fn unique_address(tag: &str) -> String {
    format!("{tag}-{}", Uuid::new_v4())
}

pub fn loaders() -> Arc<ExtensionLoaderFactory> {
    let catalog = Catalog::build(&StaticSource::new(builtin_extensions())).unwrap();
    Arc::new(ExtensionLoaderFactory::new(Arc::new(catalog)))
}

pub fn factory() -> RegistryFactory {
    RegistryFactory::new(loaders())
}

/// A fresh, started client of the memory server at `address`.
pub async fn client(address: &str) -> Arc<dyn Registry> {
    let registry = memory::create_registry(&RegistryConfig::new("memory", address)).unwrap();
    registry.init().unwrap();
    registry.start().await.unwrap();
    registry
}

pub fn provider(interface_id: &str, unique_id: &str, bindings: &[(&str, u16)]) -> ProviderConfig {
    bindings.iter().fold(
        ProviderConfig::new(interface_id).with_unique_id(unique_id),
        |config, (host, port)| config.with_server(ServerConfig::new(*host, *port)),
    )
}

/// Subscribes a consumer whose listener is a projection seeded with the
/// returned snapshot.
pub async fn subscribe_projection(
    registry: &Arc<dyn Registry>,
    interface_id: &str,
    unique_id: &str,
) -> (ConsumerConfig, Arc<ProjectionListener>) {
    let projection = ProjectionListener::new();
    let consumer = ConsumerConfig::new(interface_id)
        .with_unique_id(unique_id)
        .with_listener(Arc::clone(&projection) as Arc<dyn ProviderInfoListener>);
    let snapshot = registry.subscribe(&consumer).await.unwrap();
    projection.update_all_providers(&snapshot);
    (consumer, projection)
}

struct IgnoreEvents;

impl StoreWatcher for IgnoreEvents {
    fn on_event(&self, _event: StoreEvent) {}
}

/// A raw store session on the server at `address`, standing in for an
/// operator that edits configuration nodes.
pub async fn operator(address: &str) -> MemoryStore {
    let store = MemoryStore::new(MemoryServer::shared(address));
    store.connect(Arc::new(IgnoreEvents)).await.unwrap();
    store
}

pub fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

pub async fn write_config(store: &MemoryStore, path: &str, pairs: &[(&str, &str)]) {
    let data = serde_json::to_vec(&attrs(pairs)).unwrap();
    store.put(path, &data, false).await.unwrap();
}
