//! Coordination-store driver contract.
//!
//! A registry backend talks to the coordination service only through
//! [`CoordinationStore`]. Paths are `/`-separated; a node may hold data and
//! have children at the same time. Watches are persistent until
//! [`unwatch`](CoordinationStore::unwatch) or session loss; after
//! [`StoreEvent::SessionRestored`] the caller re-arms them and republishes
//! its ephemeral nodes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

/// Notifications from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The set of children of `path` changed, or a child's data changed.
    ChildrenChanged { path: String },
    /// The data of `path` changed, or the node was created or deleted.
    DataChanged { path: String },
    /// The session expired; ephemeral nodes and watches are gone.
    SessionLost,
    /// A new session is established.
    SessionRestored,
}

/// Receives driver notifications.
///
/// Called from the driver's notification task; implementations must not
/// block.
pub trait StoreWatcher: Send + Sync {
    fn on_event(&self, event: StoreEvent);
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Opens a session; events are delivered to `watcher` until `close`.
    async fn connect(&self, watcher: Arc<dyn StoreWatcher>) -> Result<(), StoreError>;

    /// Closes the session, dropping ephemeral nodes and watches.
    async fn close(&self);

    /// Creates or overwrites `path`, creating missing parents.
    async fn put(&self, path: &str, data: &[u8], ephemeral: bool) -> Result<(), StoreError>;

    /// Deletes `path` and its subtree. Missing nodes are not an error.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Deletes several paths in one call.
    async fn delete_all(&self, paths: &[String]) -> Result<(), StoreError>;

    /// Data of `path`, `None` if the node does not exist.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Children of `parent` as `(name, data)`. Empty if `parent` is missing.
    async fn children(&self, parent: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    async fn watch_children(&self, path: &str) -> Result<(), StoreError>;

    async fn watch_data(&self, path: &str) -> Result<(), StoreError>;

    /// Removes child and data watches on `path`.
    async fn unwatch(&self, path: &str) -> Result<(), StoreError>;
}
