use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use registry_sdk::{CoordinationStore, StoreError, StoreEvent, StoreWatcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::server::{MemoryServer, SessionId};

struct Connection {
    session: SessionId,
    cancel: CancellationToken,
}

/// [`CoordinationStore`] client of a [`MemoryServer`].
///
/// Notifications are forwarded to the watcher from a dedicated task, never
/// from the caller's stack.
pub struct MemoryStore {
    server: Arc<MemoryServer>,
    connection: Mutex<Option<Connection>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self {
            server,
            connection: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn server(&self) -> &Arc<MemoryServer> {
        &self.server
    }

    fn session(&self) -> Result<SessionId, StoreError> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| c.session)
            .ok_or_else(|| StoreError::Unavailable("not connected".to_owned()))
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn connect(&self, watcher: Arc<dyn StoreWatcher>) -> Result<(), StoreError> {
        if self.connection.lock().is_some() {
            return Ok(());
        }

        let delay = self.server.connect_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<StoreEvent>();
        let session = self.server.open_session(tx)?;
        let cancel = CancellationToken::new();

        let stop = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => watcher.on_event(event),
                        None => break,
                    },
                }
            }
        });

        let mut connection = self.connection.lock();
        if connection.is_some() {
            // Lost a race with a concurrent connect.
            cancel.cancel();
            self.server.close_session(session);
            return Ok(());
        }
        *connection = Some(Connection { session, cancel });
        tracing::debug!(address = %self.server.address(), session, "memory store connected");
        Ok(())
    }

    async fn close(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.cancel.cancel();
            self.server.close_session(connection.session);
            tracing::debug!(
                address = %self.server.address(),
                session = connection.session,
                "memory store closed"
            );
        }
    }

    async fn put(&self, path: &str, data: &[u8], ephemeral: bool) -> Result<(), StoreError> {
        self.server.put(self.session()?, path, data, ephemeral)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.server.delete(self.session()?, &[path.to_owned()])
    }

    async fn delete_all(&self, paths: &[String]) -> Result<(), StoreError> {
        self.server.delete(self.session()?, paths)
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.server.get(self.session()?, path)
    }

    async fn children(&self, parent: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.server.children(self.session()?, parent)
    }

    async fn watch_children(&self, path: &str) -> Result<(), StoreError> {
        self.server.watch(self.session()?, path, true)
    }

    async fn watch_data(&self, path: &str) -> Result<(), StoreError> {
        self.server.watch(self.session()?, path, false)
    }

    async fn unwatch(&self, path: &str) -> Result<(), StoreError> {
        self.server.unwatch(self.session()?, path)
    }
}
