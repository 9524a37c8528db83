//! In-process coordination service.
//!
//! Nodes form a `/`-separated tree. Ephemeral nodes belong to the session that
//! wrote them and vanish when it expires. Watches are per session and
//! persistent until removed or the session expires.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use registry_sdk::{StoreError, StoreEvent};
use tokio::sync::mpsc;

static SERVERS: LazyLock<DashMap<String, Arc<MemoryServer>>> = LazyLock::new(DashMap::new);

pub(crate) type SessionId = u64;

struct Node {
    data: Vec<u8>,
    owner: Option<SessionId>,
}

struct Session {
    notifier: mpsc::UnboundedSender<StoreEvent>,
    expired: bool,
    child_watches: HashSet<String>,
    data_watches: HashSet<String>,
}

#[derive(Default)]
struct State {
    available: bool,
    connect_delay: Duration,
    next_session: SessionId,
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<SessionId, Session>,
}

/// A coordination service living in process memory.
///
/// Clients talk to it through [`MemoryStore`](super::MemoryStore). Servers
/// obtained with [`MemoryServer::shared`] are keyed by address so every
/// registry configured with the same address sees the same tree.
pub struct MemoryServer {
    address: String,
    state: Mutex<State>,
}

impl MemoryServer {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            state: Mutex::new(State {
                available: true,
                ..State::default()
            }),
        })
    }

    /// The process-wide server for `address`, created on first use.
    #[must_use]
    pub fn shared(address: &str) -> Arc<Self> {
        Arc::clone(
            SERVERS
                .entry(address.to_owned())
                .or_insert_with(|| Self::new(address))
                .value(),
        )
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// When unavailable, new sessions are refused.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Delays session establishment, to exercise connect timeouts.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    /// Expires every live session: ephemeral nodes and watches are dropped and
    /// clients get [`StoreEvent::SessionLost`].
    pub fn expire_sessions(&self) {
        let mut state = self.state.lock();
        let ids: Vec<SessionId> = state
            .sessions
            .iter()
            .filter(|(_, s)| !s.expired)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let orphaned: Vec<String> = state
                .nodes
                .iter()
                .filter(|(_, node)| node.owner == Some(id))
                .map(|(path, _)| path.clone())
                .collect();
            for path in orphaned {
                state.nodes.remove(&path);
                notify(&state, &path);
            }

            if let Some(session) = state.sessions.get_mut(&id) {
                session.expired = true;
                session.child_watches.clear();
                session.data_watches.clear();
                let _ = session.notifier.send(StoreEvent::SessionLost);
            }
        }
        tracing::info!(address = %self.address, "memory store sessions expired");
    }

    /// Re-establishes every expired session; clients get
    /// [`StoreEvent::SessionRestored`].
    pub fn restore_sessions(&self) {
        let mut state = self.state.lock();
        for session in state.sessions.values_mut().filter(|s| s.expired) {
            session.expired = false;
            let _ = session.notifier.send(StoreEvent::SessionRestored);
        }
        tracing::info!(address = %self.address, "memory store sessions restored");
    }

    /// Number of nodes currently stored, parents included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(path)
    }

    pub(crate) fn connect_delay(&self) -> Duration {
        self.state.lock().connect_delay
    }

    pub(crate) fn open_session(
        &self,
        notifier: mpsc::UnboundedSender<StoreEvent>,
    ) -> Result<SessionId, StoreError> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(StoreError::Unavailable(format!(
                "memory store '{}' refuses connections",
                self.address
            )));
        }
        state.next_session += 1;
        let id = state.next_session;
        state.sessions.insert(
            id,
            Session {
                notifier,
                expired: false,
                child_watches: HashSet::new(),
                data_watches: HashSet::new(),
            },
        );
        Ok(id)
    }

    pub(crate) fn close_session(&self, id: SessionId) {
        let mut state = self.state.lock();
        if state.sessions.remove(&id).is_none() {
            return;
        }
        let owned: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(id))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            state.nodes.remove(&path);
            notify(&state, &path);
        }
    }

    pub(crate) fn put(
        &self,
        id: SessionId,
        path: &str,
        data: &[u8],
        ephemeral: bool,
    ) -> Result<(), StoreError> {
        validate_path(path)?;
        let mut state = self.state.lock();
        live(&state, id)?;

        let mut created = Vec::new();
        let mut ancestor = parent_of(path);
        while let Some(parent) = ancestor {
            if parent.is_empty() || state.nodes.contains_key(parent) {
                break;
            }
            state.nodes.insert(
                parent.to_owned(),
                Node {
                    data: Vec::new(),
                    owner: None,
                },
            );
            created.push(parent.to_owned());
            ancestor = parent_of(parent);
        }

        state.nodes.insert(
            path.to_owned(),
            Node {
                data: data.to_vec(),
                owner: ephemeral.then_some(id),
            },
        );

        for parent in created.iter().rev() {
            notify(&state, parent);
        }
        notify(&state, path);
        Ok(())
    }

    pub(crate) fn delete(&self, id: SessionId, paths: &[String]) -> Result<(), StoreError> {
        for path in paths {
            validate_path(path)?;
        }
        let mut state = self.state.lock();
        live(&state, id)?;

        for path in paths {
            let prefix = format!("{path}/");
            let doomed: Vec<String> = state
                .nodes
                .keys()
                .filter(|p| *p == path || p.starts_with(&prefix))
                .cloned()
                .collect();
            for doomed_path in doomed.iter().rev() {
                state.nodes.remove(doomed_path);
                notify(&state, doomed_path);
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, id: SessionId, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.state.lock();
        live(&state, id)?;
        Ok(state.nodes.get(path).map(|node| node.data.clone()))
    }

    pub(crate) fn children(
        &self,
        id: SessionId,
        parent: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let state = self.state.lock();
        live(&state, id)?;
        let prefix = format!("{parent}/");
        Ok(state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, node)| {
                let name = &path[prefix.len()..];
                (!name.contains('/')).then(|| (name.to_owned(), node.data.clone()))
            })
            .collect())
    }

    pub(crate) fn watch(&self, id: SessionId, path: &str, children: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        live(&state, id)?;
        if let Some(session) = state.sessions.get_mut(&id) {
            if children {
                session.child_watches.insert(path.to_owned());
            } else {
                session.data_watches.insert(path.to_owned());
            }
        }
        Ok(())
    }

    pub(crate) fn unwatch(&self, id: SessionId, path: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        live(&state, id)?;
        if let Some(session) = state.sessions.get_mut(&id) {
            session.child_watches.remove(path);
            session.data_watches.remove(path);
        }
        Ok(())
    }
}

fn validate_path(path: &str) -> Result<(), StoreError> {
    if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') || path.contains("//") {
        return Err(StoreError::Rejected(format!("invalid path '{path}'")));
    }
    Ok(())
}

fn live(state: &State, id: SessionId) -> Result<(), StoreError> {
    match state.sessions.get(&id) {
        Some(session) if !session.expired => Ok(()),
        Some(_) => Err(StoreError::SessionLost),
        None => Err(StoreError::Unavailable("session closed".to_owned())),
    }
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

/// Tells watchers that `path` was created, overwritten or removed.
fn notify(state: &State, path: &str) {
    let parent = parent_of(path);
    for session in state.sessions.values().filter(|s| !s.expired) {
        if session.data_watches.contains(path) {
            let _ = session.notifier.send(StoreEvent::DataChanged {
                path: path.to_owned(),
            });
        }
        if let Some(parent) = parent
            && session.child_watches.contains(parent)
        {
            let _ = session.notifier.send(StoreEvent::ChildrenChanged {
                path: parent.to_owned(),
            });
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn session(server: &MemoryServer) -> (SessionId, mpsc::UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (server.open_session(tx).unwrap(), rx)
    }

    #[test]
    fn put_creates_parents_and_lists_direct_children() {
        let server = MemoryServer::new("t");
        let (id, _rx) = session(&server);

        server.put(id, "/rpc/svc/providers/h1:1", b"a", true).unwrap();
        server.put(id, "/rpc/svc/providers/h1:2", b"b", true).unwrap();
        server.put(id, "/rpc/svc/u1/providers/h9:9", b"c", true).unwrap();

        let children = server.children(id, "/rpc/svc/providers").unwrap();
        assert_eq!(
            children,
            vec![
                ("h1:1".to_owned(), b"a".to_vec()),
                ("h1:2".to_owned(), b"b".to_vec())
            ]
        );
        assert!(server.exists("/rpc/svc"));
        assert!(server.children(id, "/nope").unwrap().is_empty());
    }

    #[test]
    fn child_watch_fires_on_create_update_and_delete() {
        let server = MemoryServer::new("t");
        let (id, mut rx) = session(&server);
        server.watch(id, "/s/providers", true).unwrap();

        server.put(id, "/s/providers/h:1", b"x", true).unwrap();
        server.put(id, "/s/providers/h:1", b"y", true).unwrap();
        server.delete(id, &["/s/providers/h:1".to_owned()]).unwrap();

        let changed = StoreEvent::ChildrenChanged {
            path: "/s/providers".to_owned(),
        };
        for _ in 0..3 {
            assert_eq!(rx.try_recv().unwrap(), changed);
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn expiry_drops_ephemeral_nodes_and_refuses_calls_until_restored() {
        let server = MemoryServer::new("t");
        let (id, mut rx) = session(&server);
        server.put(id, "/s/providers/h:1", b"x", true).unwrap();
        server.put(id, "/s/configs", b"{}", false).unwrap();

        server.expire_sessions();
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::SessionLost);
        assert!(!server.exists("/s/providers/h:1"));
        assert!(server.exists("/s/configs"));
        assert_eq!(server.get(id, "/s/configs"), Err(StoreError::SessionLost));

        server.restore_sessions();
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::SessionRestored);
        assert!(server.get(id, "/s/configs").unwrap().is_some());
    }

    #[test]
    fn unavailable_server_refuses_sessions() {
        let server = MemoryServer::new("t");
        server.set_available(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            server.open_session(tx),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let server = MemoryServer::new("t");
        let (id, _rx) = session(&server);
        assert!(matches!(
            server.put(id, "relative", b"", false),
            Err(StoreError::Rejected(_))
        ));
        assert!(matches!(
            server.put(id, "/a//b", b"", false),
            Err(StoreError::Rejected(_))
        ));
    }
}
