//! Per-key watch state and per-subscription dispatch workers.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use registry_sdk::{
    ConfigEvent, ConfigListener, ConfigScope, ProviderInfoListener, RegistryEvent, ServiceKey,
};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::diff::ProviderSet;

/// One live endpoint subscription: the sending half of its delivery queue.
pub(crate) struct Subscriber {
    pub consumer_id: Uuid,
    tx: mpsc::UnboundedSender<RegistryEvent>,
    cancel: CancellationToken,
}

impl Subscriber {
    /// Spawns the dispatch worker for `listener`.
    pub fn spawn(
        consumer_id: Uuid,
        key: &ServiceKey,
        listener: Arc<dyn ProviderInfoListener>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = key.to_string();
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            dispatch(rx, worker_cancel, &key, |event: RegistryEvent| {
                event.deliver(listener.as_ref());
            })
            .await;
        });
        Self {
            consumer_id,
            tx,
            cancel,
        }
    }

    pub fn send(&self, event: RegistryEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::trace!(consumer_id = %self.consumer_id, "dispatch worker gone");
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// One live config subscription on a node.
pub(crate) struct ConfigSubscriber {
    pub subscription_id: Uuid,
    tx: mpsc::UnboundedSender<ConfigEvent>,
    cancel: CancellationToken,
}

impl ConfigSubscriber {
    pub fn spawn(
        subscription_id: Uuid,
        key: &ServiceKey,
        listener: Arc<dyn ConfigListener>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = key.to_string();
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            dispatch(rx, worker_cancel, &key, |event: ConfigEvent| {
                event.deliver(listener.as_ref());
            })
            .await;
        });
        Self {
            subscription_id,
            tx,
            cancel,
        }
    }

    pub fn send(&self, event: ConfigEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::trace!(subscription_id = %self.subscription_id, "config dispatch worker gone");
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Drains `rx` in order until cancelled. Cancellation is checked before every
/// dequeue, so nothing is delivered after `cancel` except a callback already
/// running.
async fn dispatch<E>(
    mut rx: mpsc::UnboundedReceiver<E>,
    cancel: CancellationToken,
    key: &str,
    deliver: impl Fn(E),
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                if std::panic::catch_unwind(AssertUnwindSafe(|| deliver(event))).is_err() {
                    tracing::error!(key, "registry listener panicked, event dropped");
                }
            }
        }
    }
    tracing::debug!(key, "dispatch worker stopped");
}

#[derive(Default)]
pub(crate) struct ProviderWatchState {
    /// Whether the store watch is in place; retried while false.
    pub armed: bool,
    pub known: ProviderSet,
    pub subscribers: Vec<Subscriber>,
}

impl ProviderWatchState {
    pub fn broadcast(&self, events: &[RegistryEvent]) {
        for subscriber in &self.subscribers {
            for event in events {
                subscriber.send(event.clone());
            }
        }
    }

    pub fn remove(&mut self, consumer_id: Uuid) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| {
            if s.consumer_id == consumer_id {
                s.cancel();
                false
            } else {
                true
            }
        });
        before != self.subscribers.len()
    }
}

/// Child watch on the providers node of one service key.
///
/// The async mutex serializes refreshes and subscriber changes so a new
/// subscriber's snapshot is never overtaken by an older diff.
pub(crate) struct ProviderWatch {
    pub key: ServiceKey,
    pub path: String,
    pub state: Mutex<ProviderWatchState>,
}

impl ProviderWatch {
    pub fn new(key: ServiceKey, path: String) -> Self {
        Self {
            key,
            path,
            state: Mutex::new(ProviderWatchState::default()),
        }
    }
}

#[derive(Default)]
pub(crate) struct ConfigWatchState {
    pub armed: bool,
    pub known: BTreeMap<String, String>,
    pub subscribers: Vec<ConfigSubscriber>,
}

impl ConfigWatchState {
    pub fn broadcast(&self, event: &ConfigEvent) {
        for subscriber in &self.subscribers {
            subscriber.send(event.clone());
        }
    }

    pub fn remove(&mut self, subscription_id: Uuid) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| {
            if s.subscription_id == subscription_id {
                s.cancel();
                false
            } else {
                true
            }
        });
        before != self.subscribers.len()
    }
}

/// Data watch on one config node (interface configs or overrides) of a key.
pub(crate) struct ConfigWatch {
    pub key: ServiceKey,
    pub scope: ConfigScope,
    pub path: String,
    pub state: Mutex<ConfigWatchState>,
}

impl ConfigWatch {
    pub fn new(key: ServiceKey, scope: ConfigScope, path: String) -> Self {
        Self {
            key,
            scope,
            path,
            state: Mutex::new(ConfigWatchState::default()),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use registry_sdk::{ChannelListener, ConfigChannelListener, ProviderGroup, ProviderInfo};
    use std::time::Duration;

    fn added(port: u16) -> RegistryEvent {
        RegistryEvent::ProviderAdded(ProviderGroup::default_group(vec![ProviderInfo::new(
            "h", port,
        )]))
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (listener, mut rx) = ChannelListener::new();
        let subscriber = Subscriber::spawn(
            Uuid::new_v4(),
            &ServiceKey::interface("svc"),
            listener,
            CancellationToken::new(),
        );

        for port in 1..=20 {
            subscriber.send(added(port));
        }
        for port in 1..=20 {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event, added(port));
        }
    }

    #[tokio::test]
    async fn cancelled_subscriber_delivers_nothing_more() {
        let (listener, mut rx) = ChannelListener::new();
        let subscriber = Subscriber::spawn(
            Uuid::new_v4(),
            &ServiceKey::interface("svc"),
            listener,
            CancellationToken::new(),
        );

        subscriber.cancel();
        subscriber.send(added(1));

        // The worker drops the listener once it stops, closing the channel.
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn removing_one_subscriber_keeps_the_other() {
        let (a, _rx_a) = ChannelListener::new();
        let (b, mut rx_b) = ChannelListener::new();
        let key = ServiceKey::interface("svc");
        let id_a = Uuid::new_v4();

        let mut state = ProviderWatchState::default();
        state
            .subscribers
            .push(Subscriber::spawn(id_a, &key, a, CancellationToken::new()));
        state.subscribers.push(Subscriber::spawn(
            Uuid::new_v4(),
            &key,
            b,
            CancellationToken::new(),
        ));

        assert!(state.remove(id_a));
        assert!(!state.remove(id_a));
        state.broadcast(&[added(7)]);

        let event = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, added(7));
    }

    #[tokio::test]
    async fn every_config_subscriber_receives_the_broadcast() {
        let (a, mut rx_a) = ConfigChannelListener::new();
        let (b, mut rx_b) = ConfigChannelListener::new();
        let key = ServiceKey::interface("svc");
        let id_a = Uuid::new_v4();

        let mut state = ConfigWatchState::default();
        state
            .subscribers
            .push(ConfigSubscriber::spawn(id_a, &key, a, CancellationToken::new()));
        state.subscribers.push(ConfigSubscriber::spawn(
            Uuid::new_v4(),
            &key,
            b,
            CancellationToken::new(),
        ));

        let event =
            ConfigEvent::AttrUpdated(BTreeMap::from([("timeout".to_owned(), "1".to_owned())]));
        state.broadcast(&event);
        for rx in [&mut rx_a, &mut rx_b] {
            let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received, event);
        }

        assert!(state.remove(id_a));
        assert_eq!(state.subscribers.len(), 1);
        let closed = tokio::time::timeout(Duration::from_secs(1), rx_a.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
    }
}
