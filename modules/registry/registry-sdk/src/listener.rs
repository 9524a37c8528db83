//! Listener capabilities and the typed events delivered to them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::ProviderGroup;

/// Receives endpoint changes for one subscription.
///
/// Calls for one subscription are strictly sequential and ordered. Handlers
/// run on the subscription's dispatch task and should return quickly.
pub trait ProviderInfoListener: Send + Sync {
    /// Endpoints that appeared; one call per endpoint.
    fn add_provider(&self, group: &ProviderGroup);

    /// Endpoints that disappeared; one call per endpoint.
    fn remove_provider(&self, group: &ProviderGroup);

    /// An existing endpoint's record changed. `group` is the full current set.
    fn update_providers(&self, group: &ProviderGroup);

    /// Full resync, e.g. after the store session was re-established.
    fn update_all_providers(&self, groups: &[ProviderGroup]);
}

/// Receives configuration attribute changes for one service key.
pub trait ConfigListener: Send + Sync {
    /// Only the attributes that were added or changed, with their new values.
    fn attr_updated(&self, changed: &BTreeMap<String, String>);

    /// Full replacement, delivered when attributes were removed.
    fn config_changed(&self, all: &BTreeMap<String, String>);
}

/// One endpoint notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    ProviderAdded(ProviderGroup),
    ProviderRemoved(ProviderGroup),
    ProvidersUpdated(ProviderGroup),
    ProvidersReplaced(Vec<ProviderGroup>),
}

impl RegistryEvent {
    /// Invokes the matching listener callback.
    pub fn deliver(&self, listener: &dyn ProviderInfoListener) {
        match self {
            Self::ProviderAdded(group) => listener.add_provider(group),
            Self::ProviderRemoved(group) => listener.remove_provider(group),
            Self::ProvidersUpdated(group) => listener.update_providers(group),
            Self::ProvidersReplaced(groups) => listener.update_all_providers(groups),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderAdded(_) => "provider_added",
            Self::ProviderRemoved(_) => "provider_removed",
            Self::ProvidersUpdated(_) => "providers_updated",
            Self::ProvidersReplaced(_) => "providers_replaced",
        }
    }
}

/// One configuration notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    AttrUpdated(BTreeMap<String, String>),
    ConfigChanged(BTreeMap<String, String>),
}

impl ConfigEvent {
    pub fn deliver(&self, listener: &dyn ConfigListener) {
        match self {
            Self::AttrUpdated(changed) => listener.attr_updated(changed),
            Self::ConfigChanged(all) => listener.config_changed(all),
        }
    }
}

/// Turns listener callbacks into a typed event stream.
///
/// ```ignore
/// let (listener, mut events) = ChannelListener::new();
/// registry.subscribe(&consumer.with_listener(listener)).await?;
/// while let Some(event) = events.recv().await { /* ... */ }
/// ```
pub struct ChannelListener {
    providers: mpsc::UnboundedSender<RegistryEvent>,
}

impl ChannelListener {
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { providers: tx }), rx)
    }

    fn forward(&self, event: RegistryEvent) {
        if self.providers.send(event).is_err() {
            tracing::trace!("registry event receiver dropped");
        }
    }
}

impl ProviderInfoListener for ChannelListener {
    fn add_provider(&self, group: &ProviderGroup) {
        self.forward(RegistryEvent::ProviderAdded(group.clone()));
    }

    fn remove_provider(&self, group: &ProviderGroup) {
        self.forward(RegistryEvent::ProviderRemoved(group.clone()));
    }

    fn update_providers(&self, group: &ProviderGroup) {
        self.forward(RegistryEvent::ProvidersUpdated(group.clone()));
    }

    fn update_all_providers(&self, groups: &[ProviderGroup]) {
        self.forward(RegistryEvent::ProvidersReplaced(groups.to_vec()));
    }
}

/// [`ConfigListener`] counterpart of [`ChannelListener`].
pub struct ConfigChannelListener {
    events: mpsc::UnboundedSender<ConfigEvent>,
}

impl ConfigChannelListener {
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ConfigEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events: tx }), rx)
    }

    fn forward(&self, event: ConfigEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("config event receiver dropped");
        }
    }
}

impl ConfigListener for ConfigChannelListener {
    fn attr_updated(&self, changed: &BTreeMap<String, String>) {
        self.forward(ConfigEvent::AttrUpdated(changed.clone()));
    }

    fn config_changed(&self, all: &BTreeMap<String, String>) {
        self.forward(ConfigEvent::ConfigChanged(all.clone()));
    }
}
