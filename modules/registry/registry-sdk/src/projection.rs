//! Local provider state folded from a snapshot and incremental events.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::listener::ProviderInfoListener;
use crate::models::{ProviderGroup, ProviderInfo};

/// Endpoints of one subscription keyed by `host:port`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProjection {
    providers: BTreeMap<String, ProviderInfo>,
}

impl ProviderProjection {
    pub fn add(&mut self, group: &ProviderGroup) {
        for provider in &group.providers {
            self.providers.insert(provider.address(), provider.clone());
        }
    }

    pub fn remove(&mut self, group: &ProviderGroup) {
        for provider in &group.providers {
            self.providers.remove(&provider.address());
        }
    }

    /// Replaces the whole projection with `groups`.
    pub fn replace(&mut self, groups: &[ProviderGroup]) {
        self.providers = groups
            .iter()
            .flat_map(|g| g.providers.iter())
            .map(|p| (p.address(), p.clone()))
            .collect();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.providers.contains_key(address)
    }

    #[must_use]
    pub fn get(&self, address: &str) -> Option<&ProviderInfo> {
        self.providers.get(address)
    }

    /// Endpoints ordered by address.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers.values().cloned().collect()
    }
}

/// A [`ProviderInfoListener`] that folds events into a [`ProviderProjection`]
/// and lets callers await a condition on it.
pub struct ProjectionListener {
    state: watch::Sender<ProviderProjection>,
}

impl ProjectionListener {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ProviderProjection::default());
        Arc::new(Self { state })
    }

    #[must_use]
    pub fn snapshot(&self) -> ProviderProjection {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    /// Waits until `predicate` holds, returning the matching projection, or
    /// `None` after `timeout`.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&ProviderProjection) -> bool,
    ) -> Option<ProviderProjection> {
        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|p| predicate(p))).await;
        match waited {
            Ok(Ok(projection)) => Some(projection.clone()),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Shorthand for waiting until exactly `count` endpoints are known.
    pub async fn wait_for_len(&self, count: usize, timeout: Duration) -> bool {
        self.wait_for(timeout, |p| p.len() == count).await.is_some()
    }
}

impl ProviderInfoListener for ProjectionListener {
    fn add_provider(&self, group: &ProviderGroup) {
        self.state.send_modify(|p| p.add(group));
    }

    fn remove_provider(&self, group: &ProviderGroup) {
        self.state.send_modify(|p| p.remove(group));
    }

    fn update_providers(&self, group: &ProviderGroup) {
        self.state.send_modify(|p| p.replace(std::slice::from_ref(group)));
    }

    fn update_all_providers(&self, groups: &[ProviderGroup]) {
        self.state.send_modify(|p| p.replace(groups));
    }
}
