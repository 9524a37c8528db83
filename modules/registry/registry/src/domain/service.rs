//! Registry client over any [`CoordinationStore`].
//!
//! Store notifications are funnelled into one ingest task per registry. The
//! ingest task re-reads the affected node, diffs it against the last known
//! view and fans the resulting events out to per-subscription dispatch
//! workers, so listener callbacks never run on a store or caller thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use registry_sdk::{
    ConfigListener, ConfigSubscription, ConsumerConfig, CoordinationStore, ProviderConfig,
    ProviderGroup, Registry, RegistryConfig, RegistryError, RegistryEvent, RegistryState,
    ServiceKey, StoreError, StoreEvent, StoreWatcher,
};
use rpckit::telemetry::ThrottledLog;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::diff::{ProviderSet, config_event, group_of, provider_events};
use super::paths::{
    config_node_path, decode_attributes, decode_provider, encode_provider, normalize_root,
    provider_path, providers_path, validate_key,
};
use super::watch::{ConfigSubscriber, ConfigWatch, ProviderWatch, Subscriber};

const STORE_WARN_INTERVAL: Duration = Duration::from_secs(10);

/// Store-backed [`Registry`].
///
/// ```ignore
/// let registry = StoreRegistry::new(config, Arc::new(MemoryStore::new(server)));
/// registry.init()?;
/// registry.start().await?;
/// registry.register(&provider).await?;
/// ```
pub struct StoreRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    config: RegistryConfig,
    root: String,
    store: Arc<dyn CoordinationStore>,
    state: RwLock<RegistryState>,
    start_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    ingest_tx: mpsc::UnboundedSender<StoreEvent>,
    ingest_rx: Mutex<Option<mpsc::UnboundedReceiver<StoreEvent>>>,
    /// Nodes published per provider id, replayed after a session restore.
    published: DashMap<Uuid, Vec<(String, Vec<u8>)>>,
    /// Watches keyed by the store path they follow.
    provider_watches: DashMap<String, Arc<ProviderWatch>>,
    config_watches: DashMap<String, Arc<ConfigWatch>>,
    /// Providers path each consumer is subscribed to.
    subscriptions: DashMap<Uuid, String>,
    session_live: AtomicBool,
    store_warnings: ThrottledLog,
}

/// Forwards store notifications to the ingest task.
enum WatchKind {
    Children,
    Data,
}

struct IngestWatcher {
    tx: mpsc::UnboundedSender<StoreEvent>,
}

impl StoreWatcher for IngestWatcher {
    fn on_event(&self, event: StoreEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("registry ingest closed, store event dropped");
        }
    }
}

impl StoreRegistry {
    #[must_use]
    pub fn new(config: RegistryConfig, store: Arc<dyn CoordinationStore>) -> Self {
        let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
        let root = normalize_root(&config.root);
        Self {
            inner: Arc::new(Inner {
                config,
                root,
                store,
                state: RwLock::new(RegistryState::Created),
                start_lock: tokio::sync::Mutex::new(()),
                cancel: CancellationToken::new(),
                ingest_tx,
                ingest_rx: Mutex::new(Some(ingest_rx)),
                published: DashMap::new(),
                provider_watches: DashMap::new(),
                config_watches: DashMap::new(),
                subscriptions: DashMap::new(),
                session_live: AtomicBool::new(false),
                store_warnings: ThrottledLog::new(STORE_WARN_INTERVAL),
            }),
        }
    }

    /// Whether the store session is currently established.
    #[must_use]
    pub fn is_session_live(&self) -> bool {
        self.inner.session_live.load(Ordering::Acquire)
    }

    /// Number of live endpoint subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }
}

impl Inner {
    fn state(&self) -> RegistryState {
        *self.state.read()
    }

    fn ensure_started(&self, op: &'static str) -> Result<(), RegistryError> {
        match self.state() {
            RegistryState::Started => Ok(()),
            state => Err(RegistryError::State { op, state }),
        }
    }

    /// Connection-class failures are tolerated and replayed after the session
    /// comes back; everything else is surfaced to the caller.
    fn tolerate(&self, op: &'static str, err: &StoreError) -> Result<(), RegistryError> {
        if !err.is_connection() {
            return Err(RegistryError::store(op, err));
        }
        if self.store_warnings.should_log() {
            tracing::warn!(
                op,
                error = %err,
                suppressed = self.store_warnings.take_suppressed(),
                "registry store unreachable, deferring until the session is restored"
            );
        }
        Ok(())
    }

    /// Background refreshes have no caller to report to: connection failures
    /// go through [`tolerate`](Self::tolerate), rejections are logged with
    /// the path whose view is now stale.
    fn refresh_failed(&self, op: &'static str, path: &str, err: &StoreError) {
        if let Err(e) = self.tolerate(op, err)
            && self.store_warnings.should_log()
        {
            tracing::warn!(
                op,
                path,
                error = %e,
                suppressed = self.store_warnings.take_suppressed(),
                "registry store rejected a refresh, keeping the last known view"
            );
        }
    }

    /// Arms the store watch on `path` unless it already is. A tolerated
    /// failure leaves it unarmed for the next subscriber or session restore.
    async fn arm(
        &self,
        op: &'static str,
        path: &str,
        kind: WatchKind,
        armed: &mut bool,
    ) -> Result<(), RegistryError> {
        if *armed {
            return Ok(());
        }
        let result = match kind {
            WatchKind::Children => self.store.watch_children(path).await,
            WatchKind::Data => self.store.watch_data(path).await,
        };
        match result {
            Ok(()) => {
                *armed = true;
                Ok(())
            }
            Err(e) => self.tolerate(op, &e),
        }
    }

    fn init(&self) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        if *state != RegistryState::Created {
            return Err(RegistryError::State {
                op: "init",
                state: *state,
            });
        }
        *state = RegistryState::Initialized;
        tracing::debug!(protocol = %self.config.protocol, "registry initialized");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(protocol = %self.config.protocol, address = %self.config.address))]
    async fn connect(&self) -> Result<(), RegistryError> {
        let attempts = self.config.connect_retries.max(1);
        let timeout = self.config.connect_timeout;
        let watcher: Arc<dyn StoreWatcher> = Arc::new(IngestWatcher {
            tx: self.ingest_tx.clone(),
        });
        let aborted = || RegistryError::State {
            op: "start",
            state: RegistryState::Destroyed,
        };

        let mut last = StoreError::Unavailable("no connection attempt made".to_owned());
        for attempt in 1..=attempts {
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(aborted()),
                outcome = tokio::time::timeout(timeout, self.store.connect(Arc::clone(&watcher))) => outcome,
            };
            match outcome {
                Ok(Ok(())) => {
                    tracing::info!(attempt, "registry connected");
                    return Ok(());
                }
                Ok(Err(e)) => last = e,
                Err(_) => last = StoreError::Timeout(timeout),
            }
            tracing::warn!(attempt, attempts, error = %last, "registry connection attempt failed");

            if attempt < attempts {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Err(aborted()),
                    () = tokio::time::sleep(self.config.retry_backoff) => {}
                }
            }
        }

        Err(RegistryError::Connection {
            address: self.config.address.clone(),
            attempts,
            source: last,
        })
    }

    async fn destroy(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), RegistryState::Destroyed);
        if previous == RegistryState::Destroyed {
            return;
        }

        self.cancel.cancel();
        self.subscriptions.clear();
        self.provider_watches.clear();
        self.config_watches.clear();
        self.published.clear();
        self.session_live.store(false, Ordering::Release);
        self.store.close().await;
        tracing::info!(protocol = %self.config.protocol, address = %self.config.address, "registry destroyed");
    }

    fn provider_nodes(
        &self,
        op: &'static str,
        config: &ProviderConfig,
    ) -> Result<Vec<(String, Vec<u8>)>, RegistryError> {
        let key = config.key();
        config
            .servers
            .iter()
            .map(|server| {
                let provider = config.provider_info(server);
                let data = encode_provider(&provider)
                    .map_err(|e| RegistryError::operation(op, e.to_string()))?;
                Ok((provider_path(&self.root, &key, &provider), data))
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(interface = %config.interface_id, unique_id = %config.unique_id))]
    async fn register(&self, config: &ProviderConfig) -> Result<(), RegistryError> {
        const OP: &str = "register";
        self.ensure_started(OP)?;
        validate_key(OP, &config.key())?;
        validate_servers(OP, config)?;

        if !self.config.register || !config.register {
            tracing::info!("registration disabled, skipping");
            return Ok(());
        }

        let nodes = self.provider_nodes(OP, config)?;
        let stale: Vec<String> = self
            .published
            .insert(config.provider_id, nodes.clone())
            .map(|previous| {
                previous
                    .into_iter()
                    .map(|(path, _)| path)
                    .filter(|path| !nodes.iter().any(|(p, _)| p == path))
                    .collect()
            })
            .unwrap_or_default();

        if !self.session_live.load(Ordering::Acquire) {
            tracing::info!(nodes = nodes.len(), "store session down, registration queued");
            return Ok(());
        }

        if !stale.is_empty()
            && let Err(e) = self.store.delete_all(&stale).await
        {
            self.tolerate(OP, &e)?;
        }

        for (path, data) in &nodes {
            if let Err(e) = self.store.put(path, data, true).await {
                if e.is_connection() {
                    return self.tolerate(OP, &e);
                }
                self.published.remove(&config.provider_id);
                return Err(RegistryError::store(OP, &e));
            }
        }

        tracing::info!(nodes = nodes.len(), "provider registered");
        Ok(())
    }

    fn published_paths(&self, config: &ProviderConfig) -> Vec<String> {
        if let Some((_, nodes)) = self.published.remove(&config.provider_id) {
            return nodes.into_iter().map(|(path, _)| path).collect();
        }
        let key = config.key();
        config
            .servers
            .iter()
            .map(|server| provider_path(&self.root, &key, &config.provider_info(server)))
            .collect()
    }

    async fn delete_paths(&self, op: &'static str, paths: &[String]) -> Result<(), RegistryError> {
        if paths.is_empty() {
            return Ok(());
        }
        match self.store.delete_all(paths).await {
            Ok(()) => {
                tracing::info!(nodes = paths.len(), "provider nodes removed");
                Ok(())
            }
            Err(e) => self.tolerate(op, &e),
        }
    }

    #[tracing::instrument(skip_all, fields(interface = %config.interface_id, unique_id = %config.unique_id))]
    async fn unregister(&self, config: &ProviderConfig) -> Result<(), RegistryError> {
        const OP: &str = "unregister";
        self.ensure_started(OP)?;
        validate_key(OP, &config.key())?;

        let paths = self.published_paths(config);
        self.delete_paths(OP, &paths).await
    }

    #[tracing::instrument(skip_all, fields(count = configs.len()))]
    async fn batch_unregister(&self, configs: &[ProviderConfig]) -> Result<(), RegistryError> {
        const OP: &str = "batch_unregister";
        self.ensure_started(OP)?;
        for config in configs {
            validate_key(OP, &config.key())?;
        }

        let paths: Vec<String> = configs
            .iter()
            .flat_map(|config| self.published_paths(config))
            .collect();
        self.delete_paths(OP, &paths).await
    }

    async fn read_providers(&self, path: &str) -> Result<ProviderSet, StoreError> {
        let children = self.store.children(path).await?;
        Ok(children
            .iter()
            .filter_map(|(name, data)| decode_provider(name, data))
            .map(|provider| (provider.address(), provider))
            .collect())
    }

    async fn read_attributes(&self, path: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let data = self.store.get(path).await?;
        Ok(decode_attributes(path, data.as_deref()))
    }

    fn provider_watch(&self, key: &ServiceKey) -> Arc<ProviderWatch> {
        let path = providers_path(&self.root, key);
        Arc::clone(
            self.provider_watches
                .entry(path.clone())
                .or_insert_with(|| Arc::new(ProviderWatch::new(key.clone(), path)))
                .value(),
        )
    }

    fn config_watch(&self, subscription: &ConfigSubscription) -> Arc<ConfigWatch> {
        let path = config_node_path(&self.root, &subscription.key, subscription.scope);
        Arc::clone(
            self.config_watches
                .entry(path.clone())
                .or_insert_with(|| {
                    Arc::new(ConfigWatch::new(
                        subscription.key.clone(),
                        subscription.scope,
                        path,
                    ))
                })
                .value(),
        )
    }

    /// Removes the subscription of `consumer_id`, if any. Queued but not yet
    /// dispatched events are dropped.
    async fn detach(&self, consumer_id: Uuid) -> bool {
        let Some((_, path)) = self.subscriptions.remove(&consumer_id) else {
            return false;
        };
        let watch = self
            .provider_watches
            .get(&path)
            .map(|entry| Arc::clone(entry.value()));
        match watch {
            Some(watch) => watch.state.lock().await.remove(consumer_id),
            None => false,
        }
    }

    #[tracing::instrument(skip_all, fields(interface = %config.interface_id, unique_id = %config.unique_id))]
    async fn subscribe(&self, config: &ConsumerConfig) -> Result<Vec<ProviderGroup>, RegistryError> {
        const OP: &str = "subscribe";
        self.ensure_started(OP)?;
        let key = config.key();
        validate_key(OP, &key)?;
        let Some(listener) = config.listener.clone() else {
            return Err(RegistryError::operation(
                OP,
                "consumer has no provider listener",
            ));
        };

        if !self.config.subscribe || !config.subscribe {
            tracing::info!("subscription disabled, skipping");
            return Ok(Vec::new());
        }

        if self.detach(config.consumer_id).await {
            tracing::debug!(consumer_id = %config.consumer_id, "replacing earlier subscription");
        }

        let watch = self.provider_watch(&key);
        let mut state = watch.state.lock().await;
        self.arm(OP, &watch.path, WatchKind::Children, &mut state.armed).await?;
        match self.read_providers(&watch.path).await {
            Ok(current) => {
                let events = provider_events(&state.known, &current);
                state.broadcast(&events);
                state.known = current;
            }
            Err(e) => self.tolerate(OP, &e)?,
        }

        let snapshot = group_of(&state.known);
        state.subscribers.push(Subscriber::spawn(
            config.consumer_id,
            &key,
            listener,
            self.cancel.child_token(),
        ));
        drop(state);
        self.subscriptions.insert(config.consumer_id, watch.path.clone());

        tracing::info!(providers = snapshot.len(), "consumer subscribed");
        Ok(vec![snapshot])
    }

    async fn unsubscribe(&self, config: &ConsumerConfig) -> Result<(), RegistryError> {
        self.ensure_started("unsubscribe")?;
        if self.detach(config.consumer_id).await {
            tracing::info!(
                interface = %config.interface_id,
                consumer_id = %config.consumer_id,
                "consumer unsubscribed"
            );
        }
        Ok(())
    }

    async fn batch_unsubscribe(&self, configs: &[ConsumerConfig]) -> Result<(), RegistryError> {
        self.ensure_started("batch_unsubscribe")?;
        for config in configs {
            self.detach(config.consumer_id).await;
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(
        key = %subscription.key,
        scope = %subscription.scope,
        subscription_id = %subscription.subscription_id,
    ))]
    async fn subscribe_config(
        &self,
        subscription: &ConfigSubscription,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError> {
        const OP: &str = "subscribe_config";
        self.ensure_started(OP)?;
        validate_key(OP, &subscription.key)?;

        let watch = self.config_watch(subscription);
        let mut state = watch.state.lock().await;
        self.arm(OP, &watch.path, WatchKind::Data, &mut state.armed).await?;
        match self.read_attributes(&watch.path).await {
            Ok(current) => {
                if let Some(event) = config_event(&state.known, &current) {
                    state.broadcast(&event);
                }
                state.known = current;
            }
            Err(e) => self.tolerate(OP, &e)?,
        }

        if state.remove(subscription.subscription_id) {
            tracing::debug!("replacing earlier config subscription");
        }
        state.subscribers.push(ConfigSubscriber::spawn(
            subscription.subscription_id,
            &subscription.key,
            listener,
            self.cancel.child_token(),
        ));
        tracing::info!(attributes = state.known.len(), "config subscribed");
        Ok(state.known.clone())
    }

    async fn unsubscribe_config(
        &self,
        subscription: &ConfigSubscription,
    ) -> Result<(), RegistryError> {
        self.ensure_started("unsubscribe_config")?;
        let path = config_node_path(&self.root, &subscription.key, subscription.scope);
        let watch = self
            .config_watches
            .get(&path)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(watch) = watch
            && watch.state.lock().await.remove(subscription.subscription_id)
        {
            tracing::info!(
                key = %subscription.key,
                scope = %subscription.scope,
                subscription_id = %subscription.subscription_id,
                "config unsubscribed"
            );
        }
        Ok(())
    }

    async fn refresh_providers(&self, watch: &ProviderWatch) {
        let mut state = watch.state.lock().await;
        match self.read_providers(&watch.path).await {
            Ok(current) => {
                let events = provider_events(&state.known, &current);
                if !events.is_empty() {
                    tracing::debug!(key = %watch.key, events = events.len(), providers = current.len(), "providers changed");
                }
                state.broadcast(&events);
                state.known = current;
            }
            Err(e) => self.refresh_failed("refresh_providers", &watch.path, &e),
        }
    }

    async fn refresh_config(&self, watch: &ConfigWatch) {
        let mut state = watch.state.lock().await;
        match self.read_attributes(&watch.path).await {
            Ok(current) => {
                if let Some(event) = config_event(&state.known, &current) {
                    tracing::debug!(key = %watch.key, scope = %watch.scope, "config changed");
                    state.broadcast(&event);
                }
                state.known = current;
            }
            Err(e) => self.refresh_failed("refresh_config", &watch.path, &e),
        }
    }

    /// Re-arms watches, republishes every registered node and hands each
    /// subscriber a full snapshot.
    #[tracing::instrument(skip_all, fields(address = %self.config.address))]
    async fn recover(&self) {
        self.session_live.store(true, Ordering::Release);

        let provider_watches: Vec<Arc<ProviderWatch>> = self
            .provider_watches
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let config_watches: Vec<Arc<ConfigWatch>> = self
            .config_watches
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let published: Vec<(String, Vec<u8>)> = self
            .published
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();

        for watch in &provider_watches {
            let result = self.store.watch_children(&watch.path).await;
            if let Err(e) = &result {
                tracing::warn!(path = %watch.path, error = %e, "failed to re-arm provider watch");
            }
            watch.state.lock().await.armed = result.is_ok();
        }
        for watch in &config_watches {
            let result = self.store.watch_data(&watch.path).await;
            if let Err(e) = &result {
                tracing::warn!(path = %watch.path, error = %e, "failed to re-arm config watch");
            }
            watch.state.lock().await.armed = result.is_ok();
        }

        for (path, data) in &published {
            if let Err(e) = self.store.put(path, data, true).await {
                tracing::warn!(path = %path, error = %e, "failed to republish provider");
            }
        }

        for watch in &provider_watches {
            let mut state = watch.state.lock().await;
            match self.read_providers(&watch.path).await {
                Ok(current) => {
                    let event = RegistryEvent::ProvidersReplaced(vec![group_of(&current)]);
                    state.broadcast(std::slice::from_ref(&event));
                    state.known = current;
                }
                Err(e) => {
                    tracing::warn!(path = %watch.path, error = %e, "failed to resync providers");
                }
            }
        }
        for watch in &config_watches {
            self.refresh_config(watch).await;
        }

        tracing::info!(
            republished = published.len(),
            provider_watches = provider_watches.len(),
            config_watches = config_watches.len(),
            "registry session recovered"
        );
    }

    async fn handle(&self, event: StoreEvent) {
        match event {
            StoreEvent::ChildrenChanged { path } => {
                let watch = self
                    .provider_watches
                    .get(&path)
                    .map(|entry| Arc::clone(entry.value()));
                if let Some(watch) = watch {
                    self.refresh_providers(&watch).await;
                }
            }
            StoreEvent::DataChanged { path } => {
                let watch = self
                    .config_watches
                    .get(&path)
                    .map(|entry| Arc::clone(entry.value()));
                if let Some(watch) = watch {
                    self.refresh_config(&watch).await;
                }
            }
            StoreEvent::SessionLost => {
                self.session_live.store(false, Ordering::Release);
                tracing::warn!(address = %self.config.address, "registry store session lost");
            }
            StoreEvent::SessionRestored => self.recover().await,
        }
    }
}

/// Runs until the registry is destroyed or dropped.
fn spawn_ingest(inner: &Arc<Inner>, mut rx: mpsc::UnboundedReceiver<StoreEvent>) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let cancel = inner.cancel.clone();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let Some(inner) = weak.upgrade() else { break };
            inner.handle(event).await;
        }
        tracing::debug!("registry ingest stopped");
    });
}

fn validate_servers(op: &'static str, config: &ProviderConfig) -> Result<(), RegistryError> {
    if config.servers.is_empty() {
        return Err(RegistryError::operation(op, "provider has no server bindings"));
    }
    for server in &config.servers {
        if server.host.trim().is_empty() || server.host.contains('/') {
            return Err(RegistryError::operation(
                op,
                format!("invalid server host '{}'", server.host),
            ));
        }
        if server.port == 0 {
            return Err(RegistryError::operation(op, "server port must not be 0"));
        }
    }
    Ok(())
}

#[async_trait]
impl Registry for StoreRegistry {
    fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    fn state(&self) -> RegistryState {
        self.inner.state()
    }

    fn init(&self) -> Result<(), RegistryError> {
        self.inner.init()
    }

    async fn start(&self) -> Result<(), RegistryError> {
        let _guard = self.inner.start_lock.lock().await;
        match self.inner.state() {
            RegistryState::Started => return Ok(()),
            RegistryState::Initialized => {}
            state => return Err(RegistryError::State { op: "start", state }),
        }

        self.inner.connect().await?;

        let destroyed = {
            let mut state = self.inner.state.write();
            if *state == RegistryState::Destroyed {
                true
            } else {
                *state = RegistryState::Started;
                false
            }
        };
        if destroyed {
            self.inner.store.close().await;
            return Err(RegistryError::State {
                op: "start",
                state: RegistryState::Destroyed,
            });
        }

        self.inner.session_live.store(true, Ordering::Release);
        let ingest = self.inner.ingest_rx.lock().take();
        if let Some(rx) = ingest {
            spawn_ingest(&self.inner, rx);
        }
        Ok(())
    }

    async fn destroy(&self) {
        self.inner.destroy().await;
    }

    async fn register(&self, config: &ProviderConfig) -> Result<(), RegistryError> {
        self.inner.register(config).await
    }

    async fn unregister(&self, config: &ProviderConfig) -> Result<(), RegistryError> {
        self.inner.unregister(config).await
    }

    async fn batch_unregister(&self, configs: &[ProviderConfig]) -> Result<(), RegistryError> {
        self.inner.batch_unregister(configs).await
    }

    async fn subscribe(&self, config: &ConsumerConfig) -> Result<Vec<ProviderGroup>, RegistryError> {
        self.inner.subscribe(config).await
    }

    async fn unsubscribe(&self, config: &ConsumerConfig) -> Result<(), RegistryError> {
        self.inner.unsubscribe(config).await
    }

    async fn batch_unsubscribe(&self, configs: &[ConsumerConfig]) -> Result<(), RegistryError> {
        self.inner.batch_unsubscribe(configs).await
    }

    async fn subscribe_config(
        &self,
        subscription: &ConfigSubscription,
        listener: Arc<dyn ConfigListener>,
    ) -> Result<BTreeMap<String, String>, RegistryError> {
        self.inner.subscribe_config(subscription, listener).await
    }

    async fn unsubscribe_config(
        &self,
        subscription: &ConfigSubscription,
    ) -> Result<(), RegistryError> {
        self.inner.unsubscribe_config(subscription).await
    }
}

impl Drop for StoreRegistry {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::{MemoryServer, MemoryStore};
    use registry_sdk::{ChannelListener, ServerConfig};
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    fn registry(server: &Arc<MemoryServer>) -> StoreRegistry {
        StoreRegistry::new(
            RegistryConfig::new("memory", server.address()),
            Arc::new(MemoryStore::new(Arc::clone(server))),
        )
    }

    async fn started(server: &Arc<MemoryServer>) -> StoreRegistry {
        let registry = registry(server);
        registry.init().unwrap();
        registry.start().await.unwrap();
        registry
    }

    /// Memory store that rejects the next `rejected_watches` watch calls and,
    /// while `reject_reads` is set, every read.
    struct RejectingStore {
        inner: MemoryStore,
        rejected_watches: AtomicUsize,
        reject_reads: AtomicBool,
    }

    impl RejectingStore {
        fn new(server: &Arc<MemoryServer>, rejected_watches: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new(Arc::clone(server)),
                rejected_watches: AtomicUsize::new(rejected_watches),
                reject_reads: AtomicBool::new(false),
            })
        }

        fn take_watch_rejection(&self) -> Result<(), StoreError> {
            let rejected = self
                .rejected_watches
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                Err(StoreError::Rejected("no watch permission".to_owned()))
            } else {
                Ok(())
            }
        }

        fn check_read(&self) -> Result<(), StoreError> {
            if self.reject_reads.load(Ordering::Acquire) {
                Err(StoreError::Rejected("no read permission".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CoordinationStore for RejectingStore {
        async fn connect(&self, watcher: Arc<dyn StoreWatcher>) -> Result<(), StoreError> {
            self.inner.connect(watcher).await
        }

        async fn close(&self) {
            self.inner.close().await;
        }

        async fn put(&self, path: &str, data: &[u8], ephemeral: bool) -> Result<(), StoreError> {
            self.inner.put(path, data, ephemeral).await
        }

        async fn delete(&self, path: &str) -> Result<(), StoreError> {
            self.inner.delete(path).await
        }

        async fn delete_all(&self, paths: &[String]) -> Result<(), StoreError> {
            self.inner.delete_all(paths).await
        }

        async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.check_read()?;
            self.inner.get(path).await
        }

        async fn children(&self, parent: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
            self.check_read()?;
            self.inner.children(parent).await
        }

        async fn watch_children(&self, path: &str) -> Result<(), StoreError> {
            self.take_watch_rejection()?;
            self.inner.watch_children(path).await
        }

        async fn watch_data(&self, path: &str) -> Result<(), StoreError> {
            self.take_watch_rejection()?;
            self.inner.watch_data(path).await
        }

        async fn unwatch(&self, path: &str) -> Result<(), StoreError> {
            self.inner.unwatch(path).await
        }
    }

    async fn started_over(server: &Arc<MemoryServer>, store: Arc<RejectingStore>) -> StoreRegistry {
        let registry = StoreRegistry::new(RegistryConfig::new("memory", server.address()), store);
        registry.init().unwrap();
        registry.start().await.unwrap();
        registry
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<RegistryEvent>) -> RegistryEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn register_replaces_bindings_of_the_same_provider() {
        let server = MemoryServer::new("service-replace");
        let registry = started(&server).await;

        let provider =
            ProviderConfig::new("com.acme.Echo").with_server(ServerConfig::new("10.0.0.1", 12200));
        registry.register(&provider).await.unwrap();
        assert!(server.exists("/rpc/com.acme.Echo/providers/10.0.0.1:12200"));

        let mut moved = provider.clone();
        moved.servers = vec![ServerConfig::new("10.0.0.1", 12201)];
        registry.register(&moved).await.unwrap();
        assert!(!server.exists("/rpc/com.acme.Echo/providers/10.0.0.1:12200"));
        assert!(server.exists("/rpc/com.acme.Echo/providers/10.0.0.1:12201"));

        registry.destroy().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn disabled_registration_is_skipped_and_logged() {
        let server = MemoryServer::new("service-disabled");
        let registry = started(&server).await;

        let provider = ProviderConfig::new("svc")
            .with_register(false)
            .with_server(ServerConfig::new("h", 1));
        registry.register(&provider).await.unwrap();

        assert!(!server.exists("/rpc/svc/providers/h:1"));
        assert!(logs_contain("registration disabled"));
        registry.destroy().await;
    }

    #[tokio::test]
    async fn invalid_bindings_are_rejected() {
        let server = MemoryServer::new("service-invalid");
        let registry = started(&server).await;

        let no_servers = ProviderConfig::new("svc");
        assert!(matches!(
            registry.register(&no_servers).await,
            Err(RegistryError::Operation { op: "register", .. })
        ));

        let zero_port = ProviderConfig::new("svc").with_server(ServerConfig::new("h", 0));
        assert!(matches!(
            registry.register(&zero_port).await,
            Err(RegistryError::Operation { .. })
        ));

        registry.destroy().await;
    }

    #[tokio::test]
    async fn resubscribing_a_consumer_replaces_its_subscription() {
        let server = MemoryServer::new("service-resubscribe");
        let registry = started(&server).await;

        let (first, _rx1) = ChannelListener::new();
        let (second, _rx2) = ChannelListener::new();
        let consumer = ConsumerConfig::new("svc").with_listener(first);
        registry.subscribe(&consumer).await.unwrap();
        registry
            .subscribe(&consumer.clone().with_listener(second))
            .await
            .unwrap();

        assert_eq!(registry.subscription_count(), 1);
        registry.unsubscribe(&consumer).await.unwrap();
        assert_eq!(registry.subscription_count(), 0);

        registry.destroy().await;
    }

    #[tokio::test]
    async fn batch_operations_cover_every_config() {
        let server = MemoryServer::new("service-batch");
        let registry = started(&server).await;

        let a = ProviderConfig::new("svc.a").with_server(ServerConfig::new("h", 1));
        let b = ProviderConfig::new("svc.b").with_server(ServerConfig::new("h", 2));
        registry.register(&a).await.unwrap();
        registry.register(&b).await.unwrap();
        registry.batch_unregister(&[a, b]).await.unwrap();
        assert!(!server.exists("/rpc/svc.a/providers/h:1"));
        assert!(!server.exists("/rpc/svc.b/providers/h:2"));

        let consumers: Vec<ConsumerConfig> = ["svc.a", "svc.b"]
            .into_iter()
            .map(|iface| ConsumerConfig::new(iface).with_listener(ChannelListener::new().0))
            .collect();
        for consumer in &consumers {
            registry.subscribe(consumer).await.unwrap();
        }
        assert_eq!(registry.subscription_count(), 2);
        registry.batch_unsubscribe(&consumers).await.unwrap();
        assert_eq!(registry.subscription_count(), 0);

        registry.destroy().await;
    }

    #[tokio::test]
    async fn rejected_watch_is_armed_by_the_next_subscriber() {
        let server = MemoryServer::new("service-rejected-watch");
        let registry = started_over(&server, RejectingStore::new(&server, 1)).await;

        let (first, _rx1) = ChannelListener::new();
        assert!(matches!(
            registry
                .subscribe(&ConsumerConfig::new("svc").with_listener(first))
                .await,
            Err(RegistryError::Operation { op: "subscribe", .. })
        ));

        let (second, mut rx2) = ChannelListener::new();
        let snapshot = registry
            .subscribe(&ConsumerConfig::new("svc").with_listener(second))
            .await
            .unwrap();
        assert!(snapshot[0].is_empty());

        let publisher = started(&server).await;
        publisher
            .register(&ProviderConfig::new("svc").with_server(ServerConfig::new("h", 1)))
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut rx2).await,
            RegistryEvent::ProviderAdded(group) if group.providers[0].address() == "h:1"
        ));

        publisher.destroy().await;
        registry.destroy().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn rejected_refresh_is_logged_with_its_path() {
        let server = MemoryServer::new("service-rejected-read");
        let store = RejectingStore::new(&server, 0);
        let registry = started_over(&server, Arc::clone(&store)).await;

        let (listener, _rx) = ChannelListener::new();
        registry
            .subscribe(&ConsumerConfig::new("svc").with_listener(listener))
            .await
            .unwrap();
        let watch = registry
            .inner
            .provider_watches
            .get("/rpc/svc/providers")
            .map(|entry| Arc::clone(entry.value()))
            .unwrap();

        store.reject_reads.store(true, Ordering::Release);
        registry.inner.refresh_providers(&watch).await;

        assert!(logs_contain("rejected a refresh"));
        assert!(logs_contain("/rpc/svc/providers"));
        registry.destroy().await;
    }

    #[tokio::test]
    async fn store_events_reach_only_the_watch_of_their_path() {
        let server = MemoryServer::new("service-routing");
        let registry = started(&server).await;

        let (a, mut rx_a) = ChannelListener::new();
        let (b, mut rx_b) = ChannelListener::new();
        registry
            .subscribe(&ConsumerConfig::new("svc.a").with_listener(a))
            .await
            .unwrap();
        registry
            .subscribe(&ConsumerConfig::new("svc.b").with_listener(b))
            .await
            .unwrap();

        let publisher = started(&server).await;
        publisher
            .register(&ProviderConfig::new("svc.a").with_server(ServerConfig::new("h", 1)))
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut rx_a).await,
            RegistryEvent::ProviderAdded(group) if group.providers[0].address() == "h:1"
        ));

        publisher
            .register(&ProviderConfig::new("svc.b").with_server(ServerConfig::new("h", 2)))
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut rx_b).await,
            RegistryEvent::ProviderAdded(group) if group.providers[0].address() == "h:2"
        ));

        publisher.destroy().await;
        registry.destroy().await;
    }

    #[tokio::test]
    async fn session_state_follows_store_notifications() {
        let server = MemoryServer::new("service-session");
        let registry = started(&server).await;
        assert!(registry.is_session_live());

        server.expire_sessions();
        tokio::time::timeout(Duration::from_secs(1), async {
            while registry.is_session_live() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        server.restore_sessions();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !registry.is_session_live() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        registry.destroy().await;
    }
}
