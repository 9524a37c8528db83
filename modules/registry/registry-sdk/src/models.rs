//! Domain models for the registry module.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::listener::ProviderInfoListener;

/// Name of the single provider group a registry reports.
pub const DEFAULT_GROUP: &str = "default";

/// Default provider weight.
pub const DEFAULT_WEIGHT: i32 = 100;

/// Exact-match identity of a service: `(interface_id, unique_id)`.
///
/// An empty `unique_id` is its own identity, not a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub interface_id: String,
    #[serde(default)]
    pub unique_id: String,
}

impl ServiceKey {
    pub fn new(interface_id: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            interface_id: interface_id.into(),
            unique_id: unique_id.into(),
        }
    }

    pub fn interface(interface_id: impl Into<String>) -> Self {
        Self::new(interface_id, String::new())
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique_id.is_empty() {
            f.write_str(&self.interface_id)
        } else {
            write!(f, "{}:{}", self.interface_id, self.unique_id)
        }
    }
}

/// One server binding a provider is exported on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

fn default_protocol() -> String {
    "bolt".to_owned()
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: default_protocol(),
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }
}

/// What a provider publishes: the service key plus every server binding.
///
/// `provider_id` is assigned at construction and survives clones, so a
/// re-registered copy replaces the nodes published earlier for the same
/// provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider_id: Uuid,
    pub interface_id: String,
    pub unique_id: String,
    pub app_name: Option<String>,
    pub register: bool,
    pub serialization: String,
    pub weight: i32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub parameters: BTreeMap<String, String>,
    pub servers: Vec<ServerConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_id: Uuid::new_v4(),
            interface_id: String::new(),
            unique_id: String::new(),
            app_name: None,
            register: true,
            serialization: "hessian2".to_owned(),
            weight: DEFAULT_WEIGHT,
            timeout: Duration::from_secs(3),
            parameters: BTreeMap::new(),
            servers: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn new(interface_id: impl Into<String>) -> Self {
        Self {
            interface_id: interface_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    #[must_use]
    pub fn with_register(mut self, register: bool) -> Self {
        self.register = register;
        self
    }

    #[must_use]
    pub fn with_serialization(mut self, serialization: impl Into<String>) -> Self {
        self.serialization = serialization.into();
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    #[must_use]
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.interface_id.clone(), self.unique_id.clone())
    }

    /// The record published for one of this provider's server bindings.
    #[must_use]
    pub fn provider_info(&self, server: &ServerConfig) -> ProviderInfo {
        let mut attributes = self.parameters.clone();
        if let Some(app) = &self.app_name {
            attributes.insert("app_name".to_owned(), app.clone());
        }
        attributes.insert("timeout".to_owned(), self.timeout.as_millis().to_string());

        ProviderInfo {
            host: server.host.clone(),
            port: server.port,
            protocol: server.protocol.clone(),
            serialization: self.serialization.clone(),
            weight: self.weight,
            attributes,
        }
    }
}

/// What a consumer subscribes with.
///
/// `consumer_id` identifies the subscription; clones share it.
#[derive(Clone)]
pub struct ConsumerConfig {
    pub consumer_id: Uuid,
    pub interface_id: String,
    pub unique_id: String,
    pub app_name: Option<String>,
    pub subscribe: bool,
    pub serialization: String,
    pub invoke_type: String,
    pub timeout: Duration,
    pub listener: Option<Arc<dyn ProviderInfoListener>>,
}

impl ConsumerConfig {
    pub fn new(interface_id: impl Into<String>) -> Self {
        Self {
            consumer_id: Uuid::new_v4(),
            interface_id: interface_id.into(),
            unique_id: String::new(),
            app_name: None,
            subscribe: true,
            serialization: "hessian2".to_owned(),
            invoke_type: "sync".to_owned(),
            timeout: Duration::from_secs(3),
            listener: None,
        }
    }

    #[must_use]
    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    #[must_use]
    pub fn with_subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        self
    }

    #[must_use]
    pub fn with_invoke_type(mut self, invoke_type: impl Into<String>) -> Self {
        self.invoke_type = invoke_type.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProviderInfoListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    #[must_use]
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.interface_id.clone(), self.unique_id.clone())
    }
}

impl fmt::Debug for ConsumerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerConfig")
            .field("consumer_id", &self.consumer_id)
            .field("interface_id", &self.interface_id)
            .field("unique_id", &self.unique_id)
            .field("app_name", &self.app_name)
            .field("subscribe", &self.subscribe)
            .field("serialization", &self.serialization)
            .field("invoke_type", &self.invoke_type)
            .field("timeout", &self.timeout)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

/// Which configuration node of a service a config subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    /// Interface-level attributes shared by providers and consumers.
    Interface,
    /// Consumer-side overrides pushed by operators.
    Override,
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interface => "interface",
            Self::Override => "override",
        })
    }
}

/// One config listener slot: a subscriber id on one scope of one service.
///
/// Several subscriptions may follow the same node; subscribing again with the
/// same `subscription_id` replaces only that subscription's listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigSubscription {
    pub subscription_id: Uuid,
    pub key: ServiceKey,
    pub scope: ConfigScope,
}

impl ConfigSubscription {
    pub fn new(subscription_id: Uuid, key: ServiceKey, scope: ConfigScope) -> Self {
        Self {
            subscription_id,
            key,
            scope,
        }
    }

    /// Interface-level attributes of `key`.
    pub fn interface(subscription_id: Uuid, key: ServiceKey) -> Self {
        Self::new(subscription_id, key, ConfigScope::Interface)
    }

    /// Overrides of `consumer`'s service, identified by its `consumer_id`.
    #[must_use]
    pub fn overrides(consumer: &ConsumerConfig) -> Self {
        Self::new(consumer.consumer_id, consumer.key(), ConfigScope::Override)
    }
}

/// One remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub serialization: String,
    #[serde(default = "default_weight")]
    pub weight: i32,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_weight() -> i32 {
    DEFAULT_WEIGHT
}

impl ProviderInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: default_protocol(),
            serialization: String::new(),
            weight: DEFAULT_WEIGHT,
            attributes: BTreeMap::new(),
        }
    }

    /// `host:port`, the identity of an endpoint within a service key.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Named bucket of endpoints under one service key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGroup {
    pub name: String,
    pub providers: Vec<ProviderInfo>,
}

impl ProviderGroup {
    pub fn new(name: impl Into<String>, providers: Vec<ProviderInfo>) -> Self {
        Self {
            name: name.into(),
            providers,
        }
    }

    #[must_use]
    pub fn default_group(providers: Vec<ProviderInfo>) -> Self {
        Self::new(DEFAULT_GROUP, providers)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Total number of endpoints across `groups`.
#[must_use]
pub fn provider_count(groups: &[ProviderGroup]) -> usize {
    groups.iter().map(ProviderGroup::len).sum()
}
