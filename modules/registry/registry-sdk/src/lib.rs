//! Registry SDK
//!
//! Public contract of the registry module:
//!
//! - [`Registry`] - publish/subscribe of service endpoints and configuration
//!   attributes, resolved by `protocol` through the extension loader
//! - [`ProviderInfoListener`], [`ConfigListener`] - caller-supplied callbacks
//! - [`ChannelListener`], [`ProjectionListener`] - ready-made listeners
//! - [`CoordinationStore`] - driver contract for the coordination service
//! - [`DynamicConfiger`] - interface-level and consumer override configuration
//! - [`RegistryError`], [`StoreError`] - error types
//!
//! ## Usage
//!
//! ```ignore
//! use registry_sdk::{ConsumerConfig, ProjectionListener, RegistryConfig};
//!
//! let registry = factory.get_registry(&RegistryConfig::default())?;
//! registry.start().await?;
//!
//! let projection = ProjectionListener::new();
//! let consumer = ConsumerConfig::new("com.acme.EchoService")
//!     .with_unique_id("u1")
//!     .with_listener(projection.clone());
//! let snapshot = registry.subscribe(&consumer).await?;
//! projection.update_all_providers(&snapshot);
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod api;
pub mod config;
pub mod configer;
pub mod error;
pub mod listener;
pub mod models;
pub mod projection;
pub mod store;

// Re-export main types at crate root
pub use api::{Registry, RegistryState};
pub use config::RegistryConfig;
pub use configer::DynamicConfiger;
pub use error::{RegistryError, StoreError};
pub use listener::{
    ChannelListener, ConfigChannelListener, ConfigEvent, ConfigListener, ProviderInfoListener,
    RegistryEvent,
};
pub use models::{
    ConfigScope, ConfigSubscription, ConsumerConfig, DEFAULT_GROUP, ProviderConfig,
    ProviderGroup, ProviderInfo, ServerConfig, ServiceKey, provider_count,
};
pub use projection::{ProjectionListener, ProviderProjection};
pub use store::{CoordinationStore, StoreEvent, StoreWatcher};
