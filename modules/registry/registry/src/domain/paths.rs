//! Store layout of providers and configuration attributes.
//!
//! ```text
//! {root}/{interface_id}[/{unique_id}]/providers/{host}:{port}   ProviderInfo as JSON
//! {root}/{interface_id}[/{unique_id}]/configs                   {name: value} as JSON
//! {root}/{interface_id}[/{unique_id}]/overrides                 {name: value} as JSON
//! ```

use std::collections::BTreeMap;

use registry_sdk::{ConfigScope, ProviderInfo, RegistryError, ServiceKey};

const PROVIDERS: &str = "providers";
const CONFIGS: &str = "configs";
const OVERRIDES: &str = "overrides";

/// Normalizes a configured root to `/a/b` form; `""` and `"/"` become `""`.
#[must_use]
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Rejects keys that cannot be laid out unambiguously.
///
/// # Errors
/// Returns `RegistryError::Operation` naming `op`.
pub fn validate_key(op: &'static str, key: &ServiceKey) -> Result<(), RegistryError> {
    if key.interface_id.trim().is_empty() {
        return Err(RegistryError::operation(op, "interface id must not be empty"));
    }
    if key.interface_id.contains('/') || key.unique_id.contains('/') {
        return Err(RegistryError::operation(
            op,
            format!("service key '{key}' must not contain '/'"),
        ));
    }
    if [PROVIDERS, CONFIGS, OVERRIDES].contains(&key.unique_id.as_str()) {
        return Err(RegistryError::operation(
            op,
            format!("unique id '{}' is reserved", key.unique_id),
        ));
    }
    Ok(())
}

fn service_path(root: &str, key: &ServiceKey) -> String {
    if key.unique_id.is_empty() {
        format!("{root}/{}", key.interface_id)
    } else {
        format!("{root}/{}/{}", key.interface_id, key.unique_id)
    }
}

#[must_use]
pub fn providers_path(root: &str, key: &ServiceKey) -> String {
    format!("{}/{PROVIDERS}", service_path(root, key))
}

#[must_use]
pub fn provider_path(root: &str, key: &ServiceKey, provider: &ProviderInfo) -> String {
    format!("{}/{}", providers_path(root, key), provider.address())
}

#[must_use]
pub fn config_path(root: &str, key: &ServiceKey) -> String {
    format!("{}/{CONFIGS}", service_path(root, key))
}

#[must_use]
pub fn overrides_path(root: &str, key: &ServiceKey) -> String {
    format!("{}/{OVERRIDES}", service_path(root, key))
}

/// The data node a config subscription of `scope` follows.
#[must_use]
pub fn config_node_path(root: &str, key: &ServiceKey, scope: ConfigScope) -> String {
    match scope {
        ConfigScope::Interface => config_path(root, key),
        ConfigScope::Override => overrides_path(root, key),
    }
}

/// # Errors
/// Fails only if serialization fails.
pub fn encode_provider(provider: &ProviderInfo) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(provider)
}

/// Decodes a provider node. `None` when the record is malformed or its node
/// name does not match the record's `host:port`.
#[must_use]
pub fn decode_provider(node_name: &str, data: &[u8]) -> Option<ProviderInfo> {
    match serde_json::from_slice::<ProviderInfo>(data) {
        Ok(provider) if provider.address() == node_name => Some(provider),
        Ok(provider) => {
            tracing::warn!(
                node = node_name,
                address = %provider.address(),
                "provider record does not match its node name, skipping"
            );
            None
        }
        Err(e) => {
            tracing::warn!(node = node_name, error = %e, "malformed provider record, skipping");
            None
        }
    }
}

/// # Errors
/// Fails only if serialization fails.
pub fn encode_attributes(attrs: &BTreeMap<String, String>) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(attrs)
}

/// Decodes a config node; a missing or malformed node yields no attributes.
#[must_use]
pub fn decode_attributes(path: &str, data: Option<&[u8]>) -> BTreeMap<String, String> {
    let Some(data) = data else {
        return BTreeMap::new();
    };
    if data.is_empty() {
        return BTreeMap::new();
    }
    serde_json::from_slice(data).unwrap_or_else(|e| {
        tracing::warn!(path, error = %e, "malformed config record, treating as empty");
        BTreeMap::new()
    })
}
