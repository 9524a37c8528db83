//! Diffing of provider sets and attribute maps into listener events.

use std::collections::BTreeMap;

use registry_sdk::{ConfigEvent, ProviderGroup, ProviderInfo, RegistryEvent};

/// Provider set keyed by `host:port`.
pub type ProviderSet = BTreeMap<String, ProviderInfo>;

#[must_use]
pub fn group_of(set: &ProviderSet) -> ProviderGroup {
    ProviderGroup::default_group(set.values().cloned().collect())
}

/// Events turning `old` into `new`.
///
/// One `ProviderRemoved` per vanished endpoint, then one `ProviderAdded` per
/// new endpoint, then a single `ProvidersUpdated` with the full `new` group
/// if any surviving endpoint's record changed.
#[must_use]
pub fn provider_events(old: &ProviderSet, new: &ProviderSet) -> Vec<RegistryEvent> {
    let mut events = Vec::new();

    for (address, provider) in old {
        if !new.contains_key(address) {
            events.push(RegistryEvent::ProviderRemoved(ProviderGroup::default_group(
                vec![provider.clone()],
            )));
        }
    }

    let mut changed = false;
    for (address, provider) in new {
        match old.get(address) {
            None => events.push(RegistryEvent::ProviderAdded(ProviderGroup::default_group(
                vec![provider.clone()],
            ))),
            Some(previous) if previous != provider => changed = true,
            Some(_) => {}
        }
    }

    if changed {
        events.push(RegistryEvent::ProvidersUpdated(group_of(new)));
    }
    events
}

/// Event turning attribute map `old` into `new`, if they differ.
///
/// Additions and value changes produce `AttrUpdated` with only those entries;
/// any removal produces `ConfigChanged` with the full `new` map.
#[must_use]
pub fn config_event(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Option<ConfigEvent> {
    if old.keys().any(|name| !new.contains_key(name)) {
        return Some(ConfigEvent::ConfigChanged(new.clone()));
    }

    let changed: BTreeMap<String, String> = new
        .iter()
        .filter(|(name, value)| old.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    (!changed.is_empty()).then_some(ConfigEvent::AttrUpdated(changed))
}
