//! Built-in extensions of this module.

use registry_sdk::{DynamicConfiger, Registry};
use rpckit::ExtensionRegistration;

use crate::configer::{self, RegistryDynamicConfiger};
use crate::memory;

/// The `memory` registry backend. Every resolution yields a fresh client so
/// that separate configurations never share a session.
pub const MEMORY_REGISTRY: ExtensionRegistration = rpckit::extension! {
    capability: dyn Registry,
    alias: memory::PROTOCOL,
    scope: PerResolution,
    constructor: memory::create_registry,
};

/// Registry-backed dynamic configer, one per registry it is resolved with.
pub const REGISTRY_CONFIGER: ExtensionRegistration = rpckit::extension! {
    capability: dyn DynamicConfiger,
    alias: configer::ALIAS,
    scope: PerResolution,
    constructor: RegistryDynamicConfiger::create,
};

rpckit::register_extension!(MEMORY_REGISTRY);
rpckit::register_extension!(REGISTRY_CONFIGER);

/// Registrations of this module, for catalogs assembled by hand.
#[must_use]
pub fn builtin_extensions() -> [ExtensionRegistration; 2] {
    [MEMORY_REGISTRY, REGISTRY_CONFIGER]
}
