use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// An abstract contract with multiple swappable, named implementations.
///
/// Implemented for trait object types:
///
/// ```ignore
/// pub trait LoadBalancer: Send + Sync {
///     fn select(&self, providers: &[ProviderInfo]) -> Option<ProviderInfo>;
/// }
///
/// impl rpckit::Capability for dyn LoadBalancer {
///     const NAME: &'static str = "load-balancer";
///     type Args = ();
/// }
/// ```
pub trait Capability: Send + Sync + 'static {
    /// Human readable capability name used in errors and logs.
    const NAME: &'static str;

    /// Arguments handed to every constructor of this capability.
    type Args: Send + Sync + 'static;
}

/// Lifetime policy of a registered implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One shared instance for the life of the process.
    Singleton,
    /// A fresh instance on every resolution.
    PerResolution,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => f.write_str("singleton"),
            Scope::PerResolution => f.write_str("per_resolution"),
        }
    }
}

/// Stable identity of a capability type.
///
/// Equality and hashing use the `TypeId` only; the names ride along for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct CapabilityKey {
    type_id: TypeId,
    type_name: &'static str,
    name: &'static str,
}

impl CapabilityKey {
    #[must_use]
    pub fn of<T: Capability + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: T::NAME,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for CapabilityKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for CapabilityKey {}

impl Hash for CapabilityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.type_name)
    }
}
