use std::time::Duration;

use rpckit::ExtensionError;

use crate::api::RegistryState;

/// Failures reported by a coordination-store driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("coordination store session lost")]
    SessionLost,

    #[error("coordination store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("coordination store rejected the request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether the failure is about connectivity rather than the request.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::SessionLost | Self::Timeout(_)
        )
    }
}

/// Errors returned by [`Registry`](crate::Registry) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot connect to registry at '{address}' after {attempts} attempt(s): {source}")]
    Connection {
        address: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("registry {op} failed: {reason}")]
    Operation { op: &'static str, reason: String },

    #[error("registry {op} is not allowed in state {state}")]
    State {
        op: &'static str,
        state: RegistryState,
    },

    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

impl RegistryError {
    pub fn operation(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Operation {
            op,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn store(op: &'static str, err: &StoreError) -> Self {
        Self::Operation {
            op,
            reason: err.to_string(),
        }
    }
}
