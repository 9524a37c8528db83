use std::error::Error as StdError;
use std::sync::Arc;

/// Shared, cloneable cause of a failed construction.
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Catalog population failures. Fatal at startup.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate alias '{alias}' for capability '{capability}'")]
    DuplicateAlias {
        capability: &'static str,
        alias: &'static str,
    },

    #[error("empty alias registered for capability '{capability}'")]
    EmptyAlias { capability: &'static str },
}

/// Resolution failures returned by [`ExtensionLoader`](super::ExtensionLoader).
///
/// Cloneable so a single failed singleton construction can be handed to every
/// caller that waited on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtensionError {
    #[error("no extension '{alias}' registered for capability '{capability}'")]
    NotFound {
        capability: &'static str,
        alias: String,
    },

    #[error("failed to instantiate extension '{alias}' of capability '{capability}': {source}")]
    Instantiation {
        capability: &'static str,
        alias: String,
        #[source]
        source: SharedCause,
    },

    #[error(
        "extension '{alias}' of capability '{capability}' expects arguments of type {expected}"
    )]
    ArgumentMismatch {
        capability: &'static str,
        alias: String,
        expected: &'static str,
    },

    #[error("extension '{alias}' produced an instance of the wrong type for capability '{capability}'")]
    TypeMismatch {
        capability: &'static str,
        alias: String,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ExtensionError {
    pub(crate) fn instantiation(
        capability: &'static str,
        alias: &str,
        cause: anyhow::Error,
    ) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
        Self::Instantiation {
            capability,
            alias: alias.to_owned(),
            source: Arc::from(boxed),
        }
    }

    /// Alias the failure refers to, if any.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::NotFound { alias, .. }
            | Self::Instantiation { alias, .. }
            | Self::ArgumentMismatch { alias, .. }
            | Self::TypeMismatch { alias, .. } => Some(alias),
            Self::Catalog(_) => None,
        }
    }
}
