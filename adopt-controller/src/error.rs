//! Controller error types.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while reconciling an adopted resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource store failure (including optimistic-concurrency conflicts).
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Remote registry failure.
    #[error("{context}: {source}")]
    Registry {
        context: &'static str,
        #[source]
        source: adopt_registry::RegistryError,
    },

    /// Node probe, info gathering or health check failure.
    #[error("node: {0}")]
    Node(String),

    /// Link setup or teardown failure.
    #[error("link: {0}")]
    Link(String),

    /// The registry answered, but not in a way sync can use.
    #[error("sync: {0}")]
    Sync(String),

    /// Invalid or missing configuration on the resource.
    #[error("configuration: {0}")]
    Config(String),

    /// The caller cancelled the reconciliation.
    #[error("cancelled")]
    Cancelled,

    /// A network step exceeded its deadline.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
}

impl Error {
    pub(crate) fn registry(context: &'static str, source: adopt_registry::RegistryError) -> Self {
        Self::Registry { context, source }
    }

    /// Whether retrying cannot help until the resource's spec changes.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Registry { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Whether the store rejected a write because the resource changed underneath.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, Error>;
