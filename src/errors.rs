//! Error hierarchy for the enrichment cache.
//!
//! Recoverable lookup failures are absorbed by the cache (negative caching,
//! see the `enricher` module); only cancellation crosses the public
//! dispatch boundary.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cloud provider lookup failures
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The item was not accepted before the shutdown signal fired
    #[error("operation cancelled")]
    Cancelled,

    /// Unrecoverable failures requiring the embedding to restart the core
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// True when a dispatch call was rejected because of cancellation
    /// rather than a downstream failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Failures reported by a cloud provider lookup.
///
/// These are transient from the cache's point of view: a failed lookup is
/// stored as a negative entry and retried after the negative TTL elapses.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Request-level failure (transport, authorization, malformed reply)
    #[error("Provider request failed: {0}")]
    Request(String),

    /// Provider did not answer within the configured deadline
    #[error("Provider request timed out after {0:?}")]
    Timeout(Duration),
}
