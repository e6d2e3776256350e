//! Error types for modcat-indexer
//!
//! Remote failures are classified so callers can decide the smallest safe
//! unit to retry or skip:
//! - transient (timeouts, 5xx): retried or skipped per artifact/page
//! - not found: the feature is absent, not an error
//! - rate limited: triggers the shared registry cooldown
//!
//! Run-level failures ([`RunError`]) abort the run before anything is published.

use std::time::Duration;
use thiserror::Error;

/// Errors from registry, mirror and download calls
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// URL outside the domains expected for this source
    #[error("Untrusted URL: {0}")]
    UntrustedUrl(String),
}

impl RegistryError {
    /// Worth retrying at the same granularity
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Timeout(_) | RegistryError::Network(_) => true,
            RegistryError::Api(status, _) => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }

    /// Map a reqwest failure, keeping timeouts distinguishable
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RegistryError::Timeout(err.to_string())
        } else if err.is_decode() {
            RegistryError::Parse(err.to_string())
        } else {
            RegistryError::Network(err.to_string())
        }
    }
}

/// Errors from the source-control publish backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// The GraphQL endpoint answered with an `errors` payload
    #[error("GraphQL error: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("Ref not found: {0}")]
    MissingRef(String),

    #[error("Missing commit oid for ref {0}")]
    MissingOid(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Credential error: {0}")]
    Credential(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err.to_string())
    }
}

/// Fatal errors of a whole index run
#[derive(Debug, Error)]
pub enum RunError {
    /// The backend has no catalog index to reconcile against
    #[error("Catalog index missing from the index repository")]
    MissingCatalog,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Common error: {0}")]
    Common(#[from] modcat_common::Error),

    #[error("Run cancelled before publishing")]
    Cancelled,
}
