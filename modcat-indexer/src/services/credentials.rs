//! Source-control credentials
//!
//! A [`CredentialProvider`] owns the current credential and asks its
//! [`CredentialIssuer`] for a new one when none is held or the held one
//! expires within the skew window. Callers never cache tokens themselves.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::BackendError;

/// Re-issue this many seconds before the recorded expiry
pub const DEFAULT_EXPIRY_SKEW_SECS: i64 = 300;

#[derive(Clone)]
pub struct Credential {
    pub token: String,
    /// `None` for tokens that never expire
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn non_expiring(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at.map_or(true, |expires| now + skew < expires)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self) -> Result<Credential, BackendError>;
}

/// Issues one fixed personal access token
pub struct StaticTokenIssuer {
    token: String,
}

impl StaticTokenIssuer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialIssuer for StaticTokenIssuer {
    async fn issue(&self) -> Result<Credential, BackendError> {
        if self.token.trim().is_empty() {
            return Err(BackendError::Credential("empty access token".to_string()));
        }
        Ok(Credential::non_expiring(self.token.clone()))
    }
}

pub struct CredentialProvider {
    issuer: Arc<dyn CredentialIssuer>,
    current: Mutex<Option<Credential>>,
    skew: Duration,
}

impl CredentialProvider {
    pub fn new(issuer: Arc<dyn CredentialIssuer>) -> Self {
        Self {
            issuer,
            current: Mutex::new(None),
            skew: Duration::seconds(DEFAULT_EXPIRY_SKEW_SECS),
        }
    }

    pub fn static_token(token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticTokenIssuer::new(token)))
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// A token valid for at least the skew window
    pub async fn token(&self) -> Result<String, BackendError> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref() {
            if credential.is_usable_at(Utc::now(), self.skew) {
                return Ok(credential.token.clone());
            }
            tracing::debug!("Credential near expiry, re-issuing");
        }

        let credential = self.issuer.issue().await?;
        let token = credential.token.clone();
        *current = Some(credential);
        Ok(token)
    }

    /// Drop the held credential, e.g. after a 401
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}
