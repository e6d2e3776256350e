//! Shared request plumbing for the registry and mirror clients

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::RegistryError;
use crate::services::rate_limit::{RateLimitGate, RateLimitSignal, ResetClock, DEFAULT_COOLDOWN};

pub const USER_AGENT: &str = concat!(
    "modcat-indexer/",
    env!("CARGO_PKG_VERSION"),
    " (catalog indexer)"
);

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client every remote client shares settings with
pub fn build_client() -> Result<reqwest::Client, RegistryError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| RegistryError::Network(e.to_string()))
}

/// Send a request and decode its JSON body
///
/// The response's rate-limit headers are reported to `gate` and returned
/// alongside the body. 404 maps to [`RegistryError::NotFound`] carrying
/// `what`, 429 to [`RegistryError::RateLimited`].
pub async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    gate: &RateLimitGate,
    what: &str,
) -> Result<(T, RateLimitSignal), RegistryError> {
    get_json_with(request, gate, what, ResetClock::SecondsFromNow).await
}

/// [`get_json`] for hosts reporting the reset as a Unix timestamp
pub async fn get_json_with<T: DeserializeOwned>(
    request: RequestBuilder,
    gate: &RateLimitGate,
    what: &str,
    clock: ResetClock,
) -> Result<(T, RateLimitSignal), RegistryError> {
    let response = request.send().await.map_err(RegistryError::from_reqwest)?;

    let status = response.status();
    let signal = RateLimitSignal::from_headers_with(response.headers(), clock);
    gate.observe(&signal);

    if status == StatusCode::NOT_FOUND {
        return Err(RegistryError::NotFound(what.to_string()));
    }

    // GitHub reports an exhausted primary quota as 403
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && signal.is_exhausted())
    {
        return Err(RegistryError::RateLimited {
            retry_after: retry_after(response.headers(), &signal),
        });
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(RegistryError::Api(status.as_u16(), error_text));
    }

    let body = response
        .json::<T>()
        .await
        .map_err(|e| RegistryError::Parse(format!("{what}: {e}")))?;

    Ok((body, signal))
}

/// Cooldown requested by a 429 response
fn retry_after(headers: &HeaderMap, signal: &RateLimitSignal) -> Duration {
    signal
        .reset_after
        .or_else(|| {
            headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        })
        .unwrap_or(DEFAULT_COOLDOWN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_prefers_reset_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        let signal = RateLimitSignal::exhausted(Duration::from_secs(7));
        assert_eq!(retry_after(&headers, &signal), Duration::from_secs(7));
    }

    #[test]
    fn test_retry_after_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(
            retry_after(&headers, &RateLimitSignal::default()),
            Duration::from_secs(30)
        );
        assert_eq!(
            retry_after(&HeaderMap::new(), &RateLimitSignal::default()),
            DEFAULT_COOLDOWN
        );
    }
}
