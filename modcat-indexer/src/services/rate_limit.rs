//! Shared rate-limit cooldown per registry
//!
//! Every worker talking to one registry holds the same [`RateLimitGate`].
//! When a response reports `x-ratelimit-remaining: 0`, the gate records a
//! resume instant `x-ratelimit-reset` seconds ahead and every caller of
//! [`RateLimitGate::wait_ready`] sleeps until it passes.

use reqwest::header::HeaderMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Cooldown used when a registry signals exhaustion without a reset time
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// How a registry expresses `x-ratelimit-reset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetClock {
    /// Seconds until the window resets (CurseForge, Modrinth)
    #[default]
    SecondsFromNow,
    /// Unix timestamp of the reset (GitHub)
    UnixEpoch,
}

/// Rate-limit state reported by one response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub remaining: Option<u64>,
    pub reset_after: Option<Duration>,
}

impl RateLimitSignal {
    pub fn exhausted(reset_after: Duration) -> Self {
        Self {
            remaining: Some(0),
            reset_after: Some(reset_after),
        }
    }

    /// Parse headers whose reset value is seconds from now
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_headers_with(headers, ResetClock::SecondsFromNow)
    }

    pub fn from_headers_with(headers: &HeaderMap, clock: ResetClock) -> Self {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        let reset_after = number(RESET_HEADER).map(|reset| match clock {
            ResetClock::SecondsFromNow => Duration::from_secs(reset),
            ResetClock::UnixEpoch => {
                let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
                Duration::from_secs(reset.saturating_sub(now))
            }
        });
        Self {
            remaining: number(REMAINING_HEADER),
            reset_after,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// One shared cooldown clock for all workers of a registry
#[derive(Debug)]
pub struct RateLimitGate {
    registry: &'static str,
    resume_after: Mutex<Option<Instant>>,
}

impl RateLimitGate {
    pub fn new(registry: &'static str) -> Self {
        Self {
            registry,
            resume_after: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &'static str {
        self.registry
    }

    /// Record a response's rate-limit headers
    pub fn observe(&self, signal: &RateLimitSignal) {
        if signal.is_exhausted() {
            self.pause_for(signal.reset_after.unwrap_or(DEFAULT_COOLDOWN));
        }
    }

    /// Hold every caller for at least `duration` from now
    ///
    /// A later resume instant already in place is kept.
    pub fn pause_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut guard = self.resume_after.lock().unwrap_or_else(|e| e.into_inner());
        if guard.map_or(true, |current| current < until) {
            *guard = Some(until);
            tracing::warn!(
                registry = self.registry,
                cooldown_secs = duration.as_secs_f64(),
                "Rate limit exhausted, pausing all workers"
            );
        }
    }

    /// Instant before which no request may be sent
    pub fn resume_at(&self) -> Option<Instant> {
        *self.resume_after.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until the cooldown (if any) has elapsed
    ///
    /// Re-checks after sleeping so an extension made meanwhile is honoured.
    pub async fn wait_ready(&self) {
        loop {
            match self.resume_at() {
                Some(until) if until > Instant::now() => {
                    tracing::debug!(registry = self.registry, "Waiting for rate-limit cooldown");
                    tokio::time::sleep_until(until).await;
                }
                _ => return,
            }
        }
    }
}
