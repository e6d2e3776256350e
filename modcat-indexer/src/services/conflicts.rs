//! Conflict hand-off
//!
//! Conflicting outcomes are never published by a run. They go to a
//! [`ConflictNotifier`]; once a human approves one it comes back as an
//! `ApprovedUpdate` through `IndexRun::publish_resolved`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::services::reconciliation::ReviewOutcome;

#[async_trait]
pub trait ConflictNotifier: Send + Sync {
    /// Hand over one conflict; non-conflict outcomes are ignored
    async fn submit(&self, outcome: ReviewOutcome);
}

/// Reports conflicts in the log for an operator
#[derive(Debug, Default)]
pub struct LoggingConflictNotifier;

#[async_trait]
impl ConflictNotifier for LoggingConflictNotifier {
    async fn submit(&self, outcome: ReviewOutcome) {
        if !outcome.state.is_conflict() {
            return;
        }
        tracing::warn!(
            state = %outcome.state,
            latest = outcome.latest.as_ref().map(|r| r.generic_identifier.as_str()).unwrap_or("-"),
            original = outcome.original.as_ref().map(|r| r.generic_identifier.as_str()).unwrap_or("-"),
            "Record needs manual review"
        );
    }
}

/// Forwards conflicts to an in-process resolver
pub struct ChannelConflictNotifier {
    tx: mpsc::UnboundedSender<ReviewOutcome>,
}

impl ChannelConflictNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReviewOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConflictNotifier for ChannelConflictNotifier {
    async fn submit(&self, outcome: ReviewOutcome) {
        if !outcome.state.is_conflict() {
            return;
        }
        if self.tx.send(outcome).is_err() {
            tracing::warn!("Conflict resolver is gone, conflict dropped");
        }
    }
}
