//! Publishing reconciled outcomes
//!
//! [`PublishBatch`] accumulates approved outcomes into one set of file
//! changes plus the updated `index.json`; its index doubles as the working
//! catalog view while a run reconciles, so each decision sees the effect of
//! the ones before it. [`Publisher`] commits the batch once.

use modcat_common::identifier::GenericIdentifier;
use modcat_common::{IndexJson, ManifestJson};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::RunError;
use crate::services::github_client::INDEX_PATH;
use crate::services::reconciliation::{ReviewOutcome, ReviewState};
use crate::services::source_control::{FileAddition, FileChanges, SourceControlBackend};

pub const DEFAULT_PUBLISH_BRANCH: &str = "index-update";

/// Counts of applied outcomes per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub updated: usize,
    pub renamed: usize,
    pub removed: usize,
}

impl BatchCounts {
    pub fn total(&self) -> usize {
        self.updated + self.renamed + self.removed
    }
}

#[derive(Debug, Clone)]
pub struct PublishBatch {
    index: IndexJson,
    additions: BTreeMap<String, Vec<u8>>,
    deletions: BTreeSet<String>,
    counts: BatchCounts,
}

fn record_path(record: &ManifestJson) -> modcat_common::Result<String> {
    record
        .generic_identifier
        .parse::<GenericIdentifier>()
        .map(|gid| gid.record_path())
}

fn encode_json<T: serde::Serialize>(value: &T) -> modcat_common::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

impl PublishBatch {
    /// Start from the catalog index of the run's snapshot
    pub fn new(index: IndexJson) -> Self {
        Self {
            index,
            additions: BTreeMap::new(),
            deletions: BTreeSet::new(),
            counts: BatchCounts::default(),
        }
    }

    /// Working catalog view including every outcome applied so far
    pub fn index(&self) -> &IndexJson {
        &self.index
    }

    pub fn counts(&self) -> BatchCounts {
        self.counts
    }

    pub fn is_empty(&self) -> bool {
        self.counts.total() == 0
    }

    /// Apply one outcome; returns whether it changed the batch
    ///
    /// Only approved updates, renames and removals contribute. An approved
    /// outcome missing the record it needs is logged and dropped.
    pub fn apply(&mut self, outcome: &ReviewOutcome) -> modcat_common::Result<bool> {
        match outcome.state {
            ReviewState::ApprovedUpdate => {
                let Some(latest) = outcome.latest.as_ref() else {
                    tracing::error!(state = %outcome.state, "Approved outcome without a record, dropping");
                    return Ok(false);
                };
                if let Some(original) = outcome.original.as_ref() {
                    self.index.remove_record(original)?;
                    if original.generic_identifier != latest.generic_identifier {
                        self.delete(record_path(original)?);
                    }
                }
                self.write(latest)?;
                self.counts.updated += 1;
            }
            ReviewState::ApprovedIdentifierRename => {
                let (Some(latest), Some(original)) = (outcome.latest.as_ref(), outcome.original.as_ref())
                else {
                    tracing::error!(state = %outcome.state, "Rename without both records, dropping");
                    return Ok(false);
                };
                self.index.remove_record(original)?;
                self.delete(record_path(original)?);
                self.write(latest)?;
                self.counts.renamed += 1;
            }
            ReviewState::MarkedForRemoval => {
                let Some(original) = outcome.original.as_ref() else {
                    tracing::error!(state = %outcome.state, "Removal without a published record, dropping");
                    return Ok(false);
                };
                self.index.remove_record(original)?;
                self.delete(record_path(original)?);
                self.counts.removed += 1;
            }
            ReviewState::NoChange
            | ReviewState::SourceFailure
            | ReviewState::CreationConflict
            | ReviewState::UpdateConflict => return Ok(false),
        }
        Ok(true)
    }

    fn write(&mut self, record: &ManifestJson) -> modcat_common::Result<()> {
        let path = record_path(record)?;
        self.index.add_record(record)?;
        self.deletions.remove(&path);
        self.additions.insert(path, encode_json(record)?);
        Ok(())
    }

    fn delete(&mut self, path: String) {
        self.additions.remove(&path);
        self.deletions.insert(path);
    }

    /// File changes of the batch, including the rewritten index
    ///
    /// Empty when no outcome contributed.
    pub fn into_changes(self) -> modcat_common::Result<FileChanges> {
        if self.is_empty() {
            return Ok(FileChanges::default());
        }

        let mut additions: Vec<FileAddition> = self
            .additions
            .into_iter()
            .map(|(path, contents)| FileAddition { path, contents })
            .collect();
        additions.push(FileAddition {
            path: INDEX_PATH.to_string(),
            contents: encode_json(&self.index)?,
        });

        Ok(FileChanges {
            additions,
            deletions: self.deletions.into_iter().collect(),
        })
    }
}

/// Where and how a batch lands
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub branch: String,
    pub merge_without_pr: bool,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            branch: DEFAULT_PUBLISH_BRANCH.to_string(),
            merge_without_pr: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    NothingToPublish,
    PullRequest { number: u64, commit: String },
    Merged { commit: String },
}

pub struct Publisher {
    backend: Arc<dyn SourceControlBackend>,
    settings: PublishSettings,
}

impl Publisher {
    pub fn new(backend: Arc<dyn SourceControlBackend>, settings: PublishSettings) -> Self {
        Self { backend, settings }
    }

    /// Commit the batch on the publish branch, then open a PR or merge
    pub async fn publish(&self, batch: PublishBatch, run_label: &str) -> Result<PublishResult, RunError> {
        let counts = batch.counts();
        let changes = batch.into_changes()?;
        if changes.is_empty() {
            tracing::info!("No catalog changes to publish");
            return Ok(PublishResult::NothingToPublish);
        }

        // The batch was computed against the default branch, so the publish
        // branch must start from the same commit
        let branch = self.settings.branch.as_str();
        let default = self.backend.default_branch_ref().await?;
        if self.backend.does_ref_exist(branch).await? {
            self.backend.reset_ref(&default, branch).await?;
        } else {
            self.backend.create_ref(&default, branch).await?;
        }

        let message = format!(
            "Update catalog: {} updated, {} renamed, {} removed",
            counts.updated, counts.renamed, counts.removed
        );
        let commit = self
            .backend
            .commit_and_update_ref(branch, &message, &changes)
            .await?;

        if self.settings.merge_without_pr {
            self.backend
                .merge_branch_without_pr(&default.name, branch, &message)
                .await?;
            return Ok(PublishResult::Merged { commit });
        }

        if let Some(number) = self
            .backend
            .find_open_pull_request(branch, &default.name)
            .await?
        {
            tracing::info!(number, branch = %branch, "Updated open pull request");
            return Ok(PublishResult::PullRequest { number, commit });
        }

        let body = format!("{message}\n\nRun: {run_label}");
        let number = self
            .backend
            .create_pull_request(branch, &default.name, &message, Some(&body))
            .await?;
        Ok(PublishResult::PullRequest { number, commit })
    }
}
