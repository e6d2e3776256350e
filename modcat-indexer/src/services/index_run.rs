//! One end-to-end index run
//!
//! # Phases
//! 1. SNAPSHOT: download the catalog index and every record
//! 2. REBUILD: rebuild each published package (bounded concurrency)
//! 3. DISCOVER: crawl the registries for unknown packages and build them as
//!    they arrive
//! 4. RECONCILE: classify every (latest, original) pair, one at a time,
//!    against the working catalog view
//! 5. PUBLISH: hand conflicts to the notifier, commit approved changes once
//!
//! Nothing is published when the run is cancelled or fails before phase 5.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use modcat_common::{Loader, ManifestJson};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::RunError;
use crate::services::conflicts::ConflictNotifier;
use crate::services::crawl_scheduler::{CrawlScheduler, CrawlTarget};
use crate::services::index_store::{CatalogSnapshot, IndexStore};
use crate::services::manifest_builder::{BuildOutput, ManifestBuilder, PackageIds};
use crate::services::publish::{PublishBatch, PublishResult, Publisher};
use crate::services::reconciliation::{reconcile, ReviewOutcome, ReviewState};

/// Queue depth between the crawler and the builders
const DISCOVERY_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub worker_count: usize,
    /// Build and reconcile, but never commit
    pub dry_run: bool,
    pub skip_crawl: bool,
    /// Cap on newly discovered packages
    pub max_new: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            worker_count: modcat_common::config::DEFAULT_WORKER_COUNT,
            dry_run: false,
            skip_crawl: false,
            max_new: None,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub rebuilt_packages: usize,
    pub discovered_packages: usize,
    pub outcomes: BTreeMap<ReviewState, usize>,
    /// `None` for dry runs
    pub published: Option<PublishResult>,
}

impl RunReport {
    pub fn count(&self, state: ReviewState) -> usize {
        self.outcomes.get(&state).copied().unwrap_or(0)
    }
}

pub struct IndexRun {
    run_id: Uuid,
    store: Arc<dyn IndexStore>,
    builder: Arc<ManifestBuilder>,
    crawl_targets: Vec<CrawlTarget>,
    publisher: Publisher,
    notifier: Arc<dyn ConflictNotifier>,
    options: RunOptions,
    cancel: CancellationToken,
}

impl IndexRun {
    pub fn new(
        store: Arc<dyn IndexStore>,
        builder: Arc<ManifestBuilder>,
        crawl_targets: Vec<CrawlTarget>,
        publisher: Publisher,
        notifier: Arc<dyn ConflictNotifier>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            store,
            builder,
            crawl_targets,
            publisher,
            notifier,
            options,
            cancel,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Execute all phases
    pub async fn execute(&self) -> Result<RunReport, RunError> {
        let start_time = Utc::now();
        let workers = self.options.worker_count.max(1);
        tracing::info!(
            run_id = %self.run_id,
            workers,
            dry_run = self.options.dry_run,
            "Starting index run"
        );

        // Phase 1: snapshot
        let snapshot = CatalogSnapshot::load(self.store.as_ref(), workers).await?;
        tracing::info!(run_id = %self.run_id, records = snapshot.records.len(), "Catalog snapshot loaded");

        // Phase 2: rebuild known packages
        let known_ids = snapshot.package_ids();
        let mut rebuilt = self.build_all(known_ids).await;
        self.ensure_not_cancelled()?;

        // Phase 3: discovery
        let mut discovered = if self.options.skip_crawl || self.crawl_targets.is_empty() {
            Vec::new()
        } else {
            self.discover(&snapshot).await
        };
        self.ensure_not_cancelled()?;

        let rebuilt_packages = rebuilt.len();
        let discovered_packages = discovered.len();

        // Completion order of concurrent builds is arbitrary; reconcile in a stable order
        rebuilt.sort_by_key(|(ids, _)| ids.to_string());
        discovered.sort_by_key(|(ids, _)| ids.to_string());

        // Phase 4: reconcile
        let mut batch = PublishBatch::new(snapshot.index.clone());
        let mut outcomes: BTreeMap<ReviewState, usize> = BTreeMap::new();
        let mut conflicts = Vec::new();

        // Each published record is reconciled against at most one rebuild
        let mut consumed: HashSet<String> = HashSet::new();

        for (ids, output) in rebuilt.into_iter().chain(discovered) {
            let originals: Vec<ManifestJson> = snapshot
                .records_for(&ids)
                .into_iter()
                .filter(|record| consumed.insert(record.generic_identifier.clone()))
                .cloned()
                .collect();

            for (latest, original) in pair_by_loader(output.records, originals) {
                let Some(outcome) = reconcile(latest, original, &output.usage, batch.index()) else {
                    continue;
                };
                *outcomes.entry(outcome.state).or_default() += 1;

                tracing::debug!(
                    package = %ids,
                    record = outcome.generic_identifier().unwrap_or("-"),
                    state = %outcome.state,
                    "Reconciled record"
                );

                if outcome.state.is_conflict() {
                    conflicts.push(outcome);
                } else {
                    batch.apply(&outcome)?;
                }
            }
        }

        // Phase 5: publish
        for conflict in conflicts {
            self.notifier.submit(conflict).await;
        }
        self.ensure_not_cancelled()?;

        let published = if self.options.dry_run {
            let counts = batch.counts();
            tracing::info!(
                run_id = %self.run_id,
                updated = counts.updated,
                renamed = counts.renamed,
                removed = counts.removed,
                "Dry run, not publishing"
            );
            None
        } else {
            Some(self.publisher.publish(batch, &self.run_id.to_string()).await?)
        };

        let elapsed = Utc::now() - start_time;
        tracing::info!(
            run_id = %self.run_id,
            rebuilt_packages,
            discovered_packages,
            duration_secs = elapsed.num_seconds(),
            "Index run completed"
        );

        Ok(RunReport {
            run_id: self.run_id,
            rebuilt_packages,
            discovered_packages,
            outcomes,
            published,
        })
    }

    /// Publish conflicts a human has since approved
    ///
    /// Only `ApprovedUpdate` outcomes are applied, against a fresh snapshot.
    pub async fn publish_resolved(&self, resolved: Vec<ReviewOutcome>) -> Result<PublishResult, RunError> {
        let snapshot = CatalogSnapshot::load(self.store.as_ref(), self.options.worker_count).await?;
        let mut batch = PublishBatch::new(snapshot.index);

        for outcome in &resolved {
            if outcome.state != ReviewState::ApprovedUpdate {
                tracing::warn!(state = %outcome.state, "Skipping unresolved outcome");
                continue;
            }
            batch.apply(outcome)?;
        }

        self.ensure_not_cancelled()?;
        self.publisher.publish(batch, &self.run_id.to_string()).await
    }

    fn ensure_not_cancelled(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            tracing::warn!(run_id = %self.run_id, "Index run cancelled, nothing published");
            return Err(RunError::Cancelled);
        }
        Ok(())
    }

    /// Build packages with at most `worker_count` in flight
    ///
    /// Packages not yet started when the run is cancelled are skipped.
    async fn build_all(&self, ids: Vec<PackageIds>) -> Vec<(PackageIds, BuildOutput)> {
        stream::iter(ids)
            .map(|ids| self.build_one(ids))
            .buffer_unordered(self.options.worker_count.max(1))
            .filter_map(|built| async move { built })
            .collect()
            .await
    }

    async fn build_one(&self, ids: PackageIds) -> Option<(PackageIds, BuildOutput)> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let output = self.builder.build(&ids).await;
        Some((ids, output))
    }

    /// Crawl and build discovered packages concurrently
    async fn discover(&self, snapshot: &CatalogSnapshot) -> Vec<(PackageIds, BuildOutput)> {
        let scheduler = CrawlScheduler::new(
            self.crawl_targets.clone(),
            Arc::new(snapshot.known_packages()),
            self.options.worker_count,
            self.cancel.clone(),
        )
        .with_max_new(self.options.max_new);

        let (tx, rx) = mpsc::channel(DISCOVERY_QUEUE_CAPACITY);

        let discovered = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|id| (id, rx))
        })
        .map(|id| self.build_one(PackageIds::from_package_ref(&id)))
        .buffer_unordered(self.options.worker_count.max(1))
        .filter_map(|built| async move { built })
        .collect::<Vec<_>>();

        let (stats, built) = tokio::join!(scheduler.run(tx), discovered);
        tracing::info!(
            run_id = %self.run_id,
            discovered = stats.emitted(),
            built = built.len(),
            "Discovery finished"
        );
        built
    }
}

/// Pair new and published records of one package by loader
fn pair_by_loader(
    latest: Vec<ManifestJson>,
    originals: Vec<ManifestJson>,
) -> Vec<(Option<ManifestJson>, Option<ManifestJson>)> {
    let loader_of = |record: &ManifestJson| -> Loader {
        record
            .parsed_identifier()
            .map(|gid| gid.loader)
            .unwrap_or(Loader::Any)
    };

    let mut pairs: BTreeMap<Loader, (Option<ManifestJson>, Option<ManifestJson>)> = BTreeMap::new();
    for record in latest {
        let loader = loader_of(&record);
        pairs.entry(loader).or_default().0 = Some(record);
    }
    for record in originals {
        let loader = loader_of(&record);
        pairs.entry(loader).or_default().1 = Some(record);
    }
    pairs.into_values().collect()
}
