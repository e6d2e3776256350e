//! Discovery of packages not yet in the catalog
//!
//! Each registry's search endpoint is paginated by a fixed pool of workers
//! pulling page offsets from one shared atomic cursor. All workers of a
//! registry share its [`RateLimitGate`], so an exhausted quota pauses the
//! whole registry rather than one worker.
//!
//! **Per registry:**
//! 1. First search learns the total count and page size
//! 2. `worker_count` workers take successive offsets until the cursor passes the total
//! 3. Hits already in the catalog (or already emitted) are dropped before emission
//!
//! Timeouts retry the same page; the crawl finishes when every registry's
//! cursor is exhausted.

use futures::future::join_all;
use modcat_common::ManifestJson;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RegistryError;
use crate::services::rate_limit::RateLimitGate;
use crate::services::registry::{PackageRef, Registry, SearchPage, SearchQuery, SortMode};

/// Page size requested on the first search
pub const REQUESTED_PAGE_SIZE: usize = 100;

/// Attempts per page for transient failures
pub const MAX_PAGE_ATTEMPTS: u32 = 5;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Registry package ids already present in the catalog
#[derive(Debug, Clone, Default)]
pub struct KnownPackages {
    ids: HashSet<PackageRef>,
}

impl KnownPackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ManifestJson>) -> Self {
        let mut known = Self::new();
        for record in records {
            known.insert_record(record);
        }
        known
    }

    pub fn insert_record(&mut self, record: &ManifestJson) {
        if let Some(id) = record.curse_forge_id {
            self.ids.insert(PackageRef::CurseForge(id));
        }
        if let Some(id) = &record.modrinth_id {
            self.ids.insert(PackageRef::Modrinth(id.clone()));
        }
    }

    pub fn insert(&mut self, id: PackageRef) {
        self.ids.insert(id);
    }

    pub fn contains(&self, id: &PackageRef) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A registry to crawl together with its shared cooldown
#[derive(Clone)]
pub struct CrawlTarget {
    pub registry: Arc<dyn Registry>,
    pub gate: Arc<RateLimitGate>,
}

/// Counters of one crawl
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub pages_fetched: AtomicUsize,
    pub pages_failed: AtomicUsize,
    pub emitted: AtomicUsize,
    pub skipped_known: AtomicUsize,
}

impl CrawlStats {
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    pub fn pages_failed(&self) -> usize {
        self.pages_failed.load(Ordering::Relaxed)
    }

    pub fn skipped_known(&self) -> usize {
        self.skipped_known.load(Ordering::Relaxed)
    }
}

pub struct CrawlScheduler {
    targets: Vec<CrawlTarget>,
    known: Arc<KnownPackages>,
    worker_count: usize,
    sort: SortMode,
    max_new: Option<usize>,
    cancel: CancellationToken,
}

/// State shared by the workers of one crawl
struct CrawlShared<'a> {
    known: &'a KnownPackages,
    seen: Mutex<HashSet<PackageRef>>,
    tx: mpsc::Sender<PackageRef>,
    stats: &'a CrawlStats,
    max_new: Option<usize>,
    cancel: &'a CancellationToken,
}

impl CrawlShared<'_> {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
            || self.tx.is_closed()
            || self.max_new.is_some_and(|max| self.stats.emitted() >= max)
    }

    /// Emit hits not yet known; false once downstream is gone or the cap is hit
    async fn emit(&self, page: SearchPage) -> bool {
        for hit in page.hits {
            if self.known.contains(&hit.id) {
                self.stats.skipped_known.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let fresh = self
                .seen
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(hit.id.clone());
            if !fresh {
                continue;
            }
            if let Some(max) = self.max_new {
                // Reserve a slot so concurrent workers cannot overshoot the cap
                let reserved = self.stats.emitted.fetch_add(1, Ordering::SeqCst);
                if reserved >= max {
                    self.stats.emitted.fetch_sub(1, Ordering::SeqCst);
                    return false;
                }
            } else {
                self.stats.emitted.fetch_add(1, Ordering::SeqCst);
            }
            tracing::debug!(package = %hit.id, name = %hit.display_name, "Discovered new package");
            if self.tx.send(hit.id).await.is_err() {
                return false;
            }
        }
        true
    }
}

impl CrawlScheduler {
    pub fn new(
        targets: Vec<CrawlTarget>,
        known: Arc<KnownPackages>,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            targets,
            known,
            worker_count: worker_count.max(1),
            sort: SortMode::Newest,
            max_new: None,
            cancel,
        }
    }

    /// Stop after emitting `max_new` packages in total
    pub fn with_max_new(mut self, max_new: Option<usize>) -> Self {
        self.max_new = max_new;
        self
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    /// Crawl every registry, sending new package ids to `tx`
    ///
    /// `tx` is dropped on return, closing the queue for the consumer.
    pub async fn run(&self, tx: mpsc::Sender<PackageRef>) -> CrawlStats {
        let stats = CrawlStats::default();
        let shared = CrawlShared {
            known: &self.known,
            seen: Mutex::new(HashSet::new()),
            tx,
            stats: &stats,
            max_new: self.max_new,
            cancel: &self.cancel,
        };

        join_all(
            self.targets
                .iter()
                .map(|target| self.crawl_registry(target, &shared)),
        )
        .await;

        drop(shared);
        tracing::info!(
            emitted = stats.emitted(),
            skipped_known = stats.skipped_known(),
            pages = stats.pages_fetched(),
            failed_pages = stats.pages_failed(),
            "Crawl finished"
        );
        stats
    }

    async fn crawl_registry(&self, target: &CrawlTarget, shared: &CrawlShared<'_>) {
        let source = target.registry.source();

        let Some(first) = self.fetch_page(target, shared, 0, REQUESTED_PAGE_SIZE).await else {
            tracing::error!(registry = %source, "Initial search failed, skipping registry");
            return;
        };

        let total = first.total_count;
        let page_size = first.page_limit.clamp(1, REQUESTED_PAGE_SIZE);
        tracing::info!(registry = %source, total, page_size, "Starting registry crawl");

        if !shared.emit(first).await {
            return;
        }

        let cursor = AtomicUsize::new(page_size);
        let workers = (0..self.worker_count).map(|worker| {
            let cursor = &cursor;
            async move {
                loop {
                    if shared.should_stop() {
                        break;
                    }
                    let offset = cursor.fetch_add(page_size, Ordering::SeqCst);
                    if offset >= total {
                        break;
                    }
                    let Some(page) = self.fetch_page(target, shared, offset, page_size).await else {
                        continue;
                    };
                    if !shared.emit(page).await {
                        break;
                    }
                }
                tracing::debug!(registry = %source, worker, "Crawl worker finished");
            }
        });
        join_all(workers).await;
    }

    /// Fetch one page, honouring the shared cooldown and retrying timeouts
    async fn fetch_page(
        &self,
        target: &CrawlTarget,
        shared: &CrawlShared<'_>,
        offset: usize,
        limit: usize,
    ) -> Option<SearchPage> {
        let query = SearchQuery {
            text: None,
            sort: self.sort,
            offset,
            limit,
        };
        let mut attempts = 0;

        loop {
            target.gate.wait_ready().await;
            if shared.cancel.is_cancelled() {
                return None;
            }

            match target.registry.search(&query).await {
                Ok(page) => {
                    target.gate.observe(&page.rate_limit);
                    shared.stats.pages_fetched.fetch_add(1, Ordering::Relaxed);
                    return Some(page);
                }
                Err(RegistryError::RateLimited { retry_after }) => {
                    target.gate.pause_for(retry_after);
                }
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    if attempts >= MAX_PAGE_ATTEMPTS {
                        tracing::error!(
                            registry = %target.registry.source(),
                            offset,
                            attempts,
                            error = %e,
                            "Giving up on search page"
                        );
                        shared.stats.pages_failed.fetch_add(1, Ordering::Relaxed);
                        return None;
                    }
                    tracing::warn!(
                        registry = %target.registry.source(),
                        offset,
                        attempt = attempts,
                        error = %e,
                        "Search page failed, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempts).await;
                }
                Err(e) => {
                    tracing::error!(
                        registry = %target.registry.source(),
                        offset,
                        error = %e,
                        "Search page failed"
                    );
                    shared.stats.pages_failed.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
    }
}
