//! Scriptable registry, artifact fetcher and release mirror

use async_trait::async_trait;
use modcat_common::{Loader, ThirdPartySource};
use modcat_indexer::services::rate_limit::RateLimitSignal;
use modcat_indexer::services::registry::{
    ArtifactFetcher, PackageMetadata, PackageRef, Registry, ReleaseAsset, ReleaseMirror,
    RemoteArtifact, RepositorySlug, SearchHit, SearchPage, SearchQuery,
};
use modcat_indexer::RegistryError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Failure injected into one search call
#[derive(Debug, Clone, Copy)]
pub enum SearchFault {
    Timeout,
    /// `429` with a retry-after
    RateLimited(Duration),
    /// Successful page reporting `remaining: 0`
    Exhausted(Duration),
    BadRequest,
}

pub struct FakeRegistry {
    source: ThirdPartySource,
    page_limit: usize,
    metadata: Mutex<HashMap<PackageRef, PackageMetadata>>,
    artifacts: Mutex<HashMap<(PackageRef, Loader), Vec<RemoteArtifact>>>,
    failing: Mutex<HashSet<PackageRef>>,
    search_hits: Mutex<Vec<PackageRef>>,
    search_faults: Mutex<HashMap<usize, VecDeque<SearchFault>>>,
    search_calls: Mutex<Vec<(usize, Instant)>>,
    metadata_calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(source: ThirdPartySource) -> Self {
        Self {
            source,
            page_limit: 100,
            metadata: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            search_hits: Mutex::new(Vec::new()),
            search_faults: Mutex::new(HashMap::new()),
            search_calls: Mutex::new(Vec::new()),
            metadata_calls: AtomicUsize::new(0),
        }
    }

    pub fn curseforge() -> Self {
        Self::new(ThirdPartySource::CurseForge)
    }

    pub fn modrinth() -> Self {
        Self::new(ThirdPartySource::Modrinth)
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn add_package(&self, id: PackageRef, metadata: PackageMetadata) {
        self.metadata.lock().unwrap().insert(id, metadata);
    }

    pub fn add_artifact(&self, id: PackageRef, loader: Loader, artifact: RemoteArtifact) {
        self.artifacts
            .lock()
            .unwrap()
            .entry((id, loader))
            .or_default()
            .push(artifact);
    }

    /// Every call about `id` fails with a network error
    pub fn fail_package(&self, id: PackageRef) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn set_search_hits(&self, hits: Vec<PackageRef>) {
        *self.search_hits.lock().unwrap() = hits;
    }

    /// Queue a fault for the next search at `offset`
    pub fn push_search_fault(&self, offset: usize, fault: SearchFault) {
        self.search_faults
            .lock()
            .unwrap()
            .entry(offset)
            .or_default()
            .push_back(fault);
    }

    /// Offsets searched, in call order
    pub fn searched_offsets(&self) -> Vec<usize> {
        self.search_calls.lock().unwrap().iter().map(|(o, _)| *o).collect()
    }

    /// Instants of every search at `offset`
    pub fn search_times(&self, offset: usize) -> Vec<Instant> {
        self.search_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self, id: &PackageRef) -> Result<(), RegistryError> {
        if self.failing.lock().unwrap().contains(id) {
            return Err(RegistryError::Network(format!("simulated outage for {id}")));
        }
        Ok(())
    }

    fn page_at(&self, query: &SearchQuery, rate_limit: RateLimitSignal) -> SearchPage {
        let hits = self.search_hits.lock().unwrap();
        let limit = query.limit.min(self.page_limit);
        let start = query.offset.min(hits.len());
        let end = (query.offset + limit).min(hits.len());
        SearchPage {
            hits: hits[start..end]
                .iter()
                .map(|id| SearchHit {
                    id: id.clone(),
                    display_name: id.to_string(),
                })
                .collect(),
            total_count: hits.len(),
            page_limit: self.page_limit,
            rate_limit,
        }
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    fn source(&self) -> ThirdPartySource {
        self.source
    }

    async fn package_metadata(
        &self,
        id: &PackageRef,
    ) -> Result<Option<PackageMetadata>, RegistryError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available(id)?;
        Ok(self.metadata.lock().unwrap().get(id).cloned())
    }

    async fn list_artifacts(
        &self,
        id: &PackageRef,
        loader: Loader,
    ) -> Result<Vec<RemoteArtifact>, RegistryError> {
        self.check_available(id)?;
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .get(&(id.clone(), loader))
            .cloned()
            .unwrap_or_default())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, RegistryError> {
        self.search_calls
            .lock()
            .unwrap()
            .push((query.offset, Instant::now()));

        let fault = self
            .search_faults
            .lock()
            .unwrap()
            .get_mut(&query.offset)
            .and_then(VecDeque::pop_front);

        match fault {
            None => Ok(self.page_at(query, RateLimitSignal::default())),
            Some(SearchFault::Exhausted(reset)) => {
                Ok(self.page_at(query, RateLimitSignal::exhausted(reset)))
            }
            Some(SearchFault::Timeout) => Err(RegistryError::Timeout("simulated timeout".into())),
            Some(SearchFault::RateLimited(retry_after)) => {
                Err(RegistryError::RateLimited { retry_after })
            }
            Some(SearchFault::BadRequest) => {
                Err(RegistryError::Api(400, "simulated bad request".into()))
            }
        }
    }
}

/// Serves fixed bytes per URL; unknown URLs are 404
#[derive(Default)]
pub struct FakeFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(url.into(), bytes);
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(url.to_string()))
    }
}

#[derive(Default)]
pub struct FakeMirror {
    assets: Mutex<HashMap<RepositorySlug, Vec<ReleaseAsset>>>,
    licenses: Mutex<HashMap<RepositorySlug, String>>,
}

impl FakeMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&self, repo: RepositorySlug, name: &str, download_url: &str) {
        self.assets
            .lock()
            .unwrap()
            .entry(repo)
            .or_default()
            .push(ReleaseAsset {
                name: name.to_string(),
                download_url: download_url.to_string(),
            });
    }

    pub fn set_license(&self, repo: RepositorySlug, license: &str) {
        self.licenses.lock().unwrap().insert(repo, license.to_string());
    }
}

#[async_trait]
impl ReleaseMirror for FakeMirror {
    async fn release_assets(
        &self,
        repo: &RepositorySlug,
    ) -> Result<Vec<ReleaseAsset>, RegistryError> {
        self.assets
            .lock()
            .unwrap()
            .get(repo)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(repo.to_string()))
    }

    async fn license(&self, repo: &RepositorySlug) -> Result<Option<String>, RegistryError> {
        Ok(self.licenses.lock().unwrap().get(repo).cloned())
    }
}
