//! Registry and mirror boundaries
//!
//! Registries (CurseForge, Modrinth) expose package metadata, per-loader
//! artifact listings and paginated search. The GitHub release mirror only
//! lists release assets and the repository license. Both are traits so the
//! merge engine and scheduler can run against in-memory fakes.

use async_trait::async_trait;
use modcat_common::{Loader, OtherLink, ThirdPartySource};
use reqwest::Url;
use std::fmt;

use crate::error::RegistryError;
use crate::services::rate_limit::RateLimitSignal;

/// Identifier of a package on one registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackageRef {
    CurseForge(u32),
    Modrinth(String),
}

impl PackageRef {
    pub fn source(&self) -> ThirdPartySource {
        match self {
            PackageRef::CurseForge(_) => ThirdPartySource::CurseForge,
            PackageRef::Modrinth(_) => ThirdPartySource::Modrinth,
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageRef::CurseForge(id) => write!(f, "curseforge:{id}"),
            PackageRef::Modrinth(id) => write!(f, "modrinth:{id}"),
        }
    }
}

/// Package-level metadata as reported by one registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub display_name: String,
    pub author: Option<String>,
    pub license: Option<String>,
    pub issues_url: Option<String>,
    pub source_url: Option<String>,
    pub other_links: Vec<OtherLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyRelation {
    Required,
    Incompatible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    pub package: PackageRef,
    pub relation: DependencyRelation,
}

/// One file listed by a registry for one loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    pub file_name: String,
    /// Raw version tokens; may contain loader names
    pub game_versions: Vec<String>,
    /// `None` when the registry withholds third-party downloads
    pub download_url: Option<String>,
    pub dependencies: Vec<DeclaredDependency>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Newest,
    Updated,
    Popularity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub sort: SortMode,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: PackageRef,
    pub display_name: String,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// Total results reachable through pagination
    pub total_count: usize,
    /// Largest page size the registry accepts
    pub page_limit: usize,
    pub rate_limit: RateLimitSignal,
}

/// A third-party package registry
#[async_trait]
pub trait Registry: Send + Sync {
    fn source(&self) -> ThirdPartySource;

    /// `Ok(None)` when the registry does not know the package
    async fn package_metadata(
        &self,
        id: &PackageRef,
    ) -> Result<Option<PackageMetadata>, RegistryError>;

    async fn list_artifacts(
        &self,
        id: &PackageRef,
        loader: Loader,
    ) -> Result<Vec<RemoteArtifact>, RegistryError>;

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, RegistryError>;
}

/// Downloads artifact bytes
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RegistryError>;
}

/// `owner/repo` on the source-control provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositorySlug {
    pub owner: String,
    pub name: String,
}

pub const SOURCE_CONTROL_HOST: &str = "github.com";

impl RepositorySlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `https://github.com/<owner>/<repo>[...]`
    ///
    /// URLs on any other host are rejected.
    pub fn from_source_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        if host != SOURCE_CONTROL_HOST && host != "www.github.com" {
            return None;
        }
        let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let name = segments.next()?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            return None;
        }
        Some(Self::new(owner, name))
    }

    /// `owner/repo` shorthand as written in config files
    pub fn parse(shorthand: &str) -> Option<Self> {
        let (owner, name) = shorthand.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl fmt::Display for RepositorySlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A downloadable release asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
}

/// Source-control release mirror (augments known artifacts only)
#[async_trait]
pub trait ReleaseMirror: Send + Sync {
    async fn release_assets(&self, repo: &RepositorySlug)
        -> Result<Vec<ReleaseAsset>, RegistryError>;

    /// SPDX id of the repository license, if any
    async fn license(&self, repo: &RepositorySlug) -> Result<Option<String>, RegistryError>;
}

/// True if `url` is https on one of `hosts`
pub fn is_trusted_url(url: &str, hosts: &[&str]) -> bool {
    Url::parse(url)
        .ok()
        .filter(|parsed| parsed.scheme() == "https")
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| hosts.iter().any(|allowed| host == *allowed))
}
