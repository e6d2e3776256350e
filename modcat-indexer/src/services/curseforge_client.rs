//! CurseForge API client
//!
//! Integer package ids. Requests are paced by a `governor` quota and held by
//! the registry's shared [`RateLimitGate`]. Search results are capped by the
//! API at 10,000 (offset + page size).

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use modcat_common::{Loader, OtherLink, ThirdPartySource};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::services::http::{build_client, get_json};
use crate::services::rate_limit::{RateLimitGate, RateLimitSignal};
use crate::services::registry::{
    is_trusted_url, DeclaredDependency, DependencyRelation, PackageMetadata, PackageRef, Registry,
    RemoteArtifact, SearchHit, SearchPage, SearchQuery, SortMode,
};

const CURSEFORGE_BASE_URL: &str = "https://api.curseforge.com";
const API_KEY_HEADER: &str = "x-api-key";
const REQUESTS_PER_SECOND: u32 = 10;

pub const MINECRAFT_GAME_ID: u32 = 432;
pub const MOD_CLASS_ID: u32 = 6;
pub const MAX_SEARCH_RESULTS: usize = 10_000;
pub const MAX_PAGE_SIZE: usize = 50;
pub const TRUSTED_DOWNLOAD_HOSTS: &[&str] = &["edge.forgecdn.net", "mediafilez.forgecdn.net"];

const RELATION_REQUIRED: u32 = 3;
const RELATION_INCOMPATIBLE: u32 = 5;

/// `modLoaderType` filter value; Rift has none
pub fn loader_type(loader: Loader) -> Option<u32> {
    match loader {
        Loader::Forge => Some(1),
        Loader::Liteloader => Some(3),
        Loader::Fabric => Some(4),
        Loader::Quilt => Some(5),
        Loader::Rift | Loader::Any => None,
    }
}

fn sort_field(sort: SortMode) -> u32 {
    match sort {
        SortMode::Newest => 11,
        SortMode::Updated => 3,
        SortMode::Popularity => 2,
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PagedEnvelope<T> {
    data: Vec<T>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    index: usize,
    result_count: usize,
    total_count: usize,
}

#[derive(Debug, Deserialize)]
struct CfMod {
    id: u32,
    name: String,
    #[serde(default)]
    authors: Vec<CfAuthor>,
    #[serde(default)]
    links: CfLinks,
}

#[derive(Debug, Deserialize)]
struct CfAuthor {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfLinks {
    website_url: Option<String>,
    wiki_url: Option<String>,
    issues_url: Option<String>,
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfFile {
    file_name: String,
    download_url: Option<String>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    dependencies: Vec<CfDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfDependency {
    mod_id: u32,
    relation_type: u32,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CfMod {
    fn into_metadata(self) -> PackageMetadata {
        let mut other_links = Vec::new();
        if let Some(url) = non_empty(self.links.website_url) {
            other_links.push(OtherLink {
                platform: "curseforge".to_string(),
                url,
            });
        }
        if let Some(url) = non_empty(self.links.wiki_url) {
            other_links.push(OtherLink {
                platform: "wiki".to_string(),
                url,
            });
        }

        PackageMetadata {
            display_name: self.name,
            author: self.authors.into_iter().map(|a| a.name).next(),
            // CurseForge does not expose a license identifier
            license: None,
            issues_url: non_empty(self.links.issues_url),
            source_url: non_empty(self.links.source_url),
            other_links,
        }
    }
}

impl CfFile {
    fn into_artifact(self) -> RemoteArtifact {
        let download_url = match self.download_url {
            Some(url) if is_trusted_url(&url, TRUSTED_DOWNLOAD_HOSTS) => Some(url),
            Some(url) => {
                tracing::warn!(file = %self.file_name, url = %url, "Ignoring untrusted CurseForge download URL");
                None
            }
            None => None,
        };

        let dependencies = self
            .dependencies
            .into_iter()
            .filter_map(|dep| {
                let relation = match dep.relation_type {
                    RELATION_REQUIRED => DependencyRelation::Required,
                    RELATION_INCOMPATIBLE => DependencyRelation::Incompatible,
                    _ => return None,
                };
                Some(DeclaredDependency {
                    package: PackageRef::CurseForge(dep.mod_id),
                    relation,
                })
            })
            .collect();

        RemoteArtifact {
            file_name: self.file_name,
            game_versions: self.game_versions,
            download_url,
            dependencies,
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// CurseForge API client
pub struct CurseForgeClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    gate: Arc<RateLimitGate>,
    limiter: DirectLimiter,
}

impl CurseForgeClient {
    pub fn new(api_key: impl Into<String>, gate: Arc<RateLimitGate>) -> Result<Self, RegistryError> {
        let quota = Quota::per_second(NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http_client: build_client()?,
            base_url: CURSEFORGE_BASE_URL.to_string(),
            api_key: api_key.into(),
            gate,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Point the client at another host (staging or a local proxy)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn gate(&self) -> Arc<RateLimitGate> {
        Arc::clone(&self.gate)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<(T, RateLimitSignal), RegistryError> {
        self.gate.wait_ready().await;
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "Querying CurseForge API");

        let request = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query);
        get_json(request, &self.gate, what).await
    }

    fn expect_curseforge(id: &PackageRef) -> Result<u32, RegistryError> {
        match id {
            PackageRef::CurseForge(id) => Ok(*id),
            other => Err(RegistryError::NotFound(other.to_string())),
        }
    }
}

#[async_trait]
impl Registry for CurseForgeClient {
    fn source(&self) -> ThirdPartySource {
        ThirdPartySource::CurseForge
    }

    async fn package_metadata(
        &self,
        id: &PackageRef,
    ) -> Result<Option<PackageMetadata>, RegistryError> {
        let mod_id = Self::expect_curseforge(id)?;
        let path = format!("/v1/mods/{mod_id}");

        match self.get::<Envelope<CfMod>>(&path, &[], &id.to_string()).await {
            Ok((envelope, _)) => Ok(Some(envelope.data.into_metadata())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_artifacts(
        &self,
        id: &PackageRef,
        loader: Loader,
    ) -> Result<Vec<RemoteArtifact>, RegistryError> {
        let mod_id = Self::expect_curseforge(id)?;
        let Some(loader_type) = loader_type(loader) else {
            return Ok(Vec::new());
        };

        let path = format!("/v1/mods/{mod_id}/files");
        let mut artifacts = Vec::new();
        let mut index = 0;

        loop {
            let query = [
                ("modLoaderType", loader_type.to_string()),
                ("index", index.to_string()),
                ("pageSize", MAX_PAGE_SIZE.to_string()),
            ];
            let (page, _) = self
                .get::<PagedEnvelope<CfFile>>(&path, &query, &id.to_string())
                .await?;

            let fetched = page.data.len();
            artifacts.extend(page.data.into_iter().map(CfFile::into_artifact));

            index = page.pagination.index + page.pagination.result_count;
            if fetched == 0
                || index >= page.pagination.total_count
                || index + MAX_PAGE_SIZE > MAX_SEARCH_RESULTS
            {
                break;
            }
        }

        Ok(artifacts)
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, RegistryError> {
        let offset = query.offset.min(MAX_SEARCH_RESULTS);
        let limit = query
            .limit
            .clamp(1, MAX_PAGE_SIZE)
            .min(MAX_SEARCH_RESULTS - offset);

        if limit == 0 {
            return Ok(SearchPage {
                hits: Vec::new(),
                total_count: MAX_SEARCH_RESULTS,
                page_limit: MAX_PAGE_SIZE,
                rate_limit: RateLimitSignal::default(),
            });
        }

        let mut params = vec![
            ("gameId", MINECRAFT_GAME_ID.to_string()),
            ("classId", MOD_CLASS_ID.to_string()),
            ("sortField", sort_field(query.sort).to_string()),
            ("sortOrder", "desc".to_string()),
            ("index", offset.to_string()),
            ("pageSize", limit.to_string()),
        ];
        if let Some(text) = &query.text {
            params.push(("searchFilter", text.clone()));
        }

        let (page, rate_limit) = self
            .get::<PagedEnvelope<CfMod>>("/v1/mods/search", &params, "curseforge search")
            .await?;

        Ok(SearchPage {
            hits: page
                .data
                .into_iter()
                .map(|m| SearchHit {
                    id: PackageRef::CurseForge(m.id),
                    display_name: m.name,
                })
                .collect(),
            total_count: page.pagination.total_count.min(MAX_SEARCH_RESULTS),
            page_limit: MAX_PAGE_SIZE,
            rate_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_types() {
        assert_eq!(loader_type(Loader::Forge), Some(1));
        assert_eq!(loader_type(Loader::Liteloader), Some(3));
        assert_eq!(loader_type(Loader::Fabric), Some(4));
        assert_eq!(loader_type(Loader::Quilt), Some(5));
        assert_eq!(loader_type(Loader::Rift), None);
    }

    #[test]
    fn test_mod_into_metadata() {
        let json = r#"{
            "id": 238222,
            "name": "Just Enough Items (JEI)",
            "authors": [{"name": "mezz"}, {"name": "other"}],
            "links": {
                "websiteUrl": "https://www.curseforge.com/minecraft/mc-mods/jei",
                "wikiUrl": "",
                "issuesUrl": "https://github.com/mezz/JustEnoughItems/issues",
                "sourceUrl": "https://github.com/mezz/JustEnoughItems"
            }
        }"#;
        let metadata = serde_json::from_str::<CfMod>(json).unwrap().into_metadata();

        assert_eq!(metadata.display_name, "Just Enough Items (JEI)");
        assert_eq!(metadata.author.as_deref(), Some("mezz"));
        assert_eq!(metadata.license, None);
        assert_eq!(
            metadata.source_url.as_deref(),
            Some("https://github.com/mezz/JustEnoughItems")
        );
        assert_eq!(metadata.other_links.len(), 1);
        assert_eq!(metadata.other_links[0].platform, "curseforge");
    }

    #[test]
    fn test_file_into_artifact() {
        let json = r#"{
            "fileName": "jei-1.20.1-forge.jar",
            "downloadUrl": "https://edge.forgecdn.net/files/1/2/jei.jar",
            "gameVersions": ["Forge", "1.20.1"],
            "dependencies": [
                {"modId": 1, "relationType": 3},
                {"modId": 2, "relationType": 2},
                {"modId": 3, "relationType": 5}
            ]
        }"#;
        let artifact = serde_json::from_str::<CfFile>(json).unwrap().into_artifact();

        assert_eq!(artifact.game_versions, vec!["Forge", "1.20.1"]);
        assert!(artifact.download_url.is_some());
        assert_eq!(
            artifact.dependencies,
            vec![
                DeclaredDependency {
                    package: PackageRef::CurseForge(1),
                    relation: DependencyRelation::Required,
                },
                DeclaredDependency {
                    package: PackageRef::CurseForge(3),
                    relation: DependencyRelation::Incompatible,
                },
            ]
        );
    }

    #[test]
    fn test_untrusted_download_url_is_dropped() {
        let json = r#"{
            "fileName": "evil.jar",
            "downloadUrl": "https://example.com/evil.jar"
        }"#;
        let artifact = serde_json::from_str::<CfFile>(json).unwrap().into_artifact();
        assert_eq!(artifact.download_url, None);
    }
}
