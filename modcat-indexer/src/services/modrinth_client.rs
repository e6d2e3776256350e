//! Modrinth API client
//!
//! String package ids. The author is the project member holding the owner
//! role; each version contributes its primary file only.

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

const MODRINTH_BASE_URL: &str = "https://api.modrinth.com";
const REQUESTS_PER_SECOND: u32 = 5;
const OWNER_ROLE: &str = "owner";

pub const MAX_PAGE_SIZE: usize = 100;
pub const TRUSTED_DOWNLOAD_HOSTS: &[&str] = &["cdn.modrinth.com"];

fn sort_index(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Newest => "newest",
        SortMode::Updated => "updated",
        SortMode::Popularity => "downloads",
    }
}

#[derive(Debug, Deserialize)]
struct MrProject {
    title: String,
    license: Option<MrLicense>,
    issues_url: Option<String>,
    source_url: Option<String>,
    wiki_url: Option<String>,
    discord_url: Option<String>,
    #[serde(default)]
    donation_urls: Vec<MrDonationUrl>,
}

#[derive(Debug, Deserialize)]
struct MrLicense {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MrDonationUrl {
    platform: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct MrMember {
    user: MrUser,
    #[serde(default)]
    role: String,
}

#[derive(Debug, Deserialize)]
struct MrUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct MrVersion {
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    files: Vec<MrFile>,
    #[serde(default)]
    dependencies: Vec<MrDependency>,
}

#[derive(Debug, Deserialize)]
struct MrFile {
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
struct MrDependency {
    project_id: Option<String>,
    dependency_type: String,
}

#[derive(Debug, Deserialize)]
struct MrSearchResponse {
    hits: Vec<MrSearchHit>,
    limit: usize,
    total_hits: usize,
}

#[derive(Debug, Deserialize)]
struct MrSearchHit {
    project_id: String,
    title: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl MrProject {
    fn into_metadata(self, author: Option<String>) -> PackageMetadata {
        let mut other_links = Vec::new();
        if let Some(url) = non_empty(self.wiki_url) {
            other_links.push(OtherLink {
                platform: "wiki".to_string(),
                url,
            });
        }
        if let Some(url) = non_empty(self.discord_url) {
            other_links.push(OtherLink {
                platform: "discord".to_string(),
                url,
            });
        }
        for donation in self.donation_urls {
            if !donation.url.trim().is_empty() {
                other_links.push(OtherLink {
                    platform: donation.platform,
                    url: donation.url,
                });
            }
        }

        PackageMetadata {
            display_name: self.title,
            author,
            license: self.license.map(|l| l.id).filter(|id| !id.trim().is_empty()),
            issues_url: non_empty(self.issues_url),
            source_url: non_empty(self.source_url),
            other_links,
        }
    }
}

/// Owner of the project, else the first listed member
fn project_owner(members: Vec<MrMember>) -> Option<String> {
    let owner = members
        .iter()
        .position(|m| m.role.eq_ignore_ascii_case(OWNER_ROLE))
        .unwrap_or(0);
    members.into_iter().nth(owner).map(|m| m.user.username)
}

impl MrVersion {
    fn into_artifact(self) -> Option<RemoteArtifact> {
        let primary = self
            .files
            .iter()
            .position(|f| f.primary)
            .unwrap_or(0);
        let file = self.files.into_iter().nth(primary)?;

        let download_url = if is_trusted_url(&file.url, TRUSTED_DOWNLOAD_HOSTS) {
            Some(file.url)
        } else {
            tracing::warn!(file = %file.filename, url = %file.url, "Ignoring untrusted Modrinth download URL");
            None
        };

        let dependencies = self
            .dependencies
            .into_iter()
            .filter_map(|dep| {
                let relation = match dep.dependency_type.as_str() {
                    "required" => DependencyRelation::Required,
                    "incompatible" => DependencyRelation::Incompatible,
                    _ => return None,
                };
                Some(DeclaredDependency {
                    package: PackageRef::Modrinth(dep.project_id?),
                    relation,
                })
            })
            .collect();

        Some(RemoteArtifact {
            file_name: file.filename,
            game_versions: self.game_versions,
            download_url,
            dependencies,
        })
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Modrinth API client
pub struct ModrinthClient {
    http_client: reqwest::Client,
    base_url: String,
    gate: Arc<RateLimitGate>,
    limiter: DirectLimiter,
}

impl ModrinthClient {
    pub fn new(gate: Arc<RateLimitGate>) -> Result<Self, RegistryError> {
        let quota = Quota::per_second(NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http_client: build_client()?,
            base_url: MODRINTH_BASE_URL.to_string(),
            gate,
            limiter: RateLimiter::direct(quota),
        })
    }

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
        tracing::debug!(url = %url, "Querying Modrinth API");

        get_json(self.http_client.get(&url).query(query), &self.gate, what).await
    }

    fn expect_modrinth(id: &PackageRef) -> Result<&str, RegistryError> {
        match id {
            PackageRef::Modrinth(id) => Ok(id),
            other => Err(RegistryError::NotFound(other.to_string())),
        }
    }
}

#[async_trait]
impl Registry for ModrinthClient {
    fn source(&self) -> ThirdPartySource {
        ThirdPartySource::Modrinth
    }

    async fn package_metadata(
        &self,
        id: &PackageRef,
    ) -> Result<Option<PackageMetadata>, RegistryError> {
        let project_id = Self::expect_modrinth(id)?;
        let what = id.to_string();

        let project = match self
            .get::<MrProject>(&format!("/v2/project/{project_id}"), &[], &what)
            .await
        {
            Ok((project, _)) => project,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let author = match self
            .get::<Vec<MrMember>>(&format!("/v2/project/{project_id}/members"), &[], &what)
            .await
        {
            Ok((members, _)) => project_owner(members),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        Ok(Some(project.into_metadata(author)))
    }

    async fn list_artifacts(
        &self,
        id: &PackageRef,
        loader: Loader,
    ) -> Result<Vec<RemoteArtifact>, RegistryError> {
        let project_id = Self::expect_modrinth(id)?;
        if loader == Loader::Any {
            return Ok(Vec::new());
        }

        let loaders = serde_json::to_string(&[loader.as_str()])
            .map_err(|e| RegistryError::Parse(e.to_string()))?;
        let (versions, _) = self
            .get::<Vec<MrVersion>>(
                &format!("/v2/project/{project_id}/version"),
                &[("loaders", loaders)],
                &id.to_string(),
            )
            .await?;

        Ok(versions
            .into_iter()
            .filter_map(MrVersion::into_artifact)
            .collect())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, RegistryError> {
        let mut params = vec![
            ("facets", r#"[["project_type:mod"]]"#.to_string()),
            ("index", sort_index(query.sort).to_string()),
            ("offset", query.offset.to_string()),
            ("limit", query.limit.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(text) = &query.text {
            params.push(("query", text.clone()));
        }

        let (response, rate_limit) = self
            .get::<MrSearchResponse>("/v2/search", &params, "modrinth search")
            .await?;

        Ok(SearchPage {
            hits: response
                .hits
                .into_iter()
                .map(|hit| SearchHit {
                    id: PackageRef::Modrinth(hit.project_id),
                    display_name: hit.title,
                })
                .collect(),
            total_count: response.total_hits,
            page_limit: response.limit.clamp(1, MAX_PAGE_SIZE),
            rate_limit,
        })
    }
}
