//! GitHub: release mirror, catalog storage and publish backend
//!
//! [`GitHubClient`] only reads public release data and license ids for the
//! merge engine. [`GitHubBackend`] reads the catalog from the index
//! repository's default branch and writes through REST (refs, pulls,
//! merges) plus one GraphQL `createCommitOnBranch` per commit, guarded by
//! `expectedHeadOid` so a concurrent push fails the commit instead of
//! being overwritten.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use modcat_common::identifier::GenericIdentifier;
use modcat_common::{IndexJson, ManifestJson};
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::error::{BackendError, RegistryError};
use crate::services::credentials::CredentialProvider;
use crate::services::http::{build_client, get_json_with};
use crate::services::index_store::IndexStore;
use crate::services::rate_limit::{RateLimitGate, ResetClock};
use crate::services::registry::{is_trusted_url, ReleaseAsset, ReleaseMirror, RepositorySlug};
use crate::services::source_control::{BranchRef, FileChanges, SourceControlBackend};

const GITHUB_API_URL: &str = "https://api.github.com";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const RELEASES_PER_PAGE: u32 = 100;
const NO_LICENSE_ASSERTION: &str = "NOASSERTION";

pub const TRUSTED_DOWNLOAD_HOSTS: &[&str] = &["github.com", "objects.githubusercontent.com"];
pub const INDEX_PATH: &str = "index.json";

const CREATE_COMMIT_MUTATION: &str = "mutation($input: CreateCommitOnBranchInput!) { \
    createCommitOnBranch(input: $input) { commit { oid } } }";

#[derive(Debug, Deserialize)]
struct GhRelease {
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assets: Vec<GhAsset>,
}

#[derive(Debug, Deserialize)]
struct GhAsset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct GhLicenseResponse {
    license: Option<GhLicense>,
}

#[derive(Debug, Deserialize)]
struct GhLicense {
    spdx_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhRepository {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    object: GhObject,
}

#[derive(Debug, Deserialize)]
struct GhObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Downloadable `.jar` assets of published releases
fn jar_assets(releases: Vec<GhRelease>) -> Vec<ReleaseAsset> {
    releases
        .into_iter()
        .filter(|release| !release.draft)
        .flat_map(|release| release.assets)
        .filter(|asset| asset.name.to_ascii_lowercase().ends_with(".jar"))
        .filter(|asset| is_trusted_url(&asset.browser_download_url, TRUSTED_DOWNLOAD_HOSTS))
        .map(|asset| ReleaseAsset {
            name: asset.name,
            download_url: asset.browser_download_url,
        })
        .collect()
}

fn spdx_id(response: GhLicenseResponse) -> Option<String> {
    response
        .license
        .and_then(|license| license.spdx_id)
        .filter(|id| !id.is_empty() && id != NO_LICENSE_ASSERTION)
}

/// Variables of one `createCommitOnBranch` call
fn commit_input(
    repo: &RepositorySlug,
    branch: &str,
    expected_head_oid: &str,
    message: &str,
    changes: &FileChanges,
) -> serde_json::Value {
    let additions: Vec<serde_json::Value> = changes
        .additions
        .iter()
        .map(|file| json!({ "path": file.path, "contents": BASE64.encode(&file.contents) }))
        .collect();
    let deletions: Vec<serde_json::Value> = changes
        .deletions
        .iter()
        .map(|path| json!({ "path": path }))
        .collect();

    json!({
        "input": {
            "branch": {
                "repositoryNameWithOwner": repo.to_string(),
                "branchName": branch,
            },
            "message": { "headline": message },
            "expectedHeadOid": expected_head_oid,
            "fileChanges": {
                "additions": additions,
                "deletions": deletions,
            },
        }
    })
}

/// Read-only GitHub client used as the release mirror
pub struct GitHubClient {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Option<Arc<CredentialProvider>>,
    gate: Arc<RateLimitGate>,
}

impl GitHubClient {
    pub fn new(
        credentials: Option<Arc<CredentialProvider>>,
        gate: Arc<RateLimitGate>,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            http_client: build_client()?,
            base_url: GITHUB_API_URL.to_string(),
            credentials,
            gate,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, path: &str) -> Result<RequestBuilder, RegistryError> {
        self.gate.wait_ready().await;

        let mut request = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .header(ACCEPT, JSON_MEDIA_TYPE);
        if let Some(credentials) = &self.credentials {
            let token = credentials
                .token()
                .await
                .map_err(|e| RegistryError::Api(StatusCode::UNAUTHORIZED.as_u16(), e.to_string()))?;
            request = request.bearer_auth(token);
        }
        Ok(request)
    }
}

#[async_trait]
impl ReleaseMirror for GitHubClient {
    async fn release_assets(&self, repo: &RepositorySlug) -> Result<Vec<ReleaseAsset>, RegistryError> {
        let request = self
            .request(&format!("/repos/{repo}/releases"))
            .await?
            .query(&[("per_page", RELEASES_PER_PAGE)]);
        let (releases, _) =
            get_json_with::<Vec<GhRelease>>(request, &self.gate, &repo.to_string(), ResetClock::UnixEpoch)
                .await?;
        Ok(jar_assets(releases))
    }

    async fn license(&self, repo: &RepositorySlug) -> Result<Option<String>, RegistryError> {
        let request = self.request(&format!("/repos/{repo}/license")).await?;
        match get_json_with::<GhLicenseResponse>(request, &self.gate, &repo.to_string(), ResetClock::UnixEpoch)
            .await
        {
            Ok((response, _)) => Ok(spdx_id(response)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// The index repository, as catalog store and publish target
pub struct GitHubBackend {
    http_client: reqwest::Client,
    base_url: String,
    repo: RepositorySlug,
    credentials: Arc<CredentialProvider>,
    default_branch: Mutex<Option<String>>,
}

impl GitHubBackend {
    pub fn new(repo: RepositorySlug, credentials: Arc<CredentialProvider>) -> Result<Self, BackendError> {
        Ok(Self {
            http_client: build_client().map_err(|e| BackendError::Http(e.to_string()))?,
            base_url: GITHUB_API_URL.to_string(),
            repo,
            credentials,
            default_branch: Mutex::new(None),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn repository(&self) -> &RepositorySlug {
        &self.repo
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let token = self.credentials.token().await?;
        Ok(self
            .http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header(ACCEPT, JSON_MEDIA_TYPE))
    }

    /// Send and fail on any non-success status
    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(BackendError::Api(status.as_u16(), error_text))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn default_branch_name(&self) -> Result<String, BackendError> {
        let cached = self
            .default_branch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(name) = cached {
            return Ok(name);
        }

        let request = self.request(Method::GET, &format!("/repos/{}", self.repo)).await?;
        let repository: GhRepository = Self::parse(self.send(request).await?).await?;

        *self.default_branch.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(repository.default_branch.clone());
        Ok(repository.default_branch)
    }

    /// Head commit of `branch`, `None` if the branch does not exist
    async fn branch_oid(&self, branch: &str) -> Result<Option<String>, BackendError> {
        let request = self
            .request(Method::GET, &format!("/repos/{}/git/ref/heads/{branch}", self.repo))
            .await?;
        match self.send(request).await {
            Ok(response) => Ok(Some(Self::parse::<GhRef>(response).await?.object.sha)),
            Err(BackendError::Api(404, _)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Raw file contents on the default branch, `None` if absent
    async fn download_file(&self, path: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let branch = self.default_branch_name().await?;
        let request = self
            .request(Method::GET, &format!("/repos/{}/contents/{path}", self.repo))
            .await?
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .query(&[("ref", branch)]);
        match self.send(request).await {
            Ok(response) => Ok(Some(response.bytes().await?.to_vec())),
            Err(BackendError::Api(404, _)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SourceControlBackend for GitHubBackend {
    async fn default_branch_ref(&self) -> Result<BranchRef, BackendError> {
        let name = self.default_branch_name().await?;
        let oid = self
            .branch_oid(&name)
            .await?
            .ok_or_else(|| BackendError::MissingRef(name.clone()))?;
        Ok(BranchRef { name, oid })
    }

    async fn does_ref_exist(&self, branch: &str) -> Result<bool, BackendError> {
        Ok(self.branch_oid(branch).await?.is_some())
    }

    async fn create_ref(&self, from: &BranchRef, new_branch: &str) -> Result<BranchRef, BackendError> {
        let request = self
            .request(Method::POST, &format!("/repos/{}/git/refs", self.repo))
            .await?
            .json(&json!({ "ref": format!("refs/heads/{new_branch}"), "sha": from.oid }));
        let created: GhRef = Self::parse(self.send(request).await?).await?;

        tracing::info!(branch = %new_branch, from = %from.name, "Created branch");
        Ok(BranchRef {
            name: new_branch.to_string(),
            oid: created.object.sha,
        })
    }

    async fn reset_ref(&self, to: &BranchRef, branch: &str) -> Result<BranchRef, BackendError> {
        let request = self
            .request(Method::PATCH, &format!("/repos/{}/git/refs/heads/{branch}", self.repo))
            .await?
            .json(&json!({ "sha": to.oid, "force": true }));
        let updated: GhRef = Self::parse(self.send(request).await?).await?;

        tracing::info!(branch = %branch, to = %to.name, "Reset branch");
        Ok(BranchRef {
            name: branch.to_string(),
            oid: updated.object.sha,
        })
    }

    async fn commit_and_update_ref(
        &self,
        branch: &str,
        message: &str,
        changes: &FileChanges,
    ) -> Result<String, BackendError> {
        let head = self
            .branch_oid(branch)
            .await?
            .ok_or_else(|| BackendError::MissingRef(branch.to_string()))?;

        let body = json!({
            "query": CREATE_COMMIT_MUTATION,
            "variables": commit_input(&self.repo, branch, &head, message, changes),
        });
        let request = self.request(Method::POST, "/graphql").await?.json(&body);
        let response: GraphQlResponse = Self::parse(self.send(request).await?).await?;

        if !response.errors.is_empty() {
            return Err(BackendError::GraphQl(
                response.errors.into_iter().map(|e| e.message).collect(),
            ));
        }

        let oid = response
            .data
            .as_ref()
            .and_then(|data| data.pointer("/createCommitOnBranch/commit/oid"))
            .and_then(|oid| oid.as_str())
            .ok_or_else(|| BackendError::MissingOid(branch.to_string()))?
            .to_string();

        tracing::info!(
            branch = %branch,
            commit = %oid,
            additions = changes.additions.len(),
            deletions = changes.deletions.len(),
            "Committed catalog changes"
        );
        Ok(oid)
    }

    async fn create_pull_request(
        &self,
        from: &str,
        to: &str,
        title: &str,
        body: Option<&str>,
    ) -> Result<u64, BackendError> {
        let request = self
            .request(Method::POST, &format!("/repos/{}/pulls", self.repo))
            .await?
            .json(&json!({ "title": title, "head": from, "base": to, "body": body }));
        let pull: GhPullRequest = Self::parse(self.send(request).await?).await?;

        tracing::info!(number = pull.number, head = %from, base = %to, "Opened pull request");
        Ok(pull.number)
    }

    async fn find_open_pull_request(&self, from: &str, to: &str) -> Result<Option<u64>, BackendError> {
        let head = format!("{}:{from}", self.repo.owner);
        let request = self
            .request(Method::GET, &format!("/repos/{}/pulls", self.repo))
            .await?
            .query(&[("state", "open"), ("head", head.as_str()), ("base", to)]);
        let pulls: Vec<GhPullRequest> = Self::parse(self.send(request).await?).await?;
        Ok(pulls.first().map(|pull| pull.number))
    }

    async fn merge_branch_without_pr(
        &self,
        into: &str,
        from: &str,
        message: &str,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &format!("/repos/{}/merges", self.repo))
            .await?
            .json(&json!({ "base": into, "head": from, "commit_message": message }));
        let response = self.send(request).await?;

        if response.status() == StatusCode::NO_CONTENT {
            tracing::info!(base = %into, head = %from, "Nothing to merge");
        } else {
            tracing::info!(base = %into, head = %from, "Merged branch");
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for GitHubBackend {
    async fn download_catalog_index(&self) -> Result<Option<IndexJson>, BackendError> {
        let Some(bytes) = self.download_file(INDEX_PATH).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| BackendError::Parse(format!("{INDEX_PATH}: {e}")))
    }

    async fn download_record(&self, generic_identifier: &str) -> Result<Option<ManifestJson>, BackendError> {
        let gid: GenericIdentifier = generic_identifier
            .parse()
            .map_err(|e: modcat_common::Error| BackendError::Parse(e.to_string()))?;
        let path = gid.record_path();

        let Some(bytes) = self.download_file(&path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| BackendError::Parse(format!("{path}: {e}")))
    }
}
