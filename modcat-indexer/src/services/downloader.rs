//! Artifact downloads
//!
//! Only https URLs on the registries' and the mirror's download hosts are
//! fetched; anything else is rejected before a request is made.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::RegistryError;
use crate::services::http::build_client;
use crate::services::registry::{is_trusted_url, ArtifactFetcher};
use crate::services::{curseforge_client, github_client, modrinth_client};

/// Every host an artifact may be downloaded from
pub fn trusted_download_hosts() -> Vec<&'static str> {
    curseforge_client::TRUSTED_DOWNLOAD_HOSTS
        .iter()
        .chain(modrinth_client::TRUSTED_DOWNLOAD_HOSTS)
        .chain(github_client::TRUSTED_DOWNLOAD_HOSTS)
        .copied()
        .collect()
}

pub struct HttpFetcher {
    http_client: reqwest::Client,
    trusted_hosts: Vec<&'static str>,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, RegistryError> {
        Ok(Self {
            http_client: build_client()?,
            trusted_hosts: trusted_download_hosts(),
        })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        if !is_trusted_url(url, &self.trusted_hosts) {
            return Err(RegistryError::UntrustedUrl(url.to_string()));
        }

        tracing::debug!(url = %url, "Downloading artifact");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(RegistryError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(RegistryError::Api(status.as_u16(), url.to_string()));
        }

        let bytes = response.bytes().await.map_err(RegistryError::from_reqwest)?;
        Ok(bytes.to_vec())
    }
}
