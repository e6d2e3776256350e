//! Per-registry artifact merging
//!
//! Builds the per-loader artifact table of one package. Every artifact is
//! downloaded and hashed; the SHA-512 is the dedup key within a loader
//! bucket, so the same jar listed by two registries becomes one
//! [`VersionFile`] with both download URLs.
//!
//! **Merge rules:**
//! - known hash: union the download URL, flag CurseForge availability
//! - new hash: append, with loader names filtered out of the version list
//!   and dependency edges resolved through [`DependencyResolver`]
//! - release mirror: may only add URLs to hashes already in the table

use futures::stream::{self, StreamExt};
use modcat_common::hashing::digest;
use modcat_common::version::sort_descending;
use modcat_common::{Loader, ManifestJson, ThirdPartySource, VersionFile};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::services::dependency_resolver::DependencyResolver;
use crate::services::registry::{
    ArtifactFetcher, PackageRef, Registry, ReleaseAsset, RemoteArtifact,
};

/// Artifacts of one package grouped by loader
pub type ArtifactTable = BTreeMap<Loader, Vec<VersionFile>>;

/// Concurrent downloads per registry listing
pub const DOWNLOAD_CONCURRENCY: usize = 5;

pub struct SourceMerger {
    fetcher: Arc<dyn ArtifactFetcher>,
    resolver: Arc<DependencyResolver>,
}

impl SourceMerger {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, resolver: Arc<DependencyResolver>) -> Self {
        Self { fetcher, resolver }
    }

    /// Merge one registry's artifacts for `id` into `table`
    ///
    /// The table is only updated when every loader listing succeeded, so a
    /// registry that fails midway contributes nothing. Individual download
    /// failures are skipped.
    pub async fn merge_registry(
        &self,
        registry: &dyn Registry,
        id: &PackageRef,
        table: &mut ArtifactTable,
    ) -> Result<(), RegistryError> {
        let mut working = table.clone();
        let from_curseforge = registry.source() == ThirdPartySource::CurseForge;

        for loader in Loader::SUPPORTED {
            let listing = match registry.list_artifacts(id, loader).await {
                Ok(listing) => listing,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if listing.is_empty() {
                continue;
            }

            let hashed = self.download_and_hash(listing).await;
            let bucket = working.entry(loader).or_default();

            for (artifact, url, content_hash) in hashed {
                if let Some(existing) = bucket.iter_mut().find(|f| f.content_hash == content_hash) {
                    existing.add_download_url(&url);
                    if from_curseforge {
                        existing.curseforge_mirror_available = true;
                    }
                    if !artifact.dependencies.is_empty() {
                        let declared = self
                            .resolver
                            .resolve_all(registry, &artifact.dependencies, loader)
                            .await;
                        existing.dependencies.merge(declared);
                    }
                    continue;
                }

                let dependencies = self
                    .resolver
                    .resolve_all(registry, &artifact.dependencies, loader)
                    .await;

                bucket.push(VersionFile {
                    file_name: artifact.file_name,
                    supported_versions: platform_versions(&artifact.game_versions),
                    content_hash,
                    download_urls: vec![url],
                    curseforge_mirror_available: from_curseforge,
                    dependencies,
                });
            }

            tracing::debug!(
                package = %id,
                loader = %loader,
                artifacts = bucket.len(),
                "Merged registry listing"
            );
        }

        *table = working;
        Ok(())
    }

    /// Add release-mirror URLs to artifacts already in `table`
    ///
    /// Returns the number of artifacts that gained a mirror. Assets whose
    /// hash is unknown are ignored: the mirror carries no version or
    /// dependency data to build a new artifact from.
    pub async fn augment_from_mirror(
        &self,
        assets: Vec<ReleaseAsset>,
        table: &mut ArtifactTable,
    ) -> usize {
        let fetcher = Arc::clone(&self.fetcher);
        let hashed: Vec<(String, String)> = stream::iter(assets)
            .map(|asset| {
                let fetcher = Arc::clone(&fetcher);
                async move {
                    let hash = fetch_and_hash(fetcher.as_ref(), &asset.download_url).await?;
                    Some((asset.download_url, hash))
                }
            })
            .buffered(DOWNLOAD_CONCURRENCY)
            .filter_map(|entry| async move { entry })
            .collect()
            .await;

        let mut augmented = 0;
        for (url, hash) in hashed {
            for file in table.values_mut().flatten() {
                if file.content_hash == hash && file.add_download_url(&url) {
                    augmented += 1;
                }
            }
        }
        augmented
    }

    /// Download every listed artifact, keeping listing order
    async fn download_and_hash(
        &self,
        listing: Vec<RemoteArtifact>,
    ) -> Vec<(RemoteArtifact, String, String)> {
        let fetcher = Arc::clone(&self.fetcher);
        stream::iter(listing)
            .map(|artifact| {
                let fetcher = Arc::clone(&fetcher);
                async move {
                    let url = artifact.download_url.clone()?;
                    let hash = fetch_and_hash(fetcher.as_ref(), &url).await?;
                    Some((artifact, url, hash))
                }
            })
            .buffered(DOWNLOAD_CONCURRENCY)
            .filter_map(|entry| async move { entry })
            .collect()
            .await
    }
}

/// Download `url` and hash it off the async runtime
///
/// Failures are logged and yield `None`; one bad download never aborts a package.
async fn fetch_and_hash(fetcher: &dyn ArtifactFetcher, url: &str) -> Option<String> {
    let bytes = match fetcher.fetch(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Skipping artifact: download failed");
            return None;
        }
    };

    match tokio::task::spawn_blocking(move || digest(&bytes)).await {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Hash calculation task failed");
            None
        }
    }
}

/// Version tokens of an artifact, newest first, with loader names removed
pub fn platform_versions(tokens: &[String]) -> Vec<String> {
    let mut versions: Vec<String> = tokens
        .iter()
        .map(|token| token.trim())
        .filter(|token| !token.is_empty() && !Loader::is_loader_name(token))
        .map(str::to_string)
        .collect();
    sort_descending(&mut versions);
    versions.dedup();
    versions
}

/// Sort every bucket newest first and drop empty buckets
pub fn finalize_table(mut table: ArtifactTable) -> ArtifactTable {
    table.retain(|_, files| !files.is_empty());
    for files in table.values_mut() {
        ManifestJson::sort_files(files);
    }
    table
}
