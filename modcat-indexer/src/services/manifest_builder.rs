//! Record building
//!
//! Turns a package's registry identifiers into zero or more records, one per
//! loader with at least one artifact.
//!
//! **Algorithm:**
//! 1. Fetch metadata from each registry the package is known to
//! 2. Find the source repository (preferred registry's source URL first)
//! 3. Merge artifacts from both registries in preference order, then add
//!    release-mirror URLs for known hashes
//! 4. Emit one record per non-empty loader bucket
//!
//! Per-source failures never escape: they show up as a missing entry in the
//! returned [`SourceUsage`].

use modcat_common::identifier::GenericIdentifier;
use modcat_common::{
    Links, ManifestJson, SourceUsage, ThirdPartySource, UsageSummary, CURRENT_INDEX_VERSION,
};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::services::registry::{
    PackageMetadata, PackageRef, Registry, ReleaseMirror, RepositorySlug,
};
use crate::services::source_merger::{finalize_table, ArtifactTable, SourceMerger};

/// Which registry wins when metadata disagrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourcePreference {
    PreferCurseForge,
    #[default]
    PreferModrinth,
}

impl SourcePreference {
    pub fn from_prefer_curseforge(prefer_curseforge: bool) -> Self {
        if prefer_curseforge {
            SourcePreference::PreferCurseForge
        } else {
            SourcePreference::PreferModrinth
        }
    }

    fn order(self) -> [ThirdPartySource; 2] {
        match self {
            SourcePreference::PreferCurseForge => {
                [ThirdPartySource::CurseForge, ThirdPartySource::Modrinth]
            }
            SourcePreference::PreferModrinth => {
                [ThirdPartySource::Modrinth, ThirdPartySource::CurseForge]
            }
        }
    }
}

/// Registry identifiers of one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PackageIds {
    pub curseforge: Option<u32>,
    pub modrinth: Option<String>,
}

impl PackageIds {
    pub fn curseforge(id: u32) -> Self {
        Self {
            curseforge: Some(id),
            modrinth: None,
        }
    }

    pub fn modrinth(id: impl Into<String>) -> Self {
        Self {
            curseforge: None,
            modrinth: Some(id.into()),
        }
    }

    pub fn from_record(record: &ManifestJson) -> Self {
        Self {
            curseforge: record.curse_forge_id,
            modrinth: record.modrinth_id.clone(),
        }
    }

    pub fn from_package_ref(id: &PackageRef) -> Self {
        match id {
            PackageRef::CurseForge(id) => Self::curseforge(*id),
            PackageRef::Modrinth(id) => Self::modrinth(id.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.curseforge.is_none() && self.modrinth.is_none()
    }

    pub fn package_ref(&self, source: ThirdPartySource) -> Option<PackageRef> {
        match source {
            ThirdPartySource::CurseForge => self.curseforge.map(PackageRef::CurseForge),
            ThirdPartySource::Modrinth => self.modrinth.clone().map(PackageRef::Modrinth),
            ThirdPartySource::GitHub => None,
        }
    }

    /// Registries holding this package
    pub fn relevant_sources(&self) -> Vec<ThirdPartySource> {
        let mut sources = Vec::new();
        if self.curseforge.is_some() {
            sources.push(ThirdPartySource::CurseForge);
        }
        if self.modrinth.is_some() {
            sources.push(ThirdPartySource::Modrinth);
        }
        sources
    }
}

impl std::fmt::Display for PackageIds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.curseforge, &self.modrinth) {
            (Some(cf), Some(mr)) => write!(f, "curseforge:{cf}+modrinth:{mr}"),
            (Some(cf), None) => write!(f, "curseforge:{cf}"),
            (None, Some(mr)) => write!(f, "modrinth:{mr}"),
            (None, None) => f.write_str("<no ids>"),
        }
    }
}

/// Records built for one package plus which sources answered
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub records: Vec<ManifestJson>,
    pub usage: SourceUsage,
    pub summary: UsageSummary,
}

pub struct ManifestBuilder {
    curseforge: Option<Arc<dyn Registry>>,
    modrinth: Option<Arc<dyn Registry>>,
    mirror: Option<Arc<dyn ReleaseMirror>>,
    merger: SourceMerger,
    preference: SourcePreference,
}

impl ManifestBuilder {
    pub fn new(
        curseforge: Option<Arc<dyn Registry>>,
        modrinth: Option<Arc<dyn Registry>>,
        mirror: Option<Arc<dyn ReleaseMirror>>,
        merger: SourceMerger,
        preference: SourcePreference,
    ) -> Self {
        Self {
            curseforge,
            modrinth,
            mirror,
            merger,
            preference,
        }
    }

    pub fn preference(&self) -> SourcePreference {
        self.preference
    }

    fn registry(&self, source: ThirdPartySource) -> Option<&Arc<dyn Registry>> {
        match source {
            ThirdPartySource::CurseForge => self.curseforge.as_ref(),
            ThirdPartySource::Modrinth => self.modrinth.as_ref(),
            ThirdPartySource::GitHub => None,
        }
    }

    /// Build every record for one package
    pub async fn build(&self, ids: &PackageIds) -> BuildOutput {
        let mut usage = SourceUsage::new();
        let order = self.preference.order();

        // Step 1: metadata per registry, preferred first
        let mut metadata: Vec<(ThirdPartySource, PackageMetadata)> = Vec::new();
        let mut unknown_to: Vec<ThirdPartySource> = Vec::new();
        let mut reachable: Vec<ThirdPartySource> = Vec::new();

        for source in order {
            let (Some(registry), Some(package)) = (self.registry(source), ids.package_ref(source))
            else {
                continue;
            };
            match registry.package_metadata(&package).await {
                Ok(Some(found)) => {
                    reachable.push(source);
                    metadata.push((source, found));
                }
                Ok(None) => {
                    tracing::info!(package = %package, "Package no longer listed on registry");
                    reachable.push(source);
                    unknown_to.push(source);
                }
                Err(e) => {
                    tracing::warn!(package = %package, error = %e, "Registry metadata unavailable");
                }
            }
        }

        // Step 2: source repository from preferred metadata, then the other
        let repository = metadata
            .iter()
            .filter_map(|(_, m)| m.source_url.as_deref())
            .find_map(RepositorySlug::from_source_url);

        // Step 3: artifacts, threading one table through both registries
        let mut table = ArtifactTable::new();
        for source in order {
            if !reachable.contains(&source) || unknown_to.contains(&source) {
                continue;
            }
            let (Some(registry), Some(package)) = (self.registry(source), ids.package_ref(source))
            else {
                continue;
            };
            match self
                .merger
                .merge_registry(registry.as_ref(), &package, &mut table)
                .await
            {
                Ok(()) => usage.mark(source),
                Err(e) => log_registry_failure(&package, &e),
            }
        }

        // Registries that answered "not found" still succeeded
        for source in &unknown_to {
            usage.mark(*source);
        }

        let mut repository_license = None;
        if let (Some(mirror), Some(repo)) = (self.mirror.as_ref(), repository.as_ref()) {
            match mirror.release_assets(repo).await {
                Ok(assets) => {
                    let augmented = self.merger.augment_from_mirror(assets, &mut table).await;
                    tracing::debug!(repository = %repo, augmented, "Applied release mirror");
                    usage.mark(ThirdPartySource::GitHub);
                }
                Err(e) if e.is_not_found() => usage.mark(ThirdPartySource::GitHub),
                Err(e) => tracing::warn!(repository = %repo, error = %e, "Release mirror unavailable"),
            }

            let needs_license = metadata.iter().all(|(_, m)| m.license.is_none());
            if needs_license {
                repository_license = match mirror.license(repo).await {
                    Ok(license) => license,
                    Err(e) => {
                        tracing::debug!(repository = %repo, error = %e, "License lookup failed");
                        None
                    }
                };
            }
        }

        let summary = usage.summary();
        let table = finalize_table(table);

        // Step 4: nothing to publish is not an error
        if table.is_empty() || metadata.is_empty() {
            tracing::debug!(package = %ids, "No artifacts found for package");
            return BuildOutput {
                records: Vec::new(),
                usage,
                summary,
            };
        }

        // Step 5: one record per loader
        let records = match self.emit_records(ids, &metadata, repository_license, &unknown_to, table) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(package = %ids, error = %e, "Discarding package with unusable name");
                Vec::new()
            }
        };

        BuildOutput {
            records,
            usage,
            summary,
        }
    }

    fn emit_records(
        &self,
        ids: &PackageIds,
        metadata: &[(ThirdPartySource, PackageMetadata)],
        repository_license: Option<String>,
        unknown_to: &[ThirdPartySource],
        table: ArtifactTable,
    ) -> modcat_common::Result<Vec<ManifestJson>> {
        let display_name = metadata
            .iter()
            .map(|(_, m)| m.display_name.trim())
            .find(|name| !name.is_empty())
            .unwrap_or_default()
            .to_string();
        let author = first_field(metadata, |m| m.author.as_ref()).unwrap_or_default();
        let license = first_field(metadata, |m| m.license.as_ref()).or(repository_license);

        let mut links = Links {
            issues: first_field(metadata, |m| m.issues_url.as_ref()),
            source_control: first_field(metadata, |m| m.source_url.as_ref()),
            other: Vec::new(),
        };
        for (_, m) in metadata {
            for link in &m.other_links {
                links.push_other(link.clone());
            }
        }

        let curse_forge_id = ids
            .curseforge
            .filter(|_| !unknown_to.contains(&ThirdPartySource::CurseForge));
        let modrinth_id = ids
            .modrinth
            .clone()
            .filter(|_| !unknown_to.contains(&ThirdPartySource::Modrinth));

        let mut records = Vec::with_capacity(table.len());
        for (loader, files) in table {
            let gid = GenericIdentifier::from_display_name(loader, &display_name)?;
            records.push(ManifestJson {
                index_version: CURRENT_INDEX_VERSION.to_string(),
                generic_identifier: gid.to_string(),
                display_name: display_name.clone(),
                author: author.clone(),
                license: license.clone(),
                curse_forge_id,
                modrinth_id: modrinth_id.clone(),
                links: links.clone(),
                files,
            });
        }

        tracing::info!(
            package = %ids,
            records = records.len(),
            "Built records for package"
        );

        Ok(records)
    }
}

/// First value of a field in preference order
fn first_field<F>(metadata: &[(ThirdPartySource, PackageMetadata)], pick: F) -> Option<String>
where
    F: Fn(&PackageMetadata) -> Option<&String>,
{
    metadata.iter().find_map(|(_, m)| pick(m).cloned())
}

fn log_registry_failure(package: &PackageRef, err: &RegistryError) {
    if err.is_transient() {
        tracing::warn!(package = %package, error = %err, "Registry unreachable, contributing nothing");
    } else {
        tracing::error!(package = %package, error = %err, "Registry listing failed, contributing nothing");
    }
}
