//! Catalog storage and the run-start snapshot
//!
//! The snapshot taken at the start of a run is authoritative for the whole
//! run: every reconcile decision compares against it, never against state
//! published mid-run.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use modcat_common::{Error, IndexJson, ManifestJson};
use std::collections::BTreeMap;

use crate::error::{BackendError, RunError};
use crate::services::crawl_scheduler::KnownPackages;
use crate::services::manifest_builder::PackageIds;

/// Read access to the published catalog
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// `Ok(None)` when the repository holds no `index.json`
    async fn download_catalog_index(&self) -> Result<Option<IndexJson>, BackendError>;

    /// `Ok(None)` when no record exists for `generic_identifier`
    async fn download_record(
        &self,
        generic_identifier: &str,
    ) -> Result<Option<ManifestJson>, BackendError>;
}

/// Catalog state at run start
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub index: IndexJson,
    /// Published records keyed by generic identifier
    pub records: BTreeMap<String, ManifestJson>,
}

impl CatalogSnapshot {
    /// Download the index and every record it references
    ///
    /// A missing index, or an index naming a record that does not exist, is
    /// malformed local state and fails the run.
    pub async fn load(store: &dyn IndexStore, concurrency: usize) -> Result<Self, RunError> {
        let index = store
            .download_catalog_index()
            .await?
            .ok_or(RunError::MissingCatalog)?;

        let generic_identifiers = index.generic_identifiers();
        tracing::info!(
            artifacts = index.identifiers.len(),
            records = generic_identifiers.len(),
            "Downloading catalog records"
        );

        let records: BTreeMap<String, ManifestJson> = stream::iter(generic_identifiers)
            .map(|gid| async move {
                match store.download_record(&gid).await? {
                    Some(record) => Ok::<_, RunError>((gid, record)),
                    None => Err(RunError::Common(Error::NotFound(format!(
                        "record {gid} is listed in the index but missing"
                    )))),
                }
            })
            .buffer_unordered(concurrency.max(1))
            .try_collect()
            .await?;

        Ok(Self { index, records })
    }

    pub fn from_records(records: impl IntoIterator<Item = ManifestJson>) -> modcat_common::Result<Self> {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.index.add_record(&record)?;
            snapshot
                .records
                .insert(record.generic_identifier.clone(), record);
        }
        Ok(snapshot)
    }

    pub fn known_packages(&self) -> KnownPackages {
        KnownPackages::from_records(self.records.values())
    }

    /// One id pair per published package
    ///
    /// Records sharing a registry id are merged into one pair when their
    /// other ids do not contradict each other, so a package listed on both
    /// registries is rebuilt once.
    pub fn package_ids(&self) -> Vec<PackageIds> {
        let mut groups: Vec<PackageIds> = Vec::new();
        for ids in self
            .records
            .values()
            .filter(|record| record.has_source_id())
            .map(PackageIds::from_record)
        {
            absorb(&mut groups, ids);
        }

        // A later record can link two groups found separately
        loop {
            let before = groups.len();
            let mut merged = Vec::with_capacity(before);
            for ids in groups {
                absorb(&mut merged, ids);
            }
            groups = merged;
            if groups.len() == before {
                break;
            }
        }

        groups.sort_by(|a, b| (a.curseforge, &a.modrinth).cmp(&(b.curseforge, &b.modrinth)));
        groups
    }

    /// Published records belonging to `ids`
    ///
    /// A record matches when it shares either registry id.
    pub fn records_for(&self, ids: &PackageIds) -> Vec<&ManifestJson> {
        self.records
            .values()
            .filter(|record| {
                (ids.curseforge.is_some() && record.curse_forge_id == ids.curseforge)
                    || (ids.modrinth.is_some() && record.modrinth_id == ids.modrinth)
            })
            .collect()
    }
}

fn compatible<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Merge `ids` into the first group it shares an id with, else start a group
fn absorb(groups: &mut Vec<PackageIds>, ids: PackageIds) {
    let shares_id = |group: &PackageIds| {
        (group.curseforge.is_some() && group.curseforge == ids.curseforge)
            || (group.modrinth.is_some() && group.modrinth == ids.modrinth)
    };
    let target = groups.iter_mut().find(|group| {
        shares_id(group)
            && compatible(&group.curseforge, &ids.curseforge)
            && compatible(&group.modrinth, &ids.modrinth)
    });
    match target {
        Some(group) => {
            group.curseforge = group.curseforge.or(ids.curseforge);
            if group.modrinth.is_none() {
                group.modrinth = ids.modrinth;
            }
        }
        None => groups.push(ids),
    }
}
