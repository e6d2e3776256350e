//! Catalog index: the set of every published artifact identifier

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::identifier::split_artifact_identifier;
use crate::models::manifest::ManifestJson;
use crate::{Result, CURRENT_INDEX_VERSION};

/// Durable set of `<loader>:<slug>:<short hash>` identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexJson {
    pub index_version: String,
    pub identifiers: BTreeSet<String>,
}

impl Default for IndexJson {
    fn default() -> Self {
        Self {
            index_version: CURRENT_INDEX_VERSION.to_string(),
            identifiers: BTreeSet::new(),
        }
    }
}

impl IndexJson {
    /// Add every artifact identifier of `record` (idempotent)
    pub fn add_record(&mut self, record: &ManifestJson) -> Result<()> {
        self.identifiers.extend(record.artifact_identifiers()?);
        Ok(())
    }

    /// Remove every artifact identifier of `record` (idempotent)
    pub fn remove_record(&mut self, record: &ManifestJson) -> Result<()> {
        for identifier in record.artifact_identifiers()? {
            self.identifiers.remove(&identifier);
        }
        Ok(())
    }

    /// True if any artifact is published under `generic_identifier`
    pub fn contains_generic_identifier(&self, generic_identifier: &str) -> bool {
        let prefix = format!("{generic_identifier}:");
        self.identifiers
            .range(prefix.clone()..)
            .next()
            .is_some_and(|first| first.starts_with(&prefix))
    }

    /// Distinct generic identifiers present in the index
    pub fn generic_identifiers(&self) -> BTreeSet<String> {
        self.identifiers
            .iter()
            .filter_map(|identifier| split_artifact_identifier(identifier))
            .map(|(gid, _)| gid.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manifest::{Links, VersionFile};

    fn record(gid: &str, payloads: &[&str]) -> ManifestJson {
        ManifestJson {
            index_version: CURRENT_INDEX_VERSION.to_string(),
            generic_identifier: gid.to_string(),
            display_name: "Test".into(),
            author: "someone".into(),
            license: None,
            curse_forge_id: Some(1),
            modrinth_id: None,
            links: Links::default(),
            files: payloads
                .iter()
                .map(|p| VersionFile {
                    file_name: format!("{p}.jar"),
                    supported_versions: vec!["1.20.1".into()],
                    content_hash: crate::hashing::digest(p.as_bytes()),
                    download_urls: vec![],
                    curseforge_mirror_available: true,
                    dependencies: Default::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let r = record("fabric:a", &["one", "two"]);
        let mut index = IndexJson::default();
        index.add_record(&r).unwrap();
        index.add_record(&r).unwrap();
        assert_eq!(index.identifiers.len(), 2);

        index.remove_record(&r).unwrap();
        index.remove_record(&r).unwrap();
        assert!(index.identifiers.is_empty());
    }

    #[test]
    fn test_contains_generic_identifier_is_exact() {
        let mut index = IndexJson::default();
        index.add_record(&record("fabric:new_mod", &["x"])).unwrap();

        assert!(index.contains_generic_identifier("fabric:new_mod"));
        assert!(!index.contains_generic_identifier("fabric:new"));
        assert!(!index.contains_generic_identifier("forge:new_mod"));
    }

    #[test]
    fn test_generic_identifiers() {
        let mut index = IndexJson::default();
        index.add_record(&record("fabric:a", &["1", "2"])).unwrap();
        index.add_record(&record("forge:b", &["3"])).unwrap();
        let gids: Vec<_> = index.generic_identifiers().into_iter().collect();
        assert_eq!(gids, vec!["fabric:a", "forge:b"]);
    }
}
