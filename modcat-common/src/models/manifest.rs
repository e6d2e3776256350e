//! Catalog record (one package for one loader) and its artifacts

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::identifier::GenericIdentifier;
use crate::version::compare_versions;
use crate::Result;

/// Dependency edges of one artifact, as generic identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub required: BTreeSet<String>,
    #[serde(default)]
    pub incompatible: BTreeSet<String>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.incompatible.is_empty()
    }

    /// Union in the edges of `other`
    pub fn merge(&mut self, other: Dependencies) {
        self.required.extend(other.required);
        self.incompatible.extend(other.incompatible);
    }
}

/// One downloadable file, deduplicated by content hash within a loader bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFile {
    pub file_name: String,
    /// Newest first
    #[serde(rename = "mcVersions")]
    pub supported_versions: Vec<String>,
    #[serde(rename = "sha512")]
    pub content_hash: String,
    pub download_urls: Vec<String>,
    #[serde(rename = "curseDownloadAvailable")]
    pub curseforge_mirror_available: bool,
    #[serde(default)]
    pub dependencies: Dependencies,
}

impl VersionFile {
    /// Newest supported game version, if any
    pub fn newest_version(&self) -> Option<&str> {
        self.supported_versions.first().map(String::as_str)
    }

    /// Add a download URL unless it is already listed
    pub fn add_download_url(&mut self, url: &str) -> bool {
        if self.download_urls.iter().any(|existing| existing == url) {
            return false;
        }
        self.download_urls.push(url.to_string());
        true
    }
}

/// A link that is neither the issue tracker nor the source repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OtherLink {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Links {
    pub issues: Option<String>,
    pub source_control: Option<String>,
    #[serde(default)]
    pub other: Vec<OtherLink>,
}

impl Links {
    /// Append `link` unless a structurally equal one is present
    pub fn push_other(&mut self, link: OtherLink) {
        if !self.other.contains(&link) {
            self.other.push(link);
        }
    }
}

/// Fully merged description of one package for one loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestJson {
    pub index_version: String,
    pub generic_identifier: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub author: String,
    pub license: Option<String>,
    pub curse_forge_id: Option<u32>,
    pub modrinth_id: Option<String>,
    pub links: Links,
    pub files: Vec<VersionFile>,
}

impl ManifestJson {
    pub fn parsed_identifier(&self) -> Result<GenericIdentifier> {
        self.generic_identifier.parse()
    }

    /// `<generic identifier>:<short hash>` for every artifact
    pub fn artifact_identifiers(&self) -> Result<Vec<String>> {
        let gid = self.parsed_identifier()?;
        Ok(self
            .files
            .iter()
            .map(|file| gid.artifact_identifier(&file.content_hash))
            .collect())
    }

    /// Sort artifacts newest first by their newest supported version
    pub fn sort_files(files: &mut [VersionFile]) {
        files.sort_by(|a, b| {
            compare_versions(b.newest_version().unwrap_or(""), a.newest_version().unwrap_or(""))
        });
    }

    pub fn has_source_id(&self) -> bool {
        self.curse_forge_id.is_some() || self.modrinth_id.is_some()
    }
}
