//! Builders for artifacts, metadata and wired-up record builders

use modcat_indexer::services::dependency_resolver::DependencyResolver;
use modcat_indexer::services::manifest_builder::{ManifestBuilder, SourcePreference};
use modcat_indexer::services::registry::{
    DeclaredDependency, PackageMetadata, Registry, ReleaseMirror, RemoteArtifact,
};
use modcat_indexer::services::source_merger::SourceMerger;
use std::sync::Arc;

use super::fake_registry::{FakeFetcher, FakeMirror, FakeRegistry};

/// Distinct archive bytes per label
pub fn jar(label: &str) -> Vec<u8> {
    format!("PK\u{3}\u{4} test archive {label}").into_bytes()
}

pub fn mr_url(file_name: &str) -> String {
    format!("https://cdn.modrinth.com/data/{file_name}")
}

pub fn cf_url(file_name: &str) -> String {
    format!("https://edge.forgecdn.net/files/{file_name}")
}

pub fn artifact(file_name: &str, versions: &[&str], url: &str) -> RemoteArtifact {
    RemoteArtifact {
        file_name: file_name.to_string(),
        game_versions: versions.iter().map(|v| v.to_string()).collect(),
        download_url: Some(url.to_string()),
        dependencies: Vec::new(),
    }
}

pub fn artifact_with_dependencies(
    file_name: &str,
    versions: &[&str],
    url: &str,
    dependencies: Vec<DeclaredDependency>,
) -> RemoteArtifact {
    RemoteArtifact {
        dependencies,
        ..artifact(file_name, versions, url)
    }
}

pub fn metadata(display_name: &str) -> PackageMetadata {
    PackageMetadata {
        display_name: display_name.to_string(),
        author: Some("modder".to_string()),
        license: Some("MIT".to_string()),
        issues_url: None,
        source_url: None,
        other_links: Vec::new(),
    }
}

/// Record builder over fakes, with a fresh dependency cache
pub fn builder(
    curseforge: Option<Arc<FakeRegistry>>,
    modrinth: Option<Arc<FakeRegistry>>,
    mirror: Option<Arc<FakeMirror>>,
    fetcher: Arc<FakeFetcher>,
    preference: SourcePreference,
) -> ManifestBuilder {
    let merger = SourceMerger::new(fetcher, Arc::new(DependencyResolver::new()));
    ManifestBuilder::new(
        curseforge.map(|r| r as Arc<dyn Registry>),
        modrinth.map(|r| r as Arc<dyn Registry>),
        mirror.map(|m| m as Arc<dyn ReleaseMirror>),
        merger,
        preference,
    )
}
