//! Record building across CurseForge, Modrinth and the release mirror
//!
//! All registries and downloads are in-memory fakes.

mod helpers;

use helpers::fixtures::artifact_with_dependencies;
use helpers::*;
use modcat_common::hashing::digest;
use modcat_common::{Loader, ThirdPartySource};
use modcat_indexer::services::manifest_builder::{PackageIds, SourcePreference};
use modcat_indexer::services::registry::{
    DeclaredDependency, DependencyRelation, PackageRef, RepositorySlug,
};
use std::sync::Arc;

const CF_ID: u32 = 394468;
const MR_ID: &str = "AANobbMI";

fn both_ids() -> PackageIds {
    PackageIds {
        curseforge: Some(CF_ID),
        modrinth: Some(MR_ID.to_string()),
    }
}

fn cf_ref() -> PackageRef {
    PackageRef::CurseForge(CF_ID)
}

fn mr_ref() -> PackageRef {
    PackageRef::Modrinth(MR_ID.to_string())
}

/// Both registries list the same fabric jar
fn shared_jar_setup() -> (Arc<FakeRegistry>, Arc<FakeRegistry>, Arc<FakeFetcher>, Vec<u8>) {
    let fetcher = Arc::new(FakeFetcher::new());
    let cf = Arc::new(FakeRegistry::curseforge());
    let mr = Arc::new(FakeRegistry::modrinth());

    cf.add_package(cf_ref(), metadata("Sodium"));
    mr.add_package(mr_ref(), metadata("Sodium"));

    let bytes = jar("sodium-0.5.3");
    fetcher.add(cf_url("sodium-0.5.3.jar"), bytes.clone());
    fetcher.add(mr_url("sodium-0.5.3.jar"), bytes.clone());
    cf.add_artifact(
        cf_ref(),
        Loader::Fabric,
        artifact("sodium-0.5.3.jar", &["1.20.1", "Fabric"], &cf_url("sodium-0.5.3.jar")),
    );
    mr.add_artifact(
        mr_ref(),
        Loader::Fabric,
        artifact("sodium-0.5.3.jar", &["1.20.1"], &mr_url("sodium-0.5.3.jar")),
    );

    (cf, mr, fetcher, bytes)
}

#[tokio::test]
async fn test_same_hash_from_both_registries_is_one_artifact() {
    let (cf, mr, fetcher, bytes) = shared_jar_setup();
    let records = builder(Some(cf), Some(mr), None, fetcher, SourcePreference::PreferModrinth);

    let output = records.build(&both_ids()).await;

    assert_eq!(output.records.len(), 1);
    let record = &output.records[0];
    assert_eq!(record.generic_identifier, "fabric:sodium");
    assert_eq!(record.display_name, "Sodium");
    assert_eq!(record.curse_forge_id, Some(CF_ID));
    assert_eq!(record.modrinth_id.as_deref(), Some(MR_ID));

    assert_eq!(record.files.len(), 1);
    let file = &record.files[0];
    assert_eq!(file.content_hash, digest(&bytes));
    assert_eq!(
        file.download_urls,
        vec![mr_url("sodium-0.5.3.jar"), cf_url("sodium-0.5.3.jar")]
    );
    assert!(file.curseforge_mirror_available);
    // Loader names listed among game versions are filtered out
    assert_eq!(file.supported_versions, vec!["1.20.1"]);

    assert!(output.usage.contains(ThirdPartySource::CurseForge));
    assert!(output.usage.contains(ThirdPartySource::Modrinth));
    assert!(!output.usage.contains(ThirdPartySource::GitHub));
}

#[tokio::test]
async fn test_preferred_registry_url_comes_first() {
    let (cf, mr, fetcher, _) = shared_jar_setup();
    let records = builder(Some(cf), Some(mr), None, fetcher, SourcePreference::PreferCurseForge);

    let output = records.build(&both_ids()).await;

    let file = &output.records[0].files[0];
    assert_eq!(
        file.download_urls,
        vec![cf_url("sodium-0.5.3.jar"), mr_url("sodium-0.5.3.jar")]
    );
    assert!(file.curseforge_mirror_available);
}

#[tokio::test]
async fn test_quilt_dependency_falls_back_to_fabric_and_forge_edge_is_dropped() {
    let fetcher = Arc::new(FakeFetcher::new());
    let mr = Arc::new(FakeRegistry::modrinth());

    let lithium = PackageRef::Modrinth("gvQqBUqZ".into());
    let fabric_api = PackageRef::Modrinth("P7dR8mSH".into());
    let unknown = PackageRef::Modrinth("missing0".into());

    mr.add_package(lithium.clone(), metadata("Lithium"));
    mr.add_package(fabric_api.clone(), metadata("Fabric API"));
    mr.add_artifact(
        fabric_api.clone(),
        Loader::Fabric,
        artifact("fabric-api.jar", &["1.20.1"], &mr_url("fabric-api.jar")),
    );

    let dependencies = vec![
        DeclaredDependency {
            package: fabric_api,
            relation: DependencyRelation::Required,
        },
        DeclaredDependency {
            package: unknown,
            relation: DependencyRelation::Incompatible,
        },
    ];
    for (loader, file) in [(Loader::Quilt, "lithium-quilt.jar"), (Loader::Forge, "lithium-forge.jar")] {
        fetcher.add(mr_url(file), jar(file));
        mr.add_artifact(
            lithium.clone(),
            loader,
            artifact_with_dependencies(file, &["1.20.1"], &mr_url(file), dependencies.clone()),
        );
    }

    let records = builder(None, Some(mr), None, fetcher, SourcePreference::PreferModrinth);
    let output = records.build(&PackageIds::modrinth("gvQqBUqZ")).await;

    let gids: Vec<&str> = output
        .records
        .iter()
        .map(|r| r.generic_identifier.as_str())
        .collect();
    assert_eq!(gids, vec!["forge:lithium", "quilt:lithium"]);

    let forge = &output.records[0].files[0].dependencies;
    assert!(forge.is_empty());

    let quilt = &output.records[1].files[0].dependencies;
    assert_eq!(
        quilt.required.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["fabric:fabric_api"]
    );
    assert!(quilt.incompatible.is_empty());
}

#[tokio::test]
async fn test_same_hash_merge_keeps_second_registry_dependencies() {
    let fetcher = Arc::new(FakeFetcher::new());
    let cf = Arc::new(FakeRegistry::curseforge());
    let mr = Arc::new(FakeRegistry::modrinth());
    cf.add_package(cf_ref(), metadata("Sodium"));
    mr.add_package(mr_ref(), metadata("Sodium"));

    let cf_fabric_api = PackageRef::CurseForge(306612);
    cf.add_package(cf_fabric_api.clone(), metadata("Fabric API"));
    cf.add_artifact(
        cf_fabric_api.clone(),
        Loader::Fabric,
        artifact("fabric-api.jar", &["1.20.1"], &cf_url("fabric-api.jar")),
    );

    let bytes = jar("sodium-0.5.3");
    fetcher.add(cf_url("sodium-0.5.3.jar"), bytes.clone());
    fetcher.add(mr_url("sodium-0.5.3.jar"), bytes);
    mr.add_artifact(
        mr_ref(),
        Loader::Fabric,
        artifact("sodium-0.5.3.jar", &["1.20.1"], &mr_url("sodium-0.5.3.jar")),
    );
    // Only CurseForge declares the edge
    cf.add_artifact(
        cf_ref(),
        Loader::Fabric,
        artifact_with_dependencies(
            "sodium-0.5.3.jar",
            &["1.20.1"],
            &cf_url("sodium-0.5.3.jar"),
            vec![DeclaredDependency {
                package: cf_fabric_api,
                relation: DependencyRelation::Required,
            }],
        ),
    );

    let records = builder(Some(cf), Some(mr), None, fetcher, SourcePreference::PreferModrinth);
    let output = records.build(&both_ids()).await;

    let files = &output.records[0].files;
    assert_eq!(files.len(), 1);
    assert!(files[0].curseforge_mirror_available);
    assert_eq!(
        files[0].dependencies.required.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["fabric:fabric_api"]
    );
}

#[tokio::test]
async fn test_release_mirror_only_augments_known_hashes() {
    let fetcher = Arc::new(FakeFetcher::new());
    let mr = Arc::new(FakeRegistry::modrinth());
    let mirror = Arc::new(FakeMirror::new());
    let repo = RepositorySlug::new("CaffeineMC", "sodium");

    let mut package = metadata("Sodium");
    package.license = None;
    package.source_url = Some("https://github.com/CaffeineMC/sodium".into());
    mr.add_package(mr_ref(), package);

    let bytes = jar("sodium-0.5.3");
    fetcher.add(mr_url("sodium.jar"), bytes.clone());
    mr.add_artifact(
        mr_ref(),
        Loader::Fabric,
        artifact("sodium.jar", &["1.20.1"], &mr_url("sodium.jar")),
    );

    let release_url = "https://github.com/CaffeineMC/sodium/releases/download/v0.5.3/sodium.jar";
    let unknown_url = "https://github.com/CaffeineMC/sodium/releases/download/v0.5.3/sodium-dev.jar";
    fetcher.add(release_url, bytes);
    fetcher.add(unknown_url, jar("sodium-dev"));
    mirror.add_asset(repo.clone(), "sodium.jar", release_url);
    mirror.add_asset(repo.clone(), "sodium-dev.jar", unknown_url);
    mirror.set_license(repo, "LGPL-3.0-only");

    let records = builder(
        None,
        Some(mr),
        Some(mirror),
        fetcher.clone(),
        SourcePreference::PreferModrinth,
    );
    let output = records.build(&PackageIds::modrinth(MR_ID)).await;

    let record = &output.records[0];
    assert_eq!(record.files.len(), 1);
    assert_eq!(
        record.files[0].download_urls,
        vec![mr_url("sodium.jar"), release_url.to_string()]
    );
    assert_eq!(record.license.as_deref(), Some("LGPL-3.0-only"));
    assert_eq!(
        record.links.source_control.as_deref(),
        Some("https://github.com/CaffeineMC/sodium")
    );
    assert_eq!(fetcher.fetch_count(unknown_url), 1);
    assert!(output.usage.contains(ThirdPartySource::GitHub));
}

#[tokio::test]
async fn test_package_without_artifacts_builds_nothing() {
    let fetcher = Arc::new(FakeFetcher::new());
    let mr = Arc::new(FakeRegistry::modrinth());
    mr.add_package(mr_ref(), metadata("Empty Mod"));

    let records = builder(None, Some(mr), None, fetcher, SourcePreference::PreferModrinth);
    let output = records.build(&PackageIds::modrinth(MR_ID)).await;

    assert!(output.records.is_empty());
    assert!(output.usage.contains(ThirdPartySource::Modrinth));
}

#[tokio::test]
async fn test_failing_registry_contributes_nothing() {
    let (cf, mr, fetcher, _) = shared_jar_setup();
    cf.fail_package(cf_ref());

    let records = builder(Some(cf), Some(mr), None, fetcher, SourcePreference::PreferModrinth);
    let output = records.build(&both_ids()).await;

    let record = &output.records[0];
    assert_eq!(record.files[0].download_urls, vec![mr_url("sodium-0.5.3.jar")]);
    assert!(!record.files[0].curseforge_mirror_available);
    // The id is kept: the registry did not say the package is gone
    assert_eq!(record.curse_forge_id, Some(CF_ID));

    assert!(!output.usage.contains(ThirdPartySource::CurseForge));
    assert!(output.usage.contains(ThirdPartySource::Modrinth));
}

#[tokio::test]
async fn test_unlisted_package_counts_as_answered() {
    let (cf, _, fetcher, _) = shared_jar_setup();
    // Modrinth no longer knows the package at all
    let mr = Arc::new(FakeRegistry::modrinth());

    let records = builder(Some(cf), Some(mr), None, fetcher, SourcePreference::PreferModrinth);
    let output = records.build(&both_ids()).await;

    let record = &output.records[0];
    assert_eq!(record.curse_forge_id, Some(CF_ID));
    assert_eq!(record.modrinth_id, None);
    assert!(output.usage.contains(ThirdPartySource::Modrinth));
    assert!(output.usage.contains(ThirdPartySource::CurseForge));
}

#[tokio::test]
async fn test_failed_download_skips_only_that_artifact() {
    let fetcher = Arc::new(FakeFetcher::new());
    let mr = Arc::new(FakeRegistry::modrinth());
    mr.add_package(mr_ref(), metadata("Sodium"));

    fetcher.add(mr_url("sodium-new.jar"), jar("new"));
    mr.add_artifact(
        mr_ref(),
        Loader::Fabric,
        artifact("sodium-new.jar", &["1.20.2"], &mr_url("sodium-new.jar")),
    );
    mr.add_artifact(
        mr_ref(),
        Loader::Fabric,
        artifact("sodium-broken.jar", &["1.20.1"], &mr_url("sodium-broken.jar")),
    );

    let records = builder(None, Some(mr), None, fetcher, SourcePreference::PreferModrinth);
    let output = records.build(&PackageIds::modrinth(MR_ID)).await;

    let files = &output.records[0].files;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "sodium-new.jar");
    assert!(output.usage.contains(ThirdPartySource::Modrinth));
}

#[tokio::test]
async fn test_artifacts_sorted_newest_first() {
    let fetcher = Arc::new(FakeFetcher::new());
    let mr = Arc::new(FakeRegistry::modrinth());
    mr.add_package(mr_ref(), metadata("Sodium"));

    for (file, version) in [("a.jar", "1.16.5"), ("b.jar", "1.20.1"), ("c.jar", "1.18.2")] {
        fetcher.add(mr_url(file), jar(file));
        mr.add_artifact(mr_ref(), Loader::Fabric, artifact(file, &[version], &mr_url(file)));
    }

    let records = builder(None, Some(mr), None, fetcher, SourcePreference::PreferModrinth);
    let output = records.build(&PackageIds::modrinth(MR_ID)).await;

    let names: Vec<&str> = output.records[0]
        .files
        .iter()
        .map(|f| f.file_name.as_str())
        .collect();
    assert_eq!(names, vec!["b.jar", "c.jar", "a.jar"]);
}
