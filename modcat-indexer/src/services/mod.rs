//! Service modules for catalog indexing
//!
//! - Remote boundaries: registry traits and the CurseForge, Modrinth and GitHub clients
//! - Merge engine: dependency resolution, artifact merging, record building
//! - Review: reconciliation, conflict hand-off, publishing
//! - Orchestration: crawl scheduler and index run

pub mod conflicts;
pub mod crawl_scheduler;
pub mod credentials;
pub mod curseforge_client;
pub mod dependency_resolver;
pub mod downloader;
pub mod github_client;
pub mod http;
pub mod index_run;
pub mod index_store;
pub mod manifest_builder;
pub mod modrinth_client;
pub mod publish;
pub mod rate_limit;
pub mod reconciliation;
pub mod registry;
pub mod source_control;
pub mod source_merger;

pub use conflicts::{ChannelConflictNotifier, ConflictNotifier, LoggingConflictNotifier};
pub use crawl_scheduler::{CrawlScheduler, CrawlStats, CrawlTarget, KnownPackages};
pub use credentials::{Credential, CredentialIssuer, CredentialProvider, StaticTokenIssuer};
pub use curseforge_client::CurseForgeClient;
pub use dependency_resolver::DependencyResolver;
pub use downloader::HttpFetcher;
pub use github_client::{GitHubBackend, GitHubClient};
pub use index_run::{IndexRun, RunOptions, RunReport};
pub use index_store::{CatalogSnapshot, IndexStore};
pub use manifest_builder::{BuildOutput, ManifestBuilder, PackageIds, SourcePreference};
pub use modrinth_client::ModrinthClient;
pub use publish::{PublishBatch, PublishResult, PublishSettings, Publisher};
pub use rate_limit::{RateLimitGate, RateLimitSignal};
pub use reconciliation::{reconcile, ReviewOutcome, ReviewState};
pub use registry::{
    ArtifactFetcher, PackageMetadata, PackageRef, Registry, ReleaseMirror, RepositorySlug,
};
pub use source_control::{BranchRef, FileAddition, FileChanges, SourceControlBackend};
pub use source_merger::{ArtifactTable, SourceMerger};
