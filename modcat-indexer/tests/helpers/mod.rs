//! Test Helper Utilities
//!
//! In-memory registries, downloads and index repository for testing
//! modcat-indexer without network access

#![allow(dead_code)]

pub mod fake_registry;
pub mod fake_repository;
pub mod fixtures;

// Re-export commonly used items
pub use fake_registry::{FakeFetcher, FakeMirror, FakeRegistry, SearchFault};
pub use fake_repository::{FakeRepository, RecordedCommit, RecordedPullRequest};
pub use fixtures::{artifact, builder, cf_url, jar, metadata, mr_url};
