//! Source-control backend boundary
//!
//! Every write is a single atomic commit of additions and deletions on one
//! branch; an API error leaves the repository untouched.

use async_trait::async_trait;

use crate::error::BackendError;

/// A branch and the commit it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub oid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAddition {
    pub path: String,
    pub contents: Vec<u8>,
}

/// File changes of one commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChanges {
    pub additions: Vec<FileAddition>,
    pub deletions: Vec<String>,
}

impl FileChanges {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.additions.len() + self.deletions.len()
    }
}

#[async_trait]
pub trait SourceControlBackend: Send + Sync {
    async fn default_branch_ref(&self) -> Result<BranchRef, BackendError>;

    async fn does_ref_exist(&self, branch: &str) -> Result<bool, BackendError>;

    /// Create `new_branch` pointing at `from`
    async fn create_ref(&self, from: &BranchRef, new_branch: &str)
        -> Result<BranchRef, BackendError>;

    /// Force `branch` to point at `to`, discarding commits only it carries
    async fn reset_ref(&self, to: &BranchRef, branch: &str) -> Result<BranchRef, BackendError>;

    /// Commit `changes` on top of `branch`, returning the new commit oid
    async fn commit_and_update_ref(
        &self,
        branch: &str,
        message: &str,
        changes: &FileChanges,
    ) -> Result<String, BackendError>;

    /// Open a pull request, returning its number
    async fn create_pull_request(
        &self,
        from: &str,
        to: &str,
        title: &str,
        body: Option<&str>,
    ) -> Result<u64, BackendError>;

    /// Number of an open pull request from `from` into `to`, if any
    async fn find_open_pull_request(&self, from: &str, to: &str) -> Result<Option<u64>, BackendError>;

    async fn merge_branch_without_pr(
        &self,
        into: &str,
        from: &str,
        message: &str,
    ) -> Result<(), BackendError>;
}
