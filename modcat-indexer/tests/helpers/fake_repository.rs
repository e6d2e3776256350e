//! In-memory index repository
//!
//! Serves the catalog from a file map and records every write so tests can
//! assert on commits, pull requests and merges.

use async_trait::async_trait;
use modcat_common::identifier::GenericIdentifier;
use modcat_common::{IndexJson, ManifestJson};
use modcat_indexer::services::github_client::INDEX_PATH;
use modcat_indexer::services::index_store::IndexStore;
use modcat_indexer::services::source_control::{BranchRef, FileChanges, SourceControlBackend};
use modcat_indexer::BackendError;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone)]
pub struct RecordedCommit {
    pub branch: String,
    pub message: String,
    pub changes: FileChanges,
    pub oid: String,
}

impl RecordedCommit {
    pub fn added_paths(&self) -> Vec<&str> {
        self.changes.additions.iter().map(|a| a.path.as_str()).collect()
    }

    pub fn added_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.changes
            .additions
            .iter()
            .find(|a| a.path == path)
            .map(|a| serde_json::from_slice(&a.contents).unwrap())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedPullRequest {
    pub number: u64,
    pub from: String,
    pub to: String,
    pub title: String,
    pub body: Option<String>,
}

pub struct FakeRepository {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    branches: Mutex<BTreeMap<String, String>>,
    created_refs: Mutex<Vec<String>>,
    resets: Mutex<Vec<(String, String)>>,
    commits: Mutex<Vec<RecordedCommit>>,
    pull_requests: Mutex<Vec<RecordedPullRequest>>,
    merges: Mutex<Vec<(String, String)>>,
}

impl FakeRepository {
    /// Repository without a catalog index
    pub fn empty() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(DEFAULT_BRANCH.to_string(), "oid-0".to_string());
        Self {
            files: Mutex::new(BTreeMap::new()),
            branches: Mutex::new(branches),
            created_refs: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            pull_requests: Mutex::new(Vec::new()),
            merges: Mutex::new(Vec::new()),
        }
    }

    /// Repository publishing exactly `records`
    pub fn with_records(records: &[ManifestJson]) -> Self {
        let repo = Self::empty();
        let mut index = IndexJson::default();
        for record in records {
            index.add_record(record).unwrap();
            let gid: GenericIdentifier = record.generic_identifier.parse().unwrap();
            repo.put_file(&gid.record_path(), serde_json::to_vec(record).unwrap());
        }
        repo.put_file(INDEX_PATH, serde_json::to_vec(&index).unwrap());
        repo
    }

    pub fn put_file(&self, path: &str, contents: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), contents);
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn add_branch(&self, name: &str, oid: &str) {
        self.branches
            .lock()
            .unwrap()
            .insert(name.to_string(), oid.to_string());
    }

    pub fn branch_oid(&self, name: &str) -> Option<String> {
        self.branches.lock().unwrap().get(name).cloned()
    }

    pub fn created_refs(&self) -> Vec<String> {
        self.created_refs.lock().unwrap().clone()
    }

    /// `(branch, oid)` of every forced reset
    pub fn resets(&self) -> Vec<(String, String)> {
        self.resets.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.commits.lock().unwrap().clone()
    }

    pub fn pull_requests(&self) -> Vec<RecordedPullRequest> {
        self.pull_requests.lock().unwrap().clone()
    }

    /// `(into, from)` of every direct merge
    pub fn merges(&self) -> Vec<(String, String)> {
        self.merges.lock().unwrap().clone()
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>, BackendError> {
        let files = self.files.lock().unwrap();
        let Some(bytes) = files.get(path) else {
            return Ok(None);
        };
        serde_json::from_slice(bytes)
            .map(Some)
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl IndexStore for FakeRepository {
    async fn download_catalog_index(&self) -> Result<Option<IndexJson>, BackendError> {
        self.read_json(INDEX_PATH)
    }

    async fn download_record(
        &self,
        generic_identifier: &str,
    ) -> Result<Option<ManifestJson>, BackendError> {
        let gid: GenericIdentifier = generic_identifier
            .parse()
            .map_err(|e: modcat_common::Error| BackendError::Parse(e.to_string()))?;
        self.read_json(&gid.record_path())
    }
}

#[async_trait]
impl SourceControlBackend for FakeRepository {
    async fn default_branch_ref(&self) -> Result<BranchRef, BackendError> {
        let oid = self
            .branch_oid(DEFAULT_BRANCH)
            .ok_or_else(|| BackendError::MissingRef(DEFAULT_BRANCH.to_string()))?;
        Ok(BranchRef {
            name: DEFAULT_BRANCH.to_string(),
            oid,
        })
    }

    async fn does_ref_exist(&self, branch: &str) -> Result<bool, BackendError> {
        Ok(self.branch_oid(branch).is_some())
    }

    async fn create_ref(&self, from: &BranchRef, new_branch: &str) -> Result<BranchRef, BackendError> {
        self.add_branch(new_branch, &from.oid);
        self.created_refs.lock().unwrap().push(new_branch.to_string());
        Ok(BranchRef {
            name: new_branch.to_string(),
            oid: from.oid.clone(),
        })
    }

    async fn reset_ref(&self, to: &BranchRef, branch: &str) -> Result<BranchRef, BackendError> {
        if self.branch_oid(branch).is_none() {
            return Err(BackendError::MissingRef(branch.to_string()));
        }
        self.add_branch(branch, &to.oid);
        self.resets
            .lock()
            .unwrap()
            .push((branch.to_string(), to.oid.clone()));
        Ok(BranchRef {
            name: branch.to_string(),
            oid: to.oid.clone(),
        })
    }

    async fn commit_and_update_ref(
        &self,
        branch: &str,
        message: &str,
        changes: &FileChanges,
    ) -> Result<String, BackendError> {
        if self.branch_oid(branch).is_none() {
            return Err(BackendError::MissingRef(branch.to_string()));
        }
        let mut commits = self.commits.lock().unwrap();
        let oid = format!("oid-{}", commits.len() + 1);
        commits.push(RecordedCommit {
            branch: branch.to_string(),
            message: message.to_string(),
            changes: changes.clone(),
            oid: oid.clone(),
        });
        drop(commits);
        self.add_branch(branch, &oid);
        Ok(oid)
    }

    async fn create_pull_request(
        &self,
        from: &str,
        to: &str,
        title: &str,
        body: Option<&str>,
    ) -> Result<u64, BackendError> {
        let mut pull_requests = self.pull_requests.lock().unwrap();
        let number = pull_requests.len() as u64 + 1;
        pull_requests.push(RecordedPullRequest {
            number,
            from: from.to_string(),
            to: to.to_string(),
            title: title.to_string(),
            body: body.map(str::to_string),
        });
        Ok(number)
    }

    async fn find_open_pull_request(&self, from: &str, to: &str) -> Result<Option<u64>, BackendError> {
        Ok(self
            .pull_requests
            .lock()
            .unwrap()
            .iter()
            .find(|pr| pr.from == from && pr.to == to)
            .map(|pr| pr.number))
    }

    async fn merge_branch_without_pr(
        &self,
        into: &str,
        from: &str,
        _message: &str,
    ) -> Result<(), BackendError> {
        if let Some(oid) = self.branch_oid(from) {
            self.add_branch(into, &oid);
        }
        self.merges
            .lock()
            .unwrap()
            .push((into.to_string(), from.to_string()));
        Ok(())
    }
}
