use std::collections::HashMap;
use std::sync::Mutex;

use relock_core::{ArtifactHandle, CommitRef, Error, LockDocument, Result, RunId};

use crate::traits::{ArtifactStore, VersionedLockStore};

/// In-memory stores for tests. Not durable, but they honor the same
/// conflict and staleness semantics as the git-backed implementation.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    inner: Mutex<HashMap<String, LockDocument>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put_artifact(
        &self,
        lock: &LockDocument,
        run_id: &RunId,
        force: bool,
    ) -> Result<ArtifactHandle> {
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(run_id.as_str()) && !force {
            return Err(Error::Conflict { what: "lock artifact", key: run_id.0.clone() });
        }
        inner.insert(run_id.0.clone(), lock.clone());
        Ok(ArtifactHandle {
            run_id: run_id.clone(),
            location: format!("mem://artifacts/{}", run_id.as_str()),
        })
    }

    fn get_artifact(&self, run_id: &RunId) -> Result<LockDocument> {
        let inner = self.inner.lock().unwrap();
        inner
            .get(run_id.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("artifact for run '{}'", run_id.as_str())))
    }
}

#[derive(Default)]
struct BranchState {
    tip: String,
    lock: Option<LockDocument>,
}

#[derive(Default)]
pub struct InMemoryLockStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    branches: HashMap<String, BranchState>,
    archives: HashMap<String, LockDocument>,
    commit_seq: u64,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: move a branch tip, as an unrelated merge would.
    pub fn set_branch_tip(&self, branch: &str, sha: &str) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.branches.entry(branch.to_string()).or_default();
        state.tip = sha.to_string();
    }

    pub fn archived(&self, release_tag: &str) -> Option<LockDocument> {
        self.inner.lock().unwrap().archives.get(release_tag).cloned()
    }
}

impl VersionedLockStore for InMemoryLockStore {
    fn commit(&self, lock: &LockDocument, target_branch: &str) -> Result<CommitRef> {
        let mut inner = self.inner.lock().unwrap();
        let tip = inner
            .branches
            .get(target_branch)
            .map(|s| s.tip.clone())
            .unwrap_or_default();
        if tip != lock.metadata.monorepo_commit_sha {
            return Err(Error::StaleLock {
                branch: target_branch.to_string(),
                branch_sha: tip,
                lock_sha: lock.metadata.monorepo_commit_sha.clone(),
            });
        }
        inner.commit_seq += 1;
        let commit = format!("mem{:038}", inner.commit_seq);
        let state = inner.branches.entry(target_branch.to_string()).or_default();
        state.lock = Some(lock.clone());
        state.tip = commit.clone();
        Ok(CommitRef(commit))
    }

    fn get(&self, target_branch: &str) -> Result<LockDocument> {
        let inner = self.inner.lock().unwrap();
        inner
            .branches
            .get(target_branch)
            .and_then(|s| s.lock.clone())
            .ok_or_else(|| Error::NotFound(format!("committed lock on branch '{target_branch}'")))
    }

    fn archive(&self, lock: &LockDocument, release_tag: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.archives.contains_key(release_tag) {
            return Err(Error::Conflict { what: "archived lock", key: release_tag.to_string() });
        }
        inner.archives.insert(release_tag.to_string(), lock.clone());
        Ok(())
    }
}
