use relock_core::{ArtifactHandle, CommitRef, LockDocument, Result, RunId};

/// Transient, run-scoped lock storage (pre-merge pipeline artifacts).
pub trait ArtifactStore: Send + Sync {
    /// Store a copy scoped to one pipeline run. Never silently overwrites:
    /// a second put for the same run fails with `Conflict` unless `force`.
    fn put_artifact(&self, lock: &LockDocument, run_id: &RunId, force: bool)
        -> Result<ArtifactHandle>;

    fn get_artifact(&self, run_id: &RunId) -> Result<LockDocument>;
}

/// Versioned, committed lock state keyed by environment branch.
///
/// `commit` is serialized per branch by optimistic concurrency: the
/// staleness check against the lock's captured base commit is the lock
/// against races, not a mutex.
pub trait VersionedLockStore: Send + Sync {
    /// Write the lock as versioned state on the branch. Fails with
    /// `StaleLock` if the branch tip no longer matches the lock's
    /// `monorepo_commit_sha`.
    fn commit(&self, lock: &LockDocument, target_branch: &str) -> Result<CommitRef>;

    /// Fetch the committed lock; `NotFound` when the branch carries none.
    fn get(&self, target_branch: &str) -> Result<LockDocument>;

    /// Copy a lock into long-term storage keyed by release tag, for
    /// rollback. Append-only: an existing tag is never replaced.
    fn archive(&self, lock: &LockDocument, release_tag: &str) -> Result<()>;
}
