use std::path::{Path, PathBuf};
use std::process::Command;

use relock_core::{CommitRef, Error, LockDocument, Result};
use relock_resolve::CommitContext;
use relock_store::VersionedLockStore;

/// Versioned lock store backed by a git branch. The lock lives at a fixed
/// path on each environment branch; concurrency control is the optimistic
/// staleness check against the branch tip, not a mutex.
#[derive(Clone, Debug)]
pub struct GitLockStore {
    pub repo_root: PathBuf,
    pub lock_path: String,
    pub archive_dir: String,
}

impl GitLockStore {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            lock_path: "locks/lock.yml".to_string(),
            archive_dir: "locks/archive".to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        run_git(&self.repo_root, args)
    }

    pub fn branch_tip(&self, branch: &str) -> Result<String> {
        self.run(&["rev-parse", branch])
    }

    fn ensure_on_branch(&self, branch: &str) -> Result<()> {
        let head = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if head != branch {
            self.run(&["checkout", branch])?;
        }
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!out.is_empty())
    }

    fn stage_and_commit(&self, path: &str, message: &str) -> Result<CommitRef> {
        self.run(&["add", path])?;
        if !self.has_staged_changes()? {
            // Identical content already committed; landing is idempotent.
            return Ok(CommitRef(self.run(&["rev-parse", "HEAD"])?));
        }
        self.run(&["commit", "-m", message])?;
        Ok(CommitRef(self.run(&["rev-parse", "HEAD"])?))
    }
}

impl VersionedLockStore for GitLockStore {
    fn commit(&self, lock: &LockDocument, target_branch: &str) -> Result<CommitRef> {
        let tip = self.branch_tip(target_branch)?;
        if tip != lock.metadata.monorepo_commit_sha {
            return Err(Error::StaleLock {
                branch: target_branch.to_string(),
                branch_sha: tip,
                lock_sha: lock.metadata.monorepo_commit_sha.clone(),
            });
        }

        self.ensure_on_branch(target_branch)?;
        let dest = self.repo_root.join(&self.lock_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, relock_lock::to_yaml(lock)?)?;
        self.stage_and_commit(
            &self.lock_path,
            &format!("relock: pin services for {target_branch}"),
        )
    }

    fn get(&self, target_branch: &str) -> Result<LockDocument> {
        let spec = format!("{target_branch}:{}", self.lock_path);
        let yaml = self
            .run(&["show", &spec])
            .map_err(|_| Error::NotFound(format!("committed lock on branch '{target_branch}'")))?;
        relock_lock::from_yaml(&yaml)
    }

    fn archive(&self, lock: &LockDocument, release_tag: &str) -> Result<()> {
        let rel = format!("{}/{release_tag}.yml", self.archive_dir);
        let dest = self.repo_root.join(&rel);
        if dest.exists() {
            return Err(Error::Conflict { what: "archived lock", key: release_tag.to_string() });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, relock_lock::to_yaml(lock)?)?;
        self.stage_and_commit(&rel, &format!("relock: archive lock for {release_tag}"))?;
        Ok(())
    }
}

/// Gather the commit context the resolver works from: monorepo tip, the
/// checked-out branch, and every submodule's pinned SHA.
pub fn read_commit_context(repo_root: &Path) -> Result<CommitContext> {
    let monorepo_sha = run_git(repo_root, &["rev-parse", "HEAD"])?;
    let source_branch = run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;

    let mut submodules = std::collections::BTreeMap::new();
    let status = run_git(repo_root, &["submodule", "status", "--recursive"])?;
    for line in status.lines() {
        let line = line.trim_start_matches(['+', '-', 'U']);
        let mut parts = line.split_whitespace();
        let (Some(sha), Some(path)) = (parts.next(), parts.next()) else {
            continue;
        };
        submodules.insert(path.to_string(), sha.to_string());
    }

    Ok(CommitContext { monorepo_sha, source_branch, submodules })
}

fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| Error::Git(format!("spawn git {args:?}: {e}")))?;
    if !out.status.success() {
        return Err(Error::Git(format!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Initialize a minimal git repo fixture with one commit. Test helper.
pub fn init_git_repo(dir: &Path) -> Result<()> {
    run_git(dir, &["init", "-b", "main"])?;
    run_git(dir, &["config", "user.email", "relock@example.com"])?;
    run_git(dir, &["config", "user.name", "relock"])?;
    std::fs::write(dir.join("README.md"), "fixture")?;
    run_git(dir, &["add", "."])?;
    run_git(dir, &["commit", "-m", "init"])?;
    Ok(())
}
