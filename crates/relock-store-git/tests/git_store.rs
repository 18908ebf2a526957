use std::collections::BTreeMap;

use relock_core::{Error, ImageRef, LockDocument, LockMetadata, ServiceLock};
use relock_store::VersionedLockStore;
use relock_store_git::{init_git_repo, read_commit_context, GitLockStore};
use tempfile::tempdir;

fn lock_at(base_sha: &str) -> LockDocument {
    let mut services = BTreeMap::new();
    services.insert(
        "catalog".to_string(),
        ServiceLock {
            submodule_path: "services/catalog".into(),
            git_sha: "234e5bda7f00000000000000000000000000beef".into(),
            image: ImageRef {
                repository: "ghcr.io/x/catalog".into(),
                tag: "234e5bd".into(),
                digest: None,
            },
        },
    );
    LockDocument {
        metadata: LockMetadata {
            generated_at: "2026-01-05T12:00:00Z".into(),
            generator_id: "relock@v1".into(),
            source_branch: "dev".into(),
            monorepo_commit_sha: base_sha.into(),
        },
        services,
    }
}

#[test]
fn commit_get_and_staleness_against_real_repo() {
    let dir = tempdir().unwrap();
    init_git_repo(dir.path()).unwrap();
    let store = GitLockStore::new(dir.path());

    let tip = store.branch_tip("main").unwrap();
    let lock = lock_at(&tip);

    let committed = store.commit(&lock, "main").unwrap();
    assert_ne!(committed.as_str(), tip, "lock commit should advance the branch");

    let fetched = store.get("main").unwrap();
    assert_eq!(fetched, lock);

    // The branch advanced (by the lock commit itself); a lock still
    // captured against the old tip must now be rejected.
    let stale = store.commit(&lock_at(&tip), "main").unwrap_err();
    assert!(matches!(stale, Error::StaleLock { .. }));

    // A lock regenerated against the current tip commits cleanly.
    let new_tip = store.branch_tip("main").unwrap();
    let refreshed = store.commit(&lock_at(&new_tip), "main").unwrap();
    assert_ne!(refreshed.as_str(), new_tip);
}

#[test]
fn get_without_lock_is_not_found() {
    let dir = tempdir().unwrap();
    init_git_repo(dir.path()).unwrap();
    let store = GitLockStore::new(dir.path());
    assert!(matches!(store.get("main"), Err(Error::NotFound(_))));
}

#[test]
fn archive_refuses_overwrite() {
    let dir = tempdir().unwrap();
    init_git_repo(dir.path()).unwrap();
    let store = GitLockStore::new(dir.path());

    let tip = store.branch_tip("main").unwrap();
    let lock = lock_at(&tip);
    store.archive(&lock, "v1.0.0").unwrap();
    assert!(matches!(
        store.archive(&lock, "v1.0.0"),
        Err(Error::Conflict { .. })
    ));
    assert!(dir.path().join("locks/archive/v1.0.0.yml").exists());
}

#[test]
fn commit_context_reads_head_and_branch() {
    let dir = tempdir().unwrap();
    init_git_repo(dir.path()).unwrap();
    let ctx = read_commit_context(dir.path()).unwrap();
    assert_eq!(ctx.source_branch, "main");
    assert_eq!(ctx.monorepo_sha.len(), 40);
    // Fixture has no submodules; the map is simply empty.
    assert!(ctx.submodules.is_empty());
}
