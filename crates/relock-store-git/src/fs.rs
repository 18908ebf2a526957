use std::path::PathBuf;

use chrono::{DateTime, Utc};

use relock_core::{ArtifactHandle, Error, LockDocument, Result, RunId};
use relock_store::ArtifactStore;

/// Filesystem artifact store: one directory per pipeline run holding the
/// generated lock, uploaded by CI as the pre-merge build artifact.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    pub root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn lock_path(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str()).join("lock.yml")
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put_artifact(
        &self,
        lock: &LockDocument,
        run_id: &RunId,
        force: bool,
    ) -> Result<ArtifactHandle> {
        let path = self.lock_path(run_id);
        if path.exists() && !force {
            return Err(Error::Conflict { what: "lock artifact", key: run_id.0.clone() });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, relock_lock::to_yaml(lock)?)?;
        Ok(ArtifactHandle { run_id: run_id.clone(), location: path.display().to_string() })
    }

    fn get_artifact(&self, run_id: &RunId) -> Result<LockDocument> {
        let path = self.lock_path(run_id);
        let yaml = std::fs::read_to_string(&path)
            .map_err(|_| Error::NotFound(format!("artifact for run '{}'", run_id.as_str())))?;
        relock_lock::from_yaml(&yaml)
    }
}

/// Default artifact file name for CLI-generated locks,
/// e.g. `lock-20260105T120000Z.yml`.
pub fn timestamped_lock_name(now: DateTime<Utc>) -> String {
    format!("lock-{}.yml", now.format("%Y%m%dT%H%M%SZ"))
}
