use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ids::RunId, types::*};

/// Container image coordinates for one service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// One service's build coordinates as produced by the resolver.
/// Immutable once created; a new lock supersedes, never mutates.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceBuildRef {
    pub service_name: String,
    pub submodule_path: String,
    pub git_sha: String,
    pub image: ImageRef,
}

/// Persisted per-service entry inside a lock document. The service name is
/// the mapping key, so it is not repeated here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceLock {
    pub submodule_path: String,
    pub git_sha: String,
    pub image: ImageRef,
}

impl ServiceBuildRef {
    pub fn into_entry(self) -> (String, ServiceLock) {
        (
            self.service_name,
            ServiceLock {
                submodule_path: self.submodule_path,
                git_sha: self.git_sha,
                image: self.image,
            },
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockMetadata {
    pub generated_at: String,
    pub generator_id: String,
    pub source_branch: String,
    pub monorepo_commit_sha: String,
}

/// The atomic unit of promotion: every configured service pinned to a
/// commit/image pair. Once committed to an environment branch the document
/// is promoted unchanged, never regenerated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockDocument {
    pub metadata: LockMetadata,
    pub services: BTreeMap<String, ServiceLock>,
}

/// Handle to a transient lock artifact scoped to a single pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub run_id: RunId,
    pub location: String,
}

/// Which lock a promotion run operated on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LockRef {
    Artifact { run_id: RunId },
    Committed { branch: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeResult {
    pub target: String,
    pub status: ProbeStatus,
}

/// Outcome of one pre-deploy health gate pass. Created fresh per promotion
/// attempt and consumed once; never persisted beyond the run's audit log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentHealthReport {
    pub environment: Environment,
    pub checked_at_unix: i64,
    pub targets: Vec<ProbeResult>,
}

impl EnvironmentHealthReport {
    /// Overall UP only if every probed target reports UP. `Unknown`
    /// targets (gateway short-circuit) count as not-up.
    pub fn overall_up(&self) -> bool {
        !self.targets.is_empty() && self.targets.iter().all(|t| t.status.is_up())
    }

    pub fn down_targets(&self) -> Vec<&ProbeResult> {
        self.targets
            .iter()
            .filter(|t| matches!(t.status, ProbeStatus::Down { .. }))
            .collect()
    }
}

/// One execution of a pipeline stage. `decision` moves off `Pending`
/// exactly once; a halted run is terminal and retry means a new run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromotionRun {
    pub id: RunId,
    pub stage: Stage,
    pub state: RunState,
    pub lock_ref: Option<LockRef>,
    pub health_report: Option<EnvironmentHealthReport>,
    pub test_outcome: Option<TestOutcome>,
    pub decision: Decision,
}

impl PromotionRun {
    pub fn new(stage: Stage) -> Self {
        Self {
            id: RunId::new(),
            stage,
            state: RunState::Pending,
            lock_ref: None,
            health_report: None,
            test_outcome: None,
            decision: Decision::Pending,
        }
    }

    /// Terminal halt: irreversible for this run, a retry is a new run.
    pub fn halt(&mut self, reason: HaltReason) {
        self.state = RunState::Halted;
        self.decision = Decision::Halt { reason };
    }
}

/// First 7 hex characters of a full commit hash, used as the compact image
/// tag component.
pub fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(7)]
}

pub fn is_full_sha(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// OCI content digest form: `sha256:` followed by 64 hex characters.
pub fn is_oci_digest(s: &str) -> bool {
    match s.strip_prefix("sha256:") {
        Some(rest) => rest.len() == 64 && rest.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sha_takes_seven() {
        assert_eq!(short_sha("234e5bda7f00000000000000000000000000beef"), "234e5bd");
    }

    #[test]
    fn full_sha_shape() {
        assert!(is_full_sha("234e5bda7f00000000000000000000000000beef"));
        assert!(!is_full_sha("234e5bd"));
        assert!(!is_full_sha("g34e5bda7f00000000000000000000000000beef"));
    }

    #[test]
    fn oci_digest_shape() {
        assert!(is_oci_digest(&format!("sha256:{}", "a".repeat(64))));
        assert!(!is_oci_digest("sha256:short"));
        assert!(!is_oci_digest("md5:whatever"));
    }

    #[test]
    fn report_overall_up_requires_all_up() {
        let mut report = EnvironmentHealthReport {
            environment: Environment::Staging,
            checked_at_unix: 0,
            targets: vec![
                ProbeResult { target: "gateway".into(), status: ProbeStatus::Up },
                ProbeResult { target: "catalog".into(), status: ProbeStatus::Up },
            ],
        };
        assert!(report.overall_up());
        report.targets.push(ProbeResult {
            target: "orders".into(),
            status: ProbeStatus::Down { detail: "HTTP 503".into() },
        });
        assert!(!report.overall_up());
        assert_eq!(report.down_targets().len(), 1);
        assert_eq!(report.down_targets()[0].target, "orders");
    }
}
