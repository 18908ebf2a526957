use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// One pipeline stage. Dev runs pre-merge against a PR; the other two run
/// after a merge landed on their branch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DevPr,
    StagingPostMerge,
    ProdPostMerge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DevPr => "dev_pr",
            Stage::StagingPostMerge => "staging_post_merge",
            Stage::ProdPostMerge => "prod_post_merge",
        }
    }

    /// Test suite invoked once a deploy for this stage succeeded.
    pub fn test_suite(&self) -> TestSuite {
        match self {
            Stage::DevPr => TestSuite::System,
            Stage::StagingPostMerge => TestSuite::EndToEnd,
            Stage::ProdPostMerge => TestSuite::Smoke,
        }
    }

    /// Environment this stage deploys into and health-checks.
    pub fn environment(&self) -> Environment {
        match self {
            Stage::DevPr | Stage::StagingPostMerge => Environment::Staging,
            Stage::ProdPostMerge => Environment::Production,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestSuite {
    System,
    EndToEnd,
    Smoke,
}

/// Outcome of a single health probe. `Unknown` means the probe was never
/// attempted because the gateway short-circuited the gate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Up,
    Down { detail: String },
    Unknown,
}

impl ProbeStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, ProbeStatus::Up)
    }
}

/// Explicit state of a promotion run as the controller drives it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    ResolvingLock,
    HealthChecking,
    Testing,
    Advanced,
    Halted,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    LockUnavailable,
    EnvironmentUnhealthy,
    TestsFailed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Advance,
    Halt { reason: HaltReason },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    #[default]
    Passed,
    Failed { detail: String },
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }
}
