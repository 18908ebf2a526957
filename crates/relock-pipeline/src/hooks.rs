use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

use relock_core::{Environment, LockDocument, TestOutcome, TestSuite};

use crate::config::CommandsConfig;

/// Opaque deploy trigger: hands the lock's image references to the external
/// deploy machinery for one environment. No deploy internals are owned here.
pub trait Deployer: Send + Sync {
    fn deploy(&self, lock: &LockDocument, environment: Environment) -> Result<()>;
}

/// Opaque test-suite trigger for the stage-appropriate suite.
pub trait TestRunner: Send + Sync {
    fn run_suite(&self, suite: TestSuite, environment: Environment) -> Result<TestOutcome>;
}

/// Opens the staging -> main promotion request carrying an existing lock.
/// The merge itself stays a human governance gate.
pub trait PromotionOpener: Send + Sync {
    fn open_promotion(&self, lock: &LockDocument, target_branch: &str) -> Result<()>;
}

/// Cuts the release tag at the final stage.
pub trait ReleaseTagger: Send + Sync {
    fn tag_release(&self, release_tag: &str, lock: &LockDocument) -> Result<()>;
}

/// Shells out to the configured external commands. The lock is written to
/// a scratch file and its path exported, so deploy tooling can read the
/// full document rather than a summary.
pub struct CommandHooks {
    pub commands: CommandsConfig,
    pub workdir: PathBuf,
}

impl CommandHooks {
    pub fn new(commands: CommandsConfig, workdir: PathBuf) -> Self {
        Self { commands, workdir }
    }

    fn lock_scratch_file(&self, lock: &LockDocument) -> Result<PathBuf> {
        let digest = relock_lock::content_digest(lock);
        let path = std::env::temp_dir().join(format!("relock-{}.yml", &digest[..12]));
        std::fs::write(&path, relock_lock::to_yaml(lock)?)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    fn run(&self, argv: &[String], envs: &[(&str, String)]) -> Result<std::process::Output> {
        let program = argv.first().ok_or_else(|| anyhow!("empty command configured"))?;
        let mut cmd = Command::new(program);
        cmd.args(&argv[1..]).current_dir(&self.workdir);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        cmd.output().with_context(|| format!("run {argv:?}"))
    }

    fn run_checked(&self, argv: &[String], envs: &[(&str, String)]) -> Result<()> {
        let out = self.run(argv, envs)?;
        if !out.status.success() {
            return Err(anyhow!(
                "command failed: {:?}\nstdout:{}\nstderr:{}",
                argv,
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            ));
        }
        Ok(())
    }
}

impl Deployer for CommandHooks {
    fn deploy(&self, lock: &LockDocument, environment: Environment) -> Result<()> {
        let lock_file = self.lock_scratch_file(lock)?;
        self.run_checked(
            &self.commands.deploy,
            &[
                ("RELOCK_ENVIRONMENT", environment.as_str().to_string()),
                ("RELOCK_LOCK_FILE", lock_file.display().to_string()),
            ],
        )
    }
}

impl TestRunner for CommandHooks {
    fn run_suite(&self, suite: TestSuite, environment: Environment) -> Result<TestOutcome> {
        let suite_name = match suite {
            TestSuite::System => "system",
            TestSuite::EndToEnd => "e2e",
            TestSuite::Smoke => "smoke",
        };
        let out = self.run(
            &self.commands.tests,
            &[
                ("RELOCK_ENVIRONMENT", environment.as_str().to_string()),
                ("RELOCK_SUITE", suite_name.to_string()),
            ],
        )?;
        if out.status.success() {
            Ok(TestOutcome::Passed)
        } else {
            // A failing suite is a routine outcome, not an invocation error.
            Ok(TestOutcome::Failed {
                detail: format!(
                    "{suite_name} suite exited {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            })
        }
    }
}

impl PromotionOpener for CommandHooks {
    fn open_promotion(&self, lock: &LockDocument, target_branch: &str) -> Result<()> {
        let lock_file = self.lock_scratch_file(lock)?;
        self.run_checked(
            &self.commands.open_promotion,
            &[
                ("RELOCK_TARGET_BRANCH", target_branch.to_string()),
                ("RELOCK_LOCK_FILE", lock_file.display().to_string()),
            ],
        )
    }
}

impl ReleaseTagger for CommandHooks {
    fn tag_release(&self, release_tag: &str, lock: &LockDocument) -> Result<()> {
        let lock_file = self.lock_scratch_file(lock)?;
        self.run_checked(
            &self.commands.tag_release,
            &[
                ("RELOCK_RELEASE_TAG", release_tag.to_string()),
                ("RELOCK_LOCK_FILE", lock_file.display().to_string()),
            ],
        )
    }
}

/// Recording fakes for the capability seams, usable from any crate's tests.
#[derive(Default)]
pub struct RecordingHooks {
    pub deploys: Mutex<Vec<(Environment, String)>>,
    pub suites: Mutex<Vec<TestSuite>>,
    pub promotions: Mutex<Vec<(String, LockDocument)>>,
    pub tags: Mutex<Vec<(String, LockDocument)>>,
    /// Outcome the fake test runner reports; defaults to passing.
    pub test_outcome: Mutex<TestOutcome>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self {
            test_outcome: Mutex::new(TestOutcome::Passed),
            ..Default::default()
        }
    }

    pub fn failing_tests(detail: &str) -> Self {
        let hooks = Self::new();
        *hooks.test_outcome.lock().unwrap() =
            TestOutcome::Failed { detail: detail.to_string() };
        hooks
    }

    pub fn deploy_count(&self) -> usize {
        self.deploys.lock().unwrap().len()
    }
}

impl Deployer for RecordingHooks {
    fn deploy(&self, lock: &LockDocument, environment: Environment) -> Result<()> {
        self.deploys
            .lock()
            .unwrap()
            .push((environment, relock_lock::content_digest(lock)));
        Ok(())
    }
}

impl TestRunner for RecordingHooks {
    fn run_suite(&self, suite: TestSuite, _environment: Environment) -> Result<TestOutcome> {
        self.suites.lock().unwrap().push(suite);
        Ok(self.test_outcome.lock().unwrap().clone())
    }
}

impl PromotionOpener for RecordingHooks {
    fn open_promotion(&self, lock: &LockDocument, target_branch: &str) -> Result<()> {
        self.promotions
            .lock()
            .unwrap()
            .push((target_branch.to_string(), lock.clone()));
        Ok(())
    }
}

impl ReleaseTagger for RecordingHooks {
    fn tag_release(&self, release_tag: &str, lock: &LockDocument) -> Result<()> {
        self.tags
            .lock()
            .unwrap()
            .push((release_tag.to_string(), lock.clone()));
        Ok(())
    }
}
