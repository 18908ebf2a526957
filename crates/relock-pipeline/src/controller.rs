use std::time::Duration;

use tracing::{info, warn};

use relock_core::{
    Decision, Error, HaltReason, LockDocument, LockRef, PromotionRun, Result, RunState, Stage,
    TestOutcome,
};
use relock_health::{check, ProbePlan, Prober};
use relock_resolve::{CommitContext, ResolveDefaults, Resolver, ServiceConfigMap};
use relock_store::{ArtifactStore, VersionedLockStore};

use crate::hooks::{Deployer, PromotionOpener, ReleaseTagger, TestRunner};

/// Where the stage gets its lock from. The dev PR stage generates a fresh
/// one; every later stage consumes the already-committed document and must
/// never regenerate it.
pub enum LockSource {
    Generate {
        configs: ServiceConfigMap,
        commit: CommitContext,
        defaults: ResolveDefaults,
        generator_id: String,
        services_filter: Option<Vec<String>>,
    },
    Committed {
        branch: String,
    },
}

pub struct StageContext {
    pub stage: Stage,
    pub source: LockSource,
    pub probe_plan: ProbePlan,
    pub probe_timeout: Duration,
    /// Staging stage: branch the promotion request targets.
    pub promote_to: Option<String>,
    /// Prod stage: release tag cut on advance.
    pub release_tag: Option<String>,
}

/// The promotion controller: drives one `PromotionRun` through
/// `Pending -> ResolvingLock -> HealthChecking -> Testing -> Advanced | Halted`.
///
/// Gate failures halt the run (routine outcomes, recorded on the run);
/// configuration, resolution, and validation failures are returned as
/// errors for the operator, never defaulted.
pub struct Controller<'a> {
    pub artifacts: &'a dyn ArtifactStore,
    pub store: &'a dyn VersionedLockStore,
    pub prober: &'a dyn Prober,
    pub deployer: &'a dyn Deployer,
    pub tests: &'a dyn TestRunner,
    pub opener: &'a dyn PromotionOpener,
    pub tagger: &'a dyn ReleaseTagger,
}

impl<'a> Controller<'a> {
    pub fn run(&self, ctx: StageContext) -> Result<PromotionRun> {
        let mut run = PromotionRun::new(ctx.stage);
        info!(stage = ctx.stage.as_str(), run_id = run.id.as_str(), "promotion run started");

        run.state = RunState::ResolvingLock;
        let lock = match self.resolve_lock(&ctx, &mut run)? {
            Some(lock) => lock,
            None => return Ok(run),
        };

        run.state = RunState::HealthChecking;
        let environment = ctx.stage.environment();
        let report = check(environment, &ctx.probe_plan, self.prober, ctx.probe_timeout);
        let healthy = report.overall_up();
        if !healthy {
            let names: Vec<&str> =
                report.down_targets().iter().map(|t| t.target.as_str()).collect();
            warn!(
                stage = ctx.stage.as_str(),
                down = names.join(",").as_str(),
                "environment unhealthy; deploy not attempted"
            );
        }
        run.health_report = Some(report);
        if !healthy {
            run.halt(HaltReason::EnvironmentUnhealthy);
            return Ok(run);
        }

        run.state = RunState::Testing;
        if let Err(e) = self.deployer.deploy(&lock, environment) {
            warn!(stage = ctx.stage.as_str(), error = %e, "deploy trigger failed");
            run.test_outcome = Some(TestOutcome::Failed { detail: format!("deploy: {e}") });
            run.halt(HaltReason::TestsFailed);
            return Ok(run);
        }
        let outcome = match self.tests.run_suite(ctx.stage.test_suite(), environment) {
            Ok(outcome) => outcome,
            // A test invocation that errors out (timeout included) counts
            // the same as a failing suite.
            Err(e) => TestOutcome::Failed { detail: e.to_string() },
        };
        let passed = outcome.passed();
        run.test_outcome = Some(outcome);
        if !passed {
            run.halt(HaltReason::TestsFailed);
            return Ok(run);
        }

        self.advance(&ctx, &lock)?;
        run.state = RunState::Advanced;
        run.decision = Decision::Advance;
        info!(stage = ctx.stage.as_str(), run_id = run.id.as_str(), "promotion run advanced");
        Ok(run)
    }

    fn resolve_lock(
        &self,
        ctx: &StageContext,
        run: &mut PromotionRun,
    ) -> Result<Option<LockDocument>> {
        match (&ctx.stage, &ctx.source) {
            (Stage::DevPr, LockSource::Generate { configs, commit, defaults, generator_id, services_filter }) => {
                let resolver = Resolver::new(defaults.clone());
                let resolved = resolver.resolve(configs, commit, services_filter.as_deref())?;
                let metadata = relock_lock::metadata_now(
                    generator_id.clone(),
                    commit.source_branch.clone(),
                    commit.monorepo_sha.clone(),
                );
                let lock = relock_lock::build(resolved.into_values().collect(), metadata)?;
                self.artifacts.put_artifact(&lock, &run.id, false)?;
                run.lock_ref = Some(LockRef::Artifact { run_id: run.id.clone() });
                Ok(Some(lock))
            }
            (Stage::StagingPostMerge | Stage::ProdPostMerge, LockSource::Committed { branch }) => {
                match self.store.get(branch) {
                    Ok(lock) => {
                        run.lock_ref = Some(LockRef::Committed { branch: branch.clone() });
                        Ok(Some(lock))
                    }
                    Err(Error::NotFound(what)) => {
                        warn!(stage = ctx.stage.as_str(), what = what.as_str(), "lock unavailable");
                        run.halt(HaltReason::LockUnavailable);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            // Stage and source disagree; no lock applies to this run.
            _ => {
                warn!(stage = ctx.stage.as_str(), "no lock source applies to this stage");
                run.halt(HaltReason::LockUnavailable);
                Ok(None)
            }
        }
    }

    fn advance(&self, ctx: &StageContext, lock: &LockDocument) -> Result<()> {
        match ctx.stage {
            // Ready for manual merge; nothing to trigger.
            Stage::DevPr => Ok(()),
            Stage::StagingPostMerge => {
                let target = ctx.promote_to.as_deref().ok_or_else(|| {
                    Error::Config("staging stage requires a promotion target branch".into())
                })?;
                // The same document, unchanged: promotion never rebuilds it.
                self.opener
                    .open_promotion(lock, target)
                    .map_err(|e| Error::External(format!("open promotion to '{target}': {e}")))
            }
            Stage::ProdPostMerge => {
                let tag = ctx.release_tag.as_deref().ok_or_else(|| {
                    Error::Config("prod stage requires a release tag".into())
                })?;
                self.tagger
                    .tag_release(tag, lock)
                    .map_err(|e| Error::External(format!("tag release '{tag}': {e}")))?;
                self.store.archive(lock, tag)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use relock_core::{Environment, ProbeStatus};
    use relock_health::{ProbeTarget, ProbePlan};
    use relock_resolve::ServiceImageConfig;
    use relock_store::{InMemoryArtifactStore, InMemoryLockStore};

    use crate::hooks::RecordingHooks;

    use super::*;

    const MONOREPO_SHA: &str = "c0ffee0000000000000000000000000000000000";
    const SVC_SHA: &str = "234e5bda7f00000000000000000000000000beef";

    struct StaticProber {
        gateway_up: bool,
        down: Vec<String>,
        calls: Mutex<usize>,
    }

    impl StaticProber {
        fn all_up() -> Self {
            Self { gateway_up: true, down: vec![], calls: Mutex::new(0) }
        }
        fn gateway_down() -> Self {
            Self { gateway_up: false, down: vec![], calls: Mutex::new(0) }
        }
    }

    impl Prober for StaticProber {
        fn probe(&self, target: &ProbeTarget, _timeout: Duration) -> ProbeStatus {
            *self.calls.lock().unwrap() += 1;
            if target.name == "gateway" && !self.gateway_up {
                return ProbeStatus::Down { detail: "connection refused".into() };
            }
            if self.down.iter().any(|d| d == &target.name) {
                return ProbeStatus::Down { detail: "HTTP 503".into() };
            }
            ProbeStatus::Up
        }
    }

    fn plan() -> ProbePlan {
        ProbePlan {
            gateway: ProbeTarget { name: "gateway".into(), url: "http://s/actuator/health".into() },
            services: vec![ProbeTarget {
                name: "catalog".into(),
                url: "http://s/api/catalog/health".into(),
            }],
        }
    }

    fn generate_source() -> LockSource {
        let mut configs = ServiceConfigMap::new();
        configs.insert(
            "catalog".into(),
            ServiceImageConfig {
                repository: "ghcr.io/x/catalog".into(),
                tag_prefix: Some("main-".into()),
                ..Default::default()
            },
        );
        let mut submodules = BTreeMap::new();
        submodules.insert("services/catalog".to_string(), SVC_SHA.to_string());
        LockSource::Generate {
            configs,
            commit: CommitContext {
                monorepo_sha: MONOREPO_SHA.into(),
                source_branch: "dev".into(),
                submodules,
            },
            defaults: ResolveDefaults::default(),
            generator_id: "relock@v1".into(),
            services_filter: None,
        }
    }

    fn stage_ctx(stage: Stage, source: LockSource) -> StageContext {
        StageContext {
            stage,
            source,
            probe_plan: plan(),
            probe_timeout: Duration::from_secs(5),
            promote_to: Some("main".into()),
            release_tag: Some("release-20260105".into()),
        }
    }

    struct Harness {
        artifacts: InMemoryArtifactStore,
        store: InMemoryLockStore,
        hooks: RecordingHooks,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                artifacts: InMemoryArtifactStore::new(),
                store: InMemoryLockStore::new(),
                hooks: RecordingHooks::new(),
            }
        }

        fn controller<'a>(&'a self, prober: &'a StaticProber) -> Controller<'a> {
            Controller {
                artifacts: &self.artifacts,
                store: &self.store,
                prober,
                deployer: &self.hooks,
                tests: &self.hooks,
                opener: &self.hooks,
                tagger: &self.hooks,
            }
        }
    }

    #[test]
    fn dev_pr_generates_lock_and_advances() {
        let h = Harness::new();
        let prober = StaticProber::all_up();
        let run = h
            .controller(&prober)
            .run(stage_ctx(Stage::DevPr, generate_source()))
            .unwrap();

        assert_eq!(run.decision, Decision::Advance);
        assert_eq!(run.state, RunState::Advanced);
        let stored = h.artifacts.get_artifact(&run.id).unwrap();
        assert_eq!(stored.services["catalog"].image.tag, "main-234e5bd");
        assert_eq!(h.hooks.suites.lock().unwrap().as_slice(), &[relock_core::TestSuite::System]);
        // Dev advance means ready-for-merge only; no promotion is opened.
        assert!(h.hooks.promotions.lock().unwrap().is_empty());
    }

    #[test]
    fn unhealthy_environment_halts_before_deploy() {
        let h = Harness::new();
        let prober = StaticProber::gateway_down();
        let run = h
            .controller(&prober)
            .run(stage_ctx(Stage::DevPr, generate_source()))
            .unwrap();

        assert_eq!(run.decision, Decision::Halt { reason: HaltReason::EnvironmentUnhealthy });
        assert_eq!(run.state, RunState::Halted);
        assert_eq!(h.hooks.deploy_count(), 0, "deploy must never be attempted");
        assert!(run.health_report.unwrap().down_targets()[0].target == "gateway");
    }

    #[test]
    fn failing_tests_halt_after_deploy() {
        let h = Harness {
            hooks: RecordingHooks::failing_tests("e2e suite: 3 failures"),
            ..Harness::new()
        };
        let prober = StaticProber::all_up();
        let run = h
            .controller(&prober)
            .run(stage_ctx(Stage::DevPr, generate_source()))
            .unwrap();

        assert_eq!(run.decision, Decision::Halt { reason: HaltReason::TestsFailed });
        assert_eq!(h.hooks.deploy_count(), 1);
        match run.test_outcome.unwrap() {
            TestOutcome::Failed { detail } => assert!(detail.contains("3 failures")),
            other => panic!("expected failed outcome, got {other:?}"),
        }
    }

    fn committed_lock(store: &InMemoryLockStore, branch: &str) -> LockDocument {
        let mut configs = ServiceConfigMap::new();
        configs.insert(
            "catalog".into(),
            ServiceImageConfig { repository: "ghcr.io/x/catalog".into(), ..Default::default() },
        );
        let mut submodules = BTreeMap::new();
        submodules.insert("services/catalog".to_string(), SVC_SHA.to_string());
        let commit = CommitContext {
            monorepo_sha: MONOREPO_SHA.into(),
            source_branch: branch.into(),
            submodules,
        };
        let resolved = Resolver::new(ResolveDefaults::default())
            .resolve(&configs, &commit, None)
            .unwrap();
        let lock = relock_lock::build(
            resolved.into_values().collect(),
            relock_lock::metadata_now("relock@v1", branch, MONOREPO_SHA),
        )
        .unwrap();
        store.set_branch_tip(branch, MONOREPO_SHA);
        store.commit(&lock, branch).unwrap();
        lock
    }

    #[test]
    fn staging_advance_carries_the_committed_lock_unchanged() {
        let h = Harness::new();
        let committed = committed_lock(&h.store, "staging");
        let prober = StaticProber::all_up();

        let run = h
            .controller(&prober)
            .run(stage_ctx(
                Stage::StagingPostMerge,
                LockSource::Committed { branch: "staging".into() },
            ))
            .unwrap();

        assert_eq!(run.decision, Decision::Advance);
        assert_eq!(run.lock_ref, Some(LockRef::Committed { branch: "staging".into() }));
        let promotions = h.hooks.promotions.lock().unwrap();
        assert_eq!(promotions.len(), 1);
        let (target, carried) = &promotions[0];
        assert_eq!(target, "main");
        assert_eq!(carried, &committed, "promotion must not regenerate the lock");
        assert_eq!(
            relock_lock::content_digest(carried),
            relock_lock::content_digest(&h.store.get("staging").unwrap())
        );
    }

    #[test]
    fn missing_committed_lock_halts_as_unavailable() {
        let h = Harness::new();
        let prober = StaticProber::all_up();
        let run = h
            .controller(&prober)
            .run(stage_ctx(
                Stage::StagingPostMerge,
                LockSource::Committed { branch: "staging".into() },
            ))
            .unwrap();

        assert_eq!(run.decision, Decision::Halt { reason: HaltReason::LockUnavailable });
        assert_eq!(h.hooks.deploy_count(), 0);
        assert!(run.health_report.is_none(), "gate must not run without a lock");
    }

    #[test]
    fn stage_source_mismatch_halts_as_unavailable() {
        let h = Harness::new();
        let prober = StaticProber::all_up();
        let run = h
            .controller(&prober)
            .run(stage_ctx(
                Stage::DevPr,
                LockSource::Committed { branch: "staging".into() },
            ))
            .unwrap();
        assert_eq!(run.decision, Decision::Halt { reason: HaltReason::LockUnavailable });
    }

    #[test]
    fn prod_advance_tags_and_archives() {
        let h = Harness::new();
        let committed = committed_lock(&h.store, "main");
        let prober = StaticProber::all_up();

        let run = h
            .controller(&prober)
            .run(stage_ctx(
                Stage::ProdPostMerge,
                LockSource::Committed { branch: "main".into() },
            ))
            .unwrap();

        assert_eq!(run.decision, Decision::Advance);
        assert_eq!(h.hooks.suites.lock().unwrap().as_slice(), &[relock_core::TestSuite::Smoke]);
        let tags = h.hooks.tags.lock().unwrap();
        assert_eq!(tags[0].0, "release-20260105");
        assert_eq!(h.store.archived("release-20260105").unwrap(), committed);
    }
}
