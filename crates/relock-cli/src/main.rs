use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use relock_core::{Decision, Environment, ProbeStatus, Stage, TestSuite};
use relock_health::HttpProber;
use relock_pipeline::{CommandHooks, Config, Controller, LockSource, StageContext};
use relock_resolve::{load_service_metadata, ResolveDefaults, Resolver, ServiceConfigMap};
use relock_store::VersionedLockStore;
use relock_store_git::{read_commit_context, timestamped_lock_name, FsArtifactStore, GitLockStore};

#[derive(Parser)]
#[command(name = "relock", version, about = "Release-lock promotion orchestrator")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default relock.toml into the current repo
    Init,

    /// Lock document operations
    #[command(subcommand)]
    Lock(LockCommand),

    /// Probe an environment's health gate (exit 0 all UP, exit 1 otherwise)
    Health {
        /// staging | production
        #[arg(long)]
        environment: String,
    },

    /// Run one promotion stage
    Promote {
        /// dev | staging | prod
        #[arg(long)]
        stage: String,
        /// Release tag to cut at the prod stage (default: prefix + UTC date)
        #[arg(long)]
        release_tag: Option<String>,
        /// Resolve the lock and probe health only; trigger nothing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum LockCommand {
    /// Resolve submodule state + image metadata into a new lock file
    Generate {
        /// Restrict the lock to the named services
        #[arg(long = "service")]
        services: Vec<String>,
        /// Image metadata file (YAML or JSON); overrides relock.toml
        #[arg(long)]
        metadata: Option<PathBuf>,
        /// Output path (default: locks/lock-<timestamp>.yml)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Overwrite the output file if it already exists
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Tag prefix applied when a service configures neither tag nor prefix
        #[arg(long)]
        default_tag_prefix: Option<String>,
    },

    /// Print the lock committed on a branch
    Show {
        #[arg(long)]
        branch: String,
    },

    /// Commit a generated lock file onto a branch as versioned state
    Commit {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            let path = Config::config_path(&repo_root);
            if path.exists() {
                bail!("relock.toml already exists at {}", path.display());
            }
            let project_id =
                repo_root.file_name().and_then(|s| s.to_str()).unwrap_or("repo");
            Config::default_for_repo(project_id).save_to(&path)?;
            println!("Initialized relock in {}", repo_root.display());
        }
        Command::Lock(lock_cmd) => run_lock(&repo_root, lock_cmd)?,
        Command::Health { environment } => run_health(&repo_root, &environment)?,
        Command::Promote { stage, release_tag, dry_run } => {
            run_promote(&repo_root, &stage, release_tag, dry_run)?
        }
    }

    Ok(())
}

fn load_config(repo_root: &Path) -> Result<Config> {
    let path = Config::config_path(repo_root);
    if !path.exists() {
        bail!("no relock.toml found; run `relock init` first");
    }
    Config::load_from(&path)
}

fn load_metadata(
    repo_root: &Path,
    cfg: &Config,
    override_path: Option<&Path>,
) -> Result<ServiceConfigMap> {
    let path = match override_path {
        Some(p) => Some(p.to_path_buf()),
        None => cfg.resolve.metadata_file.as_ref().map(|f| repo_root.join(f)),
    };
    match path {
        Some(p) => Ok(load_service_metadata(&p)?),
        None => Ok(ServiceConfigMap::new()),
    }
}

fn run_lock(repo_root: &Path, cmd: LockCommand) -> Result<()> {
    match cmd {
        LockCommand::Generate { services, metadata, output, force, default_tag_prefix } => {
            let cfg = load_config(repo_root)?;
            let configs = load_metadata(repo_root, &cfg, metadata.as_deref())?;
            let ctx = read_commit_context(repo_root)?;

            let defaults = ResolveDefaults {
                default_registry: cfg.resolve.default_registry.clone(),
                default_tag_prefix: default_tag_prefix
                    .or_else(|| cfg.resolve.default_tag_prefix.clone()),
            };
            let filter = if services.is_empty() { None } else { Some(services.as_slice()) };
            let resolved = Resolver::new(defaults).resolve(&configs, &ctx, filter)?;

            let lock = relock_lock::build(
                resolved.into_values().collect(),
                relock_lock::metadata_now(
                    cfg.project.generator_id.clone(),
                    ctx.source_branch.clone(),
                    ctx.monorepo_sha.clone(),
                ),
            )?;

            let path = output.unwrap_or_else(|| {
                repo_root.join("locks").join(timestamped_lock_name(Utc::now()))
            });
            if path.exists() && !force {
                bail!("lock file already exists: {} (use --force)", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, relock_lock::to_yaml(&lock)?)?;
            println!("Lock written to {}", path.display());
        }
        LockCommand::Show { branch } => {
            let store = GitLockStore::new(repo_root);
            let lock = store.get(&branch)?;
            print!("{}", relock_lock::to_yaml(&lock)?);
        }
        LockCommand::Commit { branch, input } => {
            let yaml = std::fs::read_to_string(&input)
                .with_context(|| format!("read {}", input.display()))?;
            let lock = relock_lock::from_yaml(&yaml)?;
            let store = GitLockStore::new(repo_root);
            let committed = store.commit(&lock, &branch)?;
            println!("Lock committed to {branch} at {}", committed.as_str());
        }
    }
    Ok(())
}

fn parse_environment(s: &str) -> Result<Environment> {
    match s {
        "staging" => Ok(Environment::Staging),
        "production" | "prod" => Ok(Environment::Production),
        other => Err(anyhow!("unknown environment '{other}' (expected staging|production)")),
    }
}

fn run_health(repo_root: &Path, environment: &str) -> Result<()> {
    let cfg = load_config(repo_root)?;
    let env = parse_environment(environment)?;
    let plan = cfg.probe_plan(env)?;
    let timeout = cfg.probe_timeout(env)?;

    let report = relock_health::check(env, &plan, &HttpProber::new(), timeout);
    print_report(&report);
    if !report.overall_up() {
        std::process::exit(1);
    }
    println!("All {} targets UP", report.targets.len());
    Ok(())
}

fn print_report(report: &relock_core::EnvironmentHealthReport) {
    for t in &report.targets {
        match &t.status {
            ProbeStatus::Up => println!("UP      {}", t.target),
            ProbeStatus::Down { detail } => println!("DOWN    {} ({detail})", t.target),
            ProbeStatus::Unknown => println!("UNKNOWN {} (not attempted)", t.target),
        }
    }
}

fn parse_stage(s: &str) -> Result<Stage> {
    match s {
        "dev" | "dev_pr" => Ok(Stage::DevPr),
        "staging" | "staging_post_merge" => Ok(Stage::StagingPostMerge),
        "prod" | "prod_post_merge" => Ok(Stage::ProdPostMerge),
        other => Err(anyhow!("unknown stage '{other}' (expected dev|staging|prod)")),
    }
}

fn run_promote(
    repo_root: &Path,
    stage: &str,
    release_tag: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let cfg = load_config(repo_root)?;
    let stage = parse_stage(stage)?;

    let artifacts = FsArtifactStore::new(cfg.artifact_root());
    let store = GitLockStore::new(repo_root);
    let prober = HttpProber::new();
    let hooks = CommandHooks::new(cfg.commands.clone(), repo_root.to_path_buf());

    let source = match stage {
        Stage::DevPr => {
            let configs = load_metadata(repo_root, &cfg, None)?;
            let commit = read_commit_context(repo_root)?;
            LockSource::Generate {
                configs,
                commit,
                defaults: ResolveDefaults {
                    default_registry: cfg.resolve.default_registry.clone(),
                    default_tag_prefix: cfg.resolve.default_tag_prefix.clone(),
                },
                generator_id: cfg.project.generator_id.clone(),
                services_filter: None,
            }
        }
        Stage::StagingPostMerge => LockSource::Committed {
            branch: cfg.environment(Environment::Staging)?.branch.clone(),
        },
        Stage::ProdPostMerge => LockSource::Committed {
            branch: cfg.environment(Environment::Production)?.branch.clone(),
        },
    };

    let env = stage.environment();

    if dry_run {
        let lock = match &source {
            LockSource::Generate { configs, commit, defaults, generator_id, services_filter } => {
                let resolved = Resolver::new(defaults.clone())
                    .resolve(configs, commit, services_filter.as_deref())?;
                relock_lock::build(
                    resolved.into_values().collect(),
                    relock_lock::metadata_now(
                        generator_id.clone(),
                        commit.source_branch.clone(),
                        commit.monorepo_sha.clone(),
                    ),
                )?
            }
            LockSource::Committed { branch } => store.get(branch)?,
        };
        println!(
            "Lock resolves: {} services, digest {}",
            lock.services.len(),
            &relock_lock::content_digest(&lock)[..12]
        );
        let report = relock_health::check(env, &cfg.probe_plan(env)?, &prober, cfg.probe_timeout(env)?);
        print_report(&report);
        let suite = match stage.test_suite() {
            TestSuite::System => "system",
            TestSuite::EndToEnd => "e2e",
            TestSuite::Smoke => "smoke",
        };
        println!("Would deploy to {} and run the {suite} suite", env.as_str());
        if !report.overall_up() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let ctx = StageContext {
        stage,
        source,
        probe_plan: cfg.probe_plan(env)?,
        probe_timeout: cfg.probe_timeout(env)?,
        promote_to: Some(cfg.promotion.staging_to.clone()),
        release_tag: Some(release_tag.unwrap_or_else(|| {
            format!("{}{}", cfg.promotion.release_tag_prefix, Utc::now().format("%Y%m%dT%H%M%SZ"))
        })),
    };

    let controller = Controller {
        artifacts: &artifacts,
        store: &store,
        prober: &prober,
        deployer: &hooks,
        tests: &hooks,
        opener: &hooks,
        tagger: &hooks,
    };

    let run = controller.run(ctx)?;
    match &run.decision {
        Decision::Advance => {
            println!("Run {} advanced ({})", run.id.as_str(), run.stage.as_str());
        }
        Decision::Halt { reason } => {
            println!("Run {} halted: {:?}", run.id.as_str(), reason);
            if let Some(report) = &run.health_report {
                for t in report.down_targets() {
                    if let ProbeStatus::Down { detail } = &t.status {
                        println!("  DOWN {} ({detail})", t.target);
                    }
                }
            }
            if let Some(outcome) = &run.test_outcome {
                if let relock_core::TestOutcome::Failed { detail } = outcome {
                    println!("  tests: {detail}");
                }
            }
            std::process::exit(1);
        }
        Decision::Pending => unreachable!("controller always decides"),
    }
    Ok(())
}
