use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use relock_core::Environment;
use relock_health::{build_plan, ProbePlan, ProbeStyle, ServiceProbe};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    pub resolve: ResolveConfig,
    pub promotion: PromotionConfig,
    pub commands: CommandsConfig,
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub generator_id: String,
    pub artifact_root: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default)]
    pub default_registry: Option<String>,
    #[serde(default)]
    pub default_tag_prefix: Option<String>,
    /// Per-service image metadata file (YAML or JSON), relative to the repo.
    #[serde(default)]
    pub metadata_file: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Branch the staging stage promotes into.
    pub staging_to: String,
    pub release_tag_prefix: String,
}

/// External triggers the controller shells out to. Each is a program plus
/// arguments; context arrives via RELOCK_* environment variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandsConfig {
    pub deploy: Vec<String>,
    pub tests: Vec<String>,
    pub open_promotion: Vec<String>,
    pub tag_release: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub base_url: String,
    pub branch: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default)]
    pub services: Vec<ProbeEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeEntry {
    pub name: String,
    pub style: ProbeStyle,
    /// Defaults to the environment base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Config {
    pub fn default_for_repo(project_id: &str) -> Self {
        let staging = EnvironmentConfig {
            base_url: "http://staging.internal".to_string(),
            branch: "staging".to_string(),
            probe_timeout_secs: 5,
            services: vec![],
        };
        let production = EnvironmentConfig {
            base_url: "http://prod.internal".to_string(),
            branch: "main".to_string(),
            probe_timeout_secs: 5,
            services: vec![],
        };
        let mut environments = BTreeMap::new();
        environments.insert("staging".to_string(), staging);
        environments.insert("production".to_string(), production);

        Self {
            project: ProjectConfig {
                id: project_id.to_string(),
                generator_id: "relock@v1".to_string(),
                artifact_root: "~/.relock/artifacts".to_string(),
            },
            resolve: ResolveConfig {
                default_registry: Some(format!("ghcr.io/{project_id}")),
                default_tag_prefix: None,
                metadata_file: None,
            },
            promotion: PromotionConfig {
                staging_to: "main".to_string(),
                release_tag_prefix: "release-".to_string(),
            },
            commands: CommandsConfig {
                deploy: vec!["true".to_string()],
                tests: vec!["true".to_string()],
                open_promotion: vec!["true".to_string()],
                tag_release: vec!["true".to_string()],
            },
            environments,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse relock.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join("relock.toml")
    }

    pub fn artifact_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.project.artifact_root).to_string())
    }

    pub fn environment(&self, env: Environment) -> Result<&EnvironmentConfig> {
        self.environments
            .get(env.as_str())
            .ok_or_else(|| anyhow!("relock.toml has no [environments.{}] section", env.as_str()))
    }

    pub fn probe_plan(&self, env: Environment) -> Result<ProbePlan> {
        let cfg = self.environment(env)?;
        let services: Vec<ServiceProbe> = cfg
            .services
            .iter()
            .map(|p| ServiceProbe {
                name: p.name.clone(),
                base_url: p.base_url.clone().unwrap_or_else(|| cfg.base_url.clone()),
                style: p.style,
            })
            .collect();
        Ok(build_plan(&cfg.base_url, &services))
    }

    pub fn probe_timeout(&self, env: Environment) -> Result<Duration> {
        Ok(Duration::from_secs(self.environment(env)?.probe_timeout_secs))
    }
}
