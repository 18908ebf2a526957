use std::collections::BTreeMap;

use relock_core::{is_full_sha, short_sha, Error, ImageRef, Result, ServiceBuildRef};

use crate::config::{ServiceConfigMap, ServiceImageConfig};

/// Commit metadata the resolver works from: the monorepo tip plus each
/// submodule's pinned SHA. Gathering this is the shell's job; the resolver
/// itself never touches git or the registry.
#[derive(Clone, Debug, Default)]
pub struct CommitContext {
    pub monorepo_sha: String,
    pub source_branch: String,
    /// Submodule path -> full commit SHA.
    pub submodules: BTreeMap<String, String>,
}

impl CommitContext {
    /// Service name derived from a submodule path: its last component.
    pub fn service_name_for(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolveDefaults {
    /// Registry prefix used when a service has no metadata entry,
    /// e.g. "ghcr.io/shopifake".
    pub default_registry: Option<String>,
    /// Tag prefix applied when a service entry sets neither `tag` nor
    /// `tag_prefix`.
    pub default_tag_prefix: Option<String>,
}

pub struct Resolver {
    pub defaults: ResolveDefaults,
}

impl Resolver {
    pub fn new(defaults: ResolveDefaults) -> Self {
        Self { defaults }
    }

    /// Resolve every submodule in the commit context (optionally filtered)
    /// to its build coordinates. Pure over the supplied inputs: tags and
    /// digests are trusted as published by upstream per-service CI.
    pub fn resolve(
        &self,
        configs: &ServiceConfigMap,
        ctx: &CommitContext,
        filter: Option<&[String]>,
    ) -> Result<BTreeMap<String, ServiceBuildRef>> {
        let mut resolved = BTreeMap::new();

        for (path, sha) in &ctx.submodules {
            let name = CommitContext::service_name_for(path);
            if let Some(wanted) = filter {
                if !wanted.iter().any(|w| w == name) {
                    continue;
                }
            }
            if !is_full_sha(sha) {
                return Err(Error::UnresolvedCommit {
                    service: name.to_string(),
                    detail: format!("submodule '{path}' has no usable commit SHA ('{sha}')"),
                });
            }

            let entry = configs.get(name);
            let image = self.resolve_image(name, entry, sha)?;
            resolved.insert(
                name.to_string(),
                ServiceBuildRef {
                    service_name: name.to_string(),
                    submodule_path: path.clone(),
                    git_sha: sha.clone(),
                    image,
                },
            );
        }

        // Configured services pinned to an explicit submodule path must
        // resolve; silence here would drop them from the lock.
        for (name, cfg) in configs {
            if resolved.contains_key(name) {
                continue;
            }
            if let Some(wanted) = filter {
                if !wanted.iter().any(|w| w == name) {
                    continue;
                }
            }
            if let Some(path) = &cfg.submodule_path {
                let sha = ctx.submodules.get(path).ok_or_else(|| Error::UnresolvedCommit {
                    service: name.clone(),
                    detail: format!("configured submodule path '{path}' not present in commit context"),
                })?;
                if !is_full_sha(sha) {
                    return Err(Error::UnresolvedCommit {
                        service: name.clone(),
                        detail: format!("submodule '{path}' has no usable commit SHA ('{sha}')"),
                    });
                }
                let image = self.resolve_image(name, Some(cfg), sha)?;
                resolved.insert(
                    name.clone(),
                    ServiceBuildRef {
                        service_name: name.clone(),
                        submodule_path: path.clone(),
                        git_sha: sha.clone(),
                        image,
                    },
                );
            }
        }

        if let Some(wanted) = filter {
            let missing: Vec<&String> =
                wanted.iter().filter(|w| !resolved.contains_key(*w)).collect();
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
                return Err(Error::Config(format!(
                    "requested services missing from submodules: {}",
                    names.join(", ")
                )));
            }
        }

        Ok(resolved)
    }

    fn resolve_image(
        &self,
        name: &str,
        entry: Option<&ServiceImageConfig>,
        sha: &str,
    ) -> Result<ImageRef> {
        let repository = match entry {
            Some(cfg) => {
                if cfg.repository.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "service '{name}' is missing required field 'repository'"
                    )));
                }
                cfg.repository.clone()
            }
            None => match &self.defaults.default_registry {
                Some(registry) => format!("{}/{name}", registry.trim_end_matches('/')),
                None => {
                    return Err(Error::Config(format!(
                        "service '{name}' has no image metadata and no default registry is set"
                    )))
                }
            },
        };

        let tag = resolve_tag(entry, sha, self.defaults.default_tag_prefix.as_deref());
        // Pinning is opt-in: a digest is attached only when configured.
        let digest = entry.and_then(|cfg| cfg.digest.clone());

        Ok(ImageRef { repository, tag, digest })
    }
}

/// Tag resolution, first match wins:
/// 1. explicit `tag` -> verbatim
/// 2. `tag_prefix` -> prefix + 7-char short SHA
/// 3. neither -> default prefix (if any) + short SHA, else bare short SHA
pub fn resolve_tag(
    entry: Option<&ServiceImageConfig>,
    sha: &str,
    default_prefix: Option<&str>,
) -> String {
    if let Some(cfg) = entry {
        if let Some(tag) = &cfg.tag {
            return tag.clone();
        }
        if let Some(prefix) = &cfg.tag_prefix {
            return format!("{prefix}{}", short_sha(sha));
        }
    }
    match default_prefix {
        Some(prefix) => format!("{prefix}{}", short_sha(sha)),
        None => short_sha(sha).to_string(),
    }
}
