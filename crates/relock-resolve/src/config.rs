use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use relock_core::{Error, Result};

/// Per-service build metadata supplied by upstream CI. At most one of
/// `tag`/`tag_prefix` takes effect; `tag` wins when both are present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceImageConfig {
    pub repository: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub tag_prefix: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    /// Overrides the submodule path the service's SHA is looked up under.
    /// Defaults to the path whose last component matches the service name.
    #[serde(default)]
    pub submodule_path: Option<String>,
}

pub type ServiceConfigMap = BTreeMap<String, ServiceImageConfig>;

/// Load a service metadata mapping from a YAML or JSON file.
pub fn load_service_metadata(path: &Path) -> Result<ServiceConfigMap> {
    let s = std::fs::read_to_string(path)?;
    let configs: ServiceConfigMap = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&s)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?,
        _ => serde_yaml::from_str(&s)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?,
    };
    validate_service_metadata(&configs)?;
    Ok(configs)
}

pub fn validate_service_metadata(configs: &ServiceConfigMap) -> Result<()> {
    for (name, cfg) in configs {
        if cfg.repository.trim().is_empty() {
            return Err(Error::Config(format!(
                "service '{name}' is missing required field 'repository'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_repository_is_config_error() {
        let mut configs = ServiceConfigMap::new();
        configs.insert(
            "catalog".into(),
            ServiceImageConfig { repository: "  ".into(), ..Default::default() },
        );
        let err = validate_service_metadata(&configs).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("catalog"));
    }

    #[test]
    fn yaml_metadata_parses() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("images.yaml");
        std::fs::write(
            &p,
            "catalog:\n  repository: ghcr.io/x/catalog\n  tag_prefix: main-\n",
        )
        .unwrap();
        let configs = load_service_metadata(&p).unwrap();
        assert_eq!(configs["catalog"].tag_prefix.as_deref(), Some("main-"));
    }

    #[test]
    fn json_metadata_parses() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("images.json");
        std::fs::write(&p, r#"{"orders": {"repository": "ghcr.io/x/orders", "tag": "v1.2.3"}}"#)
            .unwrap();
        let configs = load_service_metadata(&p).unwrap();
        assert_eq!(configs["orders"].tag.as_deref(), Some("v1.2.3"));
    }
}
