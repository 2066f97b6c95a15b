//! Load config from a directory of JSON files and build the companion registry from it.

use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use crate::filter::ConditionFilter;
use crate::registry::CompanionRegistry;
use crate::rules::RuleSet;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

pub const RESOURCES_FILE: &str = "resources.json";
pub const ENTITIES_FILE: &str = "entities.json";
pub const VALIDATORS_FILE: &str = "validators.json";
pub const FILTERS_FILE: &str = "filters.json";

async fn read_json<T: DeserializeOwned>(dir: &Path, file: &str, required: bool) -> Result<Option<T>, ConfigError> {
    let path = dir.join(file);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => return Ok(None),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Read `resources.json` and `entities.json` (required) plus `validators.json` and
/// `filters.json` (optional) from `dir`, then validate.
pub async fn load_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let config = FullConfig {
        resources: read_json(dir, RESOURCES_FILE, true).await?.unwrap_or_default(),
        entities: read_json(dir, ENTITIES_FILE, true).await?.unwrap_or_default(),
        validators: read_json(dir, VALIDATORS_FILE, false).await?.unwrap_or_default(),
        filters: read_json(dir, FILTERS_FILE, false).await?.unwrap_or_default(),
    };
    validate(&config)?;
    tracing::info!(
        dir = %dir.display(),
        resources = config.resources.len(),
        entities = config.entities.len(),
        validators = config.validators.len(),
        filters = config.filters.len(),
        "config loaded"
    );
    Ok(config)
}

/// Register every declared entity, validator and filter under its configured name.
pub fn build_registry(config: &FullConfig) -> Result<CompanionRegistry, ConfigError> {
    validate(config)?;
    let mut registry = CompanionRegistry::new();
    for entity in &config.entities {
        registry.register_entity(entity.clone());
    }
    for validator in &config.validators {
        registry.register_validator(RuleSet::from_config(validator));
    }
    for filter in &config.filters {
        registry.register_filter(filter.name.clone(), Arc::new(ConditionFilter::from_config(filter)?));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("autoresource-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn loads_required_and_optional_files() {
        let dir = scratch_dir("load");
        std::fs::write(
            dir.join(RESOURCES_FILE),
            r#"[{"controller": "app::http::controllers::ArticleController"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join(ENTITIES_FILE),
            r#"[{"name": "app::models::Article", "table": "articles", "fillable": ["title"]}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join(FILTERS_FILE),
            r#"[{"name": "app::http::filters::ArticleFilter", "conditions": [{"field": "tenant_id", "value": 1}]}]"#,
        )
        .unwrap();

        let config = load_dir(&dir).await.unwrap();
        assert_eq!(config.resources.len(), 1);
        assert!(config.validators.is_empty());

        let registry = build_registry(&config).unwrap();
        let resource: &ResourceConfig = &config.resources[0];
        assert!(registry.resolve_entity(resource).is_ok());
        assert!(registry.resolve_filter(&resource.controller).is_some());
        assert!(registry.resolve_validator(&resource.controller).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_required_file_is_a_load_error() {
        let dir = scratch_dir("missing");
        let err = load_dir(&dir).await.unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
