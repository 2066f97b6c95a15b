//! Config validation: referential integrity and uniqueness.

use crate::config::FullConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

fn unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::Validation(format!("duplicate {}: {}", kind, name)));
        }
    }
    Ok(())
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    unique("entity", config.entities.iter().map(|e| e.name.as_str()))?;
    unique("validator", config.validators.iter().map(|v| v.name.as_str()))?;
    unique("filter", config.filters.iter().map(|f| f.name.as_str()))?;
    unique("controller", config.resources.iter().map(|r| r.controller.as_str()))?;

    let entity_names: HashSet<&str> = config.entities.iter().map(|e| e.name.as_str()).collect();
    let mut resource_keys = HashSet::new();
    for r in &config.resources {
        if r.controller.trim().is_empty() {
            return Err(ConfigError::Validation("resource with empty controller".into()));
        }
        if let Some(entity) = &r.entity {
            if !entity_names.contains(entity.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "entity",
                    id: entity.clone(),
                });
            }
        }
        if let Some(key) = &r.resource_key {
            if !resource_keys.insert(key.as_str()) {
                return Err(ConfigError::DuplicateResourceKey(key.clone()));
            }
        }
    }

    for e in &config.entities {
        if e.table.trim().is_empty() {
            return Err(ConfigError::Validation(format!("entity {} has no table", e.name)));
        }
        if e.fillable.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::Validation(format!("entity {} has an empty fillable field", e.name)));
        }
        unique(
            &format!("relation on {}", e.name),
            e.relations.iter().map(|r| r.name.as_str()),
        )?;
        for rel in &e.relations {
            if rel.table.trim().is_empty() || rel.foreign_key.trim().is_empty() {
                return Err(ConfigError::MissingReference {
                    kind: "relation target",
                    id: format!("{}.{}", e.name, rel.name),
                });
            }
        }
    }

    Ok(())
}
