//! Raw config types matching the JSON config files (resources, entities, validators, filters).

use crate::resource::{Operation, SortDirection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One exposed resource. `controller` is the identity names are derived from,
/// e.g. `app::http::controllers::ArticleController`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub controller: String,
    /// Explicit entity type; skips name derivation (existence is still checked).
    #[serde(default)]
    pub entity: Option<String>,
    /// Overrides the envelope/path key derived from the entity base name.
    #[serde(default)]
    pub resource_key: Option<String>,
    #[serde(default)]
    pub sorting_key: Option<String>,
    #[serde(default)]
    pub sorting_direction: Option<SortDirection>,
    /// Operations that write an audit record. Defaults to all six.
    #[serde(default)]
    pub audited_operations: Option<Vec<Operation>>,
    /// Cache TTL in seconds for this resource; falls back to the global setting.
    #[serde(default)]
    pub cache_ttl: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// We hold the foreign key (`local_key` on us references `foreign_key` on them).
    BelongsTo,
    /// They hold the foreign key pointing back at our `local_key`.
    HasMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub kind: RelationKind,
    pub table: String,
    pub foreign_key: String,
    #[serde(default = "default_primary_key")]
    pub local_key: String,
}

/// Persisted record type backing a resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub fillable: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    /// Opt-in publication workflow (`publication_status_id`).
    #[serde(default)]
    pub publication_status: bool,
}

impl EntityDefinition {
    pub fn relation(&self, name: &str) -> Option<&RelationConfig> {
        self.relations.iter().find(|r| r.name == name)
    }
}

fn default_primary_key() -> String {
    "id".into()
}

/// A field rule as declared: `"required|max:255"` or `["required", "max:255"]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Piped(String),
    List(Vec<String>),
}

impl RuleSpec {
    pub fn tokens(&self) -> Vec<String> {
        match self {
            RuleSpec::Piped(s) => s
                .split('|')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            RuleSpec::List(v) => v.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    pub rules: BTreeMap<String, RuleSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConditionConfig {
    pub field: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub value: serde_json::Value,
}

fn default_operator() -> String {
    "=".into()
}

/// Declarative custom filter: fixed conditions added to every query of the resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<FilterConditionConfig>,
}

/// All config types in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub resources: Vec<ResourceConfig>,
    pub entities: Vec<EntityDefinition>,
    pub validators: Vec<ValidatorConfig>,
    pub filters: Vec<FilterConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_spec_accepts_both_forms() {
        let piped: RuleSpec = serde_json::from_str(r#""required|max:255""#).unwrap();
        let list: RuleSpec = serde_json::from_str(r#"["required", "max:255"]"#).unwrap();
        assert_eq!(piped.tokens(), list.tokens());
    }

    #[test]
    fn entity_defaults() {
        let e: EntityDefinition =
            serde_json::from_str(r#"{"name": "app::models::Article", "table": "articles"}"#).unwrap();
        assert_eq!(e.primary_key, "id");
        assert!(e.fillable.is_empty());
        assert!(!e.publication_status);
    }

    #[test]
    fn resource_config_parses_operations() {
        let r: ResourceConfig = serde_json::from_str(
            r#"{"controller": "app::http::controllers::ArticleController",
                "sorting_direction": "DESC",
                "audited_operations": ["store", "update", "destroy"]}"#,
        )
        .unwrap();
        assert_eq!(r.sorting_direction, Some(SortDirection::Desc));
        assert_eq!(r.audited_operations.unwrap().len(), 3);
    }
}
