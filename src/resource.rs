//! Resource descriptor: resolved once per controller and immutable afterwards.

use crate::case::{base_name, pluralize, to_snake_case};
use crate::config::{EntityDefinition, ResourceConfig};
use crate::error::{AppError, ConfigError};
use crate::filter::PUBLICATION_STATUS_COLUMN;
use crate::store::SchemaIntrospector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const SORTING_KEY_DEFAULT: &str = "name";

/// The six controller operations. Slugs are what the audit trail stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[serde(alias = "list")]
    Index,
    #[serde(alias = "get_one")]
    Show,
    #[serde(alias = "create")]
    Store,
    Update,
    #[serde(alias = "delete")]
    Destroy,
    #[serde(alias = "describe_rules")]
    ValidationRules,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Index,
        Operation::Show,
        Operation::Destroy,
        Operation::Update,
        Operation::Store,
        Operation::ValidationRules,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Operation::Index => "index",
            Operation::Show => "show",
            Operation::Store => "store",
            Operation::Update => "update",
            Operation::Destroy => "destroy",
            Operation::ValidationRules => "validation_rules",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(AppError::BadRequest(format!("invalid sort direction: {}", other))),
        }
    }
}

/// Envelope key for an entity type: plural, snake_case form of its base name.
pub fn resource_key_for(entity_type_name: &str) -> String {
    to_snake_case(&pluralize(base_name(entity_type_name)))
}

#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    pub entity_type_name: String,
    pub resource_key: String,
    pub table: String,
    pub primary_key: String,
    /// Either an existing column or `None`.
    pub sorting_key: Option<String>,
    pub sorting_direction: SortDirection,
    pub uses_publication_status: bool,
    pub fillable_fields: Vec<String>,
    pub audited_operations: HashSet<Operation>,
    /// Zero disables caching for this resource.
    pub cache_ttl: Duration,
    pub entity: Arc<EntityDefinition>,
}

impl ResourceDescriptor {
    /// Resolve the descriptor, checking fillable fields and the sorting key against the live schema.
    pub async fn resolve<I>(
        config: &ResourceConfig,
        entity: Arc<EntityDefinition>,
        introspector: &I,
        default_ttl_secs: u64,
    ) -> Result<Self, AppError>
    where
        I: SchemaIntrospector + ?Sized,
    {
        let mut fillable_fields: Vec<String> = Vec::with_capacity(entity.fillable.len() + 1);
        for f in &entity.fillable {
            if !fillable_fields.contains(f) {
                fillable_fields.push(f.clone());
            }
        }
        if entity.publication_status && !fillable_fields.iter().any(|f| f == PUBLICATION_STATUS_COLUMN) {
            fillable_fields.push(PUBLICATION_STATUS_COLUMN.to_string());
        }
        for field in &fillable_fields {
            if !introspector.has_column(&entity.table, field).await? {
                return Err(ConfigError::UnknownFillable {
                    table: entity.table.clone(),
                    field: field.clone(),
                }
                .into());
            }
        }

        let requested_sort = config
            .sorting_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| SORTING_KEY_DEFAULT.to_string());
        let sorting_key = if introspector.has_column(&entity.table, &requested_sort).await? {
            Some(requested_sort)
        } else {
            tracing::debug!(table = %entity.table, column = %requested_sort, "sorting key is not a column, disabling default sort");
            None
        };

        let audited_operations = config
            .audited_operations
            .as_ref()
            .map(|ops| ops.iter().copied().collect())
            .unwrap_or_else(|| Operation::ALL.into_iter().collect());

        Ok(ResourceDescriptor {
            entity_type_name: entity.name.clone(),
            resource_key: config
                .resource_key
                .clone()
                .unwrap_or_else(|| resource_key_for(&entity.name)),
            table: entity.table.clone(),
            primary_key: entity.primary_key.clone(),
            sorting_key,
            sorting_direction: config.sorting_direction.unwrap_or_default(),
            uses_publication_status: entity.publication_status,
            fillable_fields,
            audited_operations,
            cache_ttl: Duration::from_secs(config.cache_ttl.unwrap_or(default_ttl_secs)),
            entity,
        })
    }

    pub fn is_fillable(&self, field: &str) -> bool {
        self.fillable_fields.iter().any(|f| f == field)
    }

    pub fn is_audited(&self, op: Operation) -> bool {
        self.audited_operations.contains(&op)
    }
}
