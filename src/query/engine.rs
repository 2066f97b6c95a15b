//! Turns request parameters into a bounded, guarded query for one resource.

use crate::error::AppError;
use crate::filter::{FilterPolicy, PublicationScope};
use crate::query::dsl::{parse_order, FieldFilters, FilterSpec};
use crate::query::{Operator, QuerySpec, RelationLoad};
use crate::resource::ResourceDescriptor;
use crate::store::RecordStore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed page size; also caps every eager-loaded relation.
pub const PAGE_SIZE: u32 = 1000;

/// Read parameters taken from the query string.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadParams {
    pub fields: Option<String>,
    pub with: Option<String>,
    pub filter: Option<String>,
    pub page: u32,
}

impl ReadParams {
    /// Unknown keys are ignored; a missing or invalid `page` is page 1.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        ReadParams {
            fields: params.get("fields").cloned(),
            with: params.get("with").cloned(),
            filter: params.get("filter").cloned(),
            page: params
                .get("page")
                .and_then(|p| p.trim().parse::<u32>().ok())
                .filter(|p| *p > 0)
                .unwrap_or(1),
        }
    }

    /// Serialised request for the audit trail.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (k, v) in [("fields", &self.fields), ("with", &self.with), ("filter", &self.filter)] {
            if let Some(v) = v {
                map.insert(k.to_string(), Value::String(v.clone()));
            }
        }
        map.insert("page".into(), Value::from(self.page));
        Value::Object(map)
    }
}

pub struct FilterQueryEngine {
    descriptor: Arc<ResourceDescriptor>,
    policy: Arc<dyn FilterPolicy>,
    publication: Option<Arc<dyn PublicationScope>>,
    store: Arc<dyn RecordStore>,
}

impl FilterQueryEngine {
    pub fn new(
        descriptor: Arc<ResourceDescriptor>,
        policy: Arc<dyn FilterPolicy>,
        publication: Option<Arc<dyn PublicationScope>>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        FilterQueryEngine {
            descriptor,
            policy,
            publication,
            store,
        }
    }

    fn base(&self) -> QuerySpec {
        QuerySpec::new(&self.descriptor.table, &self.descriptor.primary_key)
    }

    /// Policy first, then the published scope. Fails before any store access.
    fn guarded(&self, query: QuerySpec, published_only: bool) -> Result<QuerySpec, AppError> {
        let query = self.policy.apply(query)?;
        if published_only && self.descriptor.uses_publication_status {
            if let Some(scope) = &self.publication {
                return Ok(scope.scope_published(query));
            }
        }
        Ok(query)
    }

    /// A field is usable when it is fillable or an existing column of the base table.
    pub async fn is_valid_field(&self, field: &str) -> Result<bool, AppError> {
        if field.is_empty() {
            return Ok(false);
        }
        if self.descriptor.is_fillable(field) {
            return Ok(true);
        }
        self.store.has_column(&self.descriptor.table, field).await
    }

    /// Comma separated `fields`; unusable names are dropped, none left means the default projection.
    pub async fn select_fields(&self, raw: Option<&str>) -> Result<Vec<String>, AppError> {
        let mut kept: Vec<String> = Vec::new();
        for field in raw.unwrap_or("").split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if kept.iter().any(|k| k == field) {
                continue;
            }
            if self.is_valid_field(field).await? {
                kept.push(field.to_string());
            } else {
                tracing::debug!(resource = %self.descriptor.resource_key, field = %field, "dropping unknown field");
            }
        }
        if kept.is_empty() {
            return self.default_fields().await;
        }
        Ok(kept)
    }

    /// Primary key plus every fillable field that is a column.
    pub async fn default_fields(&self) -> Result<Vec<String>, AppError> {
        let d = &self.descriptor;
        let mut fields = Vec::with_capacity(d.fillable_fields.len() + 1);
        if self.store.has_column(&d.table, &d.primary_key).await? {
            fields.push(d.primary_key.clone());
        }
        for f in &d.fillable_fields {
            if !fields.contains(f) && self.store.has_column(&d.table, f).await? {
                fields.push(f.clone());
            }
        }
        Ok(fields)
    }

    /// Comma separated `with`; only declared relations survive.
    pub fn relations(&self, raw: Option<&str>) -> Vec<RelationLoad> {
        let mut out: Vec<RelationLoad> = Vec::new();
        for name in raw.unwrap_or("").split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if out.iter().any(|r| r.name == name) {
                continue;
            }
            match self.descriptor.entity.relation(name) {
                Some(rel) => out.push(RelationLoad {
                    name: rel.name.clone(),
                    kind: rel.kind,
                    table: rel.table.clone(),
                    foreign_key: rel.foreign_key.clone(),
                    local_key: rel.local_key.clone(),
                    limit: PAGE_SIZE,
                }),
                None => {
                    tracing::debug!(resource = %self.descriptor.resource_key, relation = %name, "dropping unknown relation")
                }
            }
        }
        out
    }

    async fn project(&self, query: QuerySpec, params: &ReadParams) -> Result<QuerySpec, AppError> {
        let fields = self.select_fields(params.fields.as_deref()).await?;
        Ok(self
            .relations(params.with.as_deref())
            .into_iter()
            .fold(query.select(fields), QuerySpec::with))
    }

    /// Listing query: projection, relations, policy, published scope, filter DSL and ordering.
    pub async fn build_list(&self, params: &ReadParams) -> Result<QuerySpec, AppError> {
        let guarded = self.guarded(self.base(), true)?;
        let mut query = self.project(guarded, params).await?;

        let mut sorting_key = self.descriptor.sorting_key.clone();
        let mut direction = self.descriptor.sorting_direction;

        if let Some(filter) = FilterSpec::parse(params.filter.as_deref()) {
            match filter.fields {
                Some(FieldFilters::Conditions(conditions)) => {
                    for c in conditions {
                        if !self.is_valid_field(&c.field).await? {
                            tracing::debug!(field = %c.field, "dropping filter on unknown field");
                            continue;
                        }
                        match Operator::parse(&c.operator) {
                            Some(op) => query = query.filter(c.field, op, c.value),
                            None => tracing::warn!(field = %c.field, operator = %c.operator, "dropping filter with unsupported operator"),
                        }
                    }
                }
                // Map form is not checked against fillable/columns.
                Some(FieldFilters::Contains(entries)) => {
                    for (field, value) in entries {
                        query = query.filter(field, Operator::Contains, value);
                    }
                }
                None => {}
            }
            if let Some(order) = filter.order {
                let (field, dir) = parse_order(&order, direction);
                if self.is_valid_field(&field).await? {
                    sorting_key = Some(field);
                    direction = dir;
                } else {
                    tracing::warn!(order = %order, "ignoring order on unknown field");
                }
            }
        }

        if let Some(key) = sorting_key.filter(|k| !k.trim().is_empty()) {
            query = query.order_by(key.trim(), direction);
        }
        Ok(query)
    }

    /// Single record: projection, relations, policy and published scope; no filter or sort.
    pub async fn build_one(&self, params: &ReadParams, id: &Value) -> Result<QuerySpec, AppError> {
        let guarded = self.guarded(self.base(), true)?;
        Ok(self.project(guarded, params).await?.where_key(id))
    }

    /// Policy-bound query used by update (`published_only = false`) and destroy (`true`).
    pub async fn build_scoped_write(&self, id: &Value, published_only: bool) -> Result<QuerySpec, AppError> {
        let guarded = self.guarded(self.base(), published_only)?;
        let fields = self.default_fields().await?;
        Ok(guarded.select(fields).where_key(id))
    }

    /// Unfiltered lookup of the full record, used to capture prior state.
    pub fn build_find(&self, id: &Value) -> QuerySpec {
        self.base().where_key(id)
    }
}
