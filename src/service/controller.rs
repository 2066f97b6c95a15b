//! Resource controller: the six operations over one resource.

use crate::audit::{AuditRecorder, AuditStore};
use crate::cache::{fingerprint, CacheLayer};
use crate::config::ResourceConfig;
use crate::error::AppError;
use crate::extractors::CallContext;
use crate::filter::{FilterMode, FilterPolicy, GenericFilter, PublicationScope, PublicationStatus, PUBLICATION_STATUS_COLUMN};
use crate::query::{FilterQueryEngine, ReadParams, PAGE_SIZE};
use crate::registry::{suggested_name, CompanionKind, CompanionRegistry};
use crate::resource::{Operation, ResourceDescriptor};
use crate::response::Envelope;
use crate::rules::{RuleContext, RuleSet};
use crate::sql;
use crate::store::{Record, RecordStore};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared collaborators every controller is built from.
#[derive(Clone)]
pub struct ControllerServices {
    pub registry: Arc<CompanionRegistry>,
    pub store: Arc<dyn RecordStore>,
    pub audit: Arc<dyn AuditStore>,
    pub cache: Arc<CacheLayer>,
    pub publication: Arc<dyn PublicationScope>,
    pub filter_mode: FilterMode,
    pub default_ttl_secs: u64,
}

pub struct ResourceController {
    descriptor: Arc<ResourceDescriptor>,
    engine: FilterQueryEngine,
    validator: Option<Arc<RuleSet>>,
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheLayer>,
    audit: AuditRecorder,
}

impl ResourceController {
    /// Resolve companions and the descriptor. A missing entity aborts construction;
    /// a missing filter falls back to the generic one, a missing validator is allowed.
    pub async fn build(config: &ResourceConfig, services: &ControllerServices) -> Result<Self, AppError> {
        let entity = services.registry.resolve_entity(config)?;
        let descriptor = Arc::new(
            ResourceDescriptor::resolve(config, entity, services.store.as_ref(), services.default_ttl_secs).await?,
        );
        let policy: Arc<dyn FilterPolicy> = match services.registry.resolve_filter(&config.controller) {
            Some(filter) => filter,
            None => Arc::new(GenericFilter::new(
                services.filter_mode,
                suggested_name(&config.controller, CompanionKind::Filter),
            )),
        };
        let publication = descriptor
            .uses_publication_status
            .then(|| services.publication.clone());
        let engine = FilterQueryEngine::new(descriptor.clone(), policy, publication, services.store.clone());
        tracing::info!(
            resource = %descriptor.resource_key,
            entity = %descriptor.entity_type_name,
            table = %descriptor.table,
            "resource registered"
        );
        Ok(ResourceController {
            descriptor,
            engine,
            validator: services.registry.resolve_validator(&config.controller),
            store: services.store.clone(),
            cache: services.cache.clone(),
            audit: AuditRecorder::new(services.audit.clone()),
        })
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn key(&self) -> &str {
        &self.descriptor.resource_key
    }

    fn not_found(&self, id: &Value) -> Envelope {
        let id = match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Envelope::failure(
            self.key(),
            json!({}),
            StatusCode::NOT_FOUND,
            format!("No query results for model [{}] {}", self.descriptor.entity_type_name, id),
        )
    }

    /// Flat body, or the object nested under the resource key.
    fn unwrap_body(&self, body: Value) -> Result<Record, AppError> {
        let Value::Object(mut obj) = body else {
            return Err(AppError::BadRequest("request body must be a JSON object".into()));
        };
        if let Some(Value::Object(_)) = obj.get(self.key()) {
            if let Some(Value::Object(inner)) = obj.remove(self.key()) {
                return Ok(inner);
            }
        }
        Ok(obj)
    }

    /// Fillable fields present in the input; absent fields are left to the store.
    fn assignable(&self, input: &Record) -> Record {
        self.descriptor
            .fillable_fields
            .iter()
            .filter_map(|f| input.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }

    fn validate(&self, input: &Record, ctx: RuleContext<'_>) -> Result<(), AppError> {
        if let Some(rules) = &self.validator {
            RuleSet::validate(input, &rules.adjusted(ctx))?;
        }
        if self.descriptor.uses_publication_status {
            if let Some(status) = input.get(PUBLICATION_STATUS_COLUMN).filter(|v| !v.is_null()) {
                if PublicationStatus::from_value(status).is_none() {
                    return Err(AppError::Validation(format!(
                        "The {} field must be a valid publication status.",
                        PUBLICATION_STATUS_COLUMN
                    )));
                }
            }
        }
        Ok(())
    }

    pub async fn list(&self, ctx: &CallContext, params: &ReadParams) -> Result<Envelope, AppError> {
        let d = &self.descriptor;
        let query = self.engine.build_list(params).await?;
        self.audit
            .record(ctx, d, Operation::Index, None, Some(&params.to_value()), None)
            .await?;

        let rendered = sql::select(&query, None, &sql::untyped);
        let key = fingerprint(Operation::Index, &rendered.sql, params.page, &rendered.params);
        let tables = query.tables();
        let (store, query, page) = (&self.store, &query, params.page);
        let data = self
            .cache
            .get_or_compute(&tables, &key, d.cache_ttl, || async move {
                let page = store.paginate(query, page, PAGE_SIZE).await?;
                serde_json::to_value(page).map_err(|e| AppError::Persistence(e.to_string()))
            })
            .await?;
        Ok(Envelope::ok(self.key(), data))
    }

    pub async fn show(&self, ctx: &CallContext, id: &Value, params: &ReadParams) -> Result<Envelope, AppError> {
        let d = &self.descriptor;
        let query = self.engine.build_one(params, id).await?;
        self.audit
            .record(ctx, d, Operation::Show, Some(id), Some(&params.to_value()), None)
            .await?;

        let rendered = sql::select(&query, None, &sql::untyped);
        let key = fingerprint(Operation::Show, &rendered.sql, 1, &rendered.params);
        let tables = query.tables();
        let (store, query) = (&self.store, &query);
        let found = self
            .cache
            .get_or_compute(&tables, &key, d.cache_ttl, || async move {
                store
                    .first(query)
                    .await?
                    .map(Value::Object)
                    .ok_or_else(|| AppError::NotFound(String::new()))
            })
            .await;
        match found {
            Ok(data) => Ok(Envelope::ok(self.key(), data)),
            Err(AppError::NotFound(_)) => Ok(self.not_found(id)),
            Err(e) => Err(e),
        }
    }

    pub async fn store(&self, ctx: &CallContext, body: Value) -> Result<Envelope, AppError> {
        let d = &self.descriptor;
        let input = self.unwrap_body(body)?;
        self.validate(&input, RuleContext::Create)?;
        let payload = Value::Object(input.clone());
        self.audit
            .record(ctx, d, Operation::Store, None, Some(&payload), None)
            .await?;

        let values = self.assignable(&input);
        match self.store.insert(&d.table, &values).await {
            Ok(row) => {
                self.cache.invalidate(&d.table);
                tracing::info!(resource = %d.resource_key, "resource created");
                Ok(Envelope::ok(self.key(), Value::Object(row)))
            }
            Err(e) => {
                tracing::error!(resource = %d.resource_key, error = %e, "create failed");
                Ok(Envelope::failure(
                    self.key(),
                    Value::Object(values),
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An error occurred while saving the resource",
                ))
            }
        }
    }

    pub async fn update(&self, ctx: &CallContext, id: &Value, body: Value) -> Result<Envelope, AppError> {
        let d = &self.descriptor;
        let input = self.unwrap_body(body)?;
        self.validate(&input, RuleContext::Update(Some(id)))?;
        let scoped = self.engine.build_scoped_write(id, false).await?;

        let prior = self.store.first(&self.engine.build_find(id)).await?;
        let payload = Value::Object(input.clone());
        self.audit
            .record(ctx, d, Operation::Update, Some(id), Some(&payload), prior.as_ref())
            .await?;
        if prior.is_none() {
            return Ok(self.not_found(id));
        }
        let Some(current) = self.store.first(&scoped).await? else {
            return Ok(self.not_found(id));
        };

        let values = self.assignable(&input);
        if values.is_empty() {
            return Ok(Envelope::ok(self.key(), Value::Object(current)));
        }
        match self.store.update(&scoped, &values).await {
            Ok(Some(row)) => {
                self.cache.invalidate(&d.table);
                tracing::info!(resource = %d.resource_key, "resource updated");
                Ok(Envelope::ok(self.key(), Value::Object(row)))
            }
            Ok(None) => Ok(self.not_found(id)),
            Err(e) => {
                tracing::error!(resource = %d.resource_key, error = %e, "update failed");
                Ok(Envelope::failure(
                    self.key(),
                    Value::Object(current),
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An error occurred while updating the resource",
                ))
            }
        }
    }

    pub async fn destroy(&self, ctx: &CallContext, id: &Value) -> Result<Envelope, AppError> {
        let d = &self.descriptor;
        let scoped = self.engine.build_scoped_write(id, true).await?;

        let prior = self.store.first(&self.engine.build_find(id)).await?;
        self.audit
            .record(ctx, d, Operation::Destroy, Some(id), None, prior.as_ref())
            .await?;
        let Some(prior) = prior else {
            return Ok(self.not_found(id));
        };

        match self.store.delete(&scoped).await {
            Ok(true) => {
                self.cache.invalidate(&d.table);
                tracing::info!(resource = %d.resource_key, "resource deleted");
                Ok(Envelope::ok(self.key(), Value::Object(prior)).with_message("The resource has been deleted"))
            }
            // Exists, but not visible through the policy-bound query.
            Ok(false) => Ok(self.not_found(id)),
            Err(e) => {
                tracing::error!(resource = %d.resource_key, error = %e, "delete failed");
                Ok(Envelope::failure(
                    self.key(),
                    Value::Object(prior),
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An error occurred while deleting the resource",
                ))
            }
        }
    }

    pub async fn validation_rules(&self, ctx: &CallContext) -> Result<Envelope, AppError> {
        let d = &self.descriptor;
        self.audit
            .record(ctx, d, Operation::ValidationRules, None, None, None)
            .await?;
        match &self.validator {
            Some(rules) => Ok(Envelope::ok(self.key(), rules.to_value())),
            None => {
                tracing::warn!(resource = %d.resource_key, "no validator registered");
                Ok(Envelope::failure(
                    self.key(),
                    json!([]),
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Validation rules are not available",
                )
                .with_errors(vec![format!(
                    "Unable to find validation rules for {}",
                    d.entity_type_name
                )]))
            }
        }
    }
}
