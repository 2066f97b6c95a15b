//! Audit trail: one record per allow-listed operation, written before the operation proceeds.

use crate::error::AppError;
use crate::extractors::CallContext;
use crate::resource::{Operation, ResourceDescriptor};
use crate::store::Record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entity_type_name: String,
    pub operation_slug: String,
    pub acting_user_id: String,
    pub affected_object_id: Option<String>,
    /// Serialised request body or query parameters.
    pub request_payload: Option<String>,
    /// Serialised full field map of the object before the operation.
    pub prior_object_state: Option<String>,
    pub request_path: String,
    pub client_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only sink for audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        AuditRecorder { store }
    }

    /// Writes nothing for operations outside the resource's allow-list.
    /// Fails closed: an audited call without a caller identity is an authentication error.
    pub async fn record(
        &self,
        ctx: &CallContext,
        descriptor: &ResourceDescriptor,
        op: Operation,
        object_id: Option<&Value>,
        request: Option<&Value>,
        prior: Option<&Record>,
    ) -> Result<(), AppError> {
        if !descriptor.is_audited(op) {
            return Ok(());
        }
        let identity = ctx.identity.as_ref().ok_or_else(|| {
            AppError::Authentication(format!(
                "{} on {} requires an authenticated caller",
                op.slug(),
                descriptor.resource_key
            ))
        })?;

        let affected_object_id = prior
            .and_then(|p| p.get(&descriptor.primary_key))
            .or(object_id)
            .filter(|v| !v.is_null())
            .map(id_text);
        let now = Utc::now();
        let record = AuditRecord {
            entity_type_name: descriptor.entity_type_name.clone(),
            operation_slug: op.slug().to_string(),
            acting_user_id: identity.subject_id.clone(),
            affected_object_id,
            request_payload: request.map(Value::to_string),
            prior_object_state: prior.map(|p| Value::Object(p.clone()).to_string()),
            request_path: ctx.path.clone(),
            client_ip: ctx.client_ip.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.append(&record).await?;
        tracing::debug!(
            entity = %record.entity_type_name,
            operation = %record.operation_slug,
            user = %record.acting_user_id,
            "audit record appended"
        );
        Ok(())
    }
}

fn id_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
