//! Storage seams: schema introspection, record access and the audit trail.

mod memory;
mod postgres;

pub use memory::{MemoryAuditStore, MemoryStore};
pub use postgres::{ensure_audit_table, ensure_database_exists, PgAuditStore, PgStore, AUDIT_TABLE};

use crate::error::AppError;
use crate::query::QuerySpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One persisted row as a field map.
pub type Record = Map<String, Value>;

#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn has_column(&self, table: &str, column: &str) -> Result<bool, AppError>;
}

/// Relational capability the controller runs its queries through.
#[async_trait]
pub trait RecordStore: SchemaIntrospector {
    async fn paginate(&self, query: &QuerySpec, page: u32, per_page: u32) -> Result<Page, AppError>;

    async fn first(&self, query: &QuerySpec) -> Result<Option<Record>, AppError>;

    /// Insert exactly the given fields; returns the stored row.
    async fn insert(&self, table: &str, values: &Record) -> Result<Record, AppError>;

    /// Assign `values` to the rows `query` matches. `None` when nothing matched.
    async fn update(&self, query: &QuerySpec, values: &Record) -> Result<Option<Record>, AppError>;

    /// Delete the rows `query` matches; false when nothing was deleted.
    async fn delete(&self, query: &QuerySpec) -> Result<bool, AppError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
    pub data: Vec<Value>,
}

impl Page {
    pub fn new(data: Vec<Value>, total: u64, current_page: u32, per_page: u32) -> Self {
        let per = u64::from(per_page.max(1));
        let last_page = total.div_ceil(per).max(1);
        Page {
            current_page,
            per_page,
            total,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            data,
        }
    }
}
