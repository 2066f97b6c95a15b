//! Autoresource: convention-driven CRUD/REST resources with filtering, query caching and an audit trail.

pub mod audit;
pub mod cache;
pub mod case;
pub mod config;
pub mod error;
pub mod extractors;
pub mod filter;
pub mod handlers;
pub mod query;
pub mod registry;
pub mod resource;
pub mod response;
pub mod routes;
pub mod rules;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use audit::{AuditRecord, AuditRecorder, AuditStore};
pub use cache::CacheLayer;
pub use config::{build_registry, load_dir, FullConfig, Settings};
pub use error::{AppError, ConfigError};
pub use extractors::{CallContext, CallerIdentity};
pub use filter::{FilterMode, FilterPolicy, PublicationScope, StatusColumnScope};
pub use registry::CompanionRegistry;
pub use resource::{Operation, ResourceDescriptor};
pub use response::Envelope;
pub use routes::{common_routes, resource_routes};
pub use service::{ControllerServices, ResourceController};
pub use state::AppState;
pub use store::{
    ensure_audit_table, ensure_database_exists, MemoryAuditStore, MemoryStore, PgAuditStore, PgStore, RecordStore,
    SchemaIntrospector,
};
