//! PostgreSQL record store, audit store and startup DDL.

use crate::audit::{AuditRecord, AuditStore};
use crate::error::AppError;
use crate::query::QuerySpec;
use crate::sql::{self, PgBindValue, QueryBuf};
use crate::store::{Page, Record, RecordStore, SchemaIntrospector};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, PgPool, Postgres, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const AUDIT_TABLE: &str = "audit_records";

type ColumnMap = Arc<HashMap<String, String>>;

/// Record store over a connection pool. Column names and types of each table are
/// read from `information_schema` once and kept for the life of the store.
pub struct PgStore {
    pool: PgPool,
    columns: RwLock<HashMap<String, ColumnMap>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore {
            pool,
            columns: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn table_columns(&self, table: &str) -> Result<ColumnMap, AppError> {
        if let Some(cols) = self.columns.read().await.get(table) {
            return Ok(cols.clone());
        }
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name::text, udt_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        let cols: ColumnMap = Arc::new(rows.into_iter().collect());
        self.columns
            .write()
            .await
            .insert(table.to_string(), cols.clone());
        Ok(cols)
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(&q.sql, &q.params).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn query_optional(&self, q: &QueryBuf) -> Result<Option<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(&q.sql, &q.params).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_record))
    }
}

fn bind_all<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |q, p| q.bind(PgBindValue::from_json(p)))
}

#[async_trait]
impl SchemaIntrospector for PgStore {
    async fn has_column(&self, table: &str, column: &str) -> Result<bool, AppError> {
        Ok(self.table_columns(table).await?.contains_key(column))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn paginate(&self, query: &QuerySpec, page: u32, per_page: u32) -> Result<Page, AppError> {
        let cols = self.table_columns(&query.table).await?;
        let types = |_t: &str, c: &str| cols.get(c).cloned();

        let count = sql::count(query, &types);
        tracing::debug!(sql = %count.sql, params = ?count.params, "count");
        let total: i64 = bind_all(&count.sql, &count.params)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let select = sql::select(query, Some((page, per_page)), &types);
        let data = self
            .query_many(&select)
            .await?
            .into_iter()
            .map(Value::Object)
            .collect();
        Ok(Page::new(data, u64::try_from(total).unwrap_or(0), page, per_page))
    }

    async fn first(&self, query: &QuerySpec) -> Result<Option<Record>, AppError> {
        let cols = self.table_columns(&query.table).await?;
        let types = |_t: &str, c: &str| cols.get(c).cloned();
        self.query_optional(&sql::select(query, Some((1, 1)), &types)).await
    }

    async fn insert(&self, table: &str, values: &Record) -> Result<Record, AppError> {
        let cols = self.table_columns(table).await?;
        let types = |_t: &str, c: &str| cols.get(c).cloned();
        self.query_optional(&sql::insert(table, values, &types))
            .await?
            .ok_or_else(|| AppError::Persistence(format!("insert into {} returned no row", table)))
    }

    async fn update(&self, query: &QuerySpec, values: &Record) -> Result<Option<Record>, AppError> {
        if values.is_empty() {
            return self.first(query).await;
        }
        let cols = self.table_columns(&query.table).await?;
        let types = |_t: &str, c: &str| cols.get(c).cloned();
        self.query_optional(&sql::update(query, values, &types)).await
    }

    async fn delete(&self, query: &QuerySpec) -> Result<bool, AppError> {
        let cols = self.table_columns(&query.table).await?;
        let types = |_t: &str, c: &str| cols.get(c).cloned();
        let q = sql::delete(query, &types);
        tracing::debug!(sql = %q.sql, params = ?q.params, "delete");
        let result = bind_all(&q.sql, &q.params).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::Column;
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(f64::from(n)) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

/// Appends audit records to `audit_records`.
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        PgAuditStore { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError> {
        let sql = format!(
            "INSERT INTO {} (entity_type_name, operation_slug, acting_user_id, affected_object_id, \
             request_payload, prior_object_state, request_path, client_ip, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            AUDIT_TABLE
        );
        sqlx::query(&sql)
            .bind(&record.entity_type_name)
            .bind(&record.operation_slug)
            .bind(&record.acting_user_id)
            .bind(&record.affected_object_id)
            .bind(&record.request_payload)
            .bind(&record.prior_object_state)
            .bind(&record.request_path)
            .bind(&record.client_ip)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Create the audit table if missing.
pub async fn ensure_audit_table(pool: &PgPool) -> Result<(), AppError> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            entity_type_name TEXT NOT NULL,
            operation_slug TEXT NOT NULL,
            acting_user_id TEXT NOT NULL,
            affected_object_id TEXT,
            request_payload TEXT,
            prior_object_state TEXT,
            request_path TEXT NOT NULL,
            client_ip TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        AUDIT_TABLE
    );
    sqlx::query(&ddl).execute(pool).await?;
    let index = format!(
        "CREATE INDEX IF NOT EXISTS {0}_entity_idx ON {0} (entity_type_name, affected_object_id)",
        AUDIT_TABLE
    );
    sqlx::query(&index).execute(pool).await?;
    Ok(())
}

/// Create the database named in `database_url` if it does not exist, connecting through `postgres`.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_is_split_from_url() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@localhost:5432/articles?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(name, "articles");
    }
}
