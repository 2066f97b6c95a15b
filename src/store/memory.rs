//! In-process stores for tests and local runs without a database.

use crate::audit::{AuditRecord, AuditStore};
use crate::config::RelationKind;
use crate::error::AppError;
use crate::query::{Operator, Predicate, QuerySpec, RelationLoad};
use crate::resource::SortDirection;
use crate::store::{Page, Record, RecordStore, SchemaIntrospector};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError, RwLock};

#[derive(Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
    next_id: i64,
}

/// Tables of JSON rows evaluated in memory. Counts every data query so callers can
/// observe cache hits.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    queries: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: &[&str]) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.insert(
            name.to_string(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    /// Seed a row without counting it as a query. Assigns `id` when the table has one and it is absent.
    pub fn seed(&self, table: &str, row: Value) -> Result<Record, AppError> {
        let values = match row {
            Value::Object(map) => map,
            _ => return Err(AppError::BadRequest("seed rows must be objects".into())),
        };
        self.write_row(table, &values)
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Data queries executed so far (paginate, first, insert, update, delete).
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }

    /// Make every subsequent write report a persistence failure.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    fn count_query(&self) {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(AppError::Persistence("store rejected the write".into()));
        }
        Ok(())
    }

    fn write_row(&self, table: &str, values: &Record) -> Result<Record, AppError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let t = tables
            .get_mut(table)
            .ok_or_else(|| AppError::Persistence(format!("relation \"{}\" does not exist", table)))?;
        if let Some(unknown) = values.keys().find(|k| !t.columns.contains(k)) {
            return Err(AppError::Persistence(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, table
            )));
        }
        let mut row = Record::new();
        for c in &t.columns {
            row.insert(c.clone(), values.get(c).cloned().unwrap_or(Value::Null));
        }
        if t.columns.iter().any(|c| c == "id") {
            match row.get("id").and_then(Value::as_i64) {
                Some(id) => t.next_id = t.next_id.max(id + 1),
                None if row.get("id").map_or(true, Value::is_null) => {
                    row.insert("id".into(), Value::from(t.next_id));
                    t.next_id += 1;
                }
                None => {}
            }
        }
        t.rows.push(row.clone());
        Ok(row)
    }

    fn matching(&self, query: &QuerySpec) -> Vec<Record> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(t) = tables.get(&query.table) else {
            return Vec::new();
        };
        let mut rows: Vec<Record> = t
            .rows
            .iter()
            .filter(|row| query.predicates.iter().all(|p| matches(row, p)))
            .cloned()
            .collect();
        if let Some((col, dir)) = &query.order {
            rows.sort_by(|a, b| order_rows(a.get(col), b.get(col), *dir));
        }
        rows
    }

    fn project(&self, query: &QuerySpec, row: &Record) -> Record {
        let mut out = if query.select.is_empty() {
            row.clone()
        } else {
            query
                .select
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect()
        };
        for rel in &query.relations {
            out.insert(rel.name.clone(), self.load_relation(rel, row));
        }
        out
    }

    fn load_relation(&self, rel: &RelationLoad, row: &Record) -> Value {
        let key = row.get(&rel.local_key).cloned().unwrap_or(Value::Null);
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let related = tables
            .get(&rel.table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| !key.is_null() && r.get(&rel.foreign_key).is_some_and(|v| loose_eq(v, &key)))
                    .take(rel.limit as usize)
                    .map(|r| Value::Object(r.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        match rel.kind {
            RelationKind::HasMany => Value::Array(related),
            RelationKind::BelongsTo => related.into_iter().next().unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl SchemaIntrospector for MemoryStore {
    async fn has_column(&self, table: &str, column: &str) -> Result<bool, AppError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(table)
            .is_some_and(|t| t.columns.iter().any(|c| c == column)))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn paginate(&self, query: &QuerySpec, page: u32, per_page: u32) -> Result<Page, AppError> {
        self.count_query();
        let rows = self.matching(query);
        let total = rows.len() as u64;
        let skip = (page.max(1) as usize - 1) * per_page as usize;
        let data = rows
            .iter()
            .skip(skip)
            .take(per_page as usize)
            .map(|r| Value::Object(self.project(query, r)))
            .collect();
        Ok(Page::new(data, total, page.max(1), per_page))
    }

    async fn first(&self, query: &QuerySpec) -> Result<Option<Record>, AppError> {
        self.count_query();
        Ok(self.matching(query).first().map(|r| self.project(query, r)))
    }

    async fn insert(&self, table: &str, values: &Record) -> Result<Record, AppError> {
        self.count_query();
        self.check_writable()?;
        self.write_row(table, values)
    }

    async fn update(&self, query: &QuerySpec, values: &Record) -> Result<Option<Record>, AppError> {
        self.count_query();
        self.check_writable()?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let Some(t) = tables.get_mut(&query.table) else {
            return Ok(None);
        };
        if let Some(unknown) = values.keys().find(|k| !t.columns.contains(k)) {
            return Err(AppError::Persistence(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, query.table
            )));
        }
        let mut updated = None;
        for row in t.rows.iter_mut().filter(|r| query.predicates.iter().all(|p| matches(r, p))) {
            for (k, v) in values {
                row.insert(k.clone(), v.clone());
            }
            if updated.is_none() {
                updated = Some(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, query: &QuerySpec) -> Result<bool, AppError> {
        self.count_query();
        self.check_writable()?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let Some(t) = tables.get_mut(&query.table) else {
            return Ok(false);
        };
        let before = t.rows.len();
        t.rows.retain(|r| !query.predicates.iter().all(|p| matches(r, p)));
        Ok(t.rows.len() < before)
    }
}

fn matches(row: &Record, p: &Predicate) -> bool {
    let cell = row.get(&p.column).unwrap_or(&Value::Null);
    match p.operator {
        Operator::Eq if p.value.is_null() => cell.is_null(),
        Operator::Ne if p.value.is_null() => !cell.is_null(),
        _ if cell.is_null() || p.value.is_null() => false,
        Operator::Eq => loose_eq(cell, &p.value),
        Operator::Ne => !loose_eq(cell, &p.value),
        Operator::Lt => compare(cell, &p.value) == Some(Ordering::Less),
        Operator::Le => matches!(compare(cell, &p.value), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => compare(cell, &p.value) == Some(Ordering::Greater),
        Operator::Ge => matches!(compare(cell, &p.value), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Like => like(&text(&p.value)).is_some_and(|re| re.is_match(&text(cell))),
        Operator::NotLike => like(&text(&p.value)).is_some_and(|re| !re.is_match(&text(cell))),
        Operator::Contains => text(cell).to_lowercase().contains(&text(&p.value).to_lowercase()),
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => text(a) == text(b),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    let num = |v: &Value| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => num(a)?.partial_cmp(&num(b)?),
    }
}

/// Nulls sort last ascending and first descending.
fn order_rows(a: Option<&Value>, b: Option<&Value>, dir: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ord = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
    };
    match dir {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

/// SQL LIKE pattern as an anchored regex.
fn like(pattern: &str) -> Option<Regex> {
    let mut re = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Audit records kept in memory.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
