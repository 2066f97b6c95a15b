//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a QuerySpec.

use crate::config::RelationKind;
use crate::query::{Operator, QuerySpec, RelationLoad};
use crate::sql::params::contains_pattern;
use serde_json::{Map, Value};

/// Column type lookup `(table, column) -> udt name`, used to cast placeholders.
pub type ColumnTypes<'a> = &'a (dyn Fn(&str, &str) -> Option<String> + Sync);

/// No casts; used for rendering cache fingerprints.
pub fn untyped(_table: &str, _column: &str) -> Option<String> {
    None
}

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn column(table: &str, name: &str) -> String {
    format!("{}.{}", quoted(table), quoted(name))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    fn placeholder(&mut self, v: Value, pg_type: Option<String>) -> String {
        let n = self.push_param(v);
        match pg_type {
            Some(t) => format!("${}::{}", n, quoted(&t)),
            None => format!("${}", n),
        }
    }
}

/// Scalar subquery for one eager-loaded relation: json array for has-many, object for belongs-to.
fn relation_subquery(base: &str, rel: &RelationLoad) -> String {
    let sub_from = format!(
        "{} WHERE {} = {}",
        quoted(&rel.table),
        column(&rel.table, &rel.foreign_key),
        column(base, &rel.local_key)
    );
    let subquery = match rel.kind {
        RelationKind::HasMany => format!(
            "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT * FROM {} LIMIT {}) sub)",
            sub_from, rel.limit
        ),
        RelationKind::BelongsTo => format!(
            "(SELECT row_to_json(sub) FROM (SELECT * FROM {} LIMIT 1) sub)",
            sub_from
        ),
    };
    format!("{} AS {}", subquery, quoted(&rel.name))
}

fn select_list(query: &QuerySpec) -> String {
    let mut parts: Vec<String> = if query.select.is_empty() {
        vec![format!("{}.*", quoted(&query.table))]
    } else {
        query.select.iter().map(|c| column(&query.table, c)).collect()
    };
    for rel in &query.relations {
        parts.push(relation_subquery(&query.table, rel));
    }
    parts.join(", ")
}

fn where_clause(query: &QuerySpec, q: &mut QueryBuf, types: ColumnTypes<'_>) -> String {
    let mut parts = Vec::with_capacity(query.predicates.len());
    for p in &query.predicates {
        let col = column(&query.table, &p.column);
        let part = match (p.operator, &p.value) {
            (Operator::Eq, Value::Null) => format!("{} IS NULL", col),
            (Operator::Ne, Value::Null) => format!("{} IS NOT NULL", col),
            (Operator::Contains, v) => {
                let ph = q.placeholder(Value::String(contains_pattern(v)), None);
                format!("{}::text ILIKE {}", col, ph)
            }
            (Operator::Like | Operator::NotLike, v) => {
                let ph = q.placeholder(Value::String(text_of(v)), None);
                format!("{}::text {} {}", col, p.operator.as_sql(), ph)
            }
            (op, v) => {
                let ph = q.placeholder(v.clone(), types(&query.table, &p.column));
                format!("{} {} {}", col, op.as_sql(), ph)
            }
        };
        parts.push(part);
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SELECT with projection, relation subqueries, predicates and order.
/// `page` is `(page, per_page)`; `None` renders without LIMIT/OFFSET.
pub fn select(query: &QuerySpec, page: Option<(u32, u32)>, types: ColumnTypes<'_>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(query, &mut q, types);
    let order_sql = query
        .order
        .as_ref()
        .map(|(col, dir)| format!(" ORDER BY {} {}", column(&query.table, col), dir.as_sql()))
        .unwrap_or_default();
    let page_sql = page
        .map(|(page, per_page)| {
            let offset = u64::from(page.max(1) - 1) * u64::from(per_page);
            format!(" LIMIT {} OFFSET {}", per_page, offset)
        })
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_list(query),
        quoted(&query.table),
        where_sql,
        order_sql,
        page_sql
    );
    q
}

/// COUNT(*) over the same predicates, for the page total.
pub fn count(query: &QuerySpec, types: ColumnTypes<'_>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(query, &mut q, types);
    q.sql = format!("SELECT COUNT(*) AS total FROM {}{}", quoted(&query.table), where_sql);
    q
}

/// INSERT only the supplied columns; the database fills defaults for the rest.
pub fn insert(table: &str, values: &Map<String, Value>, types: ColumnTypes<'_>) -> QueryBuf {
    let mut q = QueryBuf::new();
    if values.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quoted(table));
        return q;
    }
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (name, v) in values {
        cols.push(quoted(name));
        placeholders.push(q.placeholder(v.clone(), types(table, name)));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        quoted(table),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// UPDATE the rows the query matches, setting only the supplied columns.
pub fn update(query: &QuerySpec, values: &Map<String, Value>, types: ColumnTypes<'_>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(values.len());
    for (name, v) in values {
        let ph = q.placeholder(v.clone(), types(&query.table, name));
        sets.push(format!("{} = {}", quoted(name), ph));
    }
    let where_sql = where_clause(query, &mut q, types);
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING *",
        quoted(&query.table),
        sets.join(", "),
        where_sql
    );
    q
}

/// DELETE the rows the query matches.
pub fn delete(query: &QuerySpec, types: ColumnTypes<'_>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(query, &mut q, types);
    q.sql = format!("DELETE FROM {}{}", quoted(&query.table), where_sql);
    q
}
