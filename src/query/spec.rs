//! Relational query description handed to stores and rendered to SQL.
//! Table, column and relation names only ever come from config or validated request input.

use crate::config::RelationKind;
use crate::resource::SortDirection;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    /// Case-insensitive substring match.
    Contains,
}

impl Operator {
    /// Parse a request-supplied operator. Unknown operators yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "=" | "==" | "eq" => Some(Operator::Eq),
            "!=" | "<>" | "ne" => Some(Operator::Ne),
            "<" | "lt" => Some(Operator::Lt),
            "<=" | "le" => Some(Operator::Le),
            ">" | "gt" => Some(Operator::Gt),
            ">=" | "ge" => Some(Operator::Ge),
            "like" => Some(Operator::Like),
            "not like" => Some(Operator::NotLike),
            "contains" | "ilike" => Some(Operator::Contains),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Contains => "ILIKE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

/// Eager-loaded relation, nested rows capped at `limit`.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationLoad {
    pub name: String,
    pub kind: RelationKind,
    pub table: String,
    pub foreign_key: String,
    pub local_key: String,
    pub limit: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuerySpec {
    pub table: String,
    pub primary_key: String,
    /// Empty selects every column.
    pub select: Vec<String>,
    pub relations: Vec<RelationLoad>,
    pub predicates: Vec<Predicate>,
    pub order: Option<(String, SortDirection)>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        QuerySpec {
            table: table.into(),
            primary_key: primary_key.into(),
            select: Vec::new(),
            relations: Vec::new(),
            predicates: Vec::new(),
            order: None,
        }
    }

    pub fn select(mut self, columns: Vec<String>) -> Self {
        self.select = columns;
        self
    }

    pub fn with(mut self, relation: RelationLoad) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn filter(mut self, column: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.predicates.push(Predicate {
            column: column.into(),
            operator,
            value,
        });
        self
    }

    pub fn where_key(self, id: &Value) -> Self {
        let pk = self.primary_key.clone();
        self.filter(pk, Operator::Eq, id.clone())
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    /// Base table followed by every relation table the query reads.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = vec![self.table.as_str()];
        for rel in &self.relations {
            if !tables.contains(&rel.table.as_str()) {
                tables.push(rel.table.as_str());
            }
        }
        tables
    }
}
