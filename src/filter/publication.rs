//! Publication workflow: status ids and the read scope for published records.

use crate::query::{Operator, QuerySpec};
use serde_json::Value;

pub const PUBLICATION_STATUS_COLUMN: &str = "publication_status_id";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublicationStatus {
    Published = 1,
    Unpublished = 2,
    WaitingForApproval = 3,
    WaitingForTranslation = 4,
}

impl PublicationStatus {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(PublicationStatus::Published),
            2 => Some(PublicationStatus::Unpublished),
            3 => Some(PublicationStatus::WaitingForApproval),
            4 => Some(PublicationStatus::WaitingForTranslation),
            _ => None,
        }
    }

    /// Accepts integers and integer strings.
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_i64().and_then(Self::from_id),
            Value::String(s) => s.trim().parse::<i64>().ok().and_then(Self::from_id),
            _ => None,
        }
    }

    pub fn id(&self) -> i64 {
        *self as i64
    }

    pub fn label(&self) -> &'static str {
        match self {
            PublicationStatus::Published => "published",
            PublicationStatus::Unpublished => "unpublished",
            PublicationStatus::WaitingForApproval => "waiting for approval",
            PublicationStatus::WaitingForTranslation => "waiting for translation",
        }
    }
}

/// Strategy restricting a query to published records.
pub trait PublicationScope: Send + Sync {
    fn scope_published(&self, query: QuerySpec) -> QuerySpec;
}

/// `<column> = 1` on the base table.
#[derive(Clone, Debug)]
pub struct StatusColumnScope {
    column: String,
}

impl StatusColumnScope {
    pub fn new(column: impl Into<String>) -> Self {
        StatusColumnScope { column: column.into() }
    }
}

impl Default for StatusColumnScope {
    fn default() -> Self {
        Self::new(PUBLICATION_STATUS_COLUMN)
    }
}

impl PublicationScope for StatusColumnScope {
    fn scope_published(&self, query: QuerySpec) -> QuerySpec {
        query.filter(
            self.column.clone(),
            Operator::Eq,
            Value::from(PublicationStatus::Published.id()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_ids_and_labels() {
        assert_eq!(PublicationStatus::from_id(1), Some(PublicationStatus::Published));
        assert_eq!(PublicationStatus::from_value(&json!("3")).map(|s| s.label()), Some("waiting for approval"));
        assert_eq!(PublicationStatus::from_id(9), None);
        assert_eq!(PublicationStatus::from_value(&json!(true)), None);
    }

    #[test]
    fn scope_adds_published_predicate() {
        let q = StatusColumnScope::default().scope_published(QuerySpec::new("articles", "id"));
        assert_eq!(q.predicates[0].column, PUBLICATION_STATUS_COLUMN);
        assert_eq!(q.predicates[0].value, json!(1));
    }
}
