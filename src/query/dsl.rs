//! The `filter` request parameter: `{"fields": [...] | {...}, "order": "title DESC"}`.

use crate::resource::SortDirection;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldFilters {
    /// Ordered explicit predicates; each field is checked like `fields`.
    Conditions(Vec<FieldCondition>),
    /// `field -> value`, each a case-insensitive substring match.
    Contains(Vec<(String, Value)>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSpec {
    pub fields: Option<FieldFilters>,
    pub order: Option<String>,
}

impl FilterSpec {
    /// Parse the (already URL-decoded) parameter. Absent, empty or malformed input is no filter.
    pub fn parse(raw: Option<&str>) -> Option<FilterSpec> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed filter parameter");
                return None;
            }
        };
        let obj = value.as_object()?;
        let fields = match obj.get("fields") {
            Some(Value::Array(items)) => Some(FieldFilters::Conditions(
                items.iter().filter_map(parse_condition).collect(),
            )),
            Some(Value::Object(map)) => Some(FieldFilters::Contains(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            _ => None,
        };
        let order = obj
            .get("order")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(FilterSpec { fields, order })
    }
}

fn parse_condition(item: &Value) -> Option<FieldCondition> {
    let obj = item.as_object()?;
    let field = obj.get("field")?.as_str()?.to_string();
    let operator = obj
        .get("operator")
        .and_then(Value::as_str)
        .unwrap_or("=")
        .to_string();
    let value = obj.get("value").cloned().unwrap_or(Value::Null);
    Some(FieldCondition { field, operator, value })
}

fn order_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^(.+)\s+(ASC|DESC)\s*$").expect("static regex"))
}

/// Split `"<field> ASC|DESC"`. Without a direction the whole string is the field and
/// `fallback` is kept.
pub fn parse_order(order: &str, fallback: SortDirection) -> (String, SortDirection) {
    match order_pattern().captures(order) {
        Some(caps) => {
            let field = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let direction = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(fallback);
            (field.to_string(), direction)
        }
        None => (order.trim().to_string(), fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_or_malformed_is_none() {
        assert_eq!(FilterSpec::parse(None), None);
        assert_eq!(FilterSpec::parse(Some("")), None);
        assert_eq!(FilterSpec::parse(Some("{not json")), None);
        assert_eq!(FilterSpec::parse(Some("[1,2]")), None);
    }

    #[test]
    fn list_form_conditions() {
        let spec = FilterSpec::parse(Some(
            r#"{"fields":[{"field":"views","operator":">","value":10},{"nope":1}]}"#,
        ))
        .unwrap();
        assert_eq!(
            spec.fields,
            Some(FieldFilters::Conditions(vec![FieldCondition {
                field: "views".into(),
                operator: ">".into(),
                value: json!(10),
            }]))
        );
        assert_eq!(spec.order, None);
    }

    #[test]
    fn map_form_contains() {
        let spec = FilterSpec::parse(Some(r#"{"fields":{"title":"rust"},"order":"title DESC"}"#)).unwrap();
        assert_eq!(
            spec.fields,
            Some(FieldFilters::Contains(vec![("title".into(), json!("rust"))]))
        );
        assert_eq!(spec.order.as_deref(), Some("title DESC"));
    }

    #[test]
    fn order_split() {
        assert_eq!(
            parse_order("title DESC", SortDirection::Asc),
            ("title".into(), SortDirection::Desc)
        );
        assert_eq!(
            parse_order("created_at  asc", SortDirection::Desc),
            ("created_at".into(), SortDirection::Asc)
        );
        assert_eq!(
            parse_order("title", SortDirection::Desc),
            ("title".into(), SortDirection::Desc)
        );
    }
}
