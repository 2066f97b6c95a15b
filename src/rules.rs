//! Validator companions: declared rule sets, their create/update adjustment and local evaluation.

use crate::config::{RuleSpec, ValidatorConfig};
use crate::error::AppError;
use crate::store::Record;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Stands for the id of the object being updated inside uniqueness-style tokens,
/// e.g. `unique:articles,slug,#modelId`.
pub const MODEL_ID_PLACEHOLDER: &str = "#modelId";

/// Rules as evaluated for one request: field -> tokens.
pub type AdjustedRules = BTreeMap<String, Vec<String>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RuleContext<'a> {
    Create,
    /// Partial update of the object with this id, when known.
    Update(Option<&'a Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuleSet {
    pub name: String,
    pub rules: BTreeMap<String, RuleSpec>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, rules: BTreeMap<String, RuleSpec>) -> Self {
        RuleSet {
            name: name.into(),
            rules,
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(config.name.clone(), config.rules.clone())
    }

    /// The rule map as declared, for describe-rules.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .rules
            .iter()
            .map(|(field, spec)| {
                let v = match spec {
                    RuleSpec::Piped(s) => Value::String(s.clone()),
                    RuleSpec::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
                };
                (field.clone(), v)
            })
            .collect();
        Value::Object(map)
    }

    /// Create drops the id placeholder. Update strips `required`, substitutes the
    /// placeholder with the id (or drops it) and omits fields left without tokens.
    pub fn adjusted(&self, ctx: RuleContext<'_>) -> AdjustedRules {
        let mut out = AdjustedRules::new();
        for (field, spec) in &self.rules {
            let tokens: Vec<String> = spec
                .tokens()
                .into_iter()
                .filter(|t| !(matches!(ctx, RuleContext::Update(_)) && t.trim() == "required"))
                .map(|t| substitute_placeholder(&t, ctx))
                .collect();
            if tokens.is_empty() && matches!(ctx, RuleContext::Update(_)) {
                continue;
            }
            out.insert(field.clone(), tokens);
        }
        out
    }

    /// Evaluate `input` against adjusted rules. Tokens not understood locally are skipped.
    pub fn validate(input: &Record, rules: &AdjustedRules) -> Result<(), AppError> {
        let mut failures = Vec::new();
        for (field, tokens) in rules {
            let value = input.get(field).filter(|v| !is_blank(v));
            let Some(value) = value else {
                if tokens.iter().any(|t| t == "required") {
                    failures.push(format!("The {} field is required.", field));
                }
                continue;
            };
            let numeric = tokens.iter().any(|t| t == "numeric" || t == "integer");
            for token in tokens {
                if let Some(msg) = check_token(field, token, value, numeric) {
                    failures.push(msg);
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(failures.join(" ")))
        }
    }
}

fn substitute_placeholder(token: &str, ctx: RuleContext<'_>) -> String {
    let needle = format!(",{}", MODEL_ID_PLACEHOLDER);
    match ctx {
        RuleContext::Update(Some(id)) => {
            let id = match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            token.replace(&needle, &format!(",{}", id))
        }
        _ => token.replace(&needle, ""),
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_integer(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

/// Size used by `min`/`max`: numeric value, string length or item count.
fn size_of(v: &Value, numeric: bool) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if numeric => s.trim().parse::<f64>().ok(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(items) => Some(items.len() as f64),
        Value::Object(map) => Some(map.len() as f64),
        Value::Bool(_) | Value::Null => None,
    }
}

fn check_token(field: &str, token: &str, v: &Value, numeric: bool) -> Option<String> {
    let (name, arg) = match token.split_once(':') {
        Some((n, a)) => (n.trim(), Some(a.trim())),
        None => (token.trim(), None),
    };
    let ok = match name {
        "string" => v.is_string(),
        "integer" => is_integer(v),
        "numeric" => as_number(v).is_some(),
        "boolean" => {
            v.is_boolean()
                || matches!(v.as_i64(), Some(0 | 1))
                || matches!(v.as_str(), Some("0" | "1" | "true" | "false"))
        }
        "email" => v.as_str().is_some_and(|s| email_pattern().is_match(s)),
        "uuid" => v.as_str().is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
        "array" => v.is_array() || v.is_object(),
        "max" | "min" => {
            let limit = arg.and_then(|a| a.parse::<f64>().ok())?;
            match size_of(v, numeric) {
                Some(size) if name == "max" => size <= limit,
                Some(size) => size >= limit,
                None => false,
            }
        }
        "in" => {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            arg.unwrap_or("").split(',').map(str::trim).any(|a| a == text)
        }
        _ => true,
    };
    if ok {
        None
    } else {
        Some(match arg {
            Some(a) => format!("The {} field fails the {}:{} rule.", field, name, a),
            None => format!("The {} field must be {}.", field, describe(name)),
        })
    }
}

fn describe(name: &str) -> &str {
    match name {
        "string" => "a string",
        "integer" => "an integer",
        "numeric" => "a number",
        "boolean" => "true or false",
        "email" => "a valid email address",
        "uuid" => "a valid UUID",
        "array" => "an array",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> RuleSet {
        let config: ValidatorConfig = serde_json::from_value(json!({
            "name": "app::http::requests::ArticleRequest",
            "rules": {
                "title": "required|string|max:10",
                "slug": ["required", "unique:articles,slug,#modelId"],
                "views": "integer|min:0",
                "status": "in:draft,live"
            }
        }))
        .unwrap();
        RuleSet::from_config(&config)
    }

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => Record::new(),
        }
    }

    #[test]
    fn describe_returns_rules_as_declared() {
        let v = rules().to_value();
        assert_eq!(v["title"], json!("required|string|max:10"));
        assert_eq!(v["slug"], json!(["required", "unique:articles,slug,#modelId"]));
    }

    #[test]
    fn create_drops_placeholder() {
        let adjusted = rules().adjusted(RuleContext::Create);
        assert_eq!(adjusted["slug"], vec!["required", "unique:articles,slug"]);
        assert_eq!(adjusted["title"][0], "required");
    }

    #[test]
    fn update_strips_required_and_substitutes_id() {
        let id = json!(7);
        let adjusted = rules().adjusted(RuleContext::Update(Some(&id)));
        assert_eq!(adjusted["slug"], vec!["unique:articles,slug,7"]);
        assert_eq!(adjusted["title"], vec!["string", "max:10"]);
        let without_id = rules().adjusted(RuleContext::Update(None));
        assert_eq!(without_id["slug"], vec!["unique:articles,slug"]);
    }

    #[test]
    fn update_omits_fields_left_empty() {
        let mut map = BTreeMap::new();
        map.insert("title".to_string(), RuleSpec::Piped("required".into()));
        let adjusted = RuleSet::new("r", map).adjusted(RuleContext::Update(None));
        assert!(adjusted.is_empty());
    }

    #[test]
    fn validation_reports_each_failure() {
        let adjusted = rules().adjusted(RuleContext::Create);
        let err = RuleSet::validate(
            &record(json!({"title": "far too long title", "views": -1, "status": "gone"})),
            &adjusted,
        )
        .unwrap_err();
        let AppError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("slug field is required"));
        assert!(msg.contains("max:10"));
        assert!(msg.contains("min:0"));
        assert!(msg.contains("in:draft,live"));
    }

    #[test]
    fn valid_input_passes() {
        let adjusted = rules().adjusted(RuleContext::Create);
        RuleSet::validate(
            &record(json!({"title": "short", "slug": "s", "views": "3", "status": "live"})),
            &adjusted,
        )
        .unwrap();
        let update = rules().adjusted(RuleContext::Update(None));
        RuleSet::validate(&record(json!({"views": 2})), &update).unwrap();
    }

    #[test]
    fn typed_tokens() {
        let mut map = BTreeMap::new();
        map.insert("mail".to_string(), RuleSpec::Piped("email".into()));
        map.insert("ref".to_string(), RuleSpec::Piped("uuid".into()));
        map.insert("flag".to_string(), RuleSpec::Piped("boolean".into()));
        let adjusted = RuleSet::new("r", map).adjusted(RuleContext::Create);
        assert!(RuleSet::validate(
            &record(json!({"mail": "a@b.io", "ref": "67e55044-10b1-426f-9247-bb680e5fe0c8", "flag": 1})),
            &adjusted
        )
        .is_ok());
        assert!(RuleSet::validate(&record(json!({"mail": "nope"})), &adjusted).is_err());
        assert!(RuleSet::validate(&record(json!({"flag": "yes"})), &adjusted).is_err());
    }
}
