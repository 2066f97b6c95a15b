//! Query guards applied to every read and scoped write of a resource.

mod publication;

pub use publication::{PublicationScope, PublicationStatus, StatusColumnScope, PUBLICATION_STATUS_COLUMN};

use crate::config::FilterConfig;
use crate::error::{AppError, ConfigError};
use crate::query::{Operator, QuerySpec};

/// A resource-specific or generic query guard.
pub trait FilterPolicy: Send + Sync {
    fn apply(&self, query: QuerySpec) -> Result<QuerySpec, AppError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Permissive,
    /// Every resource must register its own filter.
    Paranoid,
}

impl std::str::FromStr for FilterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(FilterMode::Permissive),
            "paranoid" => Ok(FilterMode::Paranoid),
            other => Err(ConfigError::Validation(format!(
                "invalid filter mode: {} (expected permissive or paranoid)",
                other
            ))),
        }
    }
}

/// Fallback used when a resource has no custom filter.
#[derive(Clone, Debug)]
pub struct GenericFilter {
    mode: FilterMode,
    expected: String,
}

impl GenericFilter {
    /// `expected` is the filter name the resource would need in paranoid mode.
    pub fn new(mode: FilterMode, expected: impl Into<String>) -> Self {
        GenericFilter {
            mode,
            expected: expected.into(),
        }
    }
}

impl FilterPolicy for GenericFilter {
    fn apply(&self, query: QuerySpec) -> Result<QuerySpec, AppError> {
        match self.mode {
            FilterMode::Permissive => Ok(query),
            FilterMode::Paranoid => Err(AppError::PolicyViolation(format!(
                "filtering mode is set to paranoid, please register a {} filter for this resource",
                self.expected
            ))),
        }
    }
}

/// Declarative custom filter: fixed predicates appended to every query.
#[derive(Clone, Debug)]
pub struct ConditionFilter {
    conditions: Vec<(String, Operator, serde_json::Value)>,
}

impl ConditionFilter {
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        let mut conditions = Vec::with_capacity(config.conditions.len());
        for c in &config.conditions {
            let op = Operator::parse(&c.operator).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "filter {}: unsupported operator '{}'",
                    config.name, c.operator
                ))
            })?;
            conditions.push((c.field.clone(), op, c.value.clone()));
        }
        Ok(ConditionFilter { conditions })
    }
}

impl FilterPolicy for ConditionFilter {
    fn apply(&self, query: QuerySpec) -> Result<QuerySpec, AppError> {
        Ok(self
            .conditions
            .iter()
            .fold(query, |q, (field, op, value)| q.filter(field.clone(), *op, value.clone())))
    }
}
