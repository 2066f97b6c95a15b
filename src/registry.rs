//! Companion resolution: derive companion type names from a controller identity and look them
//! up in an explicit registry populated at startup.

use crate::case::base_name;
use crate::config::{EntityDefinition, ResourceConfig};
use crate::error::AppError;
use crate::filter::FilterPolicy;
use crate::rules::RuleSet;
use std::collections::HashMap;
use std::sync::Arc;

pub const CONTROLLER_SUFFIX: &str = "Controller";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompanionKind {
    Entity,
    Validator,
    Filter,
}

impl CompanionKind {
    fn namespace(&self) -> &'static str {
        match self {
            CompanionKind::Entity => "models",
            CompanionKind::Validator => "http::requests",
            CompanionKind::Filter => "http::filters",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            CompanionKind::Entity => "",
            CompanionKind::Validator => "Request",
            CompanionKind::Filter => "Filter",
        }
    }
}

/// Suggested companion name for a controller identity.
/// `app::http::controllers::ArticleController` gives `app::models::Article`,
/// `app::http::requests::ArticleRequest` and `app::http::filters::ArticleFilter`.
pub fn suggested_name(controller: &str, kind: CompanionKind) -> String {
    let segments: Vec<&str> = controller.split("::").collect();
    let root = match segments.iter().position(|s| s.eq_ignore_ascii_case("http")) {
        Some(i) => segments[..i].join("::"),
        None => String::new(),
    };
    let base = base_name(controller);
    let stem = base.strip_suffix(CONTROLLER_SUFFIX).unwrap_or(base);
    let name = format!("{}{}", stem, kind.suffix());
    if root.is_empty() {
        format!("{}::{}", kind.namespace(), name)
    } else {
        format!("{}::{}::{}", root, kind.namespace(), name)
    }
}

/// Entities, validators and filters keyed by their fully qualified names.
#[derive(Clone, Default)]
pub struct CompanionRegistry {
    entities: HashMap<String, Arc<EntityDefinition>>,
    validators: HashMap<String, Arc<RuleSet>>,
    filters: HashMap<String, Arc<dyn FilterPolicy>>,
}

impl CompanionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entity(&mut self, entity: EntityDefinition) {
        self.entities.insert(entity.name.clone(), Arc::new(entity));
    }

    pub fn register_validator(&mut self, rules: RuleSet) {
        self.validators.insert(rules.name.clone(), Arc::new(rules));
    }

    pub fn register_filter(&mut self, name: impl Into<String>, filter: Arc<dyn FilterPolicy>) {
        self.filters.insert(name.into(), filter);
    }

    /// Register companions under the names derived from `controller`.
    pub fn register_conventional(
        &mut self,
        controller: &str,
        mut entity: EntityDefinition,
        rules: Option<RuleSet>,
        filter: Option<Arc<dyn FilterPolicy>>,
    ) {
        entity.name = suggested_name(controller, CompanionKind::Entity);
        self.register_entity(entity);
        if let Some(mut rules) = rules {
            rules.name = suggested_name(controller, CompanionKind::Validator);
            self.register_validator(rules);
        }
        if let Some(filter) = filter {
            self.register_filter(suggested_name(controller, CompanionKind::Filter), filter);
        }
    }

    /// Entity for a resource: the explicit entity when configured, else the derived name.
    /// Only this companion kind fails when absent.
    pub fn resolve_entity(&self, resource: &ResourceConfig) -> Result<Arc<EntityDefinition>, AppError> {
        let name = resource
            .entity
            .clone()
            .unwrap_or_else(|| suggested_name(&resource.controller, CompanionKind::Entity));
        self.entities
            .get(&name)
            .cloned()
            .ok_or_else(|| AppError::Resolution(format!("the {} entity type does not exist", name)))
    }

    pub fn resolve_validator(&self, controller: &str) -> Option<Arc<RuleSet>> {
        self.validators
            .get(&suggested_name(controller, CompanionKind::Validator))
            .cloned()
    }

    pub fn resolve_filter(&self, controller: &str) -> Option<Arc<dyn FilterPolicy>> {
        self.filters
            .get(&suggested_name(controller, CompanionKind::Filter))
            .cloned()
    }
}
