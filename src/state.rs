//! Shared application state: one controller per resource key, built at startup.

use crate::config::FullConfig;
use crate::error::{AppError, ConfigError};
use crate::service::{ControllerServices, ResourceController};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub controllers: Arc<HashMap<String, Arc<ResourceController>>>,
}

impl AppState {
    /// Build every configured resource. Any resolution failure aborts startup.
    pub async fn build(config: &FullConfig, services: &ControllerServices) -> Result<Self, AppError> {
        let mut controllers = HashMap::with_capacity(config.resources.len());
        for resource in &config.resources {
            let controller = ResourceController::build(resource, services).await?;
            let key = controller.descriptor().resource_key.clone();
            if controllers.insert(key.clone(), Arc::new(controller)).is_some() {
                return Err(ConfigError::DuplicateResourceKey(key).into());
            }
        }
        Ok(AppState {
            controllers: Arc::new(controllers),
        })
    }

    pub fn controller(&self, resource_key: &str) -> Result<Arc<ResourceController>, AppError> {
        self.controllers
            .get(resource_key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown resource: {}", resource_key)))
    }

    pub fn resource_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.controllers.keys().cloned().collect();
        keys.sort();
        keys
    }
}
