//! Stand-in factory used to simulate a manifest without real service code

use super::descriptor::Properties;
use super::error::ServiceError;
use super::factory::{ServiceFactory, ServiceInstance, ServiceOptions};
use std::sync::Arc;

/// Instance produced by [`PlaceholderFactory`]
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// Id of the service this stands in for
    pub service_id: String,
    /// Binding names that were resolved
    pub references: Vec<String>,
    /// Properties as declared
    pub properties: Properties,
}

/// Factory that records what it was given and logs every lifecycle step
#[derive(Debug, Clone, Default)]
pub struct PlaceholderFactory {
    name: String,
}

impl PlaceholderFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ServiceFactory for PlaceholderFactory {
    fn create(&self, options: ServiceOptions<'_>) -> Result<ServiceInstance, ServiceError> {
        let references: Vec<String> = options.references.names().map(str::to_string).collect();
        log::info!(
            "[{}] Placeholder '{}' created with references [{}]",
            options.service_id,
            self.name,
            references.join(", ")
        );

        Ok(Arc::new(Placeholder {
            service_id: options.service_id.to_string(),
            references,
            properties: options.properties.clone(),
        }))
    }

    fn destroy(&self, service_id: &str, _instance: ServiceInstance) -> Result<(), ServiceError> {
        log::info!("[{}] Placeholder '{}' destroyed", service_id, self.name);
        Ok(())
    }
}
