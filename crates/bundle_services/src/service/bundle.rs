//! Bundle descriptors: the grouping unit services are contributed in

use super::descriptor::ServiceDescriptor;

/// A named, ordered collection of services contributed by one package
#[derive(Debug)]
pub struct BundleDescriptor {
    name: String,
    services: Vec<ServiceDescriptor>,
}

impl BundleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
        }
    }

    /// Add a service, keeping declaration order
    pub fn with_service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    pub fn push(&mut self, service: ServiceDescriptor) {
        self.services.push(service);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Give up the services; the bundle itself has no further role
    pub fn into_services(self) -> Vec<ServiceDescriptor> {
        self.services
    }
}
