//! Service descriptors and their lifecycle state machine

use super::error::ServiceError;
use super::factory::{References, ServiceFactory, ServiceInstance, ServiceOptions};
use crate::runtime::LayerError;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Opaque configuration handed verbatim to a service's factory
pub type Properties = Map<String, Value>;

/// Lifecycle state of a service.
///
/// Moves strictly forward: `NotConstructed -> Constructing -> Constructed -> Destroyed`.
/// A service that never finished construction may jump straight to `Destroyed`
/// during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not yet touched by the layer
    NotConstructed,
    /// Dependencies are being resolved
    Constructing,
    /// Instance is live
    Constructed,
    /// Torn down; terminal
    Destroyed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::NotConstructed => "not-constructed",
            ServiceState::Constructing => "constructing",
            ServiceState::Constructed => "constructed",
            ServiceState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared dependency: the interface required and the local name it is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Binding name the instance is passed under
    pub name: String,
    /// Interface that must be provided by exactly one service
    pub interface: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
        }
    }
}

/// One constructible, dependency-declaring service
pub struct ServiceDescriptor {
    id: String,
    interfaces: Vec<String>,
    dependencies: Vec<Dependency>,
    properties: Properties,
    factory: Arc<dyn ServiceFactory>,
    state: ServiceState,
    ref_count: usize,
    instance: Option<ServiceInstance>,
}

impl ServiceDescriptor {
    /// Create a descriptor constructed by `factory`
    pub fn new(id: impl Into<String>, factory: impl ServiceFactory + 'static) -> Self {
        Self::with_shared_factory(id, Arc::new(factory))
    }

    /// Create a descriptor sharing a factory with other descriptors
    pub fn with_shared_factory(id: impl Into<String>, factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            id: id.into(),
            interfaces: Vec::new(),
            dependencies: Vec::new(),
            properties: Properties::new(),
            factory,
            state: ServiceState::NotConstructed,
            ref_count: 0,
            instance: None,
        }
    }

    /// Declare an interface this service provides
    pub fn provides(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Declare a dependency bound to `name`
    pub fn depends_on(mut self, name: impl Into<String>, interface: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::new(name, interface));
        self
    }

    /// Replace the properties
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Set a single property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Number of live activations holding this service
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// The live instance, present only while constructed
    pub fn instance(&self) -> Option<&ServiceInstance> {
        self.instance.as_ref()
    }

    /// Mark the service as under construction so re-entry can be detected
    pub(crate) fn before_create(&mut self) -> Result<(), StateError> {
        if self.state != ServiceState::NotConstructed {
            return Err(self.state_error("begin construction"));
        }
        self.state = ServiceState::Constructing;
        log::debug!("[{}] Constructing", self.id);
        Ok(())
    }

    /// Run the factory with the resolved references
    pub(crate) fn create(&mut self, references: References) -> Result<ServiceInstance, LayerError> {
        if self.state != ServiceState::Constructing {
            return Err(self.state_error("create an instance").into());
        }

        let instance = self
            .factory
            .create(ServiceOptions {
                service_id: &self.id,
                references,
                properties: &self.properties,
            })
            .map_err(|source| LayerError::Construction {
                service: self.id.clone(),
                source,
            })?;

        self.instance = Some(Arc::clone(&instance));
        self.state = ServiceState::Constructed;
        log::info!("[{}] Constructed", self.id);
        Ok(instance)
    }

    /// Get the live instance, failing if the service is not constructed
    pub(crate) fn instance_or_err(&self) -> Result<ServiceInstance, StateError> {
        match (&self.state, &self.instance) {
            (ServiceState::Constructed, Some(instance)) => Ok(Arc::clone(instance)),
            _ => Err(self.state_error("hand out its instance")),
        }
    }

    /// Register one more activation, returning the new count
    pub(crate) fn add_ref(&mut self) -> usize {
        self.ref_count += 1;
        self.ref_count
    }

    /// Release one activation, returning the new count; never goes below zero
    pub(crate) fn remove_ref(&mut self) -> usize {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count
    }

    /// Tear the service down. No-op when already destroyed.
    ///
    /// The state becomes `Destroyed` even if the factory's destructor fails.
    pub(crate) fn destroy(&mut self) -> Result<(), ServiceError> {
        if self.state == ServiceState::Destroyed {
            return Ok(());
        }

        let previous = self.state;
        self.state = ServiceState::Destroyed;
        self.ref_count = 0;

        match self.instance.take() {
            Some(instance) => {
                log::info!("[{}] Destroying", self.id);
                self.factory.destroy(&self.id, instance)
            }
            None => {
                log::debug!("[{}] Discarded while {}", self.id, previous);
                Ok(())
            }
        }
    }

    fn state_error(&self, action: &'static str) -> StateError {
        StateError {
            service: self.id.clone(),
            state: self.state,
            action,
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("interfaces", &self.interfaces)
            .field("dependencies", &self.dependencies)
            .field("state", &self.state)
            .field("ref_count", &self.ref_count)
            .finish_non_exhaustive()
    }
}

/// A lifecycle operation was attempted in the wrong state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Service '{service}' cannot {action} while {state}")]
pub struct StateError {
    pub service: String,
    pub state: ServiceState,
    pub action: &'static str,
}
