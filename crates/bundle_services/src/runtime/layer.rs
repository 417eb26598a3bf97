//! Service layer - constructs services dependencies-first and tears them down dependents-first

use super::plan::{resolve_targets, ActivationPlan};
use super::verify::{verify_dependencies, DependencyError, InterfaceIndex};
use crate::service::{
    BundleDescriptor, References, ServiceDescriptor, ServiceError, ServiceInstance, ServiceState,
    StateError,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Phase of the layer as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerPhase {
    /// Created and verified, nothing constructed
    NotStarted,
    /// Every service is live
    Started,
    /// `start()` aborted part way; only `destroy()` is allowed
    Failed,
    /// Torn down; terminal
    Destroyed,
}

impl fmt::Display for LayerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayerPhase::NotStarted => "not-started",
            LayerPhase::Started => "started",
            LayerPhase::Failed => "failed",
            LayerPhase::Destroyed => "destroyed",
        })
    }
}

/// Owns every service of every bundle and drives their lifecycle.
///
/// Reference counts follow activation edges: each dependent that resolves a
/// service holds it once, and the layer holds every root (a service no other
/// service depends on) once. A service is destroyed when its last holder lets
/// go, and only then are its own dependencies released.
pub struct ServiceLayer {
    services: Vec<ServiceDescriptor>,
    index: InterfaceIndex,
    /// Provider position for each declared dependency
    targets: Vec<Vec<usize>>,
    /// Number of declared dependency edges pointing at each service
    dependents: Vec<usize>,
    /// Edges actually activated by each service
    held: Vec<Vec<usize>>,
    /// Roots currently held by the layer, in activation order
    roots: Vec<usize>,
    /// Services under construction, outermost first
    stack: Vec<usize>,
    phase: LayerPhase,
}

impl ServiceLayer {
    /// Flatten the bundles and verify the dependency graph
    pub fn new(bundles: Vec<BundleDescriptor>) -> Result<Self, LayerError> {
        let bundle_count = bundles.len();
        let services: Vec<ServiceDescriptor> = bundles
            .into_iter()
            .flat_map(BundleDescriptor::into_services)
            .collect();

        let index = verify_dependencies(&services)?;
        let targets = resolve_targets(&services, &index)?;
        let dependents = index.dependent_counts(&services);

        log::debug!(
            "Service layer created with {} services from {} bundles",
            services.len(),
            bundle_count
        );

        Ok(Self {
            held: vec![Vec::new(); services.len()],
            services,
            index,
            targets,
            dependents,
            roots: Vec::new(),
            stack: Vec::new(),
            phase: LayerPhase::NotStarted,
        })
    }

    /// Construct every service, dependencies strictly before dependents.
    ///
    /// The first error aborts the walk; services constructed so far stay alive
    /// until [`destroy`](Self::destroy) is called.
    pub fn start(&mut self) -> Result<(), LayerError> {
        if self.phase != LayerPhase::NotStarted {
            return Err(LayerError::InvalidPhase {
                operation: "start",
                phase: self.phase,
            });
        }

        log::info!("Starting {} services...", self.services.len());

        match self.start_all() {
            Ok(()) => {
                self.phase = LayerPhase::Started;
                log::info!("All services started");
                Ok(())
            }
            Err(e) => {
                self.phase = LayerPhase::Failed;
                Err(e)
            }
        }
    }

    fn start_all(&mut self) -> Result<(), LayerError> {
        self.stack.clear();

        for idx in 0..self.services.len() {
            if self.dependents[idx] == 0 {
                self.acquire(idx)?;
                self.roots.push(idx);
            } else if self.services[idx].state() == ServiceState::NotConstructed {
                // Held by its dependents once they are reached
                self.init_service(idx)?;
            }
        }

        Ok(())
    }

    /// Activate one edge: construct if needed, then count the new holder
    fn acquire(&mut self, idx: usize) -> Result<ServiceInstance, LayerError> {
        let instance = self.init_service(idx)?;
        let count = self.services[idx].add_ref();
        log::trace!("[{}] Reference count {}", self.services[idx].id(), count);
        Ok(instance)
    }

    /// Construct the service and its dependencies, or return the live instance
    fn init_service(&mut self, idx: usize) -> Result<ServiceInstance, LayerError> {
        match self.services[idx].state() {
            ServiceState::Constructed => return Ok(self.services[idx].instance_or_err()?),
            ServiceState::Constructing => return Err(self.cycle_error(idx)),
            ServiceState::NotConstructed => {}
            state => {
                return Err(StateError {
                    service: self.services[idx].id().to_string(),
                    state,
                    action: "be constructed",
                }
                .into())
            }
        }

        // Marking before recursing is what makes re-entry detectable
        self.services[idx].before_create()?;
        self.stack.push(idx);

        let mut references = References::new();
        for position in 0..self.targets[idx].len() {
            let target = self.targets[idx][position];
            let instance = self.acquire(target)?;
            self.held[idx].push(target);

            let binding = self.services[idx].dependencies()[position].name.clone();
            references.insert(binding, instance);
        }

        self.stack.pop();
        self.services[idx].create(references)
    }

    fn cycle_error(&self, idx: usize) -> LayerError {
        let start = self
            .stack
            .iter()
            .position(|&member| member == idx)
            .unwrap_or(0);

        let mut path: Vec<String> = self.stack[start..]
            .iter()
            .map(|&member| self.services[member].id().to_string())
            .collect();
        path.push(self.services[idx].id().to_string());

        LayerError::Cycle { path }
    }

    /// Tear down every service, dependents before their dependencies.
    ///
    /// Callable in any phase. A failing destructor does not stop the walk: the
    /// service is still marked destroyed, the remaining services are still torn
    /// down, and all failures are returned together afterwards.
    pub fn destroy(&mut self) -> Result<(), LayerError> {
        let remaining = self
            .services
            .iter()
            .filter(|service| service.state() != ServiceState::Destroyed)
            .count();
        if remaining > 0 {
            log::info!("Destroying {} services...", remaining);
        }

        let mut failures = Vec::new();

        for idx in std::mem::take(&mut self.roots) {
            self.release(idx, &mut failures);
        }

        // Services a partial start never handed to a holder
        for idx in 0..self.services.len() {
            if self.services[idx].state() != ServiceState::Destroyed
                && self.services[idx].ref_count() == 0
            {
                self.finalize(idx, &mut failures);
            }
        }

        for idx in 0..self.services.len() {
            if self.services[idx].state() != ServiceState::Destroyed {
                log::warn!(
                    "[{}] Still referenced after teardown, destroying anyway",
                    self.services[idx].id()
                );
                self.finalize(idx, &mut failures);
            }
        }

        self.phase = LayerPhase::Destroyed;

        if failures.is_empty() {
            if remaining > 0 {
                log::info!("All services destroyed");
            }
            Ok(())
        } else {
            Err(LayerError::Teardown(failures))
        }
    }

    /// Release one holder of the service, destroying it once nobody holds it
    fn release(&mut self, idx: usize, failures: &mut Vec<TeardownFailure>) {
        if self.services[idx].state() == ServiceState::Destroyed {
            return;
        }

        let count = self.services[idx].remove_ref();
        if count > 0 {
            log::trace!(
                "[{}] Still held by {} dependents",
                self.services[idx].id(),
                count
            );
            return;
        }

        self.finalize(idx, failures);
    }

    /// Destroy the service, then release every edge it activated
    fn finalize(&mut self, idx: usize, failures: &mut Vec<TeardownFailure>) {
        if let Err(source) = self.services[idx].destroy() {
            let service = self.services[idx].id().to_string();
            log::error!("[{}] Error destroying service: {}", service, source);
            failures.push(TeardownFailure { service, source });
        }

        for target in std::mem::take(&mut self.held[idx]) {
            self.release(target, failures);
        }
    }

    /// Compute the activation plan without constructing anything
    pub fn plan(&self) -> Result<ActivationPlan, LayerError> {
        ActivationPlan::build(&self.services, &self.index)
    }

    /// The service providing `interface`
    pub fn lookup(&self, interface: &str) -> Option<&ServiceDescriptor> {
        self.index.get(interface).map(|idx| &self.services[idx])
    }

    /// The live instance providing `interface`, downcast to `T`
    pub fn instance<T: Any + Send + Sync>(&self, interface: &str) -> Option<Arc<T>> {
        let instance = self.lookup(interface)?.instance()?;
        Arc::clone(instance).downcast::<T>().ok()
    }

    /// The service with the given id
    pub fn service(&self, id: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|service| service.id() == id)
    }

    /// All services in flattened bundle order
    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter()
    }

    pub fn index(&self) -> &InterfaceIndex {
        &self.index
    }

    pub fn phase(&self) -> LayerPhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLayer")
            .field("phase", &self.phase)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// A destructor that failed during teardown
#[derive(Debug)]
pub struct TeardownFailure {
    pub service: String,
    pub source: ServiceError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.source)
    }
}

fn describe_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while starting or destroying the layer
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Cycle during service construction: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Cannot {operation} service layer in phase '{phase}'")]
    InvalidPhase {
        operation: &'static str,
        phase: LayerPhase,
    },

    #[error("Invalid service state: {0}")]
    InvalidState(#[from] StateError),

    #[error("Failed to construct service '{service}': {source}")]
    Construction {
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("{} service(s) failed to shut down: {}", .0.len(), describe_failures(.0))]
    Teardown(Vec<TeardownFailure>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::FnFactory;
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<String>>>;

    fn tracked(id: &str, events: &Events) -> ServiceDescriptor {
        let created = events.clone();
        let destroyed = events.clone();
        let factory = FnFactory::new(move |options| {
            created
                .lock()
                .unwrap()
                .push(format!("create {}", options.service_id));
            Ok(Arc::new(options.service_id.to_string()))
        })
        .with_destroy(move |id, _| {
            destroyed.lock().unwrap().push(format!("destroy {}", id));
            Ok(())
        });
        ServiceDescriptor::new(id, factory)
    }

    fn layer(services: Vec<ServiceDescriptor>) -> ServiceLayer {
        let bundle = services
            .into_iter()
            .fold(BundleDescriptor::new("test"), BundleDescriptor::with_service);
        ServiceLayer::new(vec![bundle]).unwrap()
    }

    fn take(events: &Events) -> Vec<String> {
        std::mem::take(&mut *events.lock().unwrap())
    }

    #[test]
    fn test_chain_start_and_destroy() {
        let events = Events::default();
        let mut layer = layer(vec![
            tracked("Logger", &events).provides("logging.Logger"),
            tracked("Database", &events)
                .provides("storage.Database")
                .depends_on("logger", "logging.Logger"),
            tracked("Api", &events).depends_on("db", "storage.Database"),
        ]);

        layer.start().unwrap();
        assert_eq!(layer.phase(), LayerPhase::Started);
        assert_eq!(
            take(&events),
            vec!["create Logger", "create Database", "create Api"]
        );
        assert!(layer.services().all(|service| service.ref_count() == 1));

        layer.destroy().unwrap();
        assert_eq!(layer.phase(), LayerPhase::Destroyed);
        assert_eq!(
            take(&events),
            vec!["destroy Api", "destroy Database", "destroy Logger"]
        );
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let events = Events::default();
        let mut layer = layer(vec![tracked("A", &events)]);

        layer.start().unwrap();
        take(&events);

        let err = layer.start().unwrap_err();
        assert!(matches!(
            err,
            LayerError::InvalidPhase {
                operation: "start",
                phase: LayerPhase::Started
            }
        ));
        assert!(take(&events).is_empty());
    }

    #[test]
    fn test_start_after_destroy_is_rejected() {
        let mut layer = layer(vec![tracked("A", &Events::default())]);
        layer.destroy().unwrap();
        assert!(matches!(
            layer.start(),
            Err(LayerError::InvalidPhase {
                phase: LayerPhase::Destroyed,
                ..
            })
        ));
    }

    #[test]
    fn test_cycle_detected_during_start() {
        let events = Events::default();
        let mut layer = layer(vec![
            tracked("A", &events).provides("a").depends_on("b", "b"),
            tracked("B", &events).provides("b").depends_on("a", "a"),
        ]);

        match layer.start() {
            Err(LayerError::Cycle { path }) => assert_eq!(path, vec!["A", "B", "A"]),
            other => panic!("expected cycle error, got {:?}", other),
        }
        assert_eq!(layer.phase(), LayerPhase::Failed);
        assert!(take(&events).is_empty());
        assert!(layer
            .services()
            .all(|service| service.state() != ServiceState::Constructed));
    }

    #[test]
    fn test_lookup_and_typed_instance() {
        let events = Events::default();
        let mut layer = layer(vec![tracked("Logger", &events).provides("logging.Logger")]);

        assert!(layer.instance::<String>("logging.Logger").is_none());
        layer.start().unwrap();

        let logger = layer.instance::<String>("logging.Logger").unwrap();
        assert_eq!(logger.as_str(), "Logger");
        assert!(layer.instance::<u32>("logging.Logger").is_none());
        assert_eq!(layer.lookup("logging.Logger").unwrap().id(), "Logger");
        assert!(layer.lookup("missing").is_none());
        assert_eq!(layer.service("Logger").unwrap().state(), ServiceState::Constructed);
    }

    #[test]
    fn test_verification_errors_surface_from_new() {
        let bundle = BundleDescriptor::new("broken")
            .with_service(tracked("Api", &Events::default()).depends_on("db", "storage.Database"));

        assert!(matches!(
            ServiceLayer::new(vec![bundle]),
            Err(LayerError::Dependency(DependencyError::UnboundDependency { .. }))
        ));
    }

    #[test]
    fn test_empty_layer() {
        let mut layer = ServiceLayer::new(Vec::new()).unwrap();
        assert!(layer.is_empty());
        layer.start().unwrap();
        layer.destroy().unwrap();
        assert_eq!(layer.phase(), LayerPhase::Destroyed);
    }
}
