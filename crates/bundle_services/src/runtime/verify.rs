//! Dependency verification and the interface index

use crate::service::ServiceDescriptor;
use std::collections::{HashMap, HashSet};

/// Maps every provided interface to the position of its single provider
#[derive(Debug, Clone, Default)]
pub struct InterfaceIndex {
    providers: HashMap<String, usize>,
}

impl InterfaceIndex {
    /// Position of the service providing `interface`
    pub fn get(&self, interface: &str) -> Option<usize> {
        self.providers.get(interface).copied()
    }

    pub fn contains(&self, interface: &str) -> bool {
        self.providers.contains_key(interface)
    }

    /// All interface names with their provider positions
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.providers.iter().map(|(name, &idx)| (name.as_str(), idx))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Number of dependency edges pointing at each service
    pub fn dependent_counts(&self, services: &[ServiceDescriptor]) -> Vec<usize> {
        let mut counts = vec![0; services.len()];
        for service in services {
            for dependency in service.dependencies() {
                if let Some(target) = self.get(&dependency.interface) {
                    counts[target] += 1;
                }
            }
        }
        counts
    }
}

/// Validate the flattened services and build the interface index.
///
/// Nothing is constructed and no service state is touched.
pub fn verify_dependencies(
    services: &[ServiceDescriptor],
) -> Result<InterfaceIndex, DependencyError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(services.len());
    let mut providers: HashMap<String, usize> = HashMap::new();

    // Every id and every provided interface must be unique
    for (idx, service) in services.iter().enumerate() {
        if !ids.insert(service.id()) {
            return Err(DependencyError::DuplicateService(service.id().to_string()));
        }

        for interface in service.interfaces() {
            if interface.trim().is_empty() {
                return Err(DependencyError::InvalidInterface {
                    service: service.id().to_string(),
                    interface: interface.clone(),
                });
            }

            if let Some(&first) = providers.get(interface) {
                return Err(DependencyError::DuplicateInterface {
                    interface: interface.clone(),
                    first: services[first].id().to_string(),
                    second: service.id().to_string(),
                });
            }
            providers.insert(interface.clone(), idx);
        }
    }

    // Every dependency must name a bound interface under a unique binding
    for service in services {
        let mut bindings: HashSet<&str> = HashSet::new();

        for dependency in service.dependencies() {
            if dependency.name.trim().is_empty() {
                return Err(DependencyError::InvalidBinding {
                    service: service.id().to_string(),
                    interface: dependency.interface.clone(),
                });
            }
            if !bindings.insert(dependency.name.as_str()) {
                return Err(DependencyError::DuplicateBinding {
                    service: service.id().to_string(),
                    binding: dependency.name.clone(),
                });
            }
            if dependency.interface.trim().is_empty() {
                return Err(DependencyError::InvalidInterface {
                    service: service.id().to_string(),
                    interface: dependency.interface.clone(),
                });
            }
            if !providers.contains_key(&dependency.interface) {
                return Err(DependencyError::UnboundDependency {
                    service: service.id().to_string(),
                    binding: dependency.name.clone(),
                    interface: dependency.interface.clone(),
                });
            }
        }
    }

    log::debug!(
        "Verified {} services providing {} interfaces",
        services.len(),
        providers.len()
    );

    Ok(InterfaceIndex { providers })
}

/// Errors found while verifying the service graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    #[error("Service '{service}' requires interface '{interface}' (as '{binding}') which no service provides")]
    UnboundDependency {
        service: String,
        binding: String,
        interface: String,
    },

    #[error("Interface '{interface}' is provided by both '{first}' and '{second}'")]
    DuplicateInterface {
        interface: String,
        first: String,
        second: String,
    },

    #[error("Service '{service}' uses an invalid interface name '{interface}'")]
    InvalidInterface { service: String, interface: String },

    #[error("Service '{service}' has an empty binding name for interface '{interface}'")]
    InvalidBinding { service: String, interface: String },

    #[error("Service '{service}' binds '{binding}' more than once")]
    DuplicateBinding { service: String, binding: String },

    #[error("Service id '{0}' is defined more than once")]
    DuplicateService(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{FnFactory, ServiceDescriptor};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(id: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(id, FnFactory::new(|_| Ok(Arc::new(()))))
    }

    #[test]
    fn test_index_maps_interfaces_to_providers() {
        let services = vec![
            service("Logger").provides("logging.Logger"),
            service("Database")
                .provides("storage.Database")
                .provides("storage.Health")
                .depends_on("logger", "logging.Logger"),
        ];

        let index = verify_dependencies(&services).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("logging.Logger"), Some(0));
        assert_eq!(index.get("storage.Database"), Some(1));
        assert_eq!(index.get("storage.Health"), Some(1));
        assert!(!index.contains("http.Api"));
        assert_eq!(index.dependent_counts(&services), vec![1, 0]);
    }

    #[test]
    fn test_duplicate_interface_rejected() {
        let services = vec![
            service("A").provides("shared.Interface"),
            service("B").provides("shared.Interface"),
        ];

        assert_eq!(
            verify_dependencies(&services).unwrap_err(),
            DependencyError::DuplicateInterface {
                interface: "shared.Interface".to_string(),
                first: "A".to_string(),
                second: "B".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_interface_within_one_service_rejected() {
        let services = vec![service("A").provides("x").provides("x")];
        assert!(matches!(
            verify_dependencies(&services),
            Err(DependencyError::DuplicateInterface { .. })
        ));
    }

    #[test]
    fn test_unbound_dependency_runs_no_constructor() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        let services = vec![ServiceDescriptor::new(
            "Api",
            FnFactory::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(()))
            }),
        )
        .depends_on("db", "storage.Database")];

        let err = verify_dependencies(&services).unwrap_err();
        assert!(matches!(
            err,
            DependencyError::UnboundDependency { ref interface, .. }
                if interface == "storage.Database"
        ));
        assert_eq!(constructed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let empty_interface = vec![service("A").provides("  ")];
        assert!(matches!(
            verify_dependencies(&empty_interface),
            Err(DependencyError::InvalidInterface { .. })
        ));

        let empty_binding = vec![service("A").provides("a"), service("B").depends_on("", "a")];
        assert!(matches!(
            verify_dependencies(&empty_binding),
            Err(DependencyError::InvalidBinding { .. })
        ));

        let duplicate_binding = vec![
            service("A").provides("a").provides("b"),
            service("B").depends_on("dep", "a").depends_on("dep", "b"),
        ];
        assert_eq!(
            verify_dependencies(&duplicate_binding).unwrap_err(),
            DependencyError::DuplicateBinding {
                service: "B".to_string(),
                binding: "dep".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_service_id_rejected() {
        let services = vec![service("A"), service("A")];
        assert_eq!(
            verify_dependencies(&services).unwrap_err(),
            DependencyError::DuplicateService("A".to_string())
        );
    }

    #[test]
    fn test_cycles_pass_verification() {
        // Cycles are only detected during activation
        let services = vec![
            service("A").provides("a").depends_on("b", "b"),
            service("B").provides("b").depends_on("a", "a"),
        ];
        assert!(verify_dependencies(&services).is_ok());
    }
}
