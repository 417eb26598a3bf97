//! Bundle Services
//!
//! Lifecycle manager for services contributed by independently packaged
//! bundles.
//!
//! # Overview
//!
//! Each service provides zero or more interfaces and references other
//! services by interface name. The [`ServiceLayer`]:
//! - Verifies that every referenced interface has exactly one provider
//! - Constructs every service once, dependencies before dependents
//! - Detects dependency cycles during construction
//! - Tears services down dependents-first, destroying a shared service only
//!   after its last dependent released it
//!
//! # Example Manifest
//!
//! ```yaml
//! version: "1.0"
//!
//! bundles:
//!   logging:
//!     services:
//!       Logger:
//!         factory: console_logger
//!         provides: [logging.Logger]
//!         properties:
//!           level: info
//!
//!   storage:
//!     services:
//!       Database:
//!         provides: [storage.Database]
//!         references:
//!           logger: logging.Logger
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = FactoryRegistry::new()
//!     .with_factory("console_logger", FnFactory::new(|options| {
//!         Ok(Arc::new(ConsoleLogger::new(options.properties_as()?)))
//!     }))
//!     .with_factory("Database", FnFactory::new(|options| {
//!         let logger = options.references.get::<ConsoleLogger>("logger")?;
//!         Ok(Arc::new(Database::open(logger)?))
//!     }));
//!
//! let manifest = BundleManifest::from_file("bundles.yaml")?;
//! let mut layer = ServiceLayer::new(manifest.to_bundles(&registry)?)?;
//! layer.start()?;
//! let db = layer.instance::<Database>("storage.Database");
//! layer.destroy()?;
//! ```

pub mod cli;
pub mod config;
pub mod runtime;
pub mod service;

pub use cli::ServicesArgs;
pub use config::{BundleManifest, ManifestError, ReferenceSpec, ServiceConfig};
pub use runtime::{
    verify_dependencies, ActivationPlan, DependencyError, InterfaceIndex, LayerError, LayerPhase,
    PlanStep, ServiceLayer, TeardownFailure,
};
pub use service::{
    BundleDescriptor, Dependency, FactoryRegistry, FnFactory, PlaceholderFactory, Properties,
    References, ServiceDescriptor, ServiceError, ServiceFactory, ServiceInstance, ServiceOptions,
    ServiceState, StateError,
};
