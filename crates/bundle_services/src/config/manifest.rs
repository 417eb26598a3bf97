//! Bundle manifest YAML schema definitions

use crate::service::{BundleDescriptor, FactoryRegistry, Properties, ServiceDescriptor};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Separator between bundle and service name in service ids
pub const ID_SEPARATOR: &str = "::";

/// Root manifest: every bundle and the services it contributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Manifest format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Bundle definitions (ordered map for deterministic service order)
    #[serde(default)]
    pub bundles: IndexMap<String, BundleConfig>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// One packaging unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Services contributed by this bundle, in declaration order
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
}

/// Service declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Factory name in the registry (defaults to the service name)
    #[serde(default)]
    pub factory: Option<String>,

    /// Interfaces this service provides
    #[serde(default)]
    pub provides: Vec<String>,

    /// Dependencies keyed by the binding name the instance is passed under
    #[serde(default)]
    pub references: IndexMap<String, ReferenceSpec>,

    /// Opaque configuration passed to the factory
    #[serde(default)]
    pub properties: Properties,
}

/// Reference specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceSpec {
    /// Simple reference: just the interface name
    Simple(String),
    /// Detailed reference: { interface: name }
    Detailed { interface: String },
}

impl ReferenceSpec {
    /// Get the interface this reference requires
    pub fn interface(&self) -> &str {
        match self {
            ReferenceSpec::Simple(interface) => interface,
            ReferenceSpec::Detailed { interface } => interface,
        }
    }
}

impl ServiceConfig {
    /// Factory name, falling back to the service name
    pub fn factory_name<'a>(&'a self, service_name: &'a str) -> &'a str {
        self.factory.as_deref().unwrap_or(service_name)
    }
}

impl BundleManifest {
    /// Load a manifest from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a manifest from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let manifest: BundleManifest =
            serde_yaml::from_str(content).map_err(ManifestError::Parse)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate names and references.
    ///
    /// Graph-level problems (duplicate or unbound interfaces) are left to the
    /// dependency verifier.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (bundle_name, bundle) in &self.bundles {
            check_name("bundle", bundle_name)?;

            for (service_name, service) in &bundle.services {
                check_name("service", service_name)?;
                let id = service_id(bundle_name, service_name);

                if let Some(factory) = &service.factory {
                    if factory.trim().is_empty() {
                        return Err(ManifestError::Validation(format!(
                            "Service '{}': 'factory' must not be empty",
                            id
                        )));
                    }
                }

                for interface in &service.provides {
                    if interface.trim().is_empty() {
                        return Err(ManifestError::Validation(format!(
                            "Service '{}': provided interface names must not be empty",
                            id
                        )));
                    }
                }

                for (binding, reference) in &service.references {
                    if binding.trim().is_empty() {
                        return Err(ManifestError::Validation(format!(
                            "Service '{}': reference names must not be empty",
                            id
                        )));
                    }
                    if reference.interface().trim().is_empty() {
                        return Err(ManifestError::Validation(format!(
                            "Service '{}': reference '{}' names no interface",
                            id, binding
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Keep only the named bundles
    pub fn select_bundles(&mut self, names: &[String]) -> Result<(), ManifestError> {
        if let Some(unknown) = names.iter().find(|name| !self.bundles.contains_key(*name)) {
            return Err(ManifestError::UnknownBundle(unknown.clone()));
        }
        self.bundles.retain(|name, _| names.contains(name));
        Ok(())
    }

    /// Total number of services across all bundles
    pub fn service_count(&self) -> usize {
        self.bundles.values().map(|bundle| bundle.services.len()).sum()
    }

    /// Every interface provided in the manifest
    pub fn interfaces(&self) -> Vec<String> {
        let mut interfaces: Vec<String> = self
            .bundles
            .values()
            .flat_map(|bundle| bundle.services.values())
            .flat_map(|service| service.provides.iter().cloned())
            .collect();
        interfaces.sort();
        interfaces.dedup();
        interfaces
    }

    /// Factory names used by the manifest, in declaration order
    pub fn factory_names(&self) -> Vec<String> {
        let names: IndexSet<&str> = self
            .bundles
            .values()
            .flat_map(|bundle| bundle.services.iter())
            .map(|(name, service)| service.factory_name(name))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Build bundle descriptors, resolving every factory through `registry`
    pub fn to_bundles(
        &self,
        registry: &FactoryRegistry,
    ) -> Result<Vec<BundleDescriptor>, ManifestError> {
        let mut bundles = Vec::with_capacity(self.bundles.len());

        for (bundle_name, bundle) in &self.bundles {
            let mut descriptor = BundleDescriptor::new(bundle_name.as_str());

            for (service_name, service) in &bundle.services {
                let id = service_id(bundle_name, service_name);
                let factory_name = service.factory_name(service_name);
                let factory = registry.get(factory_name).ok_or_else(|| {
                    ManifestError::UnknownFactory {
                        service: id.clone(),
                        factory: factory_name.to_string(),
                    }
                })?;

                let mut service_descriptor = ServiceDescriptor::with_shared_factory(id, factory)
                    .with_properties(service.properties.clone());
                for interface in &service.provides {
                    service_descriptor = service_descriptor.provides(interface.as_str());
                }
                for (binding, reference) in &service.references {
                    service_descriptor =
                        service_descriptor.depends_on(binding.as_str(), reference.interface());
                }

                descriptor.push(service_descriptor);
            }

            bundles.push(descriptor);
        }

        Ok(bundles)
    }
}

/// Id of a manifest service: `<bundle>::<service>`
pub fn service_id(bundle: &str, service: &str) -> String {
    format!("{}{}{}", bundle, ID_SEPARATOR, service)
}

fn check_name(kind: &str, name: &str) -> Result<(), ManifestError> {
    if name.trim().is_empty() {
        return Err(ManifestError::Validation(format!(
            "{} names must not be empty",
            kind
        )));
    }
    if name.contains(ID_SEPARATOR) {
        return Err(ManifestError::Validation(format!(
            "{} name '{}' must not contain '{}'",
            kind, name, ID_SEPARATOR
        )));
    }
    Ok(())
}

/// Errors that can occur when loading a manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown bundle: {0}")]
    UnknownBundle(String),

    #[error("Service '{service}' uses unknown factory '{factory}'")]
    UnknownFactory { service: String, factory: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::PlaceholderFactory;
    use std::io::Write;

    const MANIFEST: &str = r#"
version: "1.0"
bundles:
  logging:
    description: Console logging
    services:
      Logger:
        factory: console_logger
        provides: [logging.Logger]
        properties:
          level: debug
  storage:
    services:
      Database:
        provides:
          - storage.Database
        references:
          logger: logging.Logger
        properties:
          url: "sqlite::memory:"
          pool_size: 4
  http:
    services:
      Api:
        references:
          db:
            interface: storage.Database
          logger: logging.Logger
"#;

    fn placeholder_registry(manifest: &BundleManifest) -> FactoryRegistry {
        let mut registry = FactoryRegistry::new();
        for name in manifest.factory_names() {
            registry.register(name.clone(), PlaceholderFactory::new(name));
        }
        registry
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = BundleManifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.version, "1.0");
        assert_eq!(manifest.bundles.len(), 3);
        assert_eq!(manifest.service_count(), 3);
        assert_eq!(
            manifest.interfaces(),
            vec!["logging.Logger".to_string(), "storage.Database".to_string()]
        );
        assert_eq!(
            manifest.factory_names(),
            vec!["console_logger", "Database", "Api"]
        );

        let api = &manifest.bundles["http"].services["Api"];
        assert_eq!(api.references["db"].interface(), "storage.Database");
        assert_eq!(
            api.references["logger"],
            ReferenceSpec::Simple("logging.Logger".to_string())
        );
    }

    #[test]
    fn test_to_bundles_builds_descriptors() {
        let manifest = BundleManifest::from_yaml(MANIFEST).unwrap();
        let bundles = manifest.to_bundles(&placeholder_registry(&manifest)).unwrap();

        assert_eq!(bundles.len(), 3);
        assert_eq!(bundles[0].name(), "logging");

        let database = &bundles[1].services()[0];
        assert_eq!(database.id(), "storage::Database");
        assert_eq!(database.interfaces(), ["storage.Database"]);
        assert_eq!(database.dependencies()[0].name, "logger");
        assert_eq!(database.dependencies()[0].interface, "logging.Logger");
        assert_eq!(database.properties()["pool_size"], 4);
    }

    #[test]
    fn test_unknown_factory() {
        let manifest = BundleManifest::from_yaml(MANIFEST).unwrap();
        let registry = FactoryRegistry::new();

        match manifest.to_bundles(&registry) {
            Err(ManifestError::UnknownFactory { service, factory }) => {
                assert_eq!(service, "logging::Logger");
                assert_eq!(factory, "console_logger");
            }
            other => panic!("expected unknown factory, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_validation_rejects_bad_names() {
        let separator = r#"
bundles:
  "bad::bundle":
    services:
      A: {}
"#;
        assert!(matches!(
            BundleManifest::from_yaml(separator),
            Err(ManifestError::Validation(_))
        ));

        let empty_reference = r#"
bundles:
  core:
    services:
      A:
        references:
          logger: ""
"#;
        assert!(matches!(
            BundleManifest::from_yaml(empty_reference),
            Err(ManifestError::Validation(_))
        ));

        let empty_interface = r#"
bundles:
  core:
    services:
      A:
        provides: [""]
"#;
        assert!(matches!(
            BundleManifest::from_yaml(empty_interface),
            Err(ManifestError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            BundleManifest::from_yaml("bundles: [not, a, map]"),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_select_bundles() {
        let mut manifest = BundleManifest::from_yaml(MANIFEST).unwrap();
        manifest
            .select_bundles(&["storage".to_string(), "logging".to_string()])
            .unwrap();
        assert_eq!(
            manifest.bundles.keys().collect::<Vec<_>>(),
            vec!["logging", "storage"]
        );

        assert!(matches!(
            manifest.select_bundles(&["missing".to_string()]),
            Err(ManifestError::UnknownBundle(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let manifest = BundleManifest::from_file(file.path()).unwrap();
        assert_eq!(manifest.service_count(), 3);

        assert!(matches!(
            BundleManifest::from_file("/nonexistent/bundles.yaml"),
            Err(ManifestError::Io { .. })
        ));
    }
}
