//! Constructor/destructor pairs for services

use super::descriptor::Properties;
use super::error::ServiceError;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A constructed service, shared by every dependent that activated it
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Resolved dependency instances keyed by their local binding name
#[derive(Clone, Default)]
pub struct References {
    entries: IndexMap<String, ServiceInstance>,
}

impl References {
    /// Create an empty reference set
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, instance: ServiceInstance) {
        self.entries.insert(name.into(), instance);
    }

    /// Get a reference downcast to its concrete type
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        let instance = self
            .entries
            .get(name)
            .ok_or_else(|| ServiceError::MissingReference(name.to_string()))?;

        Arc::clone(instance)
            .downcast::<T>()
            .map_err(|_| ServiceError::ReferenceType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Get the untyped instance bound to `name`
    pub fn raw(&self, name: &str) -> Option<&ServiceInstance> {
        self.entries.get(name)
    }

    /// Binding names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for References {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// Everything a factory receives when constructing its service
#[derive(Debug)]
pub struct ServiceOptions<'a> {
    /// Id of the service being constructed
    pub service_id: &'a str,
    /// Dependency instances keyed by binding name
    pub references: References,
    /// Configuration properties, passed through untouched
    pub properties: &'a Properties,
}

impl ServiceOptions<'_> {
    /// Deserialize the properties into a typed configuration struct.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// #[derive(Deserialize)]
    /// struct DatabaseConfig {
    ///     url: String,
    /// }
    ///
    /// let config: DatabaseConfig = options.properties_as()?;
    /// ```
    pub fn properties_as<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        serde_json::from_value(serde_json::Value::Object(self.properties.clone())).map_err(|e| {
            ServiceError::Properties {
                service: self.service_id.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

/// Constructs and tears down one kind of service.
///
/// `create` is called at most once per descriptor, after every declared
/// dependency has been constructed. `destroy` gets the instance back once the
/// last dependent has released it; the default does nothing.
pub trait ServiceFactory: Send + Sync {
    /// Construct the service from its resolved references and properties
    fn create(&self, options: ServiceOptions<'_>) -> Result<ServiceInstance, ServiceError>;

    /// Tear down a previously constructed instance
    fn destroy(&self, _service_id: &str, _instance: ServiceInstance) -> Result<(), ServiceError> {
        Ok(())
    }
}

type CreateFn = dyn Fn(ServiceOptions<'_>) -> Result<ServiceInstance, ServiceError> + Send + Sync;
type DestroyFn = dyn Fn(&str, ServiceInstance) -> Result<(), ServiceError> + Send + Sync;

/// Closure-backed factory
///
/// ```rust,ignore
/// let factory = FnFactory::new(|options| {
///     let logger = options.references.get::<Logger>("logger")?;
///     Ok(Arc::new(Database::open(logger)?))
/// })
/// .with_destroy(|_, instance| {
///     log::info!("closing database");
///     Ok(())
/// });
/// ```
pub struct FnFactory {
    create: Box<CreateFn>,
    destroy: Option<Box<DestroyFn>>,
}

impl FnFactory {
    /// Create a factory from a constructor closure
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(ServiceOptions<'_>) -> Result<ServiceInstance, ServiceError> + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
            destroy: None,
        }
    }

    /// Attach a destructor closure
    pub fn with_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&str, ServiceInstance) -> Result<(), ServiceError> + Send + Sync + 'static,
    {
        self.destroy = Some(Box::new(destroy));
        self
    }
}

impl ServiceFactory for FnFactory {
    fn create(&self, options: ServiceOptions<'_>) -> Result<ServiceInstance, ServiceError> {
        (self.create)(options)
    }

    fn destroy(&self, service_id: &str, instance: ServiceInstance) -> Result<(), ServiceError> {
        match &self.destroy {
            Some(destroy) => destroy(service_id, instance),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FnFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory")
            .field("has_destroy", &self.destroy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Logger {
        prefix: String,
    }

    #[test]
    fn test_typed_reference_lookup() {
        let mut references = References::new();
        references.insert(
            "logger",
            Arc::new(Logger {
                prefix: "app".to_string(),
            }),
        );

        let logger = references.get::<Logger>("logger").unwrap();
        assert_eq!(logger.prefix, "app");
        assert_eq!(references.names().collect::<Vec<_>>(), vec!["logger"]);
    }

    #[test]
    fn test_missing_and_mistyped_references() {
        let mut references = References::new();
        references.insert("count", Arc::new(42u32));

        assert!(matches!(
            references.get::<u32>("other"),
            Err(ServiceError::MissingReference(name)) if name == "other"
        ));
        assert!(matches!(
            references.get::<String>("count"),
            Err(ServiceError::ReferenceType { .. })
        ));
    }

    #[test]
    fn test_properties_as_typed_config() {
        #[derive(Debug, Deserialize)]
        struct Config {
            url: String,
            #[serde(default)]
            pool_size: u32,
        }

        let properties = match json!({ "url": "postgres://localhost" }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let options = ServiceOptions {
            service_id: "storage::Database",
            references: References::new(),
            properties: &properties,
        };

        let config: Config = options.properties_as().unwrap();
        assert_eq!(config.url, "postgres://localhost");
        assert_eq!(config.pool_size, 0);

        let bad = match json!({ "url": 7 }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let options = ServiceOptions {
            service_id: "storage::Database",
            references: References::new(),
            properties: &bad,
        };
        let err = options.properties_as::<Config>().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Properties { ref service, .. } if service == "storage::Database"
        ));
    }

    #[test]
    fn test_fn_factory_default_destroy() {
        let factory = FnFactory::new(|_| Ok(Arc::new(1u8)));
        let properties = Properties::new();
        let instance = factory
            .create(ServiceOptions {
                service_id: "a",
                references: References::new(),
                properties: &properties,
            })
            .unwrap();

        assert!(factory.destroy("a", instance).is_ok());
    }
}
