//! Named factory lookup for declarative manifests

use super::factory::ServiceFactory;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Maps factory names used in manifests to their implementations
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: IndexMap<String, Arc<dyn ServiceFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, factory: impl ServiceFactory + 'static) {
        self.register_shared(name, Arc::new(factory));
    }

    /// Register an already shared factory
    pub fn register_shared(&mut self, name: impl Into<String>, factory: Arc<dyn ServiceFactory>) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            log::warn!("Factory '{}' registered twice, keeping the latest", name);
        }
    }

    /// Builder-style registration
    pub fn with_factory(
        mut self,
        name: impl Into<String>,
        factory: impl ServiceFactory + 'static,
    ) -> Self {
        self.register(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
