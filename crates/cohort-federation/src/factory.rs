//! Connector creation from registration descriptors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cohort_core::ConnectionDescriptor;
use cohort_core::CoreError;
use cohort_core::RepositoryConnector;

/// Builds a connector for a member from its descriptor.
pub type ConnectorFactory =
    Arc<dyn Fn(&ConnectionDescriptor) -> Result<Arc<dyn RepositoryConnector>, CoreError> + Send + Sync>;

/// Connector factories keyed by `connector_type`, registered at start-up.
#[derive(Clone, Default)]
pub struct ConnectorFactoryTable {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorFactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `connector_type`, replacing any earlier one.
    pub fn register<F>(&mut self, connector_type: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectionDescriptor) -> Result<Arc<dyn RepositoryConnector>, CoreError> + Send + Sync + 'static,
    {
        self.factories.insert(connector_type.into(), Arc::new(factory));
    }

    pub fn with<F>(mut self, connector_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConnectionDescriptor) -> Result<Arc<dyn RepositoryConnector>, CoreError> + Send + Sync + 'static,
    {
        self.register(connector_type, factory);
        self
    }

    pub fn supports(&self, connector_type: &str) -> bool {
        self.factories.contains_key(connector_type)
    }

    /// Create a connector for `descriptor`.
    ///
    /// # Errors
    /// [`CoreError::InvalidParameter`] if no factory is registered for the
    /// descriptor's connector type, or whatever the factory returns.
    pub fn create(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn RepositoryConnector>, CoreError> {
        let factory = self.factories.get(&descriptor.connector_type).ok_or_else(|| {
            CoreError::invalid(
                "connector_type",
                format!("no connector factory registered for '{}'", descriptor.connector_type),
            )
        })?;
        factory(descriptor)
    }
}

impl fmt::Debug for ConnectorFactoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("ConnectorFactoryTable").field("connector_types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use cohort_core::InMemoryRepository;

    use super::*;

    #[test]
    fn test_create_uses_factory_for_type() {
        let table = ConnectorFactoryTable::new().with("in-memory", |descriptor: &ConnectionDescriptor| {
            let connector: Arc<dyn RepositoryConnector> =
                Arc::new(InMemoryRepository::new(descriptor.endpoint.as_str().into()));
            Ok(connector)
        });
        assert!(table.supports("in-memory"));

        let connector = table.create(&ConnectionDescriptor::new("in-memory", "b")).unwrap();
        assert_eq!(connector.metadata_collection_id().as_str(), "b");

        let err = table.create(&ConnectionDescriptor::new("rest", "http://b")).err().unwrap();
        assert!(matches!(err, CoreError::InvalidParameter { .. }));
    }
}
