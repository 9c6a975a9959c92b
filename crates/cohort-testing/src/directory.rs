//! Endpoint lookup for in-process connectors.

use std::collections::HashMap;
use std::sync::Arc;

use cohort_core::ConnectionDescriptor;
use cohort_core::CoreError;
use cohort_core::RepositoryConnector;
use parking_lot::RwLock;

/// Connector type served by [`ConnectorDirectory::factory`].
pub const IN_MEMORY_CONNECTOR: &str = "in-memory";

/// Connectors keyed by endpoint, shared by every member of a test cohort.
#[derive(Clone, Default)]
pub struct ConnectorDirectory {
    connectors: Arc<RwLock<HashMap<String, Arc<dyn RepositoryConnector>>>>,
}

impl ConnectorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `connector` at `endpoint`, replacing what was there.
    pub fn insert(&self, endpoint: impl Into<String>, connector: Arc<dyn RepositoryConnector>) {
        self.connectors.write().insert(endpoint.into(), connector);
    }

    pub fn remove(&self, endpoint: &str) -> Option<Arc<dyn RepositoryConnector>> {
        self.connectors.write().remove(endpoint)
    }

    /// Resolve a descriptor to the connector served at its endpoint.
    pub fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn RepositoryConnector>, CoreError> {
        if descriptor.connector_type != IN_MEMORY_CONNECTOR {
            return Err(CoreError::invalid(
                "connector_type",
                format!("'{}' is not served by the directory", descriptor.connector_type),
            ));
        }
        self.connectors
            .read()
            .get(&descriptor.endpoint)
            .cloned()
            .ok_or_else(|| CoreError::not_found("endpoint", &descriptor.endpoint))
    }

    /// A connector factory for [`IN_MEMORY_CONNECTOR`] descriptors.
    pub fn factory(
        &self,
    ) -> impl Fn(&ConnectionDescriptor) -> Result<Arc<dyn RepositoryConnector>, CoreError> + Send + Sync + 'static {
        let directory = self.clone();
        move |descriptor: &ConnectionDescriptor| directory.connect(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use cohort_core::InMemoryRepository;

    use super::*;

    #[test]
    fn test_factory_resolves_endpoints() {
        let directory = ConnectorDirectory::new();
        directory.insert("b", Arc::new(InMemoryRepository::new("b".into())));
        let factory = directory.factory();

        let connector = factory(&ConnectionDescriptor::new(IN_MEMORY_CONNECTOR, "b")).unwrap();
        assert_eq!(connector.metadata_collection_id().as_str(), "b");

        assert!(matches!(
            factory(&ConnectionDescriptor::new(IN_MEMORY_CONNECTOR, "missing")),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            factory(&ConnectionDescriptor::new("rest", "b")),
            Err(CoreError::InvalidParameter { .. })
        ));
    }
}
