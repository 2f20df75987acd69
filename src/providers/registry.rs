use super::client::ProviderClient;
use super::profile::{ProviderCatalog, ProviderProfile};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Registered provider clients plus the catalog describing them
///
/// Cloning is cheap; clones share the same client map.
#[derive(Clone)]
pub struct ProviderRegistry {
    clients: Arc<DashMap<String, Arc<dyn ProviderClient>>>,
    catalog: Arc<ProviderCatalog>,
}

impl ProviderRegistry {
    pub fn new(catalog: ProviderCatalog) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            catalog: Arc::new(catalog),
        }
    }

    pub fn register(&self, client: Arc<dyn ProviderClient>) {
        let name = client.name().to_string();
        if self.catalog.get(&name).is_none() {
            debug!(provider = %name, "Registering provider without a catalog profile");
        }
        self.clients.insert(name, client);
    }

    pub fn with_client(self, client: Arc<dyn ProviderClient>) -> Self {
        self.register(client);
        self
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.clients.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// A provider is available when a client is registered and reports ready
    pub fn is_available(&self, name: &str) -> bool {
        self.clients
            .get(name)
            .map(|entry| entry.value().is_available())
            .unwrap_or(false)
    }

    /// Available provider names, sorted for deterministic iteration
    pub fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .iter()
            .filter(|entry| entry.value().is_available())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn profile(&self, name: &str) -> Option<&ProviderProfile> {
        self.catalog.get(name)
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(ProviderCatalog::default_catalog())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("clients", &self.available_names())
            .field("catalog", &self.catalog.names())
            .finish()
    }
}
