use crate::providers::ProviderCatalog;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds in-flight calls per provider
///
/// Permits per provider are `requests_per_minute / 10`, clamped to
/// `[1, max_concurrent_per_provider]`. Providers without a catalog profile
/// get the maximum.
#[derive(Debug)]
pub struct ProviderConcurrencyLimiter {
    semaphores: DashMap<String, Arc<Semaphore>>,
    catalog: ProviderCatalog,
    max_concurrent_per_provider: usize,
}

impl ProviderConcurrencyLimiter {
    pub fn new(catalog: ProviderCatalog, max_concurrent_per_provider: usize) -> Self {
        Self {
            semaphores: DashMap::new(),
            catalog,
            max_concurrent_per_provider: max_concurrent_per_provider.max(1),
        }
    }

    pub fn permits_for(&self, provider: &str) -> usize {
        match self.catalog.get(provider) {
            Some(profile) => {
                let by_rate = (profile.rate_limit.requests_per_minute / 10) as usize;
                by_rate.clamp(1, self.max_concurrent_per_provider)
            }
            None => self.max_concurrent_per_provider,
        }
    }

    fn semaphore(&self, provider: &str) -> Arc<Semaphore> {
        if let Some(semaphore) = self.semaphores.get(provider) {
            return Arc::clone(semaphore.value());
        }
        let permits = self.permits_for(provider);
        let entry = self
            .semaphores
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(permits)));
        Arc::clone(entry.value())
    }

    /// Wait for a call slot on a provider
    ///
    /// Returns `None` only if the semaphore was closed, which this limiter
    /// never does; callers proceed unthrottled in that case.
    pub async fn acquire(&self, provider: &str) -> Option<OwnedSemaphorePermit> {
        self.semaphore(provider).acquire_owned().await.ok()
    }

    pub fn available_permits(&self, provider: &str) -> usize {
        self.semaphore(provider).available_permits()
    }
}
