//! Lookup adapters and their registry
//!
//! Each adapter performs one kind of external read. Adapters are registered
//! per engine rather than globally, so two engines can run side by side with
//! different providers.

use super::spec::LookupRequest;
use crate::provider::ProviderError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One external read operation
///
/// Implementations must be idempotent: running the same request against
/// unchanged external state yields an equivalent document.
#[async_trait]
pub trait LookupAdapter: Send + Sync {
    /// The target kind this adapter serves, e.g. `describe-vpc-endpoints`
    fn kind(&self) -> &str;

    async fn execute(&self, request: &LookupRequest) -> Result<Value, ProviderError>;
}

/// Adapters keyed by target kind
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn LookupAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same kind
    pub fn register<A: LookupAdapter + 'static>(&mut self, adapter: A) -> &mut Self {
        self.register_shared(Arc::new(adapter))
    }

    pub fn register_shared(&mut self, adapter: Arc<dyn LookupAdapter>) -> &mut Self {
        let kind = adapter.kind().to_string();
        if self.adapters.insert(kind.clone(), adapter).is_some() {
            tracing::debug!("Replaced lookup adapter for {}", kind);
        }
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn LookupAdapter>> {
        self.adapters.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.adapters.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}
