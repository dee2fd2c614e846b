//! Explicit adapter manifest.
//!
//! The full set of query-facing backends is enumerated once at startup and
//! passed into the components that need it. No registration happens as a
//! side effect of loading code.

use std::sync::Arc;

use lake_store::{StoreAdapter, StoreKind};

/// The store adapters an engine instance serves.
#[derive(Clone)]
pub struct AdapterManifest {
    adapters: Vec<Arc<dyn StoreAdapter>>,
}

impl AdapterManifest {
    /// Build a manifest from an explicit adapter list.
    pub fn new(adapters: Vec<Arc<dyn StoreAdapter>>) -> Self {
        Self { adapters }
    }

    /// The adapter serving a given kind, if registered.
    pub fn get(&self, kind: StoreKind) -> Option<&Arc<dyn StoreAdapter>> {
        self.adapters.iter().find(|a| a.kind() == kind)
    }

    /// All registered adapters.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn StoreAdapter>> {
        self.adapters.iter()
    }

    /// Registered kinds, in manifest order.
    pub fn kinds(&self) -> Vec<StoreKind> {
        self.adapters.iter().map(|a| a.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
