//! Routing policy: source string to target store kinds.
//!
//! An explicit, read-only table built at startup. Nothing registers itself
//! here as a side effect; the full route set is visible at the
//! construction site.

use std::collections::HashMap;

use lake_store::StoreKind;
use serde::{Deserialize, Serialize};

/// Maps an ingested item's source to the stores it is routed into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    routes: HashMap<String, Vec<StoreKind>>,
    /// Targets for sources with no explicit route.
    default_targets: Vec<StoreKind>,
}

impl RoutingPolicy {
    /// Policy with no explicit routes; everything goes to the defaults.
    pub fn new(default_targets: Vec<StoreKind>) -> Self {
        Self {
            routes: HashMap::new(),
            default_targets,
        }
    }

    /// Add an explicit route for a source.
    pub fn with_route(mut self, source: &str, targets: Vec<StoreKind>) -> Self {
        self.routes.insert(source.to_string(), targets);
        self
    }

    /// Target stores for an item's source. Deduplicated, in priority order.
    pub fn targets_for(&self, source: &str) -> Vec<StoreKind> {
        let mut targets = self
            .routes
            .get(source)
            .unwrap_or(&self.default_targets)
            .clone();
        targets.sort_by_key(|k| k.priority());
        targets.dedup();
        targets
    }

    /// Number of explicit routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RoutingPolicy {
    /// Route everything to the memory store; conversational and tool
    /// output sources additionally hit the vector store.
    fn default() -> Self {
        Self::new(vec![StoreKind::Memory])
            .with_route("conversation", vec![StoreKind::Vector, StoreKind::Memory])
            .with_route("tool_output", vec![StoreKind::Vector, StoreKind::Memory])
            .with_route("relationship", vec![StoreKind::Graph])
    }
}
