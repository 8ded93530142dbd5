//! Persisted record of which products the user may use.

use std::sync::Arc;

use crate::storage::{StorageAdapter, keys};

/// Boolean entitlement flags keyed by product id.
///
/// Flags are only ever set; revocation is not tracked.
#[derive(Clone)]
pub struct EntitlementStore {
    storage: Arc<dyn StorageAdapter>,
}

impl EntitlementStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Whether a purchase or restore of `product_id` has ever completed.
    pub fn is_entitled(&self, product_id: &str) -> bool {
        self.storage
            .get(&keys::entitlement(product_id))
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Record a completed purchase or restore of `product_id`.
    pub fn grant(&self, product_id: &str) {
        if self.is_entitled(product_id) {
            return;
        }
        tracing::info!("Granting entitlement for {}", product_id);
        self.storage.set(&keys::entitlement(product_id), "true");
    }
}

impl std::fmt::Debug for EntitlementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementStore")
            .field("storage", &"<storage>")
            .finish()
    }
}
