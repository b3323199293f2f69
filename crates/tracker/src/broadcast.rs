//! Broadcast distribution seam used for oversized catalog replies.
//!
//! The broadcast layer itself is an external collaborator; this module
//! defines the contract the tracker needs from it (publish, fetch by id,
//! destroy) plus an in-memory implementation for local mode and tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use fsh_common::{FshError, Result};
use tracing::debug;

/// Publishing/fetching contract for the broadcast layer.
pub trait BroadcastManager: Send + Sync {
    /// Publish `payload` once per node and return its id.
    fn publish(&self, payload: Vec<u8>, is_local: bool) -> Result<u64>;

    /// Fetch a published payload by id.
    fn fetch(&self, id: u64) -> Result<Arc<Vec<u8>>>;

    /// Remove a published payload. `blocking` waits for remote confirmation;
    /// non-blocking destruction may fail silently on remote nodes.
    fn destroy(&self, id: u64, blocking: bool) -> Result<()>;
}

/// Handle pinning one published blob for the lifetime of a cached catalog.
#[derive(Clone)]
pub struct Broadcast {
    id: u64,
    manager: Arc<dyn BroadcastManager>,
}

impl Broadcast {
    /// Wrap a published blob id together with the manager that owns it.
    pub fn new(id: u64, manager: Arc<dyn BroadcastManager>) -> Self {
        Self { id, manager }
    }

    /// Id of the pinned blob.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Destroy the pinned blob through the owning manager.
    pub fn destroy(&self, blocking: bool) -> Result<()> {
        self.manager.destroy(self.id, blocking)
    }
}

impl fmt::Debug for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcast").field("id", &self.id).finish()
    }
}

/// Process-local broadcast store for local mode and tests.
#[derive(Debug, Default)]
pub struct InMemoryBroadcastManager {
    next_id: AtomicU64,
    blobs: Mutex<HashMap<u64, Arc<Vec<u8>>>>,
}

impl InMemoryBroadcastManager {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently published blobs.
    pub fn published_count(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl BroadcastManager for InMemoryBroadcastManager {
    fn publish(&self, payload: Vec<u8>, _is_local: bool) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(broadcast_id = id, bytes = payload.len(), "published broadcast blob");
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(payload));
        Ok(id)
    }

    fn fetch(&self, id: u64) -> Result<Arc<Vec<u8>>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| FshError::Rpc(format!("broadcast blob {id} is not published")))
    }

    fn destroy(&self, id: u64, _blocking: bool) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_fetch_destroy_cycle() {
        let manager = InMemoryBroadcastManager::new();
        let id = manager.publish(vec![1, 2, 3], true).expect("publish");
        assert_eq!(manager.fetch(id).expect("fetch").as_slice(), &[1, 2, 3]);

        manager.destroy(id, false).expect("destroy");
        assert!(manager.fetch(id).is_err());
        assert_eq!(manager.published_count(), 0);
    }

    #[test]
    fn handle_destroys_through_owning_manager() {
        let manager: Arc<dyn BroadcastManager> = Arc::new(InMemoryBroadcastManager::new());
        let id = manager.publish(vec![9], true).expect("publish");
        let handle = Broadcast::new(id, Arc::clone(&manager));
        assert_eq!(handle.id(), id);
        handle.destroy(false).expect("destroy");
        assert!(manager.fetch(id).is_err());
    }
}
