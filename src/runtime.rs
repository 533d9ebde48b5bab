//! Collaborators the store consumes: the owning runtime, its OCI runtime
//! handles, and the external lock manager.
//!
//! The store never supervises processes and never acquires entity locks.
//! It binds hydrated entities to their OCI runtime handle and retrieves
//! their lock handle from the lock manager using the lock ID embedded in
//! the persisted configuration. Lock handles themselves are never
//! persisted; they are meaningless across restarts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{RuntimeConfig, StorageDefaults};
use crate::error::Result;

// =============================================================================
// Entity Locks
// =============================================================================

/// Mutual-exclusion handle for a single entity.
///
/// Issued and owned by an external lock manager; the store only carries the
/// handle so higher layers can serialize per-entity operations.
pub trait EntityLock: Send + Sync {
    /// The lock's allocation ID.
    fn id(&self) -> u32;
}

/// Shared handle to an entity lock.
pub type LockHandle = Arc<dyn EntityLock>;

/// Allocates and retrieves per-entity locks.
pub trait LockManager: Send + Sync {
    /// Allocates a fresh lock for a new entity.
    fn allocate_lock(&self) -> Result<LockHandle>;

    /// Retrieves the lock with the given allocation ID.
    fn retrieve_lock(&self, id: u32) -> Result<LockHandle>;

    /// Returns a lock to the manager once its entity is removed.
    fn free_lock(&self, id: u32) -> Result<()>;
}

struct InProcessLock {
    id: u32,
}

impl EntityLock for InProcessLock {
    fn id(&self) -> u32 {
        self.id
    }
}

/// Lock manager holding locks in process memory.
///
/// Suitable for single-process runtimes and tests. Retrieval materializes
/// handles on demand: locks are per-process, so after a restart the manager
/// legitimately starts empty while the store still references lock IDs.
#[derive(Default)]
pub struct InProcessLockManager {
    next_id: AtomicU32,
    locks: Mutex<HashMap<u32, LockHandle>>,
}

impl InProcessLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockManager for InProcessLockManager {
    fn allocate_lock(&self) -> Result<LockHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let lock: LockHandle = Arc::new(InProcessLock { id });
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.insert(id, lock.clone());
        Ok(lock)
    }

    fn retrieve_lock(&self, id: u32) -> Result<LockHandle> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks
            .entry(id)
            .or_insert_with(|| Arc::new(InProcessLock { id }));
        // Keep the ID counter ahead of every retrieved lock so reallocation
        // cannot hand out an ID that is still in use.
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        Ok(lock.clone())
    }

    fn free_lock(&self, id: u32) -> Result<()> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&id);
        Ok(())
    }
}

// =============================================================================
// OCI Runtime Handles
// =============================================================================

/// Handle to an OCI runtime executable known to the owning runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciRuntimeHandle {
    /// Name the runtime is registered under (e.g. "runc").
    pub name: String,
    /// Path to the runtime executable.
    pub path: String,
}

impl OciRuntimeHandle {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

// =============================================================================
// Owning Runtime
// =============================================================================

/// The runtime a store is attached to.
///
/// Supplies the configuration validated at attach, the lock manager used
/// during hydration, and the table of OCI runtime handles containers are
/// resolved against.
pub struct Runtime {
    /// Path and identity configuration, validated against the store.
    pub config: RuntimeConfig,
    /// Default storage options, used when configuration fields are empty.
    pub storage_defaults: StorageDefaults,
    /// External lock manager.
    pub lock_manager: Arc<dyn LockManager>,
    /// Available OCI runtimes by name.
    pub oci_runtimes: HashMap<String, Arc<OciRuntimeHandle>>,
    /// Runtime used by containers that do not name one.
    pub default_oci_runtime: Arc<OciRuntimeHandle>,
}

impl Runtime {
    /// Creates a runtime with detected storage defaults and a single
    /// default OCI runtime.
    pub fn new(config: RuntimeConfig, lock_manager: Arc<dyn LockManager>) -> Self {
        let default_oci_runtime = Arc::new(OciRuntimeHandle::new("runc", "/usr/bin/runc"));
        let mut oci_runtimes = HashMap::new();
        oci_runtimes.insert(
            default_oci_runtime.name.clone(),
            default_oci_runtime.clone(),
        );

        Self {
            config,
            storage_defaults: StorageDefaults::detect(),
            lock_manager,
            oci_runtimes,
            default_oci_runtime,
        }
    }

    /// Resolves an OCI runtime by name.
    pub fn oci_runtime(&self, name: &str) -> Option<Arc<OciRuntimeHandle>> {
        self.oci_runtimes.get(name).cloned()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("oci_runtimes", &self.oci_runtimes.keys())
            .field("default_oci_runtime", &self.default_oci_runtime.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_then_retrieve() {
        let manager = InProcessLockManager::new();
        let lock = manager.allocate_lock().unwrap();
        let again = manager.retrieve_lock(lock.id()).unwrap();
        assert_eq!(lock.id(), again.id());
    }

    #[test]
    fn test_retrieve_materializes_unknown_ids() {
        let manager = InProcessLockManager::new();
        let lock = manager.retrieve_lock(7).unwrap();
        assert_eq!(lock.id(), 7);
        // Subsequent allocations must not collide with it.
        let fresh = manager.allocate_lock().unwrap();
        assert!(fresh.id() > 7);
    }

    #[test]
    fn test_free_then_reallocate() {
        let manager = InProcessLockManager::new();
        let lock = manager.allocate_lock().unwrap();
        manager.free_lock(lock.id()).unwrap();
        let fresh = manager.allocate_lock().unwrap();
        assert_ne!(lock.id(), fresh.id());
    }
}
