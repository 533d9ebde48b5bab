//! Process-wide serialization of store-file access.
//!
//! The embedded engine relies on file locking for cross-process exclusion,
//! but advisory file locks misbehave when one process opens the same file
//! more than once. All access from this process is therefore funnelled
//! through a single in-memory lock per store path.
//!
//! The gate is exposed as a scoped acquisition: [`ConnectionGate::enter`]
//! returns a guard, and the gate is released when the guard drops. Early
//! returns and error paths release it like any other exit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

static GATES: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// Exclusive gate for one store path, shared by every store opened on that
/// path within this process.
pub(crate) struct ConnectionGate {
    lock: Arc<Mutex<()>>,
}

impl ConnectionGate {
    /// Returns the gate for `path`, creating it on first use.
    pub fn for_path(path: &Path) -> Self {
        let registry = GATES.get_or_init(|| Mutex::new(HashMap::new()));
        let mut gates = registry.lock().unwrap_or_else(|e| e.into_inner());
        let lock = gates.entry(path.to_path_buf()).or_default().clone();
        Self { lock }
    }

    /// Acquires the gate, queueing behind other holders. Wait time is
    /// unbounded; store transactions are short-lived by design.
    pub fn enter(&self) -> GateGuard<'_> {
        GateGuard {
            _guard: self.lock.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

/// Guard over the gate. Dropping it releases the gate.
pub(crate) struct GateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}
