//! Pod entity types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::LockHandle;

/// Immutable pod configuration, serialized verbatim into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodConfig {
    /// Unique pod ID.
    pub id: String,
    /// Unique pod name.
    pub name: String,
    /// Namespace the pod belongs to. Empty means none.
    #[serde(default)]
    pub namespace: String,
    /// Allocation ID of the pod's lock.
    #[serde(default)]
    pub lock_id: u32,
    /// Free-form labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl PodConfig {
    /// Creates a configuration with a generated ID and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.into(),
            namespace: String::new(),
            lock_id: 0,
            labels: HashMap::new(),
            created: Utc::now(),
        }
    }
}

/// Mutable pod state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PodState {
    /// Cgroup the pod's containers are placed under, once created.
    #[serde(default)]
    pub cgroup_path: Option<String>,
}

/// A pod, as held in memory by the owning runtime.
pub struct Pod {
    /// Immutable configuration.
    pub config: PodConfig,
    /// Mutable state.
    pub state: PodState,
    lock: Option<LockHandle>,
    valid: bool,
}

impl Pod {
    /// Wraps a configuration into an unregistered pod.
    pub fn new(config: PodConfig) -> Self {
        Self {
            config,
            state: PodState::default(),
            lock: None,
            valid: false,
        }
    }

    /// The pod's ID.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// The pod's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The pod's namespace, or `""` when it has none.
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Whether the store currently considers this pod registered.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The pod's lock handle, once hydrated or registered.
    pub fn lock(&self) -> Option<&LockHandle> {
        self.lock.as_ref()
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub(crate) fn bind(&mut self, lock: LockHandle) {
        self.lock = Some(lock);
    }
}

impl std::fmt::Debug for Pod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pod")
            .field("id", &self.config.id)
            .field("name", &self.config.name)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}
