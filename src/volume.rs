//! Volume entity types.
//!
//! Volumes are named, not ID'd: the name is the key under the `vol` bucket
//! and the value entered into the shared registries. Volumes carry no
//! namespace.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::LockHandle;

/// Immutable volume configuration, serialized verbatim into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Unique volume name.
    pub name: String,
    /// Volume driver (e.g. "local").
    #[serde(default)]
    pub driver: String,
    /// Host path the volume is mounted from.
    #[serde(default)]
    pub mount_point: String,
    /// Driver options.
    #[serde(default)]
    pub options: HashMap<String, String>,
    /// Allocation ID of the volume's lock.
    #[serde(default)]
    pub lock_id: u32,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl VolumeConfig {
    /// Creates a configuration for the given volume name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "local".to_string(),
            mount_point: String::new(),
            options: HashMap::new(),
            lock_id: 0,
            created: Utc::now(),
        }
    }
}

/// Mutable volume state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeState {
    /// Number of active mounts of this volume.
    #[serde(default)]
    pub mount_count: u64,
}

/// A volume, as held in memory by the owning runtime.
pub struct Volume {
    /// Immutable configuration.
    pub config: VolumeConfig,
    /// Mutable state.
    pub state: VolumeState,
    lock: Option<LockHandle>,
    valid: bool,
}

impl Volume {
    /// Wraps a configuration into an unregistered volume.
    pub fn new(config: VolumeConfig) -> Self {
        Self {
            config,
            state: VolumeState::default(),
            lock: None,
            valid: false,
        }
    }

    /// The volume's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the store currently considers this volume registered.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The volume's lock handle, once hydrated or registered.
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

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("name", &self.config.name)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}
