//! Container entity types.
//!
//! A container is persisted as two opaque JSON blobs — the immutable
//! configuration and the mutable state — plus a handful of fields the
//! store hoists into dedicated keys because it must act on them:
//! namespace, pod membership, network namespace path, dependencies, and
//! named volume references.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::runtime::{LockHandle, OciRuntimeHandle};

// =============================================================================
// Configuration
// =============================================================================

/// Immutable container configuration.
///
/// Serialized verbatim into the store at registration and never rewritten.
/// Structural fields the store enforces invariants over (dependencies,
/// named volumes, namespace, pod membership) live here; everything else is
/// the runtime's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Unique container ID.
    pub id: String,
    /// Unique container name.
    pub name: String,
    /// Namespace the container belongs to. Empty means none.
    #[serde(default)]
    pub namespace: String,
    /// ID of the pod this container is a member of, if any.
    #[serde(default)]
    pub pod_id: Option<String>,
    /// Allocation ID of the container's lock.
    #[serde(default)]
    pub lock_id: u32,
    /// Name of the OCI runtime the container was created with. Empty means
    /// the owning runtime's default.
    #[serde(default)]
    pub oci_runtime: String,
    /// IDs of containers this container depends on (forward edges).
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Named volumes mounted into the container.
    #[serde(default)]
    pub named_volumes: Vec<NamedVolume>,
    /// Free-form labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl ContainerConfig {
    /// Creates a configuration with a generated ID and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.into(),
            namespace: String::new(),
            pod_id: None,
            lock_id: 0,
            oci_runtime: String::new(),
            dependencies: Vec::new(),
            named_volumes: Vec::new(),
            labels: HashMap::new(),
            created: Utc::now(),
        }
    }
}

/// A named volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedVolume {
    /// Name of the volume.
    pub name: String,
    /// Mount destination inside the container.
    pub dest: String,
    /// Mount options.
    #[serde(default)]
    pub options: Vec<String>,
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// Configured but never created by an OCI runtime.
    #[default]
    Configured,
    /// Created, not yet started.
    Created,
    /// Running.
    Running,
    /// Stopped after running.
    Stopped,
    /// Paused.
    Paused,
}

/// Mutable container state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerState {
    /// Current lifecycle status.
    #[serde(default)]
    pub status: ContainerStatus,
    /// Exit code, once the container has stopped.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// PID of the container process while running.
    #[serde(default)]
    pub pid: Option<u32>,
    /// When the container last started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the container last stopped.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Path to the container's network namespace, if one is mounted.
    #[serde(default)]
    pub net_ns_path: Option<String>,
}

// =============================================================================
// Container
// =============================================================================

/// A container, as held in memory by the owning runtime.
///
/// `valid` is set when the store confirms the container exists and cleared
/// when the store confirms it is gone, so callers can drop stale handles.
pub struct Container {
    /// Immutable configuration.
    pub config: ContainerConfig,
    /// Mutable state.
    pub state: ContainerState,
    lock: Option<LockHandle>,
    oci_runtime: Option<Arc<OciRuntimeHandle>>,
    valid: bool,
}

impl Container {
    /// Wraps a configuration into an unregistered container.
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            config,
            state: ContainerState::default(),
            lock: None,
            oci_runtime: None,
            valid: false,
        }
    }

    /// The container's ID.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// The container's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The container's namespace, or `""` when it has none.
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// ID of the pod the container belongs to, if any.
    pub fn pod_id(&self) -> Option<&str> {
        self.config.pod_id.as_deref()
    }

    /// IDs of containers this container depends on.
    pub fn dependencies(&self) -> &[String] {
        &self.config.dependencies
    }

    /// Named volumes mounted into this container.
    pub fn named_volumes(&self) -> &[NamedVolume] {
        &self.config.named_volumes
    }

    /// Whether the store currently considers this container registered.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The container's lock handle, once hydrated or registered.
    pub fn lock(&self) -> Option<&LockHandle> {
        self.lock.as_ref()
    }

    /// The resolved OCI runtime handle, once hydrated or registered.
    pub fn oci_runtime(&self) -> Option<&Arc<OciRuntimeHandle>> {
        self.oci_runtime.as_ref()
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub(crate) fn bind(&mut self, lock: LockHandle, oci_runtime: Arc<OciRuntimeHandle>) {
        self.lock = Some(lock);
        self.oci_runtime = Some(oci_runtime);
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.config.id)
            .field("name", &self.config.name)
            .field("status", &self.state.status)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}
