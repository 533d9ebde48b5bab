//! # podstore
//!
//! **Transactional Metadata Store for Container Runtimes**
//!
//! This crate persists the identities, configurations, and cross-references
//! of containers, pods, and volumes in an embedded key-value database, and
//! layers an integrity discipline on top of the raw storage:
//!
//! - **Global uniqueness**: IDs and names are unique across all three
//!   entity kinds together, via shared ID and name registries that mirror
//!   each other exactly.
//! - **Dependency symmetry**: a container's record carries a reverse edge
//!   for every container depending on it; removal is refused while those
//!   edges exist.
//! - **Pod coherence**: pod members only depend on members of the same
//!   pod, and podless containers only depend on podless containers.
//! - **Namespace coherence**: entities linked by dependency or membership
//!   share a namespace, and a namespace-scoped store refuses access to
//!   entities outside its namespace.
//! - **Volume back-references**: named volumes track the containers
//!   referencing them and refuse removal while any remain.
//! - **Configuration validation**: at attach, the runtime's storage paths
//!   and driver are checked against the values the store was created with,
//!   so a store populated under one storage configuration is never
//!   silently reused under another.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   add/remove/hydrate containers, pods, volumes              │
//! │   cross-index invariants enforced per transaction           │
//! ├──────────────┬──────────────────┬───────────────────────────┤
//! │   schema     │  config check    │  collaborators            │
//! │   accessors  │  at attach       │  LockManager, OCI handles │
//! ├──────────────┴──────────────────┴───────────────────────────┤
//! │              nested-bucket engine adapter                   │
//! │              (redb, behind the connection gate)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entity configuration and state are stored as opaque JSON blobs; the
//! store indexes nothing inside them. The handful of fields the store must
//! act on — namespace, pod membership, dependencies, named volumes, the
//! netns path — are hoisted into dedicated keys at registration.
//!
//! All operations run inside a single engine transaction behind a
//! process-wide per-path connection gate. An error aborts the transaction;
//! partial writes are never visible.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use podstore::{
//!     Container, ContainerConfig, InProcessLockManager, Runtime,
//!     RuntimeConfig, Store,
//! };
//!
//! fn main() -> podstore::Result<()> {
//!     let runtime = Arc::new(Runtime::new(
//!         RuntimeConfig::default(),
//!         Arc::new(InProcessLockManager::new()),
//!     ));
//!     let store = Store::open("/var/lib/podstore/state.db", runtime, None)?;
//!
//!     let mut ctr = Container::new(ContainerConfig::new("web"));
//!     store.add_container(&mut ctr, None)?;
//!
//!     let hydrated = store.container(ctr.id())?;
//!     assert_eq!(hydrated.name(), "web");
//!     Ok(())
//! }
//! ```

// =============================================================================
// Internal Modules
// =============================================================================

mod constants;
mod engine;
mod gate;
mod schema;

// =============================================================================
// Public Modules
// =============================================================================

/// Runtime configuration and its validation against the store.
pub mod config;

/// Container entity types.
pub mod container;

/// Error types.
pub mod error;

/// Pod entity types.
pub mod pod;

/// Collaborators: the owning runtime, OCI runtime handles, lock manager.
pub mod runtime;

/// The metadata store itself.
pub mod store;

/// Volume entity types.
pub mod volume;

pub use config::{RuntimeConfig, StorageConfig, StorageDefaults};
pub use container::{Container, ContainerConfig, ContainerState, ContainerStatus, NamedVolume};
pub use error::{Error, Result};
pub use pod::{Pod, PodConfig, PodState};
pub use runtime::{
    EntityLock, InProcessLockManager, LockHandle, LockManager, OciRuntimeHandle, Runtime,
};
pub use store::Store;
pub use volume::{Volume, VolumeConfig, VolumeState};
