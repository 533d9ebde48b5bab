//! Constants for the metadata store.
//!
//! Bucket names and keys are part of the on-disk contract: they are the
//! exact byte strings used in the persisted layout and must never change.

// =============================================================================
// Top-Level Buckets
// =============================================================================

/// Registry of entity IDs, mapping ID to name. Shared by containers, pods,
/// and volumes to enforce global ID uniqueness.
pub const ID_REGISTRY: &[u8] = b"id-registry";

/// Registry of entity names, mapping name to ID. Shared by all entity kinds.
pub const NAME_REGISTRY: &[u8] = b"name-registry";

/// Fast namespace lookup, mapping entity ID to namespace bytes.
pub const NS_REGISTRY: &[u8] = b"ns-registry";

/// Per-container records, keyed by container ID.
pub const CTR: &[u8] = b"ctr";

/// Container enumeration index, mapping container ID to name.
pub const ALL_CTRS: &[u8] = b"all-ctrs";

/// Per-pod records, keyed by pod ID.
pub const POD: &[u8] = b"pod";

/// Pod enumeration index, mapping pod ID to name.
pub const ALL_PODS: &[u8] = b"allPods";

/// Per-volume records, keyed by volume name (volumes are named, not ID'd).
pub const VOL: &[u8] = b"vol";

/// Volume enumeration index, mapping volume name to volume name.
pub const ALL_VOLUMES: &[u8] = b"allVolumes";

/// Persisted runtime configuration, keyed by field name.
pub const RUNTIME_CONFIG: &[u8] = b"runtime-config";

// =============================================================================
// Per-Entity Keys
// =============================================================================

/// Serialized entity configuration (opaque blob, immutable after creation).
pub const CONFIG_KEY: &[u8] = b"config";

/// Serialized entity state (opaque blob, mutable).
pub const STATE_KEY: &[u8] = b"state";

/// Entity namespace. Absent when the entity has no namespace.
pub const NAMESPACE_KEY: &[u8] = b"namespace";

/// ID of the pod a container belongs to. Absent for podless containers.
pub const POD_ID_KEY: &[u8] = b"pod-id";

/// Network namespace path of a container. Absent when none is set.
pub const NETNS_KEY: &[u8] = b"netns";

/// Reverse dependency edges: sub-bucket mapping dependent ID to name.
pub const DEPENDENCIES_BUCKET: &[u8] = b"dependencies";

/// Volume back-references: sub-bucket mapping container ID to container ID.
pub const VOL_DEPENDENCIES_BUCKET: &[u8] = b"vol-dependencies";

/// Pod membership: sub-bucket mapping member container ID to name.
pub const CONTAINERS_BUCKET: &[u8] = b"containers";

// =============================================================================
// Runtime Configuration Keys
// =============================================================================

/// Operating system the store was created under.
pub const OS_KEY: &[u8] = b"os";

/// Static (persistent) state directory.
pub const STATIC_DIR_KEY: &[u8] = b"static-dir";

/// Temporary files directory.
pub const TMP_DIR_KEY: &[u8] = b"tmp-dir";

/// Storage run root directory.
pub const RUN_ROOT_KEY: &[u8] = b"run-root";

/// Storage graph root directory.
pub const GRAPH_ROOT_KEY: &[u8] = b"graph-root";

/// Storage graph driver name.
pub const GRAPH_DRIVER_KEY: &[u8] = b"graph-driver-name";

/// Volume storage directory.
pub const VOLUME_PATH_KEY: &[u8] = b"volume-path";

// =============================================================================
// Store File
// =============================================================================

/// Permission mode for the store file. The store holds paths and entity
/// configuration that other users have no business reading.
pub const DB_FILE_MODE: u32 = 0o600;
