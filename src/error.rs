//! Error types for the metadata store.

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the metadata store.
///
/// The lookup, conflict, namespace, and integrity variants are stable kinds
/// that callers match on; the remaining variants carry ambient failures
/// (engine, serialization, I/O) through the same type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Entity Lookup Errors
    // =========================================================================
    /// No container with the given ID exists in the store.
    #[error("no container with ID {0} found")]
    NoSuchContainer(String),

    /// No pod with the given ID exists in the store.
    #[error("no pod with ID {0} found")]
    NoSuchPod(String),

    /// No volume with the given name exists in the store.
    #[error("no volume with name {0} found")]
    NoSuchVolume(String),

    // =========================================================================
    // Mutation Conflicts
    // =========================================================================
    /// An entity of some kind already uses this ID or name. IDs and names
    /// are unique across containers, pods, and volumes together.
    #[error("{kind} {value} is already in use")]
    AlreadyExists { kind: &'static str, value: String },

    /// Removal refused because other entities still reference this one.
    #[error("{id} is required by: {}", .dependents.join(", "))]
    StillReferenced {
        id: String,
        dependents: Vec<String>,
    },

    /// A requested dependency would violate pod or namespace coherence.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // =========================================================================
    // Namespace Errors
    // =========================================================================
    /// Cross-namespace access attempted.
    #[error("cannot access {id}: it is in namespace {actual:?} but namespace {expected:?} is required")]
    NamespaceMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    // =========================================================================
    // Store Integrity Errors
    // =========================================================================
    /// The store layout or persisted runtime configuration does not match
    /// expectations (missing top-level bucket, configuration mismatch).
    #[error("database configuration is invalid: {0}")]
    BadConfig(String),

    /// Corruption: a record exists but is missing required contents.
    #[error("internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// Failure inside the embedded database engine.
    #[error("database error: {0}")]
    Database(String),

    /// Entity blob could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The lock manager could not produce a lock handle.
    #[error("lock error: {0}")]
    Lock(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Engine failures all funnel into the Database variant so store code can
// use `?` without caring which engine type failed.

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
