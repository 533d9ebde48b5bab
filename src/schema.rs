//! Schema initialization and bucket accessors.
//!
//! The ten top-level buckets are created when a store is first opened.
//! After that the store is assumed well-formed: every accessor returns the
//! requested bucket or fails with [`Error::BadConfig`]. Accessors never
//! create buckets on a read path; a missing top-level bucket means the
//! store is corrupt, not that this is first use.

use crate::constants::*;
use crate::engine::{Bucket, Tx, WriteTx};
use crate::error::{Error, Result};

const TOP_LEVEL: &[&[u8]] = &[
    ID_REGISTRY,
    NAME_REGISTRY,
    NS_REGISTRY,
    CTR,
    ALL_CTRS,
    POD,
    ALL_PODS,
    VOL,
    ALL_VOLUMES,
    RUNTIME_CONFIG,
];

/// Creates any top-level buckets that do not exist yet.
pub(crate) fn ensure_schema(tx: &WriteTx) -> Result<()> {
    for name in TOP_LEVEL {
        tx.ensure_bucket(&Bucket::root(name))?;
    }
    Ok(())
}

fn required(tx: &impl Tx, name: &[u8], what: &str) -> Result<Bucket> {
    let bucket = Bucket::root(name);
    if tx.bucket_exists(&bucket)? {
        Ok(bucket)
    } else {
        Err(Error::BadConfig(format!(
            "{what} bucket not found in database"
        )))
    }
}

/// The ID registry bucket.
pub(crate) fn id_registry(tx: &impl Tx) -> Result<Bucket> {
    required(tx, ID_REGISTRY, "id registry")
}

/// The name registry bucket.
pub(crate) fn name_registry(tx: &impl Tx) -> Result<Bucket> {
    required(tx, NAME_REGISTRY, "name registry")
}

/// The namespace registry bucket.
pub(crate) fn ns_registry(tx: &impl Tx) -> Result<Bucket> {
    required(tx, NS_REGISTRY, "namespace registry")
}

/// The per-container records bucket.
pub(crate) fn ctr_bucket(tx: &impl Tx) -> Result<Bucket> {
    required(tx, CTR, "containers")
}

/// The container enumeration bucket.
pub(crate) fn all_ctrs_bucket(tx: &impl Tx) -> Result<Bucket> {
    required(tx, ALL_CTRS, "all containers")
}

/// The per-pod records bucket.
pub(crate) fn pod_bucket(tx: &impl Tx) -> Result<Bucket> {
    required(tx, POD, "pods")
}

/// The pod enumeration bucket.
pub(crate) fn all_pods_bucket(tx: &impl Tx) -> Result<Bucket> {
    required(tx, ALL_PODS, "all pods")
}

/// The per-volume records bucket.
pub(crate) fn vol_bucket(tx: &impl Tx) -> Result<Bucket> {
    required(tx, VOL, "volumes")
}

/// The volume enumeration bucket.
pub(crate) fn all_volumes_bucket(tx: &impl Tx) -> Result<Bucket> {
    required(tx, ALL_VOLUMES, "all volumes")
}

/// The persisted runtime configuration bucket.
pub(crate) fn runtime_config_bucket(tx: &impl Tx) -> Result<Bucket> {
    required(tx, RUNTIME_CONFIG, "runtime configuration")
}
