//! The metadata store.
//!
//! [`Store`] persists containers, pods, and volumes in an embedded
//! key-value database and maintains the cross-index invariants the rest of
//! the runtime relies on:
//!
//! - IDs and names are unique across all three entity kinds together.
//! - The ID and name registries mirror each other exactly.
//! - Dependency edges are symmetric: a container's record lists every
//!   container depending on it, and removal is refused while that list is
//!   non-empty.
//! - Pod members only depend on members of the same pod; podless
//!   containers only depend on podless containers.
//! - Entities linked by dependency or membership share a namespace, and a
//!   namespace-scoped store refuses access outside its namespace.
//! - Named volumes track which containers reference them.
//!
//! Every operation runs inside a single engine transaction behind the
//! process-wide connection gate; an error aborts the transaction, so
//! partial writes are never visible.

mod containers;
mod pods;
mod volumes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config;
use crate::constants::{CONFIG_KEY, NAMESPACE_KEY, NETNS_KEY, STATE_KEY};
use crate::container::{Container, ContainerConfig, ContainerState};
use crate::engine::{Bucket, Engine, Tx};
use crate::error::{Error, Result};
use crate::gate::ConnectionGate;
use crate::pod::{Pod, PodConfig, PodState};
use crate::runtime::{OciRuntimeHandle, Runtime};
use crate::schema;
use crate::volume::{Volume, VolumeConfig, VolumeState};

/// Transactional metadata store for containers, pods, and volumes.
pub struct Store {
    path: PathBuf,
    engine: Engine,
    gate: ConnectionGate,
    runtime: Arc<Runtime>,
    namespace: Option<String>,
}

impl Store {
    /// Opens (or creates) the store at `path` and attaches it to `runtime`.
    ///
    /// Creates any missing top-level buckets, then validates the runtime's
    /// configuration against previously persisted values; a mismatch fails
    /// with [`Error::BadConfig`] before any entity can be touched.
    ///
    /// A non-empty `namespace` scopes the store: reads and mutations of
    /// entities outside that namespace fail with
    /// [`Error::NamespaceMismatch`].
    pub fn open(
        path: impl AsRef<Path>,
        runtime: Arc<Runtime>,
        namespace: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let gate = ConnectionGate::for_path(&path);

        let engine = {
            let _gate = gate.enter();
            let engine = Engine::open(&path)?;

            let tx = engine.begin_write()?;
            schema::ensure_schema(&tx)?;
            tx.commit()?;

            config::check_runtime_config(&engine, &runtime.config, &runtime.storage_defaults)?;
            engine
        };

        debug!("metadata store opened at {}", path.display());

        Ok(Self {
            path,
            engine,
            gate,
            runtime,
            namespace: namespace
                .filter(|ns| !ns.is_empty())
                .map(str::to_string),
        })
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Namespace the store is scoped to, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    // =========================================================================
    // Namespace Guards
    // =========================================================================

    /// Fails unless an entity in `namespace` is visible from this store.
    pub(crate) fn check_namespace(&self, id: &str, namespace: &str) -> Result<()> {
        if let Some(ns) = &self.namespace
            && ns != namespace
        {
            return Err(Error::NamespaceMismatch {
                id: id.to_string(),
                expected: ns.clone(),
                actual: namespace.to_string(),
            });
        }
        Ok(())
    }

    /// Same check, against the namespace recorded for a stored entity.
    pub(crate) fn check_stored_namespace(
        &self,
        tx: &impl Tx,
        record: &Bucket,
        id: &str,
    ) -> Result<()> {
        if let Some(ns) = &self.namespace {
            let stored = tx.get(record, NAMESPACE_KEY)?;
            if stored.as_deref() != Some(ns.as_bytes()) {
                return Err(Error::NamespaceMismatch {
                    id: id.to_string(),
                    expected: ns.clone(),
                    actual: lossy(&stored.unwrap_or_default()),
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    /// Rebuilds a container from its stored record.
    ///
    /// Reads the immutable configuration, retrieves the container's lock
    /// from the lock manager, resolves its OCI runtime handle, and marks
    /// the container valid. Never mutates the store.
    pub(crate) fn container_from_db(
        &self,
        tx: &impl Tx,
        ctrs: &Bucket,
        id: &str,
    ) -> Result<Container> {
        let record = ctrs.child(id.as_bytes());
        if !tx.bucket_exists(&record)? {
            return Err(Error::NoSuchContainer(id.to_string()));
        }

        self.check_stored_namespace(tx, &record, id)?;

        let config_bytes = tx
            .get(&record, CONFIG_KEY)?
            .ok_or_else(|| Error::Internal(format!("container {id} is missing its config key")))?;
        let config: ContainerConfig = serde_json::from_slice(&config_bytes)?;

        let lock = self.runtime.lock_manager.retrieve_lock(config.lock_id)?;
        let oci_runtime = self.resolve_oci_runtime(&config)?;

        let mut ctr = Container::new(config);
        ctr.bind(lock, oci_runtime);
        ctr.set_valid(true);
        Ok(ctr)
    }

    /// Resolves a container's OCI runtime handle by name.
    ///
    /// An empty name selects the runtime's default. Legacy records may
    /// carry a literal path as the runtime name; those are reduced to the
    /// basename before lookup.
    pub(crate) fn resolve_oci_runtime(
        &self,
        config: &ContainerConfig,
    ) -> Result<Arc<OciRuntimeHandle>> {
        if config.oci_runtime.is_empty() {
            return Ok(self.runtime.default_oci_runtime.clone());
        }

        let mut name = config.oci_runtime.as_str();
        if name.starts_with('/') {
            name = Path::new(name)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(name);
        }

        self.runtime.oci_runtime(name).ok_or_else(|| {
            Error::Internal(format!(
                "container {} was created with OCI runtime {}, but that runtime is not available",
                config.id, config.oci_runtime
            ))
        })
    }

    /// Loads a container's mutable state blob. The network namespace path
    /// is refreshed from its dedicated key, which is authoritative.
    pub(crate) fn load_container_state(
        &self,
        tx: &impl Tx,
        ctrs: &Bucket,
        ctr: &mut Container,
    ) -> Result<()> {
        let record = ctrs.child(ctr.config.id.as_bytes());
        let state_bytes = tx.get(&record, STATE_KEY)?.ok_or_else(|| {
            Error::Internal(format!(
                "container {} is missing its state key",
                ctr.config.id
            ))
        })?;
        let mut state: ContainerState = serde_json::from_slice(&state_bytes)?;
        state.net_ns_path = tx.get(&record, NETNS_KEY)?.map(|raw| lossy(&raw));
        ctr.state = state;
        Ok(())
    }

    /// Rebuilds a pod from its stored record.
    pub(crate) fn pod_from_db(&self, tx: &impl Tx, pods: &Bucket, id: &str) -> Result<Pod> {
        let record = pods.child(id.as_bytes());
        if !tx.bucket_exists(&record)? {
            return Err(Error::NoSuchPod(id.to_string()));
        }

        self.check_stored_namespace(tx, &record, id)?;

        let config_bytes = tx
            .get(&record, CONFIG_KEY)?
            .ok_or_else(|| Error::Internal(format!("pod {id} is missing its config key")))?;
        let config: PodConfig = serde_json::from_slice(&config_bytes)?;

        let lock = self.runtime.lock_manager.retrieve_lock(config.lock_id)?;

        let mut pod = Pod::new(config);
        pod.bind(lock);
        pod.set_valid(true);
        Ok(pod)
    }

    /// Loads a pod's mutable state blob.
    pub(crate) fn load_pod_state(&self, tx: &impl Tx, pods: &Bucket, pod: &mut Pod) -> Result<()> {
        let record = pods.child(pod.config.id.as_bytes());
        let state_bytes = tx
            .get(&record, STATE_KEY)?
            .ok_or_else(|| Error::Internal(format!("pod {} is missing its state key", pod.config.id)))?;
        pod.state = serde_json::from_slice::<PodState>(&state_bytes)?;
        Ok(())
    }

    /// Rebuilds a volume from its stored record. Volumes carry no
    /// namespace, so no visibility check applies.
    pub(crate) fn volume_from_db(&self, tx: &impl Tx, vols: &Bucket, name: &str) -> Result<Volume> {
        let record = vols.child(name.as_bytes());
        if !tx.bucket_exists(&record)? {
            return Err(Error::NoSuchVolume(name.to_string()));
        }

        let config_bytes = tx
            .get(&record, CONFIG_KEY)?
            .ok_or_else(|| Error::Internal(format!("volume {name} is missing its config key")))?;
        let config: VolumeConfig = serde_json::from_slice(&config_bytes)?;

        let lock = self.runtime.lock_manager.retrieve_lock(config.lock_id)?;

        let mut volume = Volume::new(config);
        volume.bind(lock);
        volume.set_valid(true);
        Ok(volume)
    }

    /// Loads a volume's mutable state blob.
    pub(crate) fn load_volume_state(
        &self,
        tx: &impl Tx,
        vols: &Bucket,
        volume: &mut Volume,
    ) -> Result<()> {
        let record = vols.child(volume.config.name.as_bytes());
        let state_bytes = tx.get(&record, STATE_KEY)?.ok_or_else(|| {
            Error::Internal(format!(
                "volume {} is missing its state key",
                volume.config.name
            ))
        })?;
        volume.state = serde_json::from_slice::<VolumeState>(&state_bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Decodes stored key bytes for display and comparison. Keys written by
/// this store are always UTF-8.
pub(crate) fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// Corruption tolerance is tested here rather than in tests/ because
// producing an inconsistent store requires raw engine access.
#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::constants::{CONTAINERS_BUCKET, DEPENDENCIES_BUCKET};
    use crate::container::NamedVolume;
    use crate::runtime::{InProcessLockManager, OciRuntimeHandle};

    fn test_runtime() -> Arc<Runtime> {
        let runc = Arc::new(OciRuntimeHandle::new("runc", "/usr/bin/runc"));
        let mut oci_runtimes = HashMap::new();
        oci_runtimes.insert(runc.name.clone(), runc.clone());
        Arc::new(Runtime {
            config: crate::config::RuntimeConfig::default(),
            storage_defaults: crate::config::StorageDefaults::default(),
            lock_manager: Arc::new(InProcessLockManager::new()),
            oci_runtimes,
            default_oci_runtime: runc,
        })
    }

    fn open_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("state.db"), test_runtime(), None).unwrap();
        (dir, store)
    }

    fn new_ctr(id: &str) -> Container {
        let mut config = ContainerConfig::new(format!("name-{id}"));
        config.id = id.to_string();
        Container::new(config)
    }

    #[test]
    fn test_remove_container_survives_missing_volume_record() {
        let (_dir, store) = open_store();

        let mut vol = Volume::new(VolumeConfig::new("data"));
        store.add_volume(&mut vol).unwrap();

        let mut ctr = new_ctr("c1");
        ctr.config.named_volumes = vec![NamedVolume {
            name: "data".to_string(),
            dest: "/data".to_string(),
            options: Vec::new(),
        }];
        store.add_container(&mut ctr, None).unwrap();

        // Simulate a volume record lost to corruption.
        {
            let tx = store.engine.begin_write().unwrap();
            let vols = schema::vol_bucket(&tx).unwrap();
            tx.delete_bucket(&vols.child(b"data")).unwrap();
            tx.commit().unwrap();
        }

        // The container can still be removed.
        store.remove_container(&mut ctr, None).unwrap();
        assert!(!ctr.is_valid());
        assert!(matches!(
            store.container("c1").unwrap_err(),
            Error::NoSuchContainer(_)
        ));
    }

    #[test]
    fn test_remove_container_survives_malformed_pod() {
        let (_dir, store) = open_store();

        let mut pod = Pod::new({
            let mut config = PodConfig::new("web");
            config.id = "p1".to_string();
            config
        });
        store.add_pod(&mut pod).unwrap();

        let mut ctr = new_ctr("c1");
        ctr.config.pod_id = Some("p1".to_string());
        store.add_container(&mut ctr, Some(&mut pod)).unwrap();

        // Simulate a pod that lost its membership bucket.
        {
            let tx = store.engine.begin_write().unwrap();
            let pods = schema::pod_bucket(&tx).unwrap();
            tx.delete_bucket(&pods.child(b"p1").child(CONTAINERS_BUCKET))
                .unwrap();
            tx.commit().unwrap();
        }

        // The container removal completes despite the malformed pod.
        store.remove_container(&mut ctr, Some(&mut pod)).unwrap();
        assert!(!ctr.is_valid());
    }

    #[test]
    fn test_missing_dependencies_bucket_is_corruption() {
        let (_dir, store) = open_store();

        let mut ctr = new_ctr("c1");
        store.add_container(&mut ctr, None).unwrap();

        {
            let tx = store.engine.begin_write().unwrap();
            let ctrs = schema::ctr_bucket(&tx).unwrap();
            tx.delete_bucket(&ctrs.child(b"c1").child(DEPENDENCIES_BUCKET))
                .unwrap();
            tx.commit().unwrap();
        }

        assert!(matches!(
            store.container_in_use("c1").unwrap_err(),
            Error::Internal(_)
        ));
        assert!(matches!(
            store.remove_container(&mut ctr, None).unwrap_err(),
            Error::Internal(_)
        ));
    }

    #[test]
    fn test_missing_config_key_is_corruption() {
        let (_dir, store) = open_store();

        let mut ctr = new_ctr("c1");
        store.add_container(&mut ctr, None).unwrap();

        {
            let tx = store.engine.begin_write().unwrap();
            let ctrs = schema::ctr_bucket(&tx).unwrap();
            tx.delete(&ctrs.child(b"c1"), CONFIG_KEY).unwrap();
            tx.commit().unwrap();
        }

        assert!(matches!(
            store.container("c1").unwrap_err(),
            Error::Internal(_)
        ));
    }
}
