//! Shared fixtures for store integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use podstore::{
    Container, ContainerConfig, InProcessLockManager, OciRuntimeHandle, Pod, PodConfig, Runtime,
    RuntimeConfig, StorageConfig, StorageDefaults, Store, Volume, VolumeConfig,
};
use tempfile::TempDir;

/// Runtime wired for tests: in-process locks, two OCI runtimes, and a
/// fixed storage configuration.
pub fn test_runtime() -> Arc<Runtime> {
    let runc = Arc::new(OciRuntimeHandle::new("runc", "/usr/bin/runc"));
    let crun = Arc::new(OciRuntimeHandle::new("crun", "/usr/bin/crun"));
    let mut oci_runtimes = HashMap::new();
    oci_runtimes.insert("runc".to_string(), runc.clone());
    oci_runtimes.insert("crun".to_string(), crun);

    Arc::new(Runtime {
        config: test_config(),
        storage_defaults: test_defaults(),
        lock_manager: Arc::new(InProcessLockManager::new()),
        oci_runtimes,
        default_oci_runtime: runc,
    })
}

pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        static_dir: "/var/lib/teststore".to_string(),
        tmp_dir: "/run/teststore".to_string(),
        volume_path: "/var/lib/teststore/volumes".to_string(),
        storage: StorageConfig {
            run_root: "/run/storage".to_string(),
            graph_root: "/var/lib/storage".to_string(),
            graph_driver: "overlay".to_string(),
        },
    }
}

pub fn test_defaults() -> StorageDefaults {
    StorageDefaults {
        run_root: "/run/storage".to_string(),
        graph_root: "/var/lib/storage".to_string(),
        graph_driver: "overlay".to_string(),
    }
}

/// Opens a store on a fresh temporary directory.
pub fn open_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("state.db"), test_runtime(), None).unwrap();
    (dir, store)
}

/// Opens a namespace-scoped store on a fresh temporary directory.
pub fn open_scoped_store(namespace: &str) -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(
        dir.path().join("state.db"),
        test_runtime(),
        Some(namespace),
    )
    .unwrap();
    (dir, store)
}

pub fn new_ctr(id: &str, name: &str) -> Container {
    let mut config = ContainerConfig::new(name);
    config.id = id.to_string();
    Container::new(config)
}

pub fn new_pod(id: &str, name: &str) -> Pod {
    let mut config = PodConfig::new(name);
    config.id = id.to_string();
    Pod::new(config)
}

pub fn new_volume(name: &str) -> Volume {
    Volume::new(VolumeConfig::new(name))
}
