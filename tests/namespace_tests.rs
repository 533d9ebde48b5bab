//! Tests for namespace scoping.
//!
//! A store attached with a namespace refuses targeted access to entities
//! outside that namespace and filters them from enumeration.

mod common;

use common::*;
use podstore::{Error, Store};
use tempfile::TempDir;

/// Seeds an unscoped store with one container in "ns1" and one in "ns2",
/// then reopens it scoped to `namespace`.
fn seeded_scoped_store(namespace: &str) -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = Store::open(&path, test_runtime(), None).unwrap();
        let mut c1 = new_ctr("c1", "web");
        c1.config.namespace = "ns1".to_string();
        store.add_container(&mut c1, None).unwrap();
        let mut c2 = new_ctr("c2", "db");
        c2.config.namespace = "ns2".to_string();
        store.add_container(&mut c2, None).unwrap();
    }

    let store = Store::open(&path, test_runtime(), Some(namespace)).unwrap();
    (dir, store)
}

#[test]
fn test_scoped_hydration_rejects_foreign_container() {
    let (_dir, store) = seeded_scoped_store("ns1");

    assert_eq!(store.container("c1").unwrap().name(), "web");

    let err = store.container("c2").unwrap_err();
    match err {
        Error::NamespaceMismatch { expected, actual, .. } => {
            assert_eq!(expected, "ns1");
            assert_eq!(actual, "ns2");
        }
        other => panic!("expected NamespaceMismatch, got {other}"),
    }
}

#[test]
fn test_scoped_enumeration_filters_by_namespace() {
    let (_dir, store) = seeded_scoped_store("ns1");

    let containers = store.all_containers().unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].id(), "c1");
}

#[test]
fn test_scoped_add_requires_matching_namespace() {
    let (_dir, store) = open_scoped_store("ns1");

    // Wrong namespace.
    let mut foreign = new_ctr("c1", "web");
    foreign.config.namespace = "ns2".to_string();
    let err = store.add_container(&mut foreign, None).unwrap_err();
    assert!(matches!(err, Error::NamespaceMismatch { .. }));

    // No namespace at all.
    let err = store
        .add_container(&mut new_ctr("c2", "db"), None)
        .unwrap_err();
    assert!(matches!(err, Error::NamespaceMismatch { .. }));

    // Matching namespace.
    let mut local = new_ctr("c3", "cache");
    local.config.namespace = "ns1".to_string();
    store.add_container(&mut local, None).unwrap();
}

#[test]
fn test_scoped_remove_rejects_foreign_container() {
    let (_dir, store) = seeded_scoped_store("ns1");

    let mut foreign = new_ctr("c2", "db");
    foreign.config.namespace = "ns2".to_string();
    let err = store.remove_container(&mut foreign, None).unwrap_err();
    assert!(matches!(err, Error::NamespaceMismatch { .. }));
}

#[test]
fn test_scoped_state_access_rejects_foreign_container() {
    let (_dir, store) = seeded_scoped_store("ns1");

    let mut foreign = new_ctr("c2", "db");
    foreign.config.namespace = "ns2".to_string();
    assert!(matches!(
        store.update_container(&mut foreign).unwrap_err(),
        Error::NamespaceMismatch { .. }
    ));
    assert!(matches!(
        store.save_container(&mut foreign).unwrap_err(),
        Error::NamespaceMismatch { .. }
    ));
    assert!(matches!(
        store.container_in_use("c2").unwrap_err(),
        Error::NamespaceMismatch { .. }
    ));
}

#[test]
fn test_scoped_pod_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = Store::open(&path, test_runtime(), None).unwrap();
        let mut p1 = new_pod("p1", "web");
        p1.config.namespace = "ns1".to_string();
        store.add_pod(&mut p1).unwrap();
        let mut p2 = new_pod("p2", "db");
        p2.config.namespace = "ns2".to_string();
        store.add_pod(&mut p2).unwrap();
    }

    let store = Store::open(&path, test_runtime(), Some("ns1")).unwrap();
    assert!(store.pod("p1").is_ok());
    assert!(matches!(
        store.pod("p2").unwrap_err(),
        Error::NamespaceMismatch { .. }
    ));
    assert!(matches!(
        store.pod_containers("p2").unwrap_err(),
        Error::NamespaceMismatch { .. }
    ));

    let pods = store.all_pods().unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].id(), "p1");
}

#[test]
fn test_unscoped_store_sees_every_namespace() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = Store::open(&path, test_runtime(), None).unwrap();
        let mut c1 = new_ctr("c1", "web");
        c1.config.namespace = "ns1".to_string();
        store.add_container(&mut c1, None).unwrap();
    }

    let store = Store::open(&path, test_runtime(), None).unwrap();
    assert!(store.container("c1").is_ok());
    assert_eq!(store.all_containers().unwrap().len(), 1);
}
