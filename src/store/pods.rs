//! Pod operations.

use tracing::{debug, error};

use crate::constants::{CONFIG_KEY, CONTAINERS_BUCKET, NAMESPACE_KEY, STATE_KEY};
use crate::engine::Tx;
use crate::error::{Error, Result};
use crate::pod::Pod;
use crate::schema;
use crate::store::{Store, lossy};

impl Store {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Hydrates the pod with the given ID.
    pub fn pod(&self, id: &str) -> Result<Pod> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let pods = schema::pod_bucket(&tx)?;

        let mut pod = self.pod_from_db(&tx, &pods, id)?;
        self.load_pod_state(&tx, &pods, &mut pod)?;
        Ok(pod)
    }

    /// Hydrates every pod in the store. In a namespace-scoped store, pods
    /// outside the namespace are skipped.
    pub fn all_pods(&self) -> Result<Vec<Pod>> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let all_pods = schema::all_pods_bucket(&tx)?;
        let pods = schema::pod_bucket(&tx)?;

        let mut out = Vec::new();
        for (id, _name) in tx.entries(&all_pods)? {
            let id = lossy(&id);
            match self.pod_from_db(&tx, &pods, &id) {
                Ok(mut pod) => {
                    self.load_pod_state(&tx, &pods, &mut pod)?;
                    out.push(pod);
                }
                Err(Error::NamespaceMismatch { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// IDs of the containers that are members of the given pod.
    pub fn pod_containers(&self, id: &str) -> Result<Vec<String>> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let pods = schema::pod_bucket(&tx)?;

        let record = pods.child(id.as_bytes());
        if !tx.bucket_exists(&record)? {
            return Err(Error::NoSuchPod(id.to_string()));
        }
        self.check_stored_namespace(&tx, &record, id)?;

        let members = record.child(CONTAINERS_BUCKET);
        if !tx.bucket_exists(&members)? {
            return Err(Error::Internal(format!(
                "pod {id} does not have a containers bucket"
            )));
        }

        Ok(tx
            .entries(&members)?
            .into_iter()
            .map(|(ctr_id, _)| lossy(&ctr_id))
            .collect())
    }

    /// Rereads a pod's mutable state from the store.
    pub fn update_pod(&self, pod: &mut Pod) -> Result<()> {
        self.check_namespace(&pod.config.id, &pod.config.namespace)?;

        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let pods = schema::pod_bucket(&tx)?;

        if !tx.bucket_exists(&pods.child(pod.config.id.as_bytes()))? {
            pod.set_valid(false);
            return Err(Error::NoSuchPod(pod.config.id.clone()));
        }

        self.load_pod_state(&tx, &pods, pod)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Writes a pod's mutable state to the store.
    pub fn save_pod(&self, pod: &mut Pod) -> Result<()> {
        self.check_namespace(&pod.config.id, &pod.config.namespace)?;

        let state_json = serde_json::to_vec(&pod.state)?;

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;
        let pods = schema::pod_bucket(&tx)?;

        let record = pods.child(pod.config.id.as_bytes());
        if !tx.bucket_exists(&record)? {
            pod.set_valid(false);
            return Err(Error::NoSuchPod(pod.config.id.clone()));
        }

        tx.put(&record, STATE_KEY, &state_json)?;
        tx.commit()
    }

    /// Registers a pod.
    pub fn add_pod(&self, pod: &mut Pod) -> Result<()> {
        self.check_namespace(&pod.config.id, &pod.config.namespace)?;

        let config_json = serde_json::to_vec(&pod.config)?;
        let state_json = serde_json::to_vec(&pod.state)?;

        let pod_id = pod.config.id.clone();
        let pod_name = pod.config.name.clone();
        let pod_ns = (!pod.config.namespace.is_empty()).then(|| pod.config.namespace.clone());

        let lock = self.runtime.lock_manager.retrieve_lock(pod.config.lock_id)?;

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;

        let ids = schema::id_registry(&tx)?;
        let names = schema::name_registry(&tx)?;
        let ns_registry = schema::ns_registry(&tx)?;
        let pods = schema::pod_bucket(&tx)?;
        let all_pods = schema::all_pods_bucket(&tx)?;

        // The ID and name must be unused by any entity of any kind.
        if tx.get(&ids, pod_id.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "ID",
                value: pod_id,
            });
        }
        if tx.get(&names, pod_name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "name",
                value: pod_name,
            });
        }

        tx.put(&ids, pod_id.as_bytes(), pod_name.as_bytes())?;
        tx.put(&names, pod_name.as_bytes(), pod_id.as_bytes())?;
        if let Some(ns) = &pod_ns {
            tx.put(&ns_registry, pod_id.as_bytes(), ns.as_bytes())?;
        }
        tx.put(&all_pods, pod_id.as_bytes(), pod_name.as_bytes())?;

        let record = pods.child(pod_id.as_bytes());
        tx.create_bucket(&record)?;
        tx.put(&record, CONFIG_KEY, &config_json)?;
        tx.put(&record, STATE_KEY, &state_json)?;
        if let Some(ns) = &pod_ns {
            tx.put(&record, NAMESPACE_KEY, ns.as_bytes())?;
        }
        tx.create_bucket(&record.child(CONTAINERS_BUCKET))?;

        tx.commit()?;

        pod.bind(lock);
        pod.set_valid(true);
        debug!("added pod {} ({})", pod.config.id, pod.config.name);
        Ok(())
    }

    /// Removes a pod.
    ///
    /// Fails with [`Error::StillReferenced`] while the pod still has member
    /// containers; they must be removed first.
    pub fn remove_pod(&self, pod: &mut Pod) -> Result<()> {
        let pod_id = pod.config.id.clone();
        let pod_name = pod.config.name.clone();

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;

        let ids = schema::id_registry(&tx)?;
        let names = schema::name_registry(&tx)?;
        let ns_registry = schema::ns_registry(&tx)?;
        let pods = schema::pod_bucket(&tx)?;
        let all_pods = schema::all_pods_bucket(&tx)?;

        let record = pods.child(pod_id.as_bytes());
        if !tx.bucket_exists(&record)? {
            pod.set_valid(false);
            return Err(Error::NoSuchPod(pod_id));
        }

        self.check_namespace(&pod_id, &pod.config.namespace)?;

        // Pods with member containers cannot be removed.
        let members_bucket = record.child(CONTAINERS_BUCKET);
        if !tx.bucket_exists(&members_bucket)? {
            // Malformed pod. Removal still proceeds, or the store could
            // never be cleaned up.
            error!("pod {pod_id} is malformed in the database: missing containers bucket");
        } else {
            let members: Vec<String> = tx
                .entries(&members_bucket)?
                .into_iter()
                .map(|(ctr_id, _)| lossy(&ctr_id))
                .collect();
            if !members.is_empty() {
                return Err(Error::StillReferenced {
                    id: pod_id,
                    dependents: members,
                });
            }
        }

        tx.delete_bucket(&record)?;
        tx.delete(&ids, pod_id.as_bytes())?;
        tx.delete(&names, pod_name.as_bytes())?;
        tx.delete(&ns_registry, pod_id.as_bytes())?;
        tx.delete(&all_pods, pod_id.as_bytes())?;

        tx.commit()?;

        pod.set_valid(false);
        debug!("removed pod {} ({})", pod.config.id, pod.config.name);
        Ok(())
    }
}
