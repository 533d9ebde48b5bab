//! Container operations.

use tracing::{debug, error};

use crate::constants::{
    CONFIG_KEY, CONTAINERS_BUCKET, DEPENDENCIES_BUCKET, NAMESPACE_KEY, NETNS_KEY, POD_ID_KEY,
    STATE_KEY, VOL_DEPENDENCIES_BUCKET,
};
use crate::container::Container;
use crate::engine::Tx;
use crate::error::{Error, Result};
use crate::pod::Pod;
use crate::schema;
use crate::store::{Store, lossy};

impl Store {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Hydrates the container with the given ID.
    pub fn container(&self, id: &str) -> Result<Container> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let ctrs = schema::ctr_bucket(&tx)?;

        let mut ctr = self.container_from_db(&tx, &ctrs, id)?;
        self.load_container_state(&tx, &ctrs, &mut ctr)?;
        Ok(ctr)
    }

    /// Hydrates every container in the store. In a namespace-scoped store,
    /// containers outside the namespace are skipped.
    pub fn all_containers(&self) -> Result<Vec<Container>> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let all_ctrs = schema::all_ctrs_bucket(&tx)?;
        let ctrs = schema::ctr_bucket(&tx)?;

        let mut out = Vec::new();
        for (id, _name) in tx.entries(&all_ctrs)? {
            let id = lossy(&id);
            match self.container_from_db(&tx, &ctrs, &id) {
                Ok(mut ctr) => {
                    self.load_container_state(&tx, &ctrs, &mut ctr)?;
                    out.push(ctr);
                }
                Err(Error::NamespaceMismatch { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// IDs of the containers that depend on the given container.
    pub fn container_in_use(&self, id: &str) -> Result<Vec<String>> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let ctrs = schema::ctr_bucket(&tx)?;

        let record = ctrs.child(id.as_bytes());
        if !tx.bucket_exists(&record)? {
            return Err(Error::NoSuchContainer(id.to_string()));
        }
        self.check_stored_namespace(&tx, &record, id)?;

        let deps = record.child(DEPENDENCIES_BUCKET);
        if !tx.bucket_exists(&deps)? {
            return Err(Error::Internal(format!(
                "container {id} does not have a dependencies bucket"
            )));
        }

        Ok(tx
            .entries(&deps)?
            .into_iter()
            .map(|(dep_id, _)| lossy(&dep_id))
            .collect())
    }

    /// Rereads a container's mutable state from the store.
    pub fn update_container(&self, ctr: &mut Container) -> Result<()> {
        self.check_namespace(&ctr.config.id, &ctr.config.namespace)?;

        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let ctrs = schema::ctr_bucket(&tx)?;

        if !tx.bucket_exists(&ctrs.child(ctr.config.id.as_bytes()))? {
            ctr.set_valid(false);
            return Err(Error::NoSuchContainer(ctr.config.id.clone()));
        }

        self.load_container_state(&tx, &ctrs, ctr)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Writes a container's mutable state to the store. The configuration
    /// is immutable and never rewritten.
    pub fn save_container(&self, ctr: &mut Container) -> Result<()> {
        self.check_namespace(&ctr.config.id, &ctr.config.namespace)?;

        let state_json = serde_json::to_vec(&ctr.state)?;

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;
        let ctrs = schema::ctr_bucket(&tx)?;

        let record = ctrs.child(ctr.config.id.as_bytes());
        if !tx.bucket_exists(&record)? {
            ctr.set_valid(false);
            return Err(Error::NoSuchContainer(ctr.config.id.clone()));
        }

        tx.put(&record, STATE_KEY, &state_json)?;
        match &ctr.state.net_ns_path {
            Some(path) => tx.put(&record, NETNS_KEY, path.as_bytes())?,
            None => tx.delete(&record, NETNS_KEY)?,
        }

        tx.commit()
    }

    /// Registers a container, optionally as a member of `pod`.
    ///
    /// All registry entries, the container record, reverse dependency
    /// edges, pod membership, and volume back-references are written in
    /// one transaction: either every write lands or none does.
    pub fn add_container(&self, ctr: &mut Container, pod: Option<&mut Pod>) -> Result<()> {
        self.check_namespace(&ctr.config.id, &ctr.config.namespace)?;

        let config_json = serde_json::to_vec(&ctr.config)?;
        let state_json = serde_json::to_vec(&ctr.state)?;
        let net_ns_path = ctr.state.net_ns_path.clone();

        let ctr_id = ctr.config.id.clone();
        let ctr_name = ctr.config.name.clone();
        let ctr_ns = (!ctr.config.namespace.is_empty()).then(|| ctr.config.namespace.clone());
        let pod_id = pod.as_ref().map(|p| p.config.id.clone());

        // Bindings are resolved before anything is written so that a bad
        // lock ID or unknown OCI runtime cannot leave a half-registered
        // container behind.
        let lock = self.runtime.lock_manager.retrieve_lock(ctr.config.lock_id)?;
        let oci_runtime = self.resolve_oci_runtime(&ctr.config)?;

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;

        let ids = schema::id_registry(&tx)?;
        let names = schema::name_registry(&tx)?;
        let ns_registry = schema::ns_registry(&tx)?;
        let ctrs = schema::ctr_bucket(&tx)?;
        let all_ctrs = schema::all_ctrs_bucket(&tx)?;
        let vols = schema::vol_bucket(&tx)?;

        // If a pod was given, it must exist and agree on namespace.
        let mut pod_members = None;
        if let Some(pod) = pod {
            let pods = schema::pod_bucket(&tx)?;
            let pod_record = pods.child(pod.config.id.as_bytes());
            if !tx.bucket_exists(&pod_record)? {
                pod.set_valid(false);
                return Err(Error::NoSuchPod(pod.config.id.clone()));
            }

            let members = pod_record.child(CONTAINERS_BUCKET);
            if !tx.bucket_exists(&members)? {
                return Err(Error::Internal(format!(
                    "pod {} does not have a containers bucket",
                    pod.config.id
                )));
            }

            let pod_ns = tx.get(&pod_record, NAMESPACE_KEY)?;
            if pod_ns.as_deref() != ctr_ns.as_deref().map(str::as_bytes) {
                return Err(Error::NamespaceMismatch {
                    id: ctr_id.clone(),
                    expected: lossy(&pod_ns.unwrap_or_default()),
                    actual: ctr_ns.clone().unwrap_or_default(),
                });
            }

            pod_members = Some(members);
        }

        // The ID and name must be unused by any entity of any kind.
        if tx.get(&ids, ctr_id.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "ID",
                value: ctr_id,
            });
        }
        if tx.get(&names, ctr_name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "name",
                value: ctr_name,
            });
        }

        tx.put(&ids, ctr_id.as_bytes(), ctr_name.as_bytes())?;
        tx.put(&names, ctr_name.as_bytes(), ctr_id.as_bytes())?;
        if let Some(ns) = &ctr_ns {
            tx.put(&ns_registry, ctr_id.as_bytes(), ns.as_bytes())?;
        }
        tx.put(&all_ctrs, ctr_id.as_bytes(), ctr_name.as_bytes())?;

        let record = ctrs.child(ctr_id.as_bytes());
        tx.create_bucket(&record)?;
        tx.put(&record, CONFIG_KEY, &config_json)?;
        tx.put(&record, STATE_KEY, &state_json)?;
        if let Some(ns) = &ctr_ns {
            tx.put(&record, NAMESPACE_KEY, ns.as_bytes())?;
        }
        if let Some(pod_id) = &pod_id {
            tx.put(&record, POD_ID_KEY, pod_id.as_bytes())?;
        }
        if let Some(path) = &net_ns_path {
            tx.put(&record, NETNS_KEY, path.as_bytes())?;
        }
        tx.create_bucket(&record.child(DEPENDENCIES_BUCKET))?;

        // Record this container as a reverse edge on each dependency.
        for dep in &ctr.config.dependencies {
            let dep_record = ctrs.child(dep.as_bytes());
            if !tx.bucket_exists(&dep_record)? {
                return Err(Error::NoSuchContainer(dep.clone()));
            }

            let dep_pod = tx.get(&dep_record, POD_ID_KEY)?;
            match &pod_id {
                Some(pod_id) => {
                    // A pod member may only depend on members of its pod.
                    match dep_pod {
                        None => {
                            return Err(Error::InvalidArgument(format!(
                                "container {ctr_id} depends on container {dep} which is not in pod {pod_id}"
                            )));
                        }
                        Some(dep_pod) if dep_pod != pod_id.as_bytes() => {
                            return Err(Error::InvalidArgument(format!(
                                "container {ctr_id} depends on container {dep} which is in a different pod ({})",
                                lossy(&dep_pod)
                            )));
                        }
                        Some(_) => {}
                    }
                }
                None => {
                    // A podless container may not depend on pod members.
                    if dep_pod.is_some() {
                        return Err(Error::InvalidArgument(format!(
                            "container {ctr_id} depends on container {dep} which is in a pod - containers not in pods cannot depend on containers in pods"
                        )));
                    }
                }
            }

            let dep_ns = tx.get(&dep_record, NAMESPACE_KEY)?;
            if dep_ns.as_deref() != ctr_ns.as_deref().map(str::as_bytes) {
                return Err(Error::NamespaceMismatch {
                    id: dep.clone(),
                    expected: ctr_ns.clone().unwrap_or_default(),
                    actual: lossy(&dep_ns.unwrap_or_default()),
                });
            }

            let dep_deps = dep_record.child(DEPENDENCIES_BUCKET);
            if !tx.bucket_exists(&dep_deps)? {
                return Err(Error::Internal(format!(
                    "container {dep} does not have a dependencies bucket"
                )));
            }
            tx.put(&dep_deps, ctr_id.as_bytes(), ctr_name.as_bytes())?;
        }

        // Enter the container into its pod's membership list.
        if let Some(members) = &pod_members {
            tx.put(members, ctr_id.as_bytes(), ctr_name.as_bytes())?;
        }

        // Record a back-reference on each named volume. Re-adding an
        // existing back-reference is a no-op.
        for vol in &ctr.config.named_volumes {
            let vol_record = vols.child(vol.name.as_bytes());
            if !tx.bucket_exists(&vol_record)? {
                return Err(Error::NoSuchVolume(vol.name.clone()));
            }

            let backrefs = vol_record.child(VOL_DEPENDENCIES_BUCKET);
            if !tx.bucket_exists(&backrefs)? {
                return Err(Error::Internal(format!(
                    "volume {} does not have a dependencies bucket",
                    vol.name
                )));
            }
            if tx.get(&backrefs, ctr_id.as_bytes())?.is_none() {
                tx.put(&backrefs, ctr_id.as_bytes(), ctr_id.as_bytes())?;
            }
        }

        tx.commit()?;

        ctr.bind(lock, oci_runtime);
        ctr.set_valid(true);
        debug!("added container {} ({})", ctr.config.id, ctr.config.name);
        Ok(())
    }

    /// Removes a container, optionally as a member of `pod`.
    ///
    /// Fails with [`Error::StillReferenced`] while other containers depend
    /// on this one. Peripheral inconsistencies found along the way (a pod
    /// missing its membership bucket, a neighbour missing its dependencies
    /// bucket, a volume already gone) are logged and skipped so that the
    /// container can always be removed.
    pub fn remove_container(&self, ctr: &mut Container, pod: Option<&mut Pod>) -> Result<()> {
        let ctr_id = ctr.config.id.clone();
        let ctr_name = ctr.config.name.clone();
        let pod_id = pod.as_ref().map(|p| p.config.id.clone());
        let pod_ns = pod.as_ref().map(|p| p.config.namespace.clone());

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;

        let ids = schema::id_registry(&tx)?;
        let names = schema::name_registry(&tx)?;
        let ns_registry = schema::ns_registry(&tx)?;
        let ctrs = schema::ctr_bucket(&tx)?;
        let all_ctrs = schema::all_ctrs_bucket(&tx)?;
        let vols = schema::vol_bucket(&tx)?;

        // The pod, when supplied, must exist.
        let mut pod_record = None;
        if let Some(pod) = pod {
            let pods = schema::pod_bucket(&tx)?;
            let record = pods.child(pod.config.id.as_bytes());
            if !tx.bucket_exists(&record)? {
                pod.set_valid(false);
                return Err(Error::NoSuchPod(pod.config.id.clone()));
            }
            pod_record = Some(record);
        }

        // So must the container.
        let record = ctrs.child(ctr_id.as_bytes());
        if !tx.bucket_exists(&record)? {
            ctr.set_valid(false);
            return Err(Error::NoSuchContainer(ctr_id));
        }

        self.check_namespace(&ctr_id, &ctr.config.namespace)?;
        if let (Some(pod_id), Some(pod_ns)) = (&pod_id, &pod_ns) {
            self.check_namespace(pod_id, pod_ns)?;
        }

        // Drop the container from its pod's membership list.
        if let Some(pod_record) = &pod_record {
            let members = pod_record.child(CONTAINERS_BUCKET);
            if !tx.bucket_exists(&members)? {
                // Malformed pod. The container removal still has to
                // complete, or the store could never be cleaned up.
                error!(
                    "pod {} is malformed in the database: missing containers bucket",
                    pod_id.as_deref().unwrap_or_default()
                );
            } else {
                if tx.get(&members, ctr_id.as_bytes())?.is_none() {
                    return Err(Error::NoSuchContainer(ctr_id));
                }
                tx.delete(&members, ctr_id.as_bytes())?;
            }
        }

        // Containers that other containers depend on cannot be removed.
        let deps = record.child(DEPENDENCIES_BUCKET);
        if !tx.bucket_exists(&deps)? {
            return Err(Error::Internal(format!(
                "container {ctr_id} does not have a dependencies bucket"
            )));
        }
        let dependents: Vec<String> = tx
            .entries(&deps)?
            .into_iter()
            .map(|(dep_id, _)| lossy(&dep_id))
            .collect();
        if !dependents.is_empty() {
            return Err(Error::StillReferenced {
                id: ctr_id,
                dependents,
            });
        }

        tx.delete_bucket(&record)?;
        tx.delete(&ids, ctr_id.as_bytes())?;
        tx.delete(&names, ctr_name.as_bytes())?;
        tx.delete(&ns_registry, ctr_id.as_bytes())?;
        tx.delete(&all_ctrs, ctr_id.as_bytes())?;

        // Remove our reverse edge from each container we depended on.
        for dep in &ctr.config.dependencies {
            let dep_record = ctrs.child(dep.as_bytes());
            if !tx.bucket_exists(&dep_record)? {
                // The dependency is gone. The record being removed was
                // inconsistent, and it is on its way out.
                continue;
            }
            let dep_deps = dep_record.child(DEPENDENCIES_BUCKET);
            if !tx.bucket_exists(&dep_deps)? {
                error!("container {dep} is missing its dependencies bucket in the database");
                continue;
            }
            tx.delete(&dep_deps, ctr_id.as_bytes())?;
        }

        // Drop our back-reference from each named volume that still exists.
        for vol in &ctr.config.named_volumes {
            let vol_record = vols.child(vol.name.as_bytes());
            if !tx.bucket_exists(&vol_record)? {
                // Volume already removed.
                continue;
            }
            let backrefs = vol_record.child(VOL_DEPENDENCIES_BUCKET);
            if !tx.bucket_exists(&backrefs)? {
                error!(
                    "volume {} is missing its dependencies bucket in the database",
                    vol.name
                );
                continue;
            }
            if tx.get(&backrefs, ctr_id.as_bytes())?.is_some() {
                tx.delete(&backrefs, ctr_id.as_bytes())?;
            }
        }

        tx.commit()?;

        ctr.set_valid(false);
        debug!("removed container {} ({})", ctr.config.id, ctr.config.name);
        Ok(())
    }
}
