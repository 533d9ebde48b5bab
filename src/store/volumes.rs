//! Volume operations.

use tracing::debug;

use crate::constants::{CONFIG_KEY, STATE_KEY, VOL_DEPENDENCIES_BUCKET};
use crate::engine::Tx;
use crate::error::{Error, Result};
use crate::schema;
use crate::store::{Store, lossy};
use crate::volume::Volume;

impl Store {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Hydrates the volume with the given name.
    pub fn volume(&self, name: &str) -> Result<Volume> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let vols = schema::vol_bucket(&tx)?;

        let mut volume = self.volume_from_db(&tx, &vols, name)?;
        self.load_volume_state(&tx, &vols, &mut volume)?;
        Ok(volume)
    }

    /// Hydrates every volume in the store.
    pub fn all_volumes(&self) -> Result<Vec<Volume>> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let all_volumes = schema::all_volumes_bucket(&tx)?;
        let vols = schema::vol_bucket(&tx)?;

        let mut out = Vec::new();
        for (name, _) in tx.entries(&all_volumes)? {
            let name = lossy(&name);
            let mut volume = self.volume_from_db(&tx, &vols, &name)?;
            self.load_volume_state(&tx, &vols, &mut volume)?;
            out.push(volume);
        }
        Ok(out)
    }

    /// IDs of the containers referencing the given volume.
    pub fn volume_in_use(&self, name: &str) -> Result<Vec<String>> {
        let _gate = self.gate.enter();
        let tx = self.engine.begin_read()?;
        let vols = schema::vol_bucket(&tx)?;

        let record = vols.child(name.as_bytes());
        if !tx.bucket_exists(&record)? {
            return Err(Error::NoSuchVolume(name.to_string()));
        }

        let backrefs = record.child(VOL_DEPENDENCIES_BUCKET);
        if !tx.bucket_exists(&backrefs)? {
            return Err(Error::Internal(format!(
                "volume {name} does not have a dependencies bucket"
            )));
        }

        Ok(tx
            .entries(&backrefs)?
            .into_iter()
            .map(|(ctr_id, _)| lossy(&ctr_id))
            .collect())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Registers a volume.
    ///
    /// Volumes are keyed by name; the name is entered into both shared
    /// registries so no container or pod can reuse it as an ID or name.
    pub fn add_volume(&self, volume: &mut Volume) -> Result<()> {
        let config_json = serde_json::to_vec(&volume.config)?;
        let state_json = serde_json::to_vec(&volume.state)?;

        let vol_name = volume.config.name.clone();

        let lock = self
            .runtime
            .lock_manager
            .retrieve_lock(volume.config.lock_id)?;

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;

        let ids = schema::id_registry(&tx)?;
        let names = schema::name_registry(&tx)?;
        let vols = schema::vol_bucket(&tx)?;
        let all_volumes = schema::all_volumes_bucket(&tx)?;

        // The name must be unused by any entity of any kind.
        if tx.get(&ids, vol_name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "ID",
                value: vol_name,
            });
        }
        if tx.get(&names, vol_name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "name",
                value: vol_name,
            });
        }

        tx.put(&ids, vol_name.as_bytes(), vol_name.as_bytes())?;
        tx.put(&names, vol_name.as_bytes(), vol_name.as_bytes())?;
        tx.put(&all_volumes, vol_name.as_bytes(), vol_name.as_bytes())?;

        let record = vols.child(vol_name.as_bytes());
        tx.create_bucket(&record)?;
        tx.put(&record, CONFIG_KEY, &config_json)?;
        tx.put(&record, STATE_KEY, &state_json)?;
        tx.create_bucket(&record.child(VOL_DEPENDENCIES_BUCKET))?;

        tx.commit()?;

        volume.bind(lock);
        volume.set_valid(true);
        debug!("added volume {}", volume.config.name);
        Ok(())
    }

    /// Removes a volume.
    ///
    /// Fails with [`Error::StillReferenced`] while containers still
    /// reference the volume.
    pub fn remove_volume(&self, volume: &mut Volume) -> Result<()> {
        let vol_name = volume.config.name.clone();

        let _gate = self.gate.enter();
        let tx = self.engine.begin_write()?;

        let ids = schema::id_registry(&tx)?;
        let names = schema::name_registry(&tx)?;
        let vols = schema::vol_bucket(&tx)?;
        let all_volumes = schema::all_volumes_bucket(&tx)?;

        let record = vols.child(vol_name.as_bytes());
        if !tx.bucket_exists(&record)? {
            volume.set_valid(false);
            return Err(Error::NoSuchVolume(vol_name));
        }

        // Volumes referenced by containers cannot be removed.
        let backrefs = record.child(VOL_DEPENDENCIES_BUCKET);
        if tx.bucket_exists(&backrefs)? {
            let users: Vec<String> = tx
                .entries(&backrefs)?
                .into_iter()
                .map(|(ctr_id, _)| lossy(&ctr_id))
                .collect();
            if !users.is_empty() {
                return Err(Error::StillReferenced {
                    id: vol_name,
                    dependents: users,
                });
            }
        }

        tx.delete_bucket(&record)?;
        tx.delete(&ids, vol_name.as_bytes())?;
        tx.delete(&names, vol_name.as_bytes())?;
        tx.delete(&all_volumes, vol_name.as_bytes())?;

        tx.commit()?;

        volume.set_valid(false);
        debug!("removed volume {}", volume.config.name);
        Ok(())
    }
}
