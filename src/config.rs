//! Runtime configuration and its validation against the store.
//!
//! A store created under one storage driver or root directory must not be
//! silently reused under another: on-disk container state would corrupt.
//! At attach, a small set of runtime path/identity fields is compared
//! against the values persisted in the `runtime-config` bucket. Fields not
//! seen before are persisted; fields that disagree fail the attach.

use std::path::PathBuf;

use crate::constants::{
    GRAPH_DRIVER_KEY, GRAPH_ROOT_KEY, OS_KEY, RUN_ROOT_KEY, STATIC_DIR_KEY, TMP_DIR_KEY,
    VOLUME_PATH_KEY,
};
use crate::engine::{Engine, Tx};
use crate::error::{Error, Result};
use crate::schema;

// =============================================================================
// Configuration Types
// =============================================================================

/// Path and identity configuration of the runtime attaching to a store.
///
/// Empty strings mean "use the default"; the defaults come from
/// [`StorageDefaults`] where one is declared.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Directory for persistent runtime state.
    pub static_dir: String,
    /// Directory for temporary runtime files.
    pub tmp_dir: String,
    /// Directory volumes are created under.
    pub volume_path: String,
    /// Storage library configuration.
    pub storage: StorageConfig,
}

/// Storage library configuration fields validated against the store.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Runtime (tmpfs) storage root.
    pub run_root: String,
    /// Persistent image/layer storage root.
    pub graph_root: String,
    /// Storage graph driver name (e.g. "overlay").
    pub graph_driver: String,
}

/// Default storage options, as provided by the storage library.
///
/// These are the values an empty [`StorageConfig`] field resolves to, and
/// what a persisted value is compared against when either side is empty.
#[derive(Debug, Clone, Default)]
pub struct StorageDefaults {
    pub run_root: String,
    pub graph_root: String,
    pub graph_driver: String,
}

impl StorageDefaults {
    /// Detects per-user default storage options.
    pub fn detect() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("podstore");
        let run_dir = dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("podstore");

        Self {
            run_root: run_dir.to_string_lossy().into_owned(),
            graph_root: data_dir.join("storage").to_string_lossy().into_owned(),
            graph_driver: "overlay".to_string(),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// One runtime configuration field to be validated against the store.
struct ConfigField {
    /// Field name, used in error messages only.
    name: &'static str,
    /// Key in the `runtime-config` bucket.
    key: &'static [u8],
    /// Value the attaching runtime is configured with.
    runtime_value: String,
    /// Declared default for the field, when it has one.
    default_value: String,
}

/// Checks the runtime's configuration against previously persisted values,
/// persisting any fields the store has not seen yet.
pub(crate) fn check_runtime_config(
    engine: &Engine,
    config: &RuntimeConfig,
    defaults: &StorageDefaults,
) -> Result<()> {
    let os = std::env::consts::OS.to_string();
    let checks = [
        ConfigField {
            name: "OS",
            key: OS_KEY,
            runtime_value: os.clone(),
            default_value: os,
        },
        ConfigField {
            name: "static directory",
            key: STATIC_DIR_KEY,
            runtime_value: config.static_dir.clone(),
            default_value: String::new(),
        },
        ConfigField {
            name: "temporary directory",
            key: TMP_DIR_KEY,
            runtime_value: config.tmp_dir.clone(),
            default_value: String::new(),
        },
        ConfigField {
            name: "storage run root",
            key: RUN_ROOT_KEY,
            runtime_value: config.storage.run_root.clone(),
            default_value: defaults.run_root.clone(),
        },
        ConfigField {
            name: "storage graph root",
            key: GRAPH_ROOT_KEY,
            runtime_value: config.storage.graph_root.clone(),
            default_value: defaults.graph_root.clone(),
        },
        ConfigField {
            name: "storage graph driver",
            key: GRAPH_DRIVER_KEY,
            runtime_value: config.storage.graph_driver.clone(),
            default_value: defaults.graph_driver.clone(),
        },
        ConfigField {
            name: "volume path",
            key: VOLUME_PATH_KEY,
            runtime_value: config.volume_path.clone(),
            default_value: String::new(),
        },
    ];

    // Validate read-only first; collect fields the store has never seen.
    let mut missing = Vec::new();
    {
        let tx = engine.begin_read()?;
        let bucket = schema::runtime_config_bucket(&tx)?;
        for check in &checks {
            match tx.get(&bucket, check.key)? {
                None => missing.push(check),
                Some(stored) => validate_field(check, &stored)?,
            }
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    // Populate missing fields.
    let tx = engine.begin_write()?;
    let bucket = schema::runtime_config_bucket(&tx)?;
    for field in missing {
        let value = if field.runtime_value.is_empty() && !field.default_value.is_empty() {
            &field.default_value
        } else {
            &field.runtime_value
        };
        tx.put(&bucket, field.key, value.as_bytes())?;
    }
    tx.commit()
}

/// Compares one stored value against the runtime's configuration.
///
/// Values match when byte-equal. They also match when one side is empty
/// and the other equals the declared default: an empty value means "take
/// the default", and the default may have been materialized on either side.
fn validate_field(check: &ConfigField, stored: &[u8]) -> Result<()> {
    let stored = String::from_utf8_lossy(stored);

    if check.runtime_value != stored {
        if check.runtime_value.is_empty()
            && !check.default_value.is_empty()
            && stored == check.default_value
        {
            return Ok(());
        }

        if stored.is_empty()
            && !check.default_value.is_empty()
            && check.runtime_value == check.default_value
        {
            return Ok(());
        }

        return Err(Error::BadConfig(format!(
            "database {} {:?} does not match our {} {:?}",
            check.name, stored, check.name, check.runtime_value
        )));
    }

    Ok(())
}
