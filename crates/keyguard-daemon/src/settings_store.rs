//! File-backed settings store
//!
//! Settings live in one JSON object keyed by setting name. Writes go to a
//! temporary file that is renamed over the original, so readers never see a
//! half-written file. Policy key changes are broadcast to subscribers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use keyguard_core::{
    Error as CoreError, LockPolicy, PairedDevice, SettingChange, SettingKey, SettingValue,
};

use crate::adapters::SettingsStore;
use crate::error::{DaemonError, Result};

/// JSON file settings store
pub struct FileSettingsStore {
    path: PathBuf,

    /// In-memory copy of the file
    values: Mutex<BTreeMap<SettingKey, SettingValue>>,

    /// Policy change broadcast
    change_tx: broadcast::Sender<SettingChange>,
}

impl FileSettingsStore {
    /// Open the store at `path`, creating an empty one if missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| unavailable(&path, e))?;
            parse_entries(&content).map_err(|e| unavailable(&path, e))?
        } else {
            info!("Creating settings store at {:?}", path);
            let values = BTreeMap::new();
            persist(&path, &values)?;
            values
        };

        let (change_tx, _) = broadcast::channel(64);

        Ok(Self {
            path,
            values: Mutex::new(values),
            change_tx,
        })
    }

    /// Subscribe to policy key changes
    pub fn subscribe(&self) -> broadcast::Receiver<SettingChange> {
        self.change_tx.subscribe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored entries
    pub fn entries(&self) -> Result<BTreeMap<SettingKey, SettingValue>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<SettingKey, SettingValue>>> {
        self.values
            .lock()
            .map_err(|_| unavailable(&self.path, "cache poisoned"))
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: SettingKey) -> Result<Option<SettingValue>> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn set(&self, key: SettingKey, value: SettingValue) -> Result<()> {
        // Reject malformed policy values before they reach the file
        let change = SettingChange::from_entry(key, &value)?;

        {
            let mut values = self.lock()?;
            if values.get(&key) == Some(&value) {
                return Ok(());
            }

            let mut updated = values.clone();
            updated.insert(key, value);
            persist(&self.path, &updated)?;
            *values = updated;
        }

        if let Some(change) = change {
            debug!("Setting changed: {:?}", change);
            // No subscribers is fine
            let _ = self.change_tx.send(change);
        }

        Ok(())
    }
}

fn unavailable(path: &Path, reason: impl fmt::Display) -> DaemonError {
    CoreError::SettingsStoreUnavailable(format!("{:?}: {}", path, reason)).into()
}

fn parse_entries(content: &str) -> Result<BTreeMap<SettingKey, SettingValue>> {
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let raw: BTreeMap<String, SettingValue> = serde_json::from_str(content)?;
    let mut values = BTreeMap::new();

    for (name, value) in raw {
        match SettingKey::from_str(&name) {
            Ok(key) => {
                values.insert(key, value);
            }
            Err(_) => warn!("Ignoring unknown setting {:?}", name),
        }
    }

    Ok(values)
}

fn persist(path: &Path, values: &BTreeMap<SettingKey, SettingValue>) -> Result<()> {
    let raw: BTreeMap<&str, &SettingValue> =
        values.iter().map(|(key, value)| (key.as_str(), value)).collect();
    let content = serde_json::to_string_pretty(&raw)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)
        .and_then(|()| std::fs::rename(&tmp, path))
        .map_err(|e| unavailable(path, e))
}

/// Read the lock policy and paired device from `store`
///
/// Missing keys keep their defaults; malformed entries are logged and
/// skipped. Only a store that cannot be read is an error.
pub fn read_policy(store: &dyn SettingsStore) -> Result<(LockPolicy, PairedDevice)> {
    let mut policy = LockPolicy::default();
    let mut device = PairedDevice::default();

    for key in SettingKey::ALL {
        let Some(value) = store.get(key)? else {
            continue;
        };

        let change = match SettingChange::from_entry(key, &value) {
            Ok(Some(change)) => change,
            Ok(None) => continue,
            Err(e) => {
                warn!("Ignoring stored setting: {}", e);
                continue;
            }
        };

        match change {
            SettingChange::PairedDeviceId(id) => device.id = id,
            SettingChange::OutOfRangeThreshold(dbm) => device.out_of_range_dbm = dbm,
            SettingChange::InRangeThreshold(dbm) => device.in_range_dbm = dbm,
            change => {
                policy.apply(&change);
            }
        }
    }

    if let Err(e) = device.validate() {
        warn!("Stored proximity thresholds rejected: {}", e);
        device = PairedDevice {
            id: device.id,
            ..PairedDevice::default()
        };
    }

    Ok((policy, device))
}
