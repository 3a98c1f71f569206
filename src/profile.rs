//! Named device profiles.
//!
//! A profile is a registry snapshot stored as JSON text under its own key
//! in the `profiles` storage namespace:
//!
//! ```text
//! {
//!   "(1,2)": {"pins": [1, 2], "state": "straight", "name": "RelayTrainSwitch"},
//!   "(6,)":  {"pins": [6],    "state": null,       "name": "StepperMotor", "steps": 12},
//!   "order": ["(1,2)", "(6,)"]
//! }
//! ```
//!
//! The entries are a flat map, so `order` carries the insertion order.
//! The favourite pointer lives in the same namespace under a reserved key
//! and holds the bare profile name.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::device::{DeviceRecord, PinSet};
use crate::error::ProfileError;

pub const PROFILE_NAMESPACE: &str = "profiles";

/// Key of the favourite pointer.  Never a valid profile name.
pub const FAVORITE_KEY: &str = "__favorite__";

/// Longest name the storage backend accepts as a key.
pub const MAX_NAME_LEN: usize = 15;

/// Largest stored profile document.
pub const MAX_PROFILE_LEN: usize = 16 * 1024;

/// Stored form of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub order: Vec<String>,
    #[serde(flatten)]
    pub entries: BTreeMap<String, DeviceRecord>,
}

impl ProfileDocument {
    pub fn from_records(records: &[DeviceRecord]) -> Self {
        let mut order = Vec::with_capacity(records.len());
        let mut entries = BTreeMap::new();
        for record in records {
            let key = record.pins.key().as_str().to_owned();
            order.push(key.clone());
            entries.insert(key, record.clone());
        }
        Self { order, entries }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ProfileError> {
        serde_json::from_slice(bytes).map_err(|_| ProfileError::Malformed("not a profile document"))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ProfileError> {
        serde_json::to_vec(self).map_err(|_| ProfileError::Malformed("unserializable profile"))
    }

    /// Records in saved order, after checking the document is consistent:
    /// every ordered key is present once and names its own pins, and no
    /// two entries share a pin.
    pub fn records(&self) -> Result<Vec<DeviceRecord>, ProfileError> {
        let mut seen = BTreeSet::new();
        let mut used = 0u64;
        let mut records = Vec::with_capacity(self.order.len());
        for key in &self.order {
            if !seen.insert(key.as_str()) {
                return Err(ProfileError::Malformed("duplicate key in order"));
            }
            let record = self
                .entries
                .get(key)
                .ok_or(ProfileError::Malformed("order names a missing entry"))?;
            let pins = PinSet::parse_key(key).map_err(|_| ProfileError::Malformed("bad pin key"))?;
            if pins != record.pins {
                return Err(ProfileError::Malformed("entry key does not match its pins"));
            }
            if used & pins.mask() != 0 {
                return Err(ProfileError::Malformed("pin used by two entries"));
            }
            used |= pins.mask();
            records.push(record.clone());
        }
        if self.entries.len() > records.len() {
            debug!("Profile: {} unordered entries ignored", self.entries.len() - records.len());
        }
        Ok(records)
    }
}

/// Response shape of a profile listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileListing {
    pub profiles: Vec<String>,
    /// The favourite as a one-element list, or empty.
    pub favorite_profile: Vec<String>,
}

/// Trim and check a profile name.
pub fn validate_name(name: &str) -> Result<&str, ProfileError> {
    let name = name.trim();
    if name == FAVORITE_KEY {
        return Err(ProfileError::ProtectedName);
    }
    let charset_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '));
    if name.is_empty() || name.len() > MAX_NAME_LEN || !charset_ok {
        return Err(ProfileError::InvalidName);
    }
    Ok(name)
}

pub struct ProfileStore<S: StoragePort> {
    storage: S,
}

impl<S: StoragePort> ProfileStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Store `records` as profile `name`, replacing any previous one.
    pub fn save(&mut self, name: &str, records: &[DeviceRecord]) -> Result<(), ProfileError> {
        let name = validate_name(name)?;
        let bytes = ProfileDocument::from_records(records).to_json()?;
        if bytes.len() > MAX_PROFILE_LEN {
            return Err(ProfileError::Io(StorageError::Full));
        }
        self.storage.write(PROFILE_NAMESPACE, name, &bytes)?;
        info!("Profile: saved '{}' ({} devices, {} bytes)", name, records.len(), bytes.len());
        Ok(())
    }

    /// Read and validate profile `name`.
    pub fn load(&self, name: &str) -> Result<Vec<DeviceRecord>, ProfileError> {
        let name = validate_name(name)?;
        let mut buf = vec![0u8; MAX_PROFILE_LEN];
        let len = self
            .storage
            .read(PROFILE_NAMESPACE, name, &mut buf)
            .map_err(|e| match e {
                StorageError::NotFound => ProfileError::NotFound(name.into()),
                e => ProfileError::Io(e),
            })?;
        let records = ProfileDocument::parse(&buf[..len])?.records()?;
        debug!("Profile: read '{}' ({} devices)", name, records.len());
        Ok(records)
    }

    /// Delete profile `name`, clearing the favourite if it pointed there.
    pub fn remove(&mut self, name: &str) -> Result<(), ProfileError> {
        let name = validate_name(name)?;
        if !self.storage.exists(PROFILE_NAMESPACE, name) {
            return Err(ProfileError::NotFound(name.into()));
        }
        self.storage.delete(PROFILE_NAMESPACE, name)?;
        if self.favorite()?.as_deref() == Some(name) {
            self.clear_favorite()?;
        }
        info!("Profile: removed '{}'", name);
        Ok(())
    }

    /// Sorted profile names plus the favourite.
    pub fn list(&self) -> Result<ProfileListing, ProfileError> {
        let mut profiles: Vec<String> = self
            .storage
            .keys(PROFILE_NAMESPACE)?
            .into_iter()
            .filter(|k| k != FAVORITE_KEY)
            .collect();
        profiles.sort();
        let favorite_profile = self.favorite()?.into_iter().collect();
        Ok(ProfileListing {
            profiles,
            favorite_profile,
        })
    }

    pub fn favorite(&self) -> Result<Option<String>, ProfileError> {
        let mut buf = [0u8; MAX_NAME_LEN];
        match self.storage.read(PROFILE_NAMESPACE, FAVORITE_KEY, &mut buf) {
            Ok(len) => match core::str::from_utf8(&buf[..len]) {
                Ok(name) => Ok(Some(name.to_owned())),
                Err(_) => {
                    warn!("Profile: favourite pointer is not UTF-8, ignoring it");
                    Ok(None)
                }
            },
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Point the favourite at `name`.  The profile need not exist yet.
    pub fn set_favorite(&mut self, name: &str) -> Result<(), ProfileError> {
        let name = validate_name(name)?;
        self.storage.write(PROFILE_NAMESPACE, FAVORITE_KEY, name.as_bytes())?;
        info!("Profile: favourite set to '{}'", name);
        Ok(())
    }

    pub fn clear_favorite(&mut self) -> Result<(), ProfileError> {
        self.storage.delete(PROFILE_NAMESPACE, FAVORITE_KEY)?;
        info!("Profile: favourite cleared");
        Ok(())
    }

    /// The favourite's records, if one is set and stored.
    pub fn load_favorite(&self) -> Result<Option<(String, Vec<DeviceRecord>)>, ProfileError> {
        let Some(name) = self.favorite()? else {
            return Ok(None);
        };
        if !self.storage.exists(PROFILE_NAMESPACE, &name) {
            warn!("Profile: favourite '{}' is not stored", name);
            return Ok(None);
        }
        let records = self.load(&name)?;
        Ok(Some((name, records)))
    }
}
