//! Durable key/value storage that survives restarts (the browser's
//! `localStorage` equivalent).
//!
//! Holds the stable user identifier, disclosed contact fields, the click id
//! derived from `fbclid`, and per-path page-view locks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pixeltrack_core::ContactInfo;

use crate::error::StoreError;

pub const EXTERNAL_ID_KEY: &str = "pixeltrack_external_id";
pub const CLICK_ID_KEY: &str = "pixeltrack_fbc";
const CONTACT_PREFIX: &str = "pixeltrack_contact_";
const PAGE_VIEW_LOCK_PREFIX: &str = "pixeltrack_pv_lock:";

/// String-valued persistent storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the removal cannot be persisted.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so a crash never leaves a half-written store behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens `path`, treating a missing file as an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, or
    /// [`StoreError::Corrupt`] if it is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = serde_json::to_string_pretty(values).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = values.clone();
        apply(&mut next);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

/// Returns the stable user identifier, creating and persisting one on first
/// use.
///
/// A store that cannot persist still yields a usable identifier for this
/// process; the failure is logged.
pub fn stable_identifier(store: &dyn KeyValueStore) -> String {
    if let Some(existing) = store.get(EXTERNAL_ID_KEY).filter(|v| !v.is_empty()) {
        return existing;
    }
    let fresh = format!("ext_{}", uuid::Uuid::new_v4().simple());
    if let Err(err) = store.set(EXTERNAL_ID_KEY, &fresh) {
        tracing::warn!(error = %err, "could not persist stable identifier");
    }
    fresh
}

const CONTACT_FIELDS: [&str; 7] = [
    "email",
    "phone",
    "city",
    "country",
    "first_name",
    "last_name",
    "login_id",
];

/// Reads persisted contact fields.
pub fn load_contact(store: &dyn KeyValueStore) -> ContactInfo {
    let get = |field: &str| {
        store
            .get(&format!("{CONTACT_PREFIX}{field}"))
            .filter(|v| !v.is_empty())
    };
    ContactInfo {
        email: get("email"),
        phone: get("phone"),
        city: get("city"),
        country: get("country"),
        first_name: get("first_name"),
        last_name: get("last_name"),
        login_id: get("login_id"),
    }
}

/// Persists every set field of `contact`; unset fields are left as stored.
///
/// # Errors
///
/// Returns the first [`StoreError`] encountered.
pub fn save_contact(store: &dyn KeyValueStore, contact: &ContactInfo) -> Result<(), StoreError> {
    let values = [
        &contact.email,
        &contact.phone,
        &contact.city,
        &contact.country,
        &contact.first_name,
        &contact.last_name,
        &contact.login_id,
    ];
    for (field, value) in CONTACT_FIELDS.iter().zip(values) {
        if let Some(value) = value {
            store.set(&format!("{CONTACT_PREFIX}{field}"), value)?;
        }
    }
    Ok(())
}

#[must_use]
pub fn page_view_lock_key(path: &str) -> String {
    format!("{PAGE_VIEW_LOCK_PREFIX}{path}")
}
