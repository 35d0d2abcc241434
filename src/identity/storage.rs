//! Per-browser-context key/value storage and the registration cache built on it.
//!
//! Each browser context owns one [`ContextStorage`]. Nothing here is global:
//! callers pass the storage (or a view over it) to whatever needs it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::error::ValidationError;
use super::model::PendingRegistration;

/// Key under which the pending registration blob is held.
pub const SIGNUP_DATA_KEY: &str = "signupData";

pub trait ContextStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);

    /// Write several keys under one lock so readers never see a partial update.
    fn set_many(&self, entries: Vec<(&str, String)>);

    /// Remove several keys under one lock.
    fn remove_many(&self, keys: &[&str]);
}

#[derive(Debug, Default)]
pub struct MemoryContextStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryContextStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContextStorage for MemoryContextStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }

    fn set_many(&self, entries: Vec<(&str, String)>) {
        let mut guard = self.entries();
        for (key, value) in entries {
            guard.insert(key.to_string(), value);
        }
    }

    fn remove_many(&self, keys: &[&str]) {
        let mut guard = self.entries();
        for key in keys {
            guard.remove(*key);
        }
    }
}

/// Holds in-progress signup data between the signup form and code verification.
#[derive(Clone, Copy)]
pub struct RegistrationCache<'a> {
    storage: &'a dyn ContextStorage,
}

impl<'a> RegistrationCache<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn ContextStorage) -> Self {
        Self { storage }
    }

    /// Store the pending registration, replacing any previous one.
    ///
    /// # Errors
    /// Returns `CorruptPending` if the registration cannot be serialized.
    pub fn hold(&self, pending: &PendingRegistration) -> Result<(), ValidationError> {
        let blob = serde_json::to_string(pending).map_err(|_| ValidationError::CorruptPending)?;
        self.storage.set(SIGNUP_DATA_KEY, blob);
        Ok(())
    }

    /// # Errors
    /// `MissingPending` when nothing is held, `CorruptPending` when the blob does not parse.
    pub fn load(&self) -> Result<PendingRegistration, ValidationError> {
        let blob = self
            .storage
            .get(SIGNUP_DATA_KEY)
            .ok_or(ValidationError::MissingPending)?;
        serde_json::from_str(&blob).map_err(|_| ValidationError::CorruptPending)
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.load().is_ok()
    }

    pub fn clear(&self) {
        self.storage.remove(SIGNUP_DATA_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::model::Role;

    fn pending() -> PendingRegistration {
        PendingRegistration {
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            first_name: "Ada".to_string(),
            middle_name: Some("King".to_string()),
            last_name: "Lovelace".to_string(),
            role: Role::Provider,
            session_id: "s1".to_string(),
            decoy: false,
        }
    }

    #[test]
    fn hold_load_clear() -> Result<(), ValidationError> {
        let storage = MemoryContextStorage::new();
        let cache = RegistrationCache::new(&storage);
        assert_eq!(cache.load(), Err(ValidationError::MissingPending));

        cache.hold(&pending())?;
        assert!(cache.has_pending());
        assert_eq!(cache.load()?, pending());
        assert!(storage.get(SIGNUP_DATA_KEY).is_some());

        cache.clear();
        assert!(!cache.has_pending());
        Ok(())
    }

    #[test]
    fn unreadable_blob_is_corrupt() {
        let storage = MemoryContextStorage::new();
        storage.set(SIGNUP_DATA_KEY, "{not json".to_string());
        let cache = RegistrationCache::new(&storage);
        assert_eq!(cache.load(), Err(ValidationError::CorruptPending));
        assert!(!cache.has_pending());
    }

    #[test]
    fn set_many_and_remove_many() {
        let storage = MemoryContextStorage::new();
        storage.set_many(vec![("a", "1".to_string()), ("b", "2".to_string())]);
        assert_eq!(storage.get("a").as_deref(), Some("1"));
        assert_eq!(storage.get("b").as_deref(), Some("2"));
        storage.remove_many(&["a", "b"]);
        assert_eq!(storage.get("a"), None);
        assert_eq!(storage.get("b"), None);
    }
}
