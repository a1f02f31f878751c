//! Client-side session storage.
//!
//! A narrow string key/value interface, the shape of a browser's session
//! storage, so the wallet flow can run against the real thing or an
//! in-memory map in tests.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use serde::{Serialize, de::DeserializeOwned};

/// Key under which the login session is stored.
pub const SESSION_KEY: &str = "trailmint.login_session";

/// Key under which the identity token is stored.
pub const TOKEN_KEY: &str = "trailmint.id_token";

/// Storage failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store is unavailable.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("session store value for `{key}` is invalid: {reason}")]
    Codec {
        /// The key involved.
        key: String,
        /// Decoder message.
        reason: String,
    },
}

/// A string key/value store scoped to one client session.
pub trait SessionStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Delete a value; absent keys are not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Delete everything.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Read and JSON-decode a value.
pub fn load<T: DeserializeOwned>(
    store: &(impl SessionStore + ?Sized),
    key: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(key)?
        .map(|text| {
            serde_json::from_str(&text).map_err(|err| StoreError::Codec {
                key: key.to_owned(),
                reason: err.to_string(),
            })
        })
        .transpose()
}

/// JSON-encode and write a value.
pub fn save<T: Serialize>(
    store: &(impl SessionStore + ?Sized),
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let text = serde_json::to_string(value).map_err(|err| StoreError::Codec {
        key: key.to_owned(),
        reason: err.to_string(),
    })?;
    store.set(key, text)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// A poisoned map is still a consistent map: every operation is a single
// insert or remove.
impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_clear() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1".to_owned()).unwrap();
        store.set("b", "2".to_owned()).unwrap();
        store.set("a", "3".to_owned()).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("3"));

        store.remove("a").unwrap();
        store.remove("missing").unwrap();
        assert_eq!(store.len(), 1);

        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn json_helpers() {
        let store = MemoryStore::new();
        save(&store, "n", &42u64).unwrap();
        assert_eq!(load::<u64>(&store, "n").unwrap(), Some(42));
        assert_eq!(load::<u64>(&store, "absent").unwrap(), None);

        store.set("n", "not json".to_owned()).unwrap();
        assert!(matches!(
            load::<u64>(&store, "n"),
            Err(StoreError::Codec { .. })
        ));
    }
}
