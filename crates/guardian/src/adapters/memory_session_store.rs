// Rust guideline compliant 2026-10-08

//! In-memory adapter for the `SessionStore` port.
//!
//! Lives as long as the process, like a browser tab's session storage.

use std::cell::RefCell;
use std::collections::HashMap;

use domain::{SessionStore, StoreError};

/// `SessionStore` adapter backed by a `HashMap`. Never fails.
// #[allow] not #[expect]: dead in guardian_sqlite, used in guardian.
#[allow(dead_code, reason = "used by guardian binary; dead in guardian_sqlite")]
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[allow(dead_code, reason = "used by guardian binary; dead in guardian_sqlite")]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.borrow_mut().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut values = self.values.borrow_mut();
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }

    async fn replace(&self, key: &str, value: String, remove: &[&str]) -> Result<(), StoreError> {
        let mut values = self.values.borrow_mut();
        for key in remove {
            values.remove(*key);
        }
        values.insert(key.to_owned(), value);
        Ok(())
    }
}
