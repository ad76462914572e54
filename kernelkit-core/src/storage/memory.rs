//! In-memory storage backend.
//!
//! Nothing survives the process. Useful for tests and for hosts that opt out of
//! persistence but still want a session registry.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{KeyValueStore, StorageResult};

/// Key/value store held in a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether no key is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn read(&self, key: String) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.values.lock().get(&key).cloned())
    }

    fn write(&self, key: String, value: Vec<u8>) -> StorageResult<()> {
        self.values.lock().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: String) -> StorageResult<()> {
        self.values.lock().remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_delete() {
        let store = InMemoryStore::new();
        assert!(store.read("a".to_string()).expect("read").is_none());

        store.write("a".to_string(), vec![1, 2]).expect("write");
        store.write("a".to_string(), vec![3]).expect("overwrite");
        assert_eq!(store.read("a".to_string()).expect("read"), Some(vec![3]));
        assert_eq!(store.len(), 1);

        store.delete("a".to_string()).expect("delete");
        store.delete("a".to_string()).expect("delete missing key");
        assert!(store.is_empty());
    }
}
