use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::TrieDB;
use crate::error::TrieError;

/// A `TrieDB` backed by a plain in-memory map. Useful for tests and for
/// trie instances that don't need to survive a process restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub fn new(inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>) -> Self {
        Self { inner }
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::DbError("in-memory trie db lock poisoned".to_string()))?
            .get(&key)
            .cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::DbError("in-memory trie db lock poisoned".to_string()))?
            .insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let db = InMemoryTrieDB::new(Arc::new(Mutex::new(HashMap::new())));
        db.put(b"key".to_vec(), b"value".to_vec()).unwrap();
        assert_eq!(db.get(b"key".to_vec()).unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn missing_key_returns_none() {
        let db = InMemoryTrieDB::new(Arc::new(Mutex::new(HashMap::new())));
        assert_eq!(db.get(b"missing".to_vec()).unwrap(), None);
    }
}
