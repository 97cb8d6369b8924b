use std::collections::HashMap;
use std::sync::RwLock;

use crate::engine::StoreEngine;
use crate::error::StoreError;

/// An `RwLock<HashMap>`-backed engine. Used for tests and for nodes that
/// don't need state to survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryStoreEngine {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStoreEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreEngine for InMemoryStoreEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))?
            .get(key)
            .cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))?
            .insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let engine = InMemoryStoreEngine::new();
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn remove_clears_key() {
        let engine = InMemoryStoreEngine::new();
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.remove(b"k").unwrap();
        assert_eq!(engine.get(b"k").unwrap(), None);
    }

    #[test]
    fn contains_reflects_presence() {
        let engine = InMemoryStoreEngine::new();
        assert!(!engine.contains(b"k").unwrap());
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert!(engine.contains(b"k").unwrap());
    }
}
