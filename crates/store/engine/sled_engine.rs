use std::path::Path;

use crate::engine::StoreEngine;
use crate::error::StoreError;

/// A `sled`-backed engine. Keeps state across restarts in a single
/// on-disk tree, suitable for a node's identity file cache or a persisted
/// peer book.
#[derive(Debug, Clone)]
pub struct SledStoreEngine {
    db: sled::Db,
}

impl SledStoreEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

impl StoreEngine for SledStoreEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .db
            .get(key)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(|ivec| ivec.to_vec()))
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.db
            .insert(key, value)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db
            .remove(key)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile_dir();
        let engine = SledStoreEngine::open(&dir).unwrap();
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("p2pkit-store-test-{:x}", std::process::id()));
        dir
    }
}
