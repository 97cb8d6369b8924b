use std::sync::Arc;

use tracing::info;

use self::engine::in_memory::InMemoryStoreEngine;
use self::engine::sled_engine::SledStoreEngine;
use self::engine::StoreEngine;
use self::error::StoreError;

pub mod config;
pub mod engine;
pub mod error;
pub mod peerbook;

/// Which on-disk (or off-disk) backend a [`Store`] is wired to.
#[derive(Debug, Clone, Copy)]
pub enum EngineType {
    InMemory,
    Sled,
}

/// A thin, byte-blob key-value handle shared by the RLPx/SSB layers for
/// whatever they need to persist: node identity files, the peer book,
/// protocol config. Not a chain database.
#[derive(Debug, Clone)]
pub struct Store {
    engine: Arc<dyn StoreEngine>,
}

impl Store {
    pub fn new(engine_type: EngineType, path: &str) -> Result<Self, StoreError> {
        info!("Starting storage engine ({engine_type:?})");
        let engine: Arc<dyn StoreEngine> = match engine_type {
            EngineType::InMemory => Arc::new(InMemoryStoreEngine::new()),
            EngineType::Sled => Arc::new(SledStoreEngine::open(path)?),
        };
        Ok(Self { engine })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.engine.get(key)
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.engine.put(key, value)
    }

    pub fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.engine.remove(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.engine.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_round_trips() {
        let store = Store::new(EngineType::InMemory, "").unwrap();
        store.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.contains(b"k").unwrap());
        store.remove(b"k").unwrap();
        assert!(!store.contains(b"k").unwrap());
    }
}
