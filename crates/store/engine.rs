pub mod in_memory;
pub mod sled_engine;

use std::fmt::Debug;

use crate::error::StoreError;

/// Byte-blob key-value storage. This is the whole contract: no chain state,
/// no transaction pool, no block validation — just get/put/remove/contains
/// over opaque keys and values, usable by the RLPx/SSB layers (peer book,
/// node key persistence) and by `p2pkit-trie`'s `TrieDB` adapters.
pub trait StoreEngine: Debug + Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;
    fn remove(&self, key: &[u8]) -> Result<(), StoreError>;
    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}
