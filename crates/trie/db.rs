pub mod in_memory;

use crate::error::TrieError;

/// Byte-blob storage backing a trie: nodes are addressed and stored by their
/// RLP-encoded bytes, keyed by `NodeHash`. No node is ever removed.
pub trait TrieDB: Send + Sync {
    fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, TrieError>;
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError>;
}
