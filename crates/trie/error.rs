use p2pkit_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error("trie references a node that isn't present in its backing store")]
    InconsistentTree,
    #[error("storage backend error: {0}")]
    DbError(String),
}
