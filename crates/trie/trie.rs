pub mod db;
mod error;
mod nibbles;
mod node;
mod node_hash;
mod rlp;
mod state;

use ethereum_types::H256;
use p2pkit_rlp::constants::RLP_NULL;
use nibbles::Nibbles;
use node::{LeafNode, Node};
use node_hash::NodeHash;
use sha3::{Digest, Keccak256};

pub use self::db::{in_memory::InMemoryTrieDB, TrieDB};
pub use self::error::TrieError;

use self::state::TrieState;

use lazy_static::lazy_static;

lazy_static! {
    /// Hash of an empty trie: keccak(RLP_NULL).
    pub static ref EMPTY_TRIE_HASH: H256 = H256::from_slice(
        Keccak256::new()
            .chain_update([RLP_NULL])
            .finalize()
            .as_slice(),
    );
}

/// RLP-encoded trie path
pub type PathRLP = Vec<u8>;
/// RLP-encoded trie value
pub type ValueRLP = Vec<u8>;

/// An in-memory-cached Merkle-Patricia trie supporting get/put/hash only.
/// Proof generation, stateless reconstruction from proof nodes, and
/// iteration are out of scope: this trie is a keyed, hashable value store,
/// not an Ethereum state trie.
pub struct Trie {
    root: Option<NodeHash>,
    pub(crate) state: TrieState,
}

impl Trie {
    /// Creates a new, empty trie over a clean DB.
    pub fn new(db: Box<dyn TrieDB>) -> Self {
        Self {
            state: TrieState::new(db),
            root: None,
        }
    }

    /// Opens a trie over an already-populated DB, rooted at `root`.
    pub fn open(db: Box<dyn TrieDB>, root: H256) -> Self {
        let root = (root != *EMPTY_TRIE_HASH).then_some(root.into());
        Self {
            state: TrieState::new(db),
            root,
        }
    }

    pub fn get(&self, path: &PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        if let Some(root) = &self.root {
            let root_node = self
                .state
                .get_node(root.clone())?
                .ok_or(TrieError::InconsistentTree)?;
            root_node.get(&self.state, Nibbles::from_bytes(path))
        } else {
            Ok(None)
        }
    }

    pub fn insert(&mut self, path: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        let root = self.root.take();
        if let Some(root_node) = root
            .map(|root| self.state.get_node(root))
            .transpose()?
            .flatten()
        {
            let root_node =
                root_node.insert(&mut self.state, Nibbles::from_bytes(&path), value.clone())?;
            self.root = Some(root_node.insert_self(&mut self.state)?)
        } else {
            let new_leaf = Node::from(LeafNode::new(Nibbles::from_bytes(&path), value));
            self.root = Some(new_leaf.insert_self(&mut self.state)?)
        }
        Ok(())
    }

    /// Removes a value from the trie given its path, returning it if it was present.
    pub fn remove(&mut self, path: PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        let root = self.root.take();
        if let Some(root) = root {
            let root_node = self
                .state
                .get_node(root)?
                .ok_or(TrieError::InconsistentTree)?;
            let (root_node, old_value) =
                root_node.remove(&mut self.state, Nibbles::from_bytes(&path))?;
            self.root = root_node
                .map(|root| root.insert_self(&mut self.state))
                .transpose()?;
            Ok(old_value)
        } else {
            Ok(None)
        }
    }

    /// Returns the trie's root hash, committing any pending changes to the DB.
    /// Returns keccak(RLP_NULL) for an empty trie.
    pub fn hash(&mut self) -> Result<H256, TrieError> {
        if let Some(ref root) = self.root {
            self.state.commit(root)?;
        }
        Ok(self
            .root
            .as_ref()
            .map(|root| root.clone().finalize())
            .unwrap_or(*EMPTY_TRIE_HASH))
    }

    /// Returns the trie's root hash without committing pending changes.
    pub fn hash_no_commit(&self) -> H256 {
        self.root
            .as_ref()
            .map(|root| root.clone().finalize())
            .unwrap_or(*EMPTY_TRIE_HASH)
    }

    #[cfg(test)]
    fn new_temp() -> Self {
        Trie::new(Box::new(InMemoryTrieDB::default()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut trie = Trie::new_temp();
        trie.insert(b"first".to_vec(), b"value".to_vec()).unwrap();
        assert_eq!(trie.get(&b"first".to_vec()).unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn get_missing_key_is_none() {
        let trie = Trie::new_temp();
        assert_eq!(trie.get(&b"missing".to_vec()).unwrap(), None);
    }

    #[test]
    fn empty_trie_hashes_to_constant() {
        let mut trie = Trie::new_temp();
        assert_eq!(trie.hash().unwrap(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn insert_many_then_get_each() {
        let mut trie = Trie::new_temp();
        let entries = [
            (b"first".to_vec(), b"value1".to_vec()),
            (b"second".to_vec(), b"value2".to_vec()),
            (b"third".to_vec(), b"value3".to_vec()),
        ];
        for (k, v) in entries.iter() {
            trie.insert(k.clone(), v.clone()).unwrap();
        }
        for (k, v) in entries.iter() {
            assert_eq!(trie.get(k).unwrap(), Some(v.clone()));
        }
    }

    #[test]
    fn insert_then_remove_then_get_none() {
        let mut trie = Trie::new_temp();
        trie.insert(b"key".to_vec(), b"value".to_vec()).unwrap();
        assert_eq!(trie.remove(b"key".to_vec()).unwrap(), Some(b"value".to_vec()));
        assert_eq!(trie.get(&b"key".to_vec()).unwrap(), None);
    }

    #[test]
    fn remove_missing_key_is_none() {
        let mut trie = Trie::new_temp();
        assert_eq!(trie.remove(b"missing".to_vec()).unwrap(), None);
    }

    #[test]
    fn hash_is_stable_across_reinsert_of_same_value() {
        let mut trie_a = Trie::new_temp();
        trie_a.insert(b"key".to_vec(), b"value".to_vec()).unwrap();
        let hash_a = trie_a.hash().unwrap();

        let mut trie_b = Trie::new_temp();
        trie_b.insert(b"key".to_vec(), b"value".to_vec()).unwrap();
        let hash_b = trie_b.hash().unwrap();

        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn hash_changes_when_a_value_changes() {
        let mut trie = Trie::new_temp();
        trie.insert(b"key".to_vec(), b"value".to_vec()).unwrap();
        let hash_before = trie.hash().unwrap();
        trie.insert(b"key".to_vec(), b"other".to_vec()).unwrap();
        let hash_after = trie.hash().unwrap();
        assert_ne!(hash_before, hash_after);
    }

    #[test]
    fn open_reconstructs_committed_trie() {
        let backing = std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));
        let root = {
            let mut trie = Trie::new(Box::new(InMemoryTrieDB::new(backing.clone())));
            trie.insert(b"key".to_vec(), b"value".to_vec()).unwrap();
            trie.hash().unwrap()
        };
        let reopened = Trie::open(Box::new(InMemoryTrieDB::new(backing)), root);
        assert_eq!(reopened.get(&b"key".to_vec()).unwrap(), Some(b"value".to_vec()));
    }
}
