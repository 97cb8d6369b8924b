use std::collections::HashMap;

use p2pkit_rlp::{decode::RLPDecode, encode::RLPEncode};

use crate::db::TrieDB;
use crate::error::TrieError;
use crate::node::Node;
use crate::node_hash::NodeHash;

/// Holds a trie's nodes: a write-through cache of nodes touched since the
/// last commit plus the backing `TrieDB`. No node is ever removed from the
/// DB once committed.
pub struct TrieState {
    db: Box<dyn TrieDB>,
    cache: HashMap<NodeHash, Node>,
}

impl TrieState {
    pub fn new(db: Box<dyn TrieDB>) -> Self {
        Self {
            db,
            cache: Default::default(),
        }
    }

    /// Retrieves a node based on its hash, checking the cache first.
    pub fn get_node(&self, hash: NodeHash) -> Result<Option<Node>, TrieError> {
        if let Some(node) = self.cache.get(&hash) {
            return Ok(Some(node.clone()));
        }
        self.db
            .get(hash.into())?
            .map(|rlp| Node::decode(&rlp).map_err(TrieError::RLPDecode))
            .transpose()
    }

    /// Inserts a node into the cache, to be flushed on the next `commit`.
    pub fn insert_node(&mut self, node: Node, hash: NodeHash) {
        self.cache.insert(hash, node);
    }

    /// Commits every node reachable from `root` to the DB and clears the cache.
    pub fn commit(&mut self, root: &NodeHash) -> Result<(), TrieError> {
        self.commit_node(root)?;
        self.cache.clear();
        Ok(())
    }

    fn commit_node(&mut self, node_hash: &NodeHash) -> Result<(), TrieError> {
        let Some(node) = self.cache.remove(node_hash) else {
            // Already committed in a previous `commit` call.
            return Ok(());
        };
        match &node {
            Node::Branch(n) => {
                for child in n.choices.iter() {
                    if child.is_valid() {
                        self.commit_node(child)?;
                    }
                }
            }
            Node::Extension(n) => self.commit_node(&n.child)?,
            Node::Leaf(_) => {}
        }
        self.db.put(node_hash.into(), node.encode_to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::in_memory::InMemoryTrieDB;
    use crate::node::LeafNode;
    use crate::nibbles::Nibbles;

    #[test]
    fn insert_then_get_node_hits_cache() {
        let mut state = TrieState::new(Box::new(InMemoryTrieDB::default()));
        let leaf = Node::from(LeafNode::new(Nibbles::from_bytes(b"k"), b"v".to_vec()));
        let hash = leaf.insert_self(&mut state).unwrap();
        assert!(state.get_node(hash).unwrap().is_some());
    }

    #[test]
    fn commit_then_get_node_hits_db() {
        let mut state = TrieState::new(Box::new(InMemoryTrieDB::default()));
        let leaf = Node::from(LeafNode::new(Nibbles::from_bytes(b"k"), b"v".to_vec()));
        let hash = leaf.insert_self(&mut state).unwrap();
        state.commit(&hash).unwrap();
        assert!(state.get_node(hash).unwrap().is_some());
    }
}
