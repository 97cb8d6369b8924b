use p2pkit_rlp::structs::Encoder;

use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node_hash::NodeHash;
use crate::state::TrieState;
use crate::ValueRLP;

use super::{BranchNode, ExtensionNode, Node};

/// A terminal node: `path` is the remaining nibble path from here to the
/// stored `value`.
#[derive(Debug, Clone)]
pub struct LeafNode {
    pub path: Nibbles,
    pub value: ValueRLP,
}

impl LeafNode {
    pub fn new(path: Nibbles, value: ValueRLP) -> Self {
        Self { path, value }
    }

    pub fn get(&self, path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        Ok((path == self.path).then(|| self.value.clone()))
    }

    pub fn insert(self, state: &mut TrieState, path: Nibbles, value: ValueRLP) -> Result<Node, TrieError> {
        if path == self.path {
            return Ok(LeafNode::new(path, value).into());
        }

        let match_len = path.count_prefix(&self.path);
        let mut choices = BranchNode::empty_choices();
        let mut branch_value = ValueRLP::new();

        let mut old_remainder = self.path.offset(match_len);
        match old_remainder.next_choice() {
            Some(idx) => {
                let leaf = Node::from(LeafNode::new(old_remainder, self.value));
                choices[idx] = leaf.insert_self(state)?;
            }
            None => branch_value = self.value,
        }

        let mut new_remainder = path.offset(match_len);
        match new_remainder.next_choice() {
            Some(idx) => {
                let leaf = Node::from(LeafNode::new(new_remainder, value));
                choices[idx] = leaf.insert_self(state)?;
            }
            None => branch_value = value,
        }

        let branch = BranchNode::new_with_value(Box::new(choices), branch_value);
        if match_len == 0 {
            Ok(branch.into())
        } else {
            let prefix = self.path.slice(0, match_len);
            let branch_hash = branch.insert_self(state)?;
            Ok(ExtensionNode::new(prefix, branch_hash).into())
        }
    }

    pub fn remove(self, path: Nibbles) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        if path == self.path {
            Ok((None, Some(self.value)))
        } else {
            Ok((Some(self.into()), None))
        }
    }

    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded_raw(self.encode_raw())
    }

    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&self.path)
            .encode_field(&self.value)
            .finish();
        buf
    }

    pub fn insert_self(self, state: &mut TrieState) -> Result<NodeHash, TrieError> {
        let hash = self.compute_hash();
        state.insert_node(self.into(), hash.clone());
        Ok(hash)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_matching_path() {
        let path = Nibbles::from_bytes(b"key");
        let node = LeafNode::new(path.clone(), b"value".to_vec());
        assert_eq!(node.get(path).unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn get_mismatched_path_is_none() {
        let node = LeafNode::new(Nibbles::from_bytes(b"key"), b"value".to_vec());
        assert_eq!(node.get(Nibbles::from_bytes(b"other")).unwrap(), None);
    }

    #[test]
    fn insert_same_path_replaces_value() {
        let mut state = TrieState::new(Box::new(crate::db::in_memory::InMemoryTrieDB::default()));
        let path = Nibbles::from_bytes(b"key");
        let node = LeafNode::new(path.clone(), b"value".to_vec());
        let new_node = node.insert(&mut state, path.clone(), b"updated".to_vec()).unwrap();
        assert_eq!(new_node.get(&state, path).unwrap(), Some(b"updated".to_vec()));
    }

    #[test]
    fn insert_diverging_path_creates_branch() {
        let mut state = TrieState::new(Box::new(crate::db::in_memory::InMemoryTrieDB::default()));
        let node = LeafNode::new(Nibbles::from_bytes(&[0x12]), b"a".to_vec());
        let new_node = node
            .insert(&mut state, Nibbles::from_bytes(&[0x34]), b"b".to_vec())
            .unwrap();
        assert!(matches!(new_node, Node::Branch(_)));
        assert_eq!(
            new_node.get(&state, Nibbles::from_bytes(&[0x12])).unwrap(),
            Some(b"a".to_vec())
        );
        assert_eq!(
            new_node.get(&state, Nibbles::from_bytes(&[0x34])).unwrap(),
            Some(b"b".to_vec())
        );
    }
}
