use p2pkit_rlp::structs::Encoder;

use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node_hash::NodeHash;
use crate::state::TrieState;
use crate::ValueRLP;

use super::{BranchNode, LeafNode, Node};

/// A path-compressing node: `prefix` is shared by every key under `child`.
#[derive(Debug, Clone)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeHash,
}

impl ExtensionNode {
    pub fn new(prefix: Nibbles, child: NodeHash) -> Self {
        Self { prefix, child }
    }

    pub fn get(&self, state: &TrieState, mut path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        if path.skip_prefix(&self.prefix) {
            let child_node = state
                .get_node(self.child.clone())?
                .ok_or(TrieError::InconsistentTree)?;
            child_node.get(state, path)
        } else {
            Ok(None)
        }
    }

    pub fn insert(
        self,
        state: &mut TrieState,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        let match_len = path.count_prefix(&self.prefix);
        if match_len == self.prefix.len() {
            let mut remainder = path;
            remainder.skip_prefix(&self.prefix);
            let child_node = state
                .get_node(self.child.clone())?
                .ok_or(TrieError::InconsistentTree)?;
            let child_node = child_node.insert(state, remainder, value)?;
            let child_hash = child_node.insert_self(state)?;
            return Ok(ExtensionNode::new(self.prefix, child_hash).into());
        }

        // Partial match: split this extension into (optionally) a shorter extension
        // leading to a new branch node.
        let branch_choice = self.prefix.at(match_len);
        let mut choices = BranchNode::empty_choices();

        let old_remainder = self.prefix.offset(match_len + 1);
        choices[branch_choice] = if old_remainder.is_empty() {
            self.child
        } else {
            ExtensionNode::new(old_remainder, self.child).insert_self(state)?
        };

        let mut new_remainder = path.offset(match_len);
        let branch = match new_remainder.next_choice() {
            Some(idx) => {
                let leaf = Node::from(LeafNode::new(new_remainder, value));
                choices[idx] = leaf.insert_self(state)?;
                BranchNode::new(Box::new(choices))
            }
            None => BranchNode::new_with_value(Box::new(choices), value),
        };

        if match_len == 0 {
            Ok(branch.into())
        } else {
            let prefix = self.prefix.slice(0, match_len);
            let branch_hash = branch.insert_self(state)?;
            Ok(ExtensionNode::new(prefix, branch_hash).into())
        }
    }

    pub fn remove(
        self,
        state: &mut TrieState,
        mut path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        if !path.skip_prefix(&self.prefix) {
            return Ok((Some(self.into()), None));
        }
        let child_node = state
            .get_node(self.child.clone())?
            .ok_or(TrieError::InconsistentTree)?;
        let (child_node, value) = child_node.remove(state, path)?;
        let new_node = match child_node {
            Some(Node::Branch(branch)) => {
                let child_hash = Node::from(*branch).insert_self(state)?;
                Some(ExtensionNode::new(self.prefix, child_hash).into())
            }
            Some(Node::Extension(mut child_extension)) => {
                let mut merged = self.prefix;
                merged.extend(&child_extension.prefix);
                child_extension.prefix = merged;
                Some(child_extension.into())
            }
            Some(Node::Leaf(leaf)) => Some(leaf.into()),
            None => None,
        };
        Ok((new_node, value))
    }

    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded_raw(self.encode_raw())
    }

    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&self.prefix)
            .encode_field(&self.child)
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

    fn single_child_extension() -> (ExtensionNode, TrieState) {
        let mut state = TrieState::new(Box::new(crate::db::in_memory::InMemoryTrieDB::default()));
        let leaf = Node::from(LeafNode::new(Nibbles::from_hex(vec![3, 4, 16]), vec![0xAB]));
        let child = leaf.insert_self(&mut state).unwrap();
        (
            ExtensionNode::new(Nibbles::from_hex(vec![1, 2]), child),
            state,
        )
    }

    #[test]
    fn get_through_matching_prefix() {
        let (node, state) = single_child_extension();
        let path = Nibbles::from_hex(vec![1, 2, 3, 4, 16]);
        assert_eq!(node.get(&state, path).unwrap(), Some(vec![0xAB]));
    }

    #[test]
    fn get_mismatched_prefix_is_none() {
        let (node, state) = single_child_extension();
        let path = Nibbles::from_hex(vec![9, 9, 3, 4, 16]);
        assert_eq!(node.get(&state, path).unwrap(), None);
    }
}
