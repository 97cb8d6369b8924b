use p2pkit_rlp::structs::Encoder;

use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node_hash::NodeHash;
use crate::state::TrieState;
use crate::ValueRLP;

use super::{ExtensionNode, LeafNode, Node};

/// A 16-way branch node. `choices[n]` holds the hash (or inline encoding) of
/// the child reached by nibble `n`; `value` holds this node's own value, for
/// keys whose path ends exactly here.
#[derive(Debug, Clone)]
pub struct BranchNode {
    pub choices: Box<[NodeHash; 16]>,
    pub value: ValueRLP,
}

impl BranchNode {
    pub fn empty_choices() -> [NodeHash; 16] {
        std::array::from_fn(|_| NodeHash::default())
    }

    pub fn new(choices: Box<[NodeHash; 16]>) -> Self {
        Self {
            choices,
            value: Default::default(),
        }
    }

    pub fn new_with_value(choices: Box<[NodeHash; 16]>, value: ValueRLP) -> Self {
        Self { choices, value }
    }

    pub fn get(&self, state: &TrieState, mut path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        match path.next_choice() {
            Some(choice) => {
                let child_hash = &self.choices[choice];
                if child_hash.is_valid() {
                    let child_node = state
                        .get_node(child_hash.clone())?
                        .ok_or(TrieError::InconsistentTree)?;
                    child_node.get(state, path)
                } else {
                    Ok(None)
                }
            }
            None => Ok((!self.value.is_empty()).then_some(self.value.clone())),
        }
    }

    pub fn insert(
        mut self,
        state: &mut TrieState,
        mut path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        match path.next_choice() {
            Some(choice) => {
                let choice_hash = &mut self.choices[choice];
                if choice_hash.is_valid() {
                    let child_node = state
                        .get_node(choice_hash.clone())?
                        .ok_or(TrieError::InconsistentTree)?;
                    let child_node = child_node.insert(state, path, value)?;
                    *choice_hash = child_node.insert_self(state)?;
                } else {
                    let new_leaf = Node::from(LeafNode::new(path, value));
                    *choice_hash = new_leaf.insert_self(state)?;
                }
            }
            None => self.value = value,
        }
        Ok(self.into())
    }

    pub fn remove(
        mut self,
        state: &mut TrieState,
        mut path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        let value = match path.next_choice() {
            Some(choice_index) => {
                if self.choices[choice_index].is_valid() {
                    let child_node = state
                        .get_node(self.choices[choice_index].clone())?
                        .ok_or(TrieError::InconsistentTree)?;
                    let (child_node, old_value) = child_node.remove(state, path)?;
                    self.choices[choice_index] = match child_node {
                        Some(child_node) => child_node.insert_self(state)?,
                        None => NodeHash::default(),
                    };
                    old_value
                } else {
                    None
                }
            }
            None => {
                if !self.value.is_empty() {
                    Some(std::mem::take(&mut self.value))
                } else {
                    None
                }
            }
        };

        // `Err(())` means more than one remaining choice; `Ok(Some(_))`/`Ok(None)` mean one
        // choice (with its index) or none, respectively.
        let choice_count = self
            .choices
            .iter()
            .enumerate()
            .try_fold(None, |acc, (i, x)| {
                Ok(match (acc, x.is_valid()) {
                    (None, true) => Some(i),
                    (None, false) => None,
                    (Some(_), true) => return Err(()),
                    (Some(i), false) => Some(i),
                })
            });

        let child_hash = match choice_count {
            Ok(Some(choice_index)) => {
                let child_hash = self.choices[choice_index].clone();
                let child_node = state
                    .get_node(child_hash.clone())?
                    .ok_or(TrieError::InconsistentTree)?;
                match child_node {
                    Node::Branch(_) => {
                        let extension_node =
                            ExtensionNode::new(Nibbles::from_hex(vec![choice_index as u8]), child_hash);
                        Some(extension_node.insert_self(state)?)
                    }
                    Node::Extension(mut extension_node) => {
                        debug_assert!(self.value.is_empty());
                        extension_node.prefix.prepend(choice_index as u8);
                        return Ok((Some(extension_node.into()), value));
                    }
                    Node::Leaf(_) => Some(child_hash),
                }
            }
            _ => None,
        };

        let new_node = match (child_hash, !self.value.is_empty()) {
            (Some(_), true) => Some(self.into()),
            (None, true) => Some(LeafNode::new(Nibbles::from_hex(vec![16]), self.value).into()),
            (Some(x), false) => {
                Some(state.get_node(x)?.ok_or(TrieError::InconsistentTree)?)
            }
            (None, false) => Some(self.into()),
        };

        Ok((new_node, value))
    }

    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded_raw(self.encode_raw())
    }

    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf);
        for choice in self.choices.iter() {
            encoder = encoder.encode_field(choice);
        }
        encoder.encode_field(&self.value).finish();
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
    use ethereum_types::H256;

    use super::*;

    fn leaf_choices() -> (BranchNode, TrieState) {
        let mut state = TrieState::new(Box::new(crate::db::in_memory::InMemoryTrieDB::default()));
        let mut choices = BranchNode::empty_choices();
        let leaf0 = Node::from(LeafNode::new(Nibbles::from_bytes(&[0x00]), vec![0x00]));
        let leaf1 = Node::from(LeafNode::new(Nibbles::from_bytes(&[0x10]), vec![0x10]));
        choices[0] = leaf0.insert_self(&mut state).unwrap();
        choices[1] = leaf1.insert_self(&mut state).unwrap();
        (BranchNode::new(Box::new(choices)), state)
    }

    #[test]
    fn new_sets_choices() {
        let mut choices = BranchNode::empty_choices();
        choices[2] = NodeHash::Hashed(H256([2; 32]));
        let node = BranchNode::new(Box::new(choices));
        assert_eq!(node.choices[2], NodeHash::Hashed(H256([2; 32])));
        assert_eq!(node.choices[0], NodeHash::default());
    }

    #[test]
    fn get_reaches_child_leaf() {
        let (node, state) = leaf_choices();
        assert_eq!(
            node.get(&state, Nibbles::from_bytes(&[0x00])).unwrap(),
            Some(vec![0x00])
        );
        assert_eq!(
            node.get(&state, Nibbles::from_bytes(&[0x10])).unwrap(),
            Some(vec![0x10])
        );
    }

    #[test]
    fn get_missing_choice_is_none() {
        let (node, state) = leaf_choices();
        assert_eq!(node.get(&state, Nibbles::from_bytes(&[0x20])).unwrap(), None);
    }

    #[test]
    fn insert_new_choice() {
        let (node, mut state) = leaf_choices();
        let path = Nibbles::from_bytes(&[0x20]);
        let new_node = node.insert(&mut state, path.clone(), vec![0x21]).unwrap();
        assert!(matches!(new_node, Node::Branch(_)));
        assert_eq!(new_node.get(&state, path).unwrap(), Some(vec![0x21]));
    }

    #[test]
    fn remove_choice_leaves_single_leaf() {
        let (node, mut state) = leaf_choices();
        let (new_node, value) = node.remove(&mut state, Nibbles::from_bytes(&[0x00])).unwrap();
        assert!(matches!(new_node, Some(Node::Leaf(_))));
        assert_eq!(value, Some(vec![0x00]));
    }
}
