use ethereum_types::H256;
use p2pkit_rlp::{decode::RLPDecode, encode::RLPEncode};
use sha3::{Digest, Keccak256};

/// A trie node's identity: nodes whose encoding is at least 32 bytes are
/// addressed by their Keccak-256 hash; smaller nodes are inlined directly
/// into their parent rather than stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeHash {
    Hashed(H256),
    Inline(Vec<u8>),
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        match self {
            NodeHash::Inline(x) => x.as_ref(),
            NodeHash::Hashed(x) => x.as_bytes(),
        }
    }
}

impl NodeHash {
    pub fn from_encoded_raw(encoded: Vec<u8>) -> NodeHash {
        if encoded.len() >= 32 {
            let hash = Keccak256::new_with_prefix(&encoded).finalize();
            NodeHash::Hashed(H256::from_slice(hash.as_slice()))
        } else {
            NodeHash::Inline(encoded)
        }
    }

    /// Finalizes an inlined node into a real hash. Only valid for a trie's
    /// root: intermediate inline nodes must stay inline to match their
    /// parent's view of them.
    pub fn finalize(self) -> H256 {
        match self {
            NodeHash::Inline(x) => {
                H256::from_slice(Keccak256::new().chain_update(&*x).finalize().as_slice())
            }
            NodeHash::Hashed(x) => x,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, NodeHash::Inline(v) if v.is_empty())
    }
}

impl From<Vec<u8>> for NodeHash {
    fn from(value: Vec<u8>) -> Self {
        match value.len() {
            32 => NodeHash::Hashed(H256::from_slice(&value)),
            _ => NodeHash::Inline(value),
        }
    }
}

impl From<H256> for NodeHash {
    fn from(value: H256) -> Self {
        NodeHash::Hashed(value)
    }
}

impl From<NodeHash> for Vec<u8> {
    fn from(val: NodeHash) -> Self {
        match val {
            NodeHash::Hashed(x) => x.0.to_vec(),
            NodeHash::Inline(x) => x,
        }
    }
}

impl From<&NodeHash> for Vec<u8> {
    fn from(val: &NodeHash) -> Self {
        match val {
            NodeHash::Hashed(x) => x.0.to_vec(),
            NodeHash::Inline(x) => x.clone(),
        }
    }
}

impl Default for NodeHash {
    fn default() -> Self {
        NodeHash::Inline(Vec::new())
    }
}

impl RLPEncode for NodeHash {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        RLPEncode::encode(&Into::<Vec<u8>>::into(self), buf)
    }
}

impl RLPDecode for NodeHash {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), p2pkit_rlp::error::RLPDecodeError> {
        let (hash, rest): (Vec<u8>, &[u8]) = RLPDecode::decode_unfinished(rlp)?;
        Ok((NodeHash::from(hash), rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_nodes_stay_inline() {
        let hash = NodeHash::from_encoded_raw(vec![1, 2, 3]);
        assert!(matches!(hash, NodeHash::Inline(_)));
    }

    #[test]
    fn long_nodes_are_hashed() {
        let hash = NodeHash::from_encoded_raw(vec![0u8; 40]);
        assert!(matches!(hash, NodeHash::Hashed(_)));
    }
}
