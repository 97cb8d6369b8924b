//! A passive bookkeeping table of known peers.
//!
//! This is not discovery: nothing here probes the network or walks a
//! Kademlia table. Entries are added and removed by the RLPx/SSB layers as
//! connections come and go, the way a node keeps track of who it has
//! talked to. `node_id` is the peer's raw identity bytes rather than a
//! fixed-width hash, since RLPx identifies peers by a 64-byte secp256k1
//! public key and SSB by a 32-byte Ed25519 one.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

/// A reachable network endpoint for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub ip: IpAddr,
    pub tcp_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: Vec<u8>,
    pub last_seen: u64,
    pub endpoint: PeerEndpoint,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Default)]
pub struct PeerBook {
    peers: RwLock<HashMap<Vec<u8>, NodeRecord>>,
}

impl PeerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: NodeRecord) {
        self.peers
            .write()
            .expect("peer book lock poisoned")
            .insert(record.node_id.clone(), record);
    }

    pub fn remove(&self, node_id: &[u8]) -> Option<NodeRecord> {
        self.peers
            .write()
            .expect("peer book lock poisoned")
            .remove(node_id)
    }

    pub fn get(&self, node_id: &[u8]) -> Option<NodeRecord> {
        self.peers
            .read()
            .expect("peer book lock poisoned")
            .get(node_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.read().expect("peer book lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<NodeRecord> {
        self.peers
            .read()
            .expect("peer book lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample(node_id: u8) -> NodeRecord {
        NodeRecord {
            node_id: vec![node_id; 64],
            last_seen: 1,
            endpoint: PeerEndpoint {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                tcp_port: 30303,
            },
            capabilities: vec!["eth/68".to_string()],
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let book = PeerBook::new();
        book.upsert(sample(1));
        assert_eq!(book.get(&[1u8; 64]).unwrap().last_seen, 1);
    }

    #[test]
    fn remove_clears_entry() {
        let book = PeerBook::new();
        book.upsert(sample(2));
        assert!(book.remove(&[2u8; 64]).is_some());
        assert!(book.get(&[2u8; 64]).is_none());
    }

    #[test]
    fn upsert_overwrites_existing() {
        let book = PeerBook::new();
        book.upsert(sample(3));
        let mut updated = sample(3);
        updated.last_seen = 42;
        book.upsert(updated);
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(&[3u8; 64]).unwrap().last_seen, 42);
    }
}
