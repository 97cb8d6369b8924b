//! Sub-protocol capability advertisement and id-range negotiation.
//!
//! Each peer advertises a list of `(name, version)` pairs it supports in its
//! Hello message. Once both Hello messages have been exchanged, each side
//! independently computes the same assignment of message-id ranges to
//! capabilities: walk the local capability list in priority order (the
//! order it was configured in), and for every capability both peers
//! support, allocate the next contiguous block of ids starting at 16,
//! sized to the highest version count both sides agree on. Because both
//! peers see the same two capability lists and apply the same
//! deterministic rule, they arrive at an identical range table without
//! exchanging it explicitly.

use std::collections::BTreeMap;
use std::ops::Range;

use ethereum_types::H512;

pub const BASE_MESSAGE_ID_OFFSET: u8 = 16;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capability {
    pub name: String,
    pub version: u8,
}

impl Capability {
    pub fn new(name: impl Into<String>, version: u8) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// A local sub-protocol implementation: its identity plus how many message
/// kinds (the "width" of its id range) it defines for a given version.
pub trait SubProtocol {
    fn capability(&self) -> Capability;
    fn message_id_width(&self) -> u8;
}

/// The outcome of negotiating capabilities with a remote peer: for each
/// mutually supported capability, the id at which its range starts and how
/// many ids it occupies.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    ranges: BTreeMap<String, (u8, u8)>,
}

impl NegotiatedCapabilities {
    /// Negotiates ranges given the local offered list (in priority order)
    /// and the remote's offered list. Picks, for each locally-offered
    /// capability name also offered by the remote, the highest version
    /// supported by both sides.
    pub fn negotiate(
        local: &[(Capability, u8)],
        remote: &[(Capability, u8)],
    ) -> NegotiatedCapabilities {
        let mut ranges = BTreeMap::new();
        let mut next_id = BASE_MESSAGE_ID_OFFSET;

        for (local_cap, width) in local {
            let best_common_version = remote
                .iter()
                .filter(|(remote_cap, _)| remote_cap.name == local_cap.name)
                .map(|(remote_cap, _)| remote_cap.version)
                .filter(|v| *v <= local_cap.version)
                .max();

            if best_common_version.is_some() {
                ranges.insert(local_cap.name.clone(), (next_id, *width));
                next_id = next_id
                    .checked_add(*width)
                    .expect("message id space exhausted");
            }
        }

        NegotiatedCapabilities { ranges }
    }

    /// Returns the capability name and relative (0-based) message id that
    /// `msg_id` falls under, if any.
    pub fn resolve(&self, msg_id: u8) -> Option<(&str, u8)> {
        self.ranges.iter().find_map(|(name, (start, width))| {
            if msg_id >= *start && msg_id < start.checked_add(*width)? {
                Some((name.as_str(), msg_id - start))
            } else {
                None
            }
        })
    }

    pub fn range_for(&self, name: &str) -> Option<Range<u8>> {
        self.ranges
            .get(name)
            .map(|(start, width)| *start..(start + width))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Helper used only by tests/disconnect diagnostics: formats a node id as a
/// short hex prefix.
pub fn short_id(id: &H512) -> String {
    hex::encode(&id.as_bytes()[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_contiguous_and_disjoint() {
        let local = vec![
            (Capability::new("eth", 68), 8),
            (Capability::new("snap", 1), 8),
        ];
        let remote = vec![
            (Capability::new("eth", 67), 8),
            (Capability::new("snap", 1), 8),
        ];
        let negotiated = NegotiatedCapabilities::negotiate(&local, &remote);
        assert_eq!(negotiated.range_for("eth"), Some(16..24));
        assert_eq!(negotiated.range_for("snap"), Some(24..32));
    }

    #[test]
    fn unmatched_capability_gets_no_range() {
        let local = vec![(Capability::new("eth", 68), 8)];
        let remote = vec![(Capability::new("snap", 1), 8)];
        let negotiated = NegotiatedCapabilities::negotiate(&local, &remote);
        assert!(negotiated.is_empty());
    }

    #[test]
    fn resolve_maps_back_to_relative_id() {
        let local = vec![(Capability::new("eth", 68), 8)];
        let remote = vec![(Capability::new("eth", 68), 8)];
        let negotiated = NegotiatedCapabilities::negotiate(&local, &remote);
        assert_eq!(negotiated.resolve(16), Some(("eth", 0)));
        assert_eq!(negotiated.resolve(19), Some(("eth", 3)));
        assert_eq!(negotiated.resolve(24), None);
    }
}
