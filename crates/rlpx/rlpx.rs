pub mod capability;
pub mod connection;
pub mod disconnect;
pub mod error;
pub mod eth;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod p2p;
pub mod utils;

pub use connection::RLPxConnection;

/// Cap on the plaintext size of a handshake (Auth/Ack) packet, including its
/// EIP-8 size prefix. Bigger than any real Auth/Ack message; guards against a
/// peer claiming an absurd length before a connection is established.
pub(crate) const MAX_DISC_PACKET_SIZE: usize = 1280;
