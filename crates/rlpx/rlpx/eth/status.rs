use bytes::BufMut;
use ethereum_types::{H256, U256};
use p2pkit_rlp::{
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};

use crate::rlpx::{
    message::RLPxMessage,
    utils::{snappy_compress, snappy_decompress},
};

pub const ETH_VERSION: u32 = 68;

/// The eth fork identifier (EIP-2124): a CRC32 of past fork block numbers
/// plus the next known fork activation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkId {
    pub hash: [u8; 4],
    pub next: u64,
}

impl RLPEncode for ForkId {
    fn encode(&self, buf: &mut dyn BufMut) {
        (self.hash.as_slice(), self.next).encode(buf)
    }
}

impl p2pkit_rlp::decode::RLPDecode for ForkId {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let ((hash, next), rest): ((bytes::Bytes, u64), &[u8]) =
            p2pkit_rlp::decode::RLPDecode::decode_unfinished(rlp)?;
        let hash: [u8; 4] = hash.as_ref().try_into().map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok((ForkId { hash, next }, rest))
    }
}

/// One demonstration sub-protocol message: the `eth` capability's Status,
/// sent as soon as both peers have negotiated a shared `eth` range.
#[derive(Debug)]
pub(crate) struct StatusMessage {
    pub(crate) eth_version: u32,
    pub(crate) network_id: u64,
    pub(crate) total_difficulty: U256,
    pub(crate) block_hash: H256,
    pub(crate) genesis: H256,
    pub(crate) fork_id: ForkId,
}

impl RLPxMessage for StatusMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.eth_version)
            .encode_field(&self.network_id)
            .encode_field(&self.total_difficulty)
            .encode_field(&self.block_hash)
            .encode_field(&self.genesis)
            .encode_field(&self.fork_id)
            .finish();

        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed_data)?;
        let (eth_version, decoder): (u32, _) = decoder.decode_field("protocolVersion")?;
        let (network_id, decoder): (u64, _) = decoder.decode_field("networkId")?;
        let (total_difficulty, decoder): (U256, _) = decoder.decode_field("totalDifficulty")?;
        let (block_hash, decoder): (H256, _) = decoder.decode_field("blockHash")?;
        let (genesis, decoder): (H256, _) = decoder.decode_field("genesis")?;
        let (fork_id, decoder): (ForkId, _) = decoder.decode_field("forkId")?;
        // Implementations must ignore any additional list elements
        let _padding = decoder.finish_unchecked();

        Ok(Self {
            eth_version,
            network_id,
            total_difficulty,
            block_hash,
            genesis,
            fork_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_encode_decode() {
        let status = StatusMessage {
            eth_version: ETH_VERSION,
            network_id: 1,
            total_difficulty: U256::from(17_179_869_184u64),
            block_hash: H256::random(),
            genesis: H256::random(),
            fork_id: ForkId {
                hash: [0xfc, 0x64, 0xec, 0x04],
                next: 1_150_000,
            },
        };
        let mut buf = vec![];
        status.encode(&mut buf).unwrap();
        let decoded = StatusMessage::decode(&buf).unwrap();
        assert_eq!(decoded.network_id, status.network_id);
        assert_eq!(decoded.block_hash, status.block_hash);
        assert_eq!(decoded.fork_id, status.fork_id);
    }
}
