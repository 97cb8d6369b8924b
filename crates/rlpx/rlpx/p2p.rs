use bytes::BufMut;
use ethereum_types::H512;
use k256::PublicKey;
use p2pkit_rlp::{
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};

use super::capability::Capability;
use super::disconnect::DisconnectReason;
use super::{
    message::RLPxMessage,
    utils::{id2pubkey, pubkey2id, snappy_compress, snappy_decompress},
};

/// Baseline RLPx protocol version this implementation speaks. Frame-level
/// snappy compression (introduced in v5) is not implemented, so v4 is
/// advertised rather than claiming a capability we don't have.
pub const RLPX_PROTOCOL_VERSION: u64 = 4;

impl RLPEncode for Capability {
    fn encode(&self, buf: &mut dyn BufMut) {
        (self.name.as_str(), self.version).encode(buf)
    }
}

impl p2pkit_rlp::decode::RLPDecode for Capability {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let ((name, version), rest): ((String, u8), &[u8]) =
            p2pkit_rlp::decode::RLPDecode::decode_unfinished(rlp)?;
        Ok((Capability { name, version }, rest))
    }
}

#[derive(Debug)]
pub struct HelloMessage {
    pub client_id: String,
    pub capabilities: Vec<(Capability, u8)>,
    pub listen_port: u16,
    pub node_id: PublicKey,
}

impl HelloMessage {
    pub fn new(
        client_id: String,
        capabilities: Vec<(Capability, u8)>,
        listen_port: u16,
        node_id: PublicKey,
    ) -> Self {
        Self {
            client_id,
            capabilities,
            listen_port,
            node_id,
        }
    }
}

impl RLPxMessage for HelloMessage {
    fn encode(&self, mut buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(&mut buf)
            .encode_field(&RLPX_PROTOCOL_VERSION)
            .encode_field(&self.client_id)
            .encode_field(&self.capabilities)
            .encode_field(&self.listen_port)
            .encode_field(&pubkey2id(&self.node_id))
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        // [protocolVersion: P, clientId: B, capabilities, listenPort: P, nodeId: B_64, ...]
        let decoder = Decoder::new(msg_data)?;
        let (_protocol_version, decoder): (u64, _) = decoder.decode_field("protocolVersion")?;
        let (client_id, decoder): (String, _) = decoder.decode_field("clientId")?;
        let (capabilities, decoder): (Vec<(Capability, u8)>, _) =
            decoder.decode_field("capabilities")?;
        let (listen_port, decoder): (u16, _) = decoder.decode_field("listenPort")?;
        let (node_id, decoder): (H512, _) = decoder.decode_field("nodeId")?;
        // Implementations must ignore any additional list elements
        let _padding = decoder.finish_unchecked();

        Ok(Self::new(
            client_id,
            capabilities,
            listen_port,
            id2pubkey(node_id).ok_or(RLPDecodeError::MalformedData)?,
        ))
    }
}

#[derive(Debug)]
pub struct DisconnectMessage {
    pub reason: Option<DisconnectReason>,
}

impl DisconnectMessage {
    pub fn new(reason: Option<DisconnectReason>) -> Self {
        Self { reason }
    }
}

impl RLPxMessage for DisconnectMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        match self.reason {
            Some(reason) => Encoder::new(&mut encoded_data)
                .encode_field(&reason.code())
                .finish(),
            None => Vec::<u8>::new().encode(&mut encoded_data),
        }
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        // Peers encode the reason either as a single byte or as an RLP list.
        let reason = match decompressed_data.len() {
            0 => None,
            1 => Some(DisconnectReason::from_code(decompressed_data[0])),
            _ => {
                let decoder = Decoder::new(&decompressed_data)?;
                let (reason, _): (Option<u8>, _) = decoder.decode_optional_field();
                reason.map(DisconnectReason::from_code)
            }
        };

        Ok(Self::new(reason))
    }
}

#[derive(Debug)]
pub struct PingMessage {}

impl PingMessage {
    pub fn new() -> Self {
        Self {}
    }
}

impl RLPxMessage for PingMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Vec::<u8>::new().encode(&mut encoded_data);
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed_data)?;
        let result = decoder.finish_unchecked();
        if !result.is_empty() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok(Self::new())
    }
}

#[derive(Debug)]
pub struct PongMessage {}

impl PongMessage {
    pub fn new() -> Self {
        Self {}
    }
}

impl RLPxMessage for PongMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Vec::<u8>::new().encode(&mut encoded_data);
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let decoder = Decoder::new(&decompressed_data)?;
        let result = decoder.finish_unchecked();
        if !result.is_empty() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok(Self::new())
    }
}
