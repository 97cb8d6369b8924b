use bytes::{BufMut, Bytes};
use p2pkit_rlp::error::{RLPDecodeError, RLPEncodeError};
use std::fmt::Display;

use super::p2p::{DisconnectMessage, HelloMessage, PingMessage, PongMessage};

pub trait RLPxMessage: Sized {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError>;

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError>;
}

/// The four RLPx base-protocol control messages sit at fixed ids 0-3.
/// Everything at id 16 and above belongs to a negotiated sub-protocol;
/// only the connection layer, which holds the negotiated id-range table,
/// knows how to decode it further, so it is kept here as a raw payload.
#[derive(Debug)]
pub enum Message {
    Hello(HelloMessage),
    Disconnect(DisconnectMessage),
    Ping(PingMessage),
    Pong(PongMessage),
    SubProtocol { msg_id: u8, payload: Bytes },
}

impl Message {
    pub fn decode(msg_id: u8, msg_data: &[u8]) -> Result<Message, RLPDecodeError> {
        match msg_id {
            0x00 => Ok(Message::Hello(HelloMessage::decode(msg_data)?)),
            0x01 => Ok(Message::Disconnect(DisconnectMessage::decode(msg_data)?)),
            0x02 => Ok(Message::Ping(PingMessage::decode(msg_data)?)),
            0x03 => Ok(Message::Pong(PongMessage::decode(msg_data)?)),
            id if id >= super::capability::BASE_MESSAGE_ID_OFFSET => Ok(Message::SubProtocol {
                msg_id: id,
                payload: Bytes::copy_from_slice(msg_data),
            }),
            _ => Err(RLPDecodeError::MalformedData),
        }
    }

    pub fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        match self {
            Message::Hello(msg) => {
                buf.put_u8(0x00);
                msg.encode(buf)
            }
            Message::Disconnect(msg) => {
                buf.put_u8(0x01);
                msg.encode(buf)
            }
            Message::Ping(msg) => {
                buf.put_u8(0x02);
                msg.encode(buf)
            }
            Message::Pong(msg) => {
                buf.put_u8(0x03);
                msg.encode(buf)
            }
            Message::SubProtocol { msg_id, payload } => {
                buf.put_u8(*msg_id);
                buf.put_slice(payload);
                Ok(())
            }
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Hello(_) => "p2p:Hello".fmt(f),
            Message::Disconnect(_) => "p2p:Disconnect".fmt(f),
            Message::Ping(_) => "p2p:Ping".fmt(f),
            Message::Pong(_) => "p2p:Pong".fmt(f),
            Message::SubProtocol { msg_id, .. } => write!(f, "subprotocol:0x{msg_id:02x}"),
        }
    }
}
