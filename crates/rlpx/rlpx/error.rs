use crate::rlpx::message::Message;
use p2pkit_core::completion::Cancelled;
use p2pkit_rlp::error::{RLPDecodeError, RLPEncodeError};
use thiserror::Error;

/// Error taxonomy for the RLPx wire protocol: handshake failures, framing
/// failures (bad MAC), malformed sub-protocol payloads, transport errors,
/// and cancellation, matching the categories peers need to distinguish
/// when deciding whether a session is salvageable.
#[derive(Debug, Error)]
pub enum RLPxError {
    #[error("handshake error: {0}")]
    HandshakeError(String),
    #[error("invalid MAC")]
    InvalidMac(),
    #[error("cryptography error: {0}")]
    CryptographyError(String),
    #[error("invalid connection state")]
    InvalidState(),
    #[error("decode error: {0}")]
    DecodeError(#[from] RLPDecodeError),
    #[error("encode error: {0}")]
    EncodeError(#[from] RLPEncodeError),
    #[error("invalid peer id")]
    InvalidPeerId(),
    #[error("invalid recovery id")]
    InvalidRecoveryId(),
    #[error("invalid message length")]
    InvalidMessageLength(),
    #[error("{0} not found")]
    NotFound(String),
    #[error("transport error: {0}")]
    ConnectionError(String),
    #[error("unexpected message: {0}")]
    UnexpectedMessage(Message),
    #[error("message not handled")]
    MessageNotHandled(),
    #[error("peer disconnected: {0}")]
    Disconnected(super::disconnect::DisconnectReason),
    #[error("operation cancelled")]
    Cancelled(),
}

impl From<k256::ecdsa::Error> for RLPxError {
    fn from(err: k256::ecdsa::Error) -> Self {
        RLPxError::CryptographyError(err.to_string())
    }
}

impl From<k256::elliptic_curve::Error> for RLPxError {
    fn from(err: k256::elliptic_curve::Error) -> Self {
        RLPxError::CryptographyError(err.to_string())
    }
}

impl From<aes::cipher::InvalidLength> for RLPxError {
    fn from(err: aes::cipher::InvalidLength) -> Self {
        RLPxError::CryptographyError(err.to_string())
    }
}

impl From<aes::cipher::StreamCipherError> for RLPxError {
    fn from(err: aes::cipher::StreamCipherError) -> Self {
        RLPxError::CryptographyError(err.to_string())
    }
}

impl From<Cancelled> for RLPxError {
    fn from(_: Cancelled) -> Self {
        RLPxError::Cancelled()
    }
}
