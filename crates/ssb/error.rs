use p2pkit_core::completion::Cancelled;
use thiserror::Error;

/// Error taxonomy for the SSB handshake, boxstream, and RPC layers: shape,
/// signature, and decrypt failures are fatal and the caller must close the
/// connection on any of them.
#[derive(Debug, Error)]
pub enum SSBError {
    #[error("handshake error: {0}")]
    Handshake(String),
    #[error("boxstream error: {0}")]
    Stream(String),
    #[error("transport error: {0}")]
    ConnectionError(String),
    #[error("malformed RPC frame: {0}")]
    MalformedFrame(String),
    #[error("operation cancelled")]
    Cancelled(),
}

impl From<Cancelled> for SSBError {
    fn from(_: Cancelled) -> Self {
        SSBError::Cancelled()
    }
}
