pub mod boxstream;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod rpc;

pub use boxstream::{BoxStreamReader, BoxStreamWriter};
pub use error::SSBError;
pub use handshake::{client_handshake, server_handshake, SSBSession};
pub use rpc::{BodyType, RpcFrame, RpcMultiplexer};
