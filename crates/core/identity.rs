//! Node identity loading and persistence.
//!
//! RLPx identifies peers by the 64-byte uncompressed secp256k1 public key
//! with the leading `0x04` tag stripped. SSB identifies peers by their
//! Ed25519 public key. Both identities are generated once and persisted to
//! a hex-encoded secret key file so a node's address stays stable across
//! restarts.

use std::fs;
use std::path::Path;

use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ethereum_types::H512;
use k256::{
    ecdsa::SigningKey as Secp256k1SigningKey,
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey as Secp256k1PublicKey, SecretKey as Secp256k1SecretKey,
};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read identity key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex in identity key file")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("malformed secret key")]
    MalformedKey,
}

/// A persisted secp256k1 keypair, used as the RLPx node key.
pub struct Secp256k1Identity {
    pub secret_key: Secp256k1SecretKey,
}

impl Secp256k1Identity {
    pub fn generate() -> Self {
        Self {
            secret_key: Secp256k1SecretKey::random(&mut OsRng),
        }
    }

    /// Loads the identity from `path`, generating and persisting a new one
    /// if the file does not exist yet.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if let Ok(contents) = fs::read_to_string(path) {
            let bytes = hex::decode(contents.trim())?;
            let secret_key =
                Secp256k1SecretKey::from_slice(&bytes).map_err(|_| IdentityError::MalformedKey)?;
            return Ok(Self { secret_key });
        }
        let identity = Self::generate();
        fs::write(path, hex::encode(identity.secret_key.to_bytes()))?;
        Ok(identity)
    }

    pub fn public_key(&self) -> Secp256k1PublicKey {
        self.secret_key.public_key()
    }

    pub fn signing_key(&self) -> Secp256k1SigningKey {
        Secp256k1SigningKey::from(&self.secret_key)
    }

    /// The 64-byte node id: the uncompressed public key with the leading
    /// `0x04` tag byte stripped.
    pub fn node_id(&self) -> H512 {
        pubkey_to_node_id(&self.public_key())
    }
}

pub fn pubkey_to_node_id(pk: &Secp256k1PublicKey) -> H512 {
    let encoded = pk.to_encoded_point(false);
    let bytes = encoded.as_bytes();
    debug_assert_eq!(bytes[0], 4);
    H512::from_slice(&bytes[1..])
}

/// A persisted Ed25519 keypair, used as the SSB node identity.
#[derive(Clone)]
pub struct Ed25519Identity {
    pub signing_key: Ed25519SigningKey,
}

impl Ed25519Identity {
    pub fn generate() -> Self {
        Self {
            signing_key: Ed25519SigningKey::generate(&mut OsRng),
        }
    }

    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if let Ok(contents) = fs::read_to_string(path) {
            let bytes = hex::decode(contents.trim())?;
            let bytes: [u8; 32] = bytes.try_into().map_err(|_| IdentityError::MalformedKey)?;
            return Ok(Self {
                signing_key: Ed25519SigningKey::from_bytes(&bytes),
            });
        }
        let identity = Self::generate();
        fs::write(path, hex::encode(identity.signing_key.to_bytes()))?;
        Ok(identity)
    }

    pub fn public_key(&self) -> ed25519_dalek::VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The canonical `@<base64>.ed25519` SSB feed id for this identity.
    pub fn feed_id(&self) -> String {
        crate::fileutil::format_feed_id(&self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrip() {
        let identity = Secp256k1Identity::generate();
        let id = identity.node_id();
        assert_eq!(id.as_bytes().len(), 64);
    }

    #[test]
    fn ed25519_generate_has_distinct_keys() {
        let a = Ed25519Identity::generate();
        let b = Ed25519Identity::generate();
        assert_ne!(a.public_key().as_bytes(), b.public_key().as_bytes());
    }
}
