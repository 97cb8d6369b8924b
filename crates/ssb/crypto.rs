//! Small cryptographic primitives the handshake needs that aren't provided
//! directly by `ed25519-dalek`/`x25519-dalek`: converting long-term Ed25519
//! keys to their Curve25519 (Montgomery-form) counterparts so they can take
//! part in a Diffie-Hellman exchange alongside the ephemeral X25519 keys.

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha512, Sha512_256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::error::SSBError;

/// Converts a long-term Ed25519 public key to its X25519 (Montgomery u
/// coordinate) form, the way libsodium's `crypto_sign_ed25519_pk_to_curve25519`
/// does.
pub fn ed25519_pk_to_curve25519(pk: &VerifyingKey) -> Result<X25519PublicKey, SSBError> {
    let compressed = CompressedEdwardsY(pk.to_bytes());
    let point = compressed
        .decompress()
        .ok_or_else(|| SSBError::Handshake("peer public key is not a valid point".to_string()))?;
    Ok(X25519PublicKey::from(point.to_montgomery().to_bytes()))
}

/// Converts a long-term Ed25519 signing key to its X25519 scalar form, the
/// way libsodium's `crypto_sign_ed25519_sk_to_curve25519` does: hash the
/// 32-byte seed with SHA-512 and keep the first half (clamping happens
/// inside `StaticSecret::from`).
pub fn ed25519_sk_to_curve25519(signing_key: &SigningKey) -> X25519StaticSecret {
    let digest = Sha512::digest(signing_key.to_bytes());
    let mut scalar_bytes = [0u8; 32];
    scalar_bytes.copy_from_slice(&digest[..32]);
    X25519StaticSecret::from(scalar_bytes)
}

/// `HMAC-SHA-512-256(key, message)`, truncated to the dedicated 256-bit
/// SHA-512/256 hash rather than truncating SHA-512's output, matching the
/// secret-handshake protocol's choice of hash function.
pub fn hmac_sha512_256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac =
        Hmac::<Sha512_256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::Sha256;
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn ed25519_to_curve25519_dh_matches_both_directions() {
        let a = SigningKey::generate(&mut OsRng);
        let b_eph = X25519StaticSecret::random_from_rng(OsRng);
        let b_pub = X25519PublicKey::from(&b_eph);

        let a_curve_sk = ed25519_sk_to_curve25519(&a);
        let a_curve_pk = ed25519_pk_to_curve25519(&a.verifying_key()).unwrap();

        let shared_from_b = b_eph.diffie_hellman(&a_curve_pk);
        let shared_from_a = a_curve_sk.diffie_hellman(&b_pub);
        assert_eq!(shared_from_a.as_bytes(), shared_from_b.as_bytes());
    }
}
