//! The four-message secret-handshake: two unauthenticated hellos (proving
//! both sides know the same network identifier) followed by two encrypted
//! identity exchanges (proving both sides own their claimed long-term key),
//! ending with both peers holding an identical pair of directional boxstream
//! keys without ever having sent them over the wire.

use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use p2pkit_core::identity::Ed25519Identity;
use rand::rngs::OsRng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::crypto::{ed25519_pk_to_curve25519, ed25519_sk_to_curve25519, hmac_sha512_256, sha256};
use crate::error::SSBError;

const CLIENT_HELLO_LEN: usize = 64;
const SERVER_HELLO_LEN: usize = 64;
const CLIENT_IDENTITY_LEN: usize = 112;
const SERVER_ACCEPT_LEN: usize = 80;
const ZERO_NONCE: [u8; 24] = [0u8; 24];

/// The pair of directional boxstream keys/nonces both sides derive once the
/// handshake completes: client-to-server and server-to-client are fully
/// independent, each with its own key and 24-byte nonce counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSBSession {
    pub c2s_key: [u8; 32],
    pub c2s_nonce: [u8; 24],
    pub s2c_key: [u8; 32],
    pub s2c_nonce: [u8; 24],
}

fn secretbox_seal(key: &[u8; 32], nonce: &[u8; 24], plaintext: &[u8]) -> Vec<u8> {
    use xsalsa20poly1305::aead::{AeadInPlace, KeyInit};
    use xsalsa20poly1305::{Key, Nonce, XSalsa20Poly1305};

    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer)
        .expect("xsalsa20poly1305 encryption does not fail for in-memory buffers");
    let mut sealed = Vec::with_capacity(16 + buffer.len());
    sealed.extend_from_slice(&tag);
    sealed.extend_from_slice(&buffer);
    sealed
}

fn secretbox_open(key: &[u8; 32], nonce: &[u8; 24], sealed: &[u8]) -> Result<Vec<u8>, SSBError> {
    use xsalsa20poly1305::aead::{AeadInPlace, KeyInit};
    use xsalsa20poly1305::{Key, Nonce, Tag, XSalsa20Poly1305};

    if sealed.len() < 16 {
        return Err(SSBError::Handshake("sealed message too short".to_string()));
    }
    let (tag, ciphertext) = sealed.split_at(16);
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer, Tag::from_slice(tag))
        .map_err(|_| SSBError::Handshake("failed to decrypt handshake message".to_string()))?;
    Ok(buffer)
}

struct EphemeralKeypair {
    secret: X25519StaticSecret,
    public: X25519PublicKey,
}

impl EphemeralKeypair {
    fn generate() -> Self {
        let secret = X25519StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }
}

/// Derives the shared boxstream session from the three Diffie-Hellman
/// results (`ab`, `aB`, `Ab`) both peers arrive at independently.
#[allow(clippy::too_many_arguments)]
fn derive_session(
    network_id: &[u8; 32],
    ab: &[u8; 32],
    a_big_b: &[u8; 32],
    big_a_b: &[u8; 32],
    client_lt_pub: &VerifyingKey,
    server_lt_pub: &VerifyingKey,
    server_ephemeral_pub: &X25519PublicKey,
) -> SSBSession {
    let base = sha256(&sha256(
        &[
            network_id.as_slice(),
            ab.as_slice(),
            a_big_b.as_slice(),
            big_a_b.as_slice(),
        ]
        .concat(),
    ));
    let c2s_key = sha256(&[base.as_slice(), server_lt_pub.as_bytes().as_slice()].concat());
    let s2c_key = sha256(&[base.as_slice(), client_lt_pub.as_bytes().as_slice()].concat());

    let c2s_nonce_full = hmac_sha512_256(network_id, server_ephemeral_pub.as_bytes());
    let s2c_nonce_full = hmac_sha512_256(network_id, client_lt_pub.as_bytes());

    let mut c2s_nonce = [0u8; 24];
    c2s_nonce.copy_from_slice(&c2s_nonce_full[..24]);
    let mut s2c_nonce = [0u8; 24];
    s2c_nonce.copy_from_slice(&s2c_nonce_full[..24]);

    SSBSession {
        c2s_key,
        c2s_nonce,
        s2c_key,
        s2c_nonce,
    }
}

async fn send(stream: &mut (impl AsyncWrite + Unpin), bytes: &[u8]) -> Result<(), SSBError> {
    stream
        .write_all(bytes)
        .await
        .map_err(|e| SSBError::ConnectionError(e.to_string()))
}

async fn recv(stream: &mut (impl AsyncRead + Unpin), len: usize) -> Result<Vec<u8>, SSBError> {
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| SSBError::ConnectionError(e.to_string()))?;
    Ok(buf)
}

/// Runs the client side of the handshake. The client must already know the
/// server's long-term public key (out-of-band, as in the SSB invite model).
pub async fn client_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    network_id: [u8; 32],
    local: &Ed25519Identity,
    server_lt_pub: &VerifyingKey,
) -> Result<SSBSession, SSBError> {
    let client_eph = EphemeralKeypair::generate();

    // 1. client -> server hello
    let client_hello_mac = hmac_sha512_256(&network_id, client_eph.public.as_bytes());
    let mut client_hello = Vec::with_capacity(CLIENT_HELLO_LEN);
    client_hello.extend_from_slice(&client_hello_mac);
    client_hello.extend_from_slice(client_eph.public.as_bytes());
    send(stream, &client_hello).await?;

    // 2. server -> client hello
    let server_hello = recv(stream, SERVER_HELLO_LEN).await?;
    let (server_mac, server_eph_pub_bytes) = server_hello.split_at(32);
    let expected_mac = hmac_sha512_256(&network_id, server_eph_pub_bytes);
    if expected_mac.as_slice() != server_mac {
        return Err(SSBError::Handshake(
            "server hello MAC does not match our network identifier".to_string(),
        ));
    }
    let server_eph_pub = X25519PublicKey::from(
        <[u8; 32]>::try_from(server_eph_pub_bytes)
            .map_err(|_| SSBError::Handshake("malformed server ephemeral key".to_string()))?,
    );

    // ab  = curve25519(client_eph_priv, server_eph_pub)
    // aB  = curve25519(client_eph_priv, server_lt_pub)
    // Ab  = curve25519(client_lt_priv,  server_eph_pub)
    let ab = client_eph.secret.diffie_hellman(&server_eph_pub);
    let a_big_b = client_eph
        .secret
        .diffie_hellman(&ed25519_pk_to_curve25519(server_lt_pub)?);
    let client_lt_curve_secret = ed25519_sk_to_curve25519(&local.signing_key);
    let big_a_b = client_lt_curve_secret.diffie_hellman(&server_eph_pub);

    // 3. client -> server identity
    let client_lt_pub = local.public_key();
    let identity_key = sha256(
        &[network_id.as_slice(), ab.as_bytes().as_slice(), a_big_b.as_bytes().as_slice()].concat(),
    );
    let sig_payload = [
        network_id.as_slice(),
        server_lt_pub.as_bytes().as_slice(),
        sha256(ab.as_bytes()).as_slice(),
    ]
    .concat();
    let client_sig: Signature = local.signing_key.sign(&sig_payload);
    let mut identity_plain = Vec::with_capacity(96);
    identity_plain.extend_from_slice(&client_sig.to_bytes());
    identity_plain.extend_from_slice(client_lt_pub.as_bytes());
    let identity_sealed = secretbox_seal(&identity_key, &ZERO_NONCE, &identity_plain);
    debug_assert_eq!(identity_sealed.len(), CLIENT_IDENTITY_LEN);
    send(stream, &identity_sealed).await?;

    // 4. server -> client accept
    let accept_key = sha256(
        &[
            network_id.as_slice(),
            ab.as_bytes().as_slice(),
            a_big_b.as_bytes().as_slice(),
            big_a_b.as_bytes().as_slice(),
        ]
        .concat(),
    );
    let accept_sealed = recv(stream, SERVER_ACCEPT_LEN).await?;
    let accept_plain = secretbox_open(&accept_key, &ZERO_NONCE, &accept_sealed)?;
    let server_sig_bytes: [u8; 64] = accept_plain
        .as_slice()
        .try_into()
        .map_err(|_| SSBError::Handshake("malformed server accept signature".to_string()))?;
    let server_sig = Signature::from_bytes(&server_sig_bytes);
    let expected_accept_payload = [
        network_id.as_slice(),
        &client_sig.to_bytes(),
        client_lt_pub.as_bytes(),
        sha256(ab.as_bytes()).as_slice(),
    ]
    .concat();
    server_lt_pub
        .verify(&expected_accept_payload, &server_sig)
        .map_err(|_| SSBError::Handshake("server accept signature did not verify".to_string()))?;

    Ok(derive_session(
        &network_id,
        ab.as_bytes(),
        a_big_b.as_bytes(),
        big_a_b.as_bytes(),
        &client_lt_pub,
        server_lt_pub,
        &server_eph_pub,
    ))
}

/// Runs the server side of the handshake, learning the client's long-term
/// public key as part of message 3.
pub async fn server_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    network_id: [u8; 32],
    local: &Ed25519Identity,
) -> Result<(SSBSession, VerifyingKey), SSBError> {
    let server_eph = EphemeralKeypair::generate();

    // 1. client -> server hello
    let client_hello = recv(stream, CLIENT_HELLO_LEN).await?;
    let (client_mac, client_eph_pub_bytes) = client_hello.split_at(32);
    let expected_mac = hmac_sha512_256(&network_id, client_eph_pub_bytes);
    if expected_mac.as_slice() != client_mac {
        return Err(SSBError::Handshake(
            "client hello MAC does not match our network identifier".to_string(),
        ));
    }
    let client_eph_pub = X25519PublicKey::from(
        <[u8; 32]>::try_from(client_eph_pub_bytes)
            .map_err(|_| SSBError::Handshake("malformed client ephemeral key".to_string()))?,
    );

    // 2. server -> client hello
    let server_hello_mac = hmac_sha512_256(&network_id, server_eph.public.as_bytes());
    let mut server_hello = Vec::with_capacity(SERVER_HELLO_LEN);
    server_hello.extend_from_slice(&server_hello_mac);
    server_hello.extend_from_slice(server_eph.public.as_bytes());
    send(stream, &server_hello).await?;

    // ab = curve25519(server_eph_priv, client_eph_pub)
    // aB = curve25519(server_lt_priv,  client_eph_pub)  (computed from the server's side)
    let ab = server_eph.secret.diffie_hellman(&client_eph_pub);
    let server_lt_curve_secret = ed25519_sk_to_curve25519(&local.signing_key);
    let a_big_b = server_lt_curve_secret.diffie_hellman(&client_eph_pub);

    // 3. client -> server identity
    let identity_key = sha256(
        &[network_id.as_slice(), ab.as_bytes().as_slice(), a_big_b.as_bytes().as_slice()].concat(),
    );
    let identity_sealed = recv(stream, CLIENT_IDENTITY_LEN).await?;
    let identity_plain = secretbox_open(&identity_key, &ZERO_NONCE, &identity_sealed)?;
    if identity_plain.len() != 96 {
        return Err(SSBError::Handshake(
            "malformed client identity message".to_string(),
        ));
    }
    let client_sig_bytes: [u8; 64] = identity_plain[..64]
        .try_into()
        .expect("slice is exactly 64 bytes");
    let client_sig = Signature::from_bytes(&client_sig_bytes);
    let client_lt_pub_bytes: [u8; 32] = identity_plain[64..]
        .try_into()
        .expect("slice is exactly 32 bytes");
    let client_lt_pub = VerifyingKey::from_bytes(&client_lt_pub_bytes)
        .map_err(|_| SSBError::Handshake("malformed client long-term public key".to_string()))?;

    let server_lt_pub = local.public_key();
    let sig_payload = [
        network_id.as_slice(),
        server_lt_pub.as_bytes().as_slice(),
        sha256(ab.as_bytes()).as_slice(),
    ]
    .concat();
    client_lt_pub
        .verify(&sig_payload, &client_sig)
        .map_err(|_| SSBError::Handshake("client identity signature did not verify".to_string()))?;

    // 4. server -> client accept
    // Ab = curve25519(server_eph_priv, client_lt_pub), mirroring the client's Ab.
    let big_a_b = server_eph
        .secret
        .diffie_hellman(&ed25519_pk_to_curve25519(&client_lt_pub)?);
    let accept_key = sha256(
        &[
            network_id.as_slice(),
            ab.as_bytes().as_slice(),
            a_big_b.as_bytes().as_slice(),
            big_a_b.as_bytes().as_slice(),
        ]
        .concat(),
    );
    let accept_payload = [
        network_id.as_slice(),
        &client_sig.to_bytes(),
        client_lt_pub.as_bytes(),
        sha256(ab.as_bytes()).as_slice(),
    ]
    .concat();
    let server_sig: Signature = local.signing_key.sign(&accept_payload);
    let accept_sealed = secretbox_seal(&accept_key, &ZERO_NONCE, &server_sig.to_bytes());
    debug_assert_eq!(accept_sealed.len(), SERVER_ACCEPT_LEN);
    send(stream, &accept_sealed).await?;

    let session = derive_session(
        &network_id,
        ab.as_bytes(),
        a_big_b.as_bytes(),
        big_a_b.as_bytes(),
        &client_lt_pub,
        &server_lt_pub,
        &client_eph_pub,
    );
    Ok((session, client_lt_pub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn handshake_yields_identical_sessions() {
        let network_id = [0x11u8; 32];
        let client_identity = Ed25519Identity::generate();
        let server_identity = Ed25519Identity::generate();
        let server_lt_pub = server_identity.public_key();

        let (mut client_stream, mut server_stream) = duplex(4096);

        let client_fut =
            client_handshake(&mut client_stream, network_id, &client_identity, &server_lt_pub);
        let server_fut = server_handshake(&mut server_stream, network_id, &server_identity);

        let (client_result, server_result) = tokio::join!(client_fut, server_fut);
        let client_session = client_result.expect("client handshake should succeed");
        let (server_session, learned_client_pub) =
            server_result.expect("server handshake should succeed");

        assert_eq!(client_session, server_session);
        assert_eq!(learned_client_pub, client_identity.public_key());
    }

    #[tokio::test]
    async fn wrong_network_id_is_rejected() {
        let client_identity = Ed25519Identity::generate();
        let server_identity = Ed25519Identity::generate();
        let server_lt_pub = server_identity.public_key();

        let (mut client_stream, mut server_stream) = duplex(4096);

        let client_fut =
            client_handshake(&mut client_stream, [0x11u8; 32], &client_identity, &server_lt_pub);
        let server_fut = server_handshake(&mut server_stream, [0x22u8; 32], &server_identity);

        let (client_result, _server_result) = tokio::join!(client_fut, server_fut);
        assert!(client_result.is_err());
    }
}
