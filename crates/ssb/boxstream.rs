//! The authenticated, chunked duplex stream built on top of the handshake's
//! session keys: each direction is sealed independently with its own key
//! and a monotonically advancing nonce, so a boxstream reader never needs
//! to see what the writer on the same connection sent.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use xsalsa20poly1305::aead::{AeadInPlace, KeyInit};
use xsalsa20poly1305::{Key, Nonce, Tag, XSalsa20Poly1305};

use crate::error::SSBError;
use crate::handshake::SSBSession;

pub const MAX_CHUNK_SIZE: usize = 4096;
const SEALED_HEADER_LEN: usize = 34;
const HEADER_PLAIN_LEN: usize = 18;
const GOODBYE_HEADER_PLAIN: [u8; HEADER_PLAIN_LEN] = [0u8; HEADER_PLAIN_LEN];

fn increment_nonce(nonce: &mut [u8; 24], by: u64) {
    // Nonces are big-endian counters per the NaCl/libsodium convention.
    let mut carry = by;
    for byte in nonce.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u64 + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
}

fn seal(key: &[u8; 32], nonce: &[u8; 24], plaintext: &mut Vec<u8>) -> [u8; 16] {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", plaintext)
        .expect("xsalsa20poly1305 encryption does not fail for in-memory buffers");
    tag.into()
}

fn open(key: &[u8; 32], nonce: &[u8; 24], ciphertext: &mut Vec<u8>, tag: &[u8; 16]) -> Result<(), SSBError> {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), b"", ciphertext, Tag::from_slice(tag))
        .map_err(|_| SSBError::Stream("boxstream decrypt failure".to_string()))
}

/// The write half of a boxstream: chunks outbound payloads to at most
/// [`MAX_CHUNK_SIZE`] bytes and seals each one under an advancing nonce.
pub struct BoxStreamWriter<W> {
    key: [u8; 32],
    nonce: [u8; 24],
    inner: W,
}

impl<W: AsyncWrite + Unpin> BoxStreamWriter<W> {
    pub fn new(inner: W, key: [u8; 32], nonce: [u8; 24]) -> Self {
        Self { key, nonce, inner }
    }

    pub fn from_session_c2s(inner: W, session: &SSBSession) -> Self {
        Self::new(inner, session.c2s_key, session.c2s_nonce)
    }

    pub fn from_session_s2c(inner: W, session: &SSBSession) -> Self {
        Self::new(inner, session.s2c_key, session.s2c_nonce)
    }

    /// Writes `payload`, splitting it into as many chunks as needed.
    pub async fn write(&mut self, payload: &[u8]) -> Result<(), SSBError> {
        for chunk in payload.chunks(MAX_CHUNK_SIZE) {
            self.write_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SSBError> {
        let header_nonce = self.nonce;
        let mut body_nonce = self.nonce;
        increment_nonce(&mut body_nonce, 1);
        increment_nonce(&mut self.nonce, 2);

        let mut body = chunk.to_vec();
        let body_tag = seal(&self.key, &body_nonce, &mut body);

        let mut header_plain = Vec::with_capacity(HEADER_PLAIN_LEN);
        header_plain.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
        header_plain.extend_from_slice(&body_tag);
        let header_tag = seal(&self.key, &header_nonce, &mut header_plain);

        let mut frame = Vec::with_capacity(SEALED_HEADER_LEN + body.len());
        frame.extend_from_slice(&header_tag);
        frame.extend_from_slice(&header_plain);
        frame.extend_from_slice(&body);

        self.inner
            .write_all(&frame)
            .await
            .map_err(|e| SSBError::ConnectionError(e.to_string()))
    }

    /// Sends the all-zero goodbye frame signalling a clean close.
    pub async fn write_goodbye(&mut self) -> Result<(), SSBError> {
        let header_nonce = self.nonce;
        increment_nonce(&mut self.nonce, 2);
        let mut header_plain = GOODBYE_HEADER_PLAIN.to_vec();
        let header_tag = seal(&self.key, &header_nonce, &mut header_plain);
        let mut frame = Vec::with_capacity(SEALED_HEADER_LEN);
        frame.extend_from_slice(&header_tag);
        frame.extend_from_slice(&header_plain);
        self.inner
            .write_all(&frame)
            .await
            .map_err(|e| SSBError::ConnectionError(e.to_string()))
    }
}

/// The read half of a boxstream.
pub struct BoxStreamReader<R> {
    key: [u8; 32],
    nonce: [u8; 24],
    inner: R,
}

/// What a single read off the wire produced.
pub enum BoxStreamFrame {
    Data(Vec<u8>),
    Goodbye,
}

impl<R: AsyncRead + Unpin> BoxStreamReader<R> {
    pub fn new(inner: R, key: [u8; 32], nonce: [u8; 24]) -> Self {
        Self { key, nonce, inner }
    }

    pub fn from_session_c2s(inner: R, session: &SSBSession) -> Self {
        Self::new(inner, session.c2s_key, session.c2s_nonce)
    }

    pub fn from_session_s2c(inner: R, session: &SSBSession) -> Self {
        Self::new(inner, session.s2c_key, session.s2c_nonce)
    }

    /// Reads and decrypts a single chunk, or detects the goodbye frame.
    pub async fn read_frame(&mut self) -> Result<BoxStreamFrame, SSBError> {
        let header_nonce = self.nonce;
        let mut body_nonce = self.nonce;
        increment_nonce(&mut body_nonce, 1);
        increment_nonce(&mut self.nonce, 2);

        let mut sealed_header = [0u8; SEALED_HEADER_LEN];
        self.inner
            .read_exact(&mut sealed_header)
            .await
            .map_err(|e| SSBError::ConnectionError(e.to_string()))?;
        let header_tag: [u8; 16] = sealed_header[..16].try_into().expect("slice is 16 bytes");
        let mut header_plain = sealed_header[16..].to_vec();
        open(&self.key, &header_nonce, &mut header_plain, &header_tag)?;

        if header_plain == GOODBYE_HEADER_PLAIN {
            return Ok(BoxStreamFrame::Goodbye);
        }

        let body_len = u16::from_be_bytes([header_plain[0], header_plain[1]]) as usize;
        if body_len > MAX_CHUNK_SIZE {
            return Err(SSBError::Stream(format!(
                "chunk body length {body_len} exceeds maximum of {MAX_CHUNK_SIZE}"
            )));
        }
        let body_tag: [u8; 16] = header_plain[2..18].try_into().expect("slice is 16 bytes");

        let mut body = vec![0u8; body_len];
        self.inner
            .read_exact(&mut body)
            .await
            .map_err(|e| SSBError::ConnectionError(e.to_string()))?;
        open(&self.key, &body_nonce, &mut body, &body_tag)?;

        Ok(BoxStreamFrame::Data(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn fixed_session() -> SSBSession {
        SSBSession {
            c2s_key: [0x42; 32],
            c2s_nonce: [0; 24],
            s2c_key: [0x24; 32],
            s2c_nonce: [0; 24],
        }
    }

    #[tokio::test]
    async fn echoes_small_payload() {
        let session = fixed_session();
        let (client_io, server_io) = duplex(8192);
        let mut writer = BoxStreamWriter::from_session_c2s(client_io, &session);
        let mut reader = BoxStreamReader::from_session_c2s(server_io, &session);

        writer.write(b"deadbeef").await.unwrap();
        match reader.read_frame().await.unwrap() {
            BoxStreamFrame::Data(data) => assert_eq!(data, b"deadbeef"),
            BoxStreamFrame::Goodbye => panic!("expected data frame"),
        }
    }

    #[tokio::test]
    async fn splits_large_payload_into_chunks() {
        let session = fixed_session();
        let (client_io, server_io) = duplex(1 << 20);
        let mut writer = BoxStreamWriter::from_session_c2s(client_io, &session);
        let mut reader = BoxStreamReader::from_session_c2s(server_io, &session);

        let payload = vec![0xabu8; MAX_CHUNK_SIZE * 2 + 37];
        writer.write(&payload).await.unwrap();

        let mut received = Vec::new();
        for _ in 0..3 {
            match reader.read_frame().await.unwrap() {
                BoxStreamFrame::Data(chunk) => received.extend_from_slice(&chunk),
                BoxStreamFrame::Goodbye => panic!("expected data frame"),
            }
        }
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn goodbye_frame_is_recognized() {
        let session = fixed_session();
        let (client_io, server_io) = duplex(8192);
        let mut writer = BoxStreamWriter::from_session_c2s(client_io, &session);
        let mut reader = BoxStreamReader::from_session_c2s(server_io, &session);

        writer.write_goodbye().await.unwrap();
        assert!(matches!(
            reader.read_frame().await.unwrap(),
            BoxStreamFrame::Goodbye
        ));
    }

    #[test]
    fn nonce_advances_by_two_per_chunk() {
        let mut nonce = [0u8; 24];
        increment_nonce(&mut nonce, 2);
        assert_eq!(nonce[23], 2);
        increment_nonce(&mut nonce, 2);
        assert_eq!(nonce[23], 4);
    }
}
