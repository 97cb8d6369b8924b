//! Base64 key file helpers.
//!
//! `identity.rs` persists node keys as hex, which is what RLPx node-key
//! files conventionally use. Secure Scuttlebutt instead identifies feeds by
//! a base64-encoded Ed25519 public key wrapped as `@<base64>.ed25519`, so
//! SSB-facing code needs the same read/write/parse support in base64.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::VerifyingKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileUtilError {
    #[error("failed to read key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid base64 in key file")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("malformed feed id, expected @<base64>.ed25519")]
    MalformedFeedId,
    #[error("malformed public key")]
    MalformedKey,
}

/// Formats a feed's public key as the canonical SSB feed id.
pub fn format_feed_id(key: &VerifyingKey) -> String {
    format!("@{}.ed25519", BASE64.encode(key.as_bytes()))
}

/// Parses a `@<base64>.ed25519` feed id back into a public key.
pub fn parse_feed_id(feed_id: &str) -> Result<VerifyingKey, FileUtilError> {
    let body = feed_id
        .strip_prefix('@')
        .and_then(|s| s.strip_suffix(".ed25519"))
        .ok_or(FileUtilError::MalformedFeedId)?;
    let bytes = BASE64.decode(body)?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| FileUtilError::MalformedKey)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| FileUtilError::MalformedKey)
}

/// Reads a base64-encoded secret scalar from `path`, trimming surrounding
/// whitespace the way `identity.rs`'s hex reader does.
pub fn read_base64_key_file(path: &Path) -> Result<Vec<u8>, FileUtilError> {
    let contents = fs::read_to_string(path)?;
    Ok(BASE64.decode(contents.trim())?)
}

/// Writes `bytes` to `path` as base64, the SSB-side counterpart to
/// `identity.rs`'s hex key file writer.
pub fn write_base64_key_file(path: &Path, bytes: &[u8]) -> Result<(), FileUtilError> {
    fs::write(path, BASE64.encode(bytes))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn feed_id_roundtrip() {
        let key = SigningKey::generate(&mut OsRng).verifying_key();
        let feed_id = format_feed_id(&key);
        assert!(feed_id.starts_with('@'));
        assert!(feed_id.ends_with(".ed25519"));
        assert_eq!(parse_feed_id(&feed_id).unwrap(), key);
    }

    #[test]
    fn parse_feed_id_rejects_malformed_input() {
        assert!(parse_feed_id("not-a-feed-id").is_err());
        assert!(parse_feed_id("@invalid-base64!!.ed25519").is_err());
    }

    #[test]
    fn base64_key_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("p2pkit-fileutil-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("secret.b64");
        write_base64_key_file(&path, b"some secret bytes").unwrap();
        let read_back = read_base64_key_file(&path).unwrap();
        assert_eq!(read_back, b"some secret bytes");
        let _ = fs::remove_dir_all(&dir);
    }
}
