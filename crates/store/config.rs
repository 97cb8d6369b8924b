//! TOML-backed configuration for the RLPx and SSB services.
//!
//! Loaded with `toml` + `serde::Deserialize` rather than hand-rolled
//! parsing, mirroring how the rest of the ambient stack favors real crates
//! over bespoke parsers.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::StoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct SubProtocolConfig {
    pub name: String,
    pub version: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RLPxServiceOptions {
    pub listen_port: u16,
    pub advertised_port: u16,
    pub bind_address: String,
    pub client_id: String,
    pub identity_key_file: String,
    #[serde(default, rename = "sub_protocols")]
    pub sub_protocols: Vec<SubProtocolConfig>,
}

impl RLPxServiceOptions {
    fn validate(&self) -> Result<(), StoreError> {
        if self.listen_port == 0 {
            return Err(StoreError::Config(
                "rlpx.listen_port must be nonzero".to_string(),
            ));
        }
        if self.advertised_port == 0 {
            return Err(StoreError::Config(
                "rlpx.advertised_port must be nonzero".to_string(),
            ));
        }
        if self.client_id.trim().is_empty() {
            return Err(StoreError::Config(
                "rlpx.client_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SSBServiceOptions {
    pub bind_address: String,
    pub identity_key_file: String,
    pub network_identifier: String,
}

impl SSBServiceOptions {
    fn validate(&self) -> Result<(), StoreError> {
        let bytes = hex::decode(self.network_identifier.trim())
            .map_err(|_| StoreError::Config("ssb.network_identifier is not hex".to_string()))?;
        if bytes.len() != 32 {
            return Err(StoreError::Config(
                "ssb.network_identifier must be 32 bytes".to_string(),
            ));
        }
        Ok(())
    }

    pub fn network_identifier_bytes(&self) -> Result<[u8; 32], StoreError> {
        let bytes = hex::decode(self.network_identifier.trim())
            .map_err(|_| StoreError::Config("ssb.network_identifier is not hex".to_string()))?;
        bytes
            .try_into()
            .map_err(|_| StoreError::Config("ssb.network_identifier must be 32 bytes".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawConfig {
    rlpx: Option<RLPxServiceOptions>,
    ssb: Option<SSBServiceOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub rlpx: Option<RLPxServiceOptions>,
    pub ssb: Option<SSBServiceOptions>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|e| StoreError::Config(format!("reading config file: {e}")))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, StoreError> {
        let raw: RawConfig =
            toml::from_str(contents).map_err(|e| StoreError::Config(e.to_string()))?;
        if let Some(rlpx) = &raw.rlpx {
            rlpx.validate()?;
        }
        if let Some(ssb) = &raw.ssb {
            ssb.validate()?;
        }
        Ok(Config {
            rlpx: raw.rlpx,
            ssb: raw.ssb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [rlpx]
        listen_port = 30303
        advertised_port = 30303
        bind_address = "0.0.0.0"
        client_id = "p2pkit/0.1.0"
        identity_key_file = "rlpx_identity.hex"

        [[rlpx.sub_protocols]]
        name = "eth"
        version = 68

        [ssb]
        bind_address = "0.0.0.0:8008"
        identity_key_file = "ssb_identity.hex"
        network_identifier = "d4a1cb88a66f02f175a2a6c6a6c6ca969cbe4c0504ffdc9e2e5e3b1c8b4d1e9"
    "#;

    #[test]
    fn parses_sample_config() {
        let config = Config::parse(SAMPLE).unwrap();
        let rlpx = config.rlpx.unwrap();
        assert_eq!(rlpx.listen_port, 30303);
        assert_eq!(rlpx.sub_protocols.len(), 1);
        assert_eq!(rlpx.sub_protocols[0].name, "eth");
        let ssb = config.ssb.unwrap();
        assert_eq!(ssb.network_identifier_bytes().unwrap().len(), 32);
    }

    #[test]
    fn rejects_zero_port() {
        let bad = SAMPLE.replace("listen_port = 30303", "listen_port = 0");
        let err = Config::parse(&bad).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn rejects_empty_client_id() {
        let bad = SAMPLE.replace(r#"client_id = "p2pkit/0.1.0""#, r#"client_id = "   ""#);
        let err = Config::parse(&bad).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn rejects_short_network_identifier() {
        let bad = SAMPLE.replace(
            r#"network_identifier = "d4a1cb88a66f02f175a2a6c6a6c6ca969cbe4c0504ffdc9e2e5e3b1c8b4d1e9""#,
            r#"network_identifier = "d4a1""#,
        );
        let err = Config::parse(&bad).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
