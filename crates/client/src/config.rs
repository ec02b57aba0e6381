use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ClientError;
use common::crypto::SecretKey;

fn default_request_timeout_secs() -> u64 {
    30
}

// one hour
fn default_token_ttl_secs() -> u64 {
    3600
}

/// One storage node of the cluster
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDescriptor {
    /// Node identity; used as credential audience and as a routing key
    pub id: String,
    /// Base network address
    pub url: Url,
}

/// Storage client configuration
///
/// Supplied by the environment, typically from a TOML file:
///
/// ```toml
/// caller_id = "did:splitvault:reporting"
/// signing_key = "0x4f3c..."
///
/// [[nodes]]
/// id = "node-alpha"
/// url = "https://alpha.cluster.example"
///
/// [[nodes]]
/// id = "node-beta"
/// url = "https://beta.cluster.example"
///
/// [collections]
/// findings = "schema-findings-v1"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Caller identity, the `iss` claim of every minted credential
    pub caller_id: String,
    /// Hex-encoded Ed25519 signing key for credential minting
    pub signing_key: SecretKey,
    /// Ordered node topology; share *i* of every protected field goes to node *i*
    pub nodes: Vec<NodeDescriptor>,
    /// Logical collection name to node-side schema identifier
    pub collections: HashMap<String, String>,
    /// Per-node-call timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Credential lifetime in seconds
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Best-effort removal of already-landed shares when a write is not
    /// unanimous; off by default (the reference behavior leaves them behind)
    #[serde(default)]
    pub cleanup_partial_writes: bool,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ClientError> {
        toml::from_str(raw).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClientError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_toml_with_defaults() {
        let key = SecretKey::generate();
        let raw = format!(
            r#"
            caller_id = "did:splitvault:test"
            signing_key = "{}"

            [[nodes]]
            id = "node-alpha"
            url = "https://alpha.cluster.example"

            [[nodes]]
            id = "node-beta"
            url = "https://beta.cluster.example"

            [collections]
            findings = "schema-findings-v1"
            "#,
            key.to_hex()
        );

        let config = Config::from_toml_str(&raw).unwrap();
        assert_eq!(config.caller_id, "did:splitvault:test");
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].id, "node-beta");
        assert_eq!(config.collections["findings"], "schema-findings-v1");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.token_ttl(), Duration::from_secs(3600));
        assert!(!config.cleanup_partial_writes);
        assert_eq!(config.signing_key.public(), key.public());
    }

    #[test]
    fn test_parse_toml_rejects_bad_key() {
        let raw = r#"
            caller_id = "did:splitvault:test"
            signing_key = "not-hex"
            nodes = []
            [collections]
        "#;
        assert!(matches!(
            Config::from_toml_str(raw),
            Err(ClientError::Config(_))
        ));
    }
}
