//! Per-operation credential minting
//!
//! Every coordinator operation mints one fresh short-lived bearer credential
//! per node: issuer = the caller's own identity, audience = that node's
//! identity. There is no cache and no background refresh; a token minted for
//! one node must be rejected by every other node.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::NodeDescriptor;
use common::crypto::SecretKey;

/// Errors that can occur while minting credentials
///
/// Any of these is fatal to the whole operation: no network call is made
/// once signing has failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("key error: {0}")]
    Key(#[from] common::crypto::KeyError),
    #[error("system clock is before the unix epoch")]
    Clock,
}

/// Claims carried by every node-scoped bearer credential
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Caller identity
    pub iss: String,
    /// Identity of the one node this token is valid for
    pub aud: String,
    /// Expiry, unix time in seconds
    pub exp: u64,
}

/// Mints node-scoped bearer credentials, signed with the caller's key
pub struct TokenIssuer {
    issuer: String,
    key: EncodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(
        issuer: impl Into<String>,
        key: &SecretKey,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        let der = key.to_pkcs8_der()?;
        Ok(TokenIssuer {
            issuer: issuer.into(),
            key: EncodingKey::from_ed_der(&der),
            ttl,
        })
    }

    /// Mint one token per node, audience-bound to each node's identity
    pub fn issue(&self, nodes: &[NodeDescriptor]) -> Result<Vec<String>, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| AuthError::Clock)?;
        let exp = now.as_secs() + self.ttl.as_secs();
        let header = Header::new(Algorithm::EdDSA);

        nodes
            .iter()
            .map(|node| {
                let claims = Claims {
                    iss: self.issuer.clone(),
                    aud: node.id.clone(),
                    exp,
                };
                encode(&header, &claims, &self.key).map_err(AuthError::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use url::Url;

    fn node(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: id.to_string(),
            url: Url::parse("http://localhost:1").unwrap(),
        }
    }

    fn validation(audience: &str) -> Validation {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation
    }

    #[test]
    fn test_issue_one_token_per_node() {
        let key = SecretKey::generate();
        let issuer = TokenIssuer::new("caller", &key, Duration::from_secs(3600)).unwrap();
        let tokens = issuer
            .issue(&[node("node-a"), node("node-b"), node("node-c")])
            .unwrap();
        assert_eq!(tokens.len(), 3);

        let decoding = DecodingKey::from_ed_der(&key.public().to_bytes());
        let claims = decode::<Claims>(&tokens[1], &decoding, &validation("node-b"))
            .unwrap()
            .claims;
        assert_eq!(claims.iss, "caller");
        assert_eq!(claims.aud, "node-b");

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(claims.exp >= now + 3590 && claims.exp <= now + 3610);
    }

    #[test]
    fn test_audience_binding() {
        let key = SecretKey::generate();
        let issuer = TokenIssuer::new("caller", &key, Duration::from_secs(3600)).unwrap();
        let tokens = issuer.issue(&[node("node-a")]).unwrap();

        let decoding = DecodingKey::from_ed_der(&key.public().to_bytes());
        assert!(decode::<Claims>(&tokens[0], &decoding, &validation("node-a")).is_ok());
        assert!(decode::<Claims>(&tokens[0], &decoding, &validation("node-b")).is_err());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let key = SecretKey::generate();
        let issuer = TokenIssuer::new("caller", &key, Duration::from_secs(3600)).unwrap();
        let tokens = issuer.issue(&[node("node-a")]).unwrap();

        let other = SecretKey::generate();
        let decoding = DecodingKey::from_ed_der(&other.public().to_bytes());
        assert!(decode::<Claims>(&tokens[0], &decoding, &validation("node-a")).is_err());
    }
}
