/**
 * Per-operation credential minting.
 *  One short-lived, node-scoped bearer token
 *  per node per coordinator operation.
 */
pub mod auth;
/**
 * Logical collection name to node-side
 *  schema identifier routing.
 */
pub mod collections;
/**
 * Client configuration: caller identity, signing
 *  key, node topology, collection table.
 */
pub mod config;
pub mod error;
/**
 * Per-node transport. One authenticated HTTP call
 *  against one node, failures normalized into a
 *  uniform per-node outcome.
 */
pub mod node;
/**
 * In-process mock nodes for exercising the full
 *  client stack without a real cluster.
 */
pub mod testkit;

mod delete;
mod read;
mod write;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use uuid::Uuid;

use crate::auth::TokenIssuer;
use crate::collections::CollectionRouter;
use crate::node::CREATE_PATH;
use common::crypto::ShareEngine;
use common::record::Filter;

pub use crate::config::{Config, NodeDescriptor};
pub use crate::delete::{DeleteError, DeleteOutcome};
pub use crate::error::ClientError;
pub use crate::node::NodeFailure;
pub use crate::read::{ReadError, ReadOutcome, ReconstructedRecord};
pub use crate::write::{WriteError, WriteReceipt};

/// The secret-sharing storage client
///
/// Splits protected record fields into one share per configured node, fans
/// writes out to every node under node-scoped credentials, and on read
/// collects shares from all nodes and reconstructs only the records for
/// which a full share set is present.
///
/// The cluster key lives inside this value behind a single-initialization
/// barrier: share one `VaultClient` per process, or data written through one
/// client cannot be reconstructed through another.
#[derive(Debug)]
pub struct VaultClient {
    config: Config,
    http: reqwest::Client,
    issuer: TokenIssuer,
    router: CollectionRouter,
    engine: ShareEngine,
}

impl VaultClient {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        if config.nodes.len() < 2 {
            return Err(ClientError::Config(format!(
                "secret sharing requires at least 2 nodes, got {}",
                config.nodes.len()
            )));
        }
        for (i, node) in config.nodes.iter().enumerate() {
            if config.nodes[..i].iter().any(|n| n.id == node.id) {
                return Err(ClientError::Config(format!(
                    "duplicate node identity: {}",
                    node.id
                )));
            }
            node.url.join(CREATE_PATH).map_err(|e| {
                ClientError::Config(format!("node {} has an unusable url: {}", node.id, e))
            })?;
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let issuer = TokenIssuer::new(&config.caller_id, &config.signing_key, config.token_ttl())?;
        let router = CollectionRouter::new(config.collections.clone());
        let engine = ShareEngine::new(config.nodes.len());

        Ok(VaultClient {
            config,
            http,
            issuer,
            router,
            engine,
        })
    }

    /// The configured node topology, in share order
    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.config.nodes
    }

    /// Equality filter on a matchable protected field
    ///
    /// Computes the deterministic share every node holds for `value`, so the
    /// nodes can match on it without reconstruction. Filtering on a blind or
    /// additive field is not possible.
    pub fn match_filter(&self, field: &str, value: &str) -> Result<Filter, ClientError> {
        let share = self.engine.matchable(value)?;
        let mut wrapper = serde_json::Map::new();
        wrapper.insert(
            common::record::SHARE_KEY.to_string(),
            serde_json::Value::String(share.encode()),
        );
        let mut filter = Filter::new();
        filter.insert(field.to_string(), serde_json::Value::Object(wrapper));
        Ok(filter)
    }

    /// Filter selecting a single record by identifier
    pub fn id_filter(id: Uuid) -> Filter {
        let mut filter = Filter::new();
        filter.insert(
            "_id".to_string(),
            serde_json::Value::String(id.to_string()),
        );
        filter
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::crypto::SecretKey;
    use std::collections::HashMap;
    use url::Url;

    fn config(node_ids: &[&str]) -> Config {
        Config {
            caller_id: "did:splitvault:test".to_string(),
            signing_key: SecretKey::generate(),
            nodes: node_ids
                .iter()
                .map(|id| NodeDescriptor {
                    id: id.to_string(),
                    url: Url::parse("http://localhost:1").unwrap(),
                })
                .collect(),
            collections: HashMap::new(),
            request_timeout_secs: 5,
            token_ttl_secs: 3600,
            cleanup_partial_writes: false,
        }
    }

    #[test]
    fn test_new_rejects_single_node() {
        assert!(matches!(
            VaultClient::new(config(&["only"])),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_new_rejects_duplicate_node_ids() {
        assert!(matches!(
            VaultClient::new(config(&["node-a", "node-a"])),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_id_filter_shape() {
        let id = Uuid::new_v4();
        let filter = VaultClient::id_filter(id);
        assert_eq!(
            serde_json::Value::Object(filter),
            serde_json::json!({ "_id": id.to_string() })
        );
    }

    #[test]
    fn test_match_filter_is_deterministic() {
        let vault = VaultClient::new(config(&["node-a", "node-b"])).unwrap();
        let first = vault.match_filter("source", "EU DPO").unwrap();
        let second = vault.match_filter("source", "EU DPO").unwrap();
        assert_eq!(first, second);

        let other = vault.match_filter("source", "US SEC").unwrap();
        assert_ne!(first, other);
    }
}
