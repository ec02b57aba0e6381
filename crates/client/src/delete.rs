//! Delete fan-out
//!
//! A delete is issued identically to all N nodes under the same
//! all-or-nothing discipline as writes: the operation is reported failed
//! unless every node acknowledged, and no compensation is attempted for the
//! nodes that already removed their partial records.

use futures::future::join_all;

use crate::auth::AuthError;
use crate::error::ClientError;
use crate::node::{NodeClient, NodeFailure};
use crate::VaultClient;
use common::record::Filter;

/// Errors raised by the delete path
#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Fewer than N nodes acknowledged; the cluster now disagrees about the
    /// affected records
    #[error("partial delete: {succeeded} of {total} nodes acknowledged")]
    Partial {
        total: usize,
        succeeded: usize,
        failures: Vec<(String, NodeFailure)>,
    },
}

/// Result of a unanimous delete
#[derive(Debug)]
pub struct DeleteOutcome {
    /// Per-node count of removed partial records, in node order
    pub deleted: Vec<u64>,
}

impl VaultClient {
    /// Remove the records matching a filter from every node
    pub async fn delete(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<DeleteOutcome, DeleteError> {
        let schema = self.router.schema(collection)?.to_string();
        let tokens = self.issuer.issue(&self.config.nodes)?;
        let total = self.config.nodes.len();

        tracing::debug!("deleting from {} nodes under schema {}", total, schema);

        let calls = self
            .config
            .nodes
            .iter()
            .zip(tokens.iter())
            .map(|(node, token)| {
                let schema = schema.as_str();
                async move {
                    NodeClient::new(&self.http, node)
                        .delete(token, schema, filter)
                        .await
                }
            });
        let results = join_all(calls).await;

        let mut deleted = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (node, result) in self.config.nodes.iter().zip(results) {
            match result {
                Ok(count) => deleted.push(count),
                Err(failure) => {
                    tracing::warn!("delete failed at node {}: {}", node.id, failure);
                    failures.push((node.id.clone(), failure));
                }
            }
        }

        if failures.is_empty() {
            tracing::info!("deleted from all {} nodes: {:?}", total, deleted);
            Ok(DeleteOutcome { deleted })
        } else {
            Err(DeleteError::Partial {
                total,
                succeeded: total - failures.len(),
                failures,
            })
        }
    }
}
