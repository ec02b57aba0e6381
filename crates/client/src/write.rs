//! Write coordinator
//!
//! A write projects one logical record onto N partial records, one per node,
//! and dispatches them concurrently under node-scoped credentials. The
//! operation succeeds if and only if every node acknowledged its partial
//! record. On a non-unanimous write the record must be treated as if it does
//! not exist: it can never be reconstructed. Nodes that did store their share
//! keep it unless `cleanup_partial_writes` is configured, in which case a
//! best-effort delete is fanned out to them.

use futures::future::join_all;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::error::ClientError;
use crate::node::{NodeClient, NodeFailure};
use crate::VaultClient;
use common::record::{FieldValue, PartialRecord, Record};

/// Errors raised by the write path
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("share error: {0}")]
    Share(#[from] common::crypto::ShareError),
    /// Fewer than N nodes acknowledged; the record cannot be reconstructed
    /// and must be treated as nonexistent, even though `succeeded` nodes
    /// already persisted their share
    #[error("partial write of record {id}: {succeeded} of {total} nodes acknowledged")]
    Partial {
        id: Uuid,
        total: usize,
        succeeded: usize,
        failures: Vec<(String, NodeFailure)>,
    },
}

/// Receipt for a unanimous write
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub id: Uuid,
}

impl VaultClient {
    /// Write a record under a freshly generated identifier
    pub async fn write(
        &self,
        collection: &str,
        record: &Record,
    ) -> Result<WriteReceipt, WriteError> {
        self.write_with_id(collection, Uuid::new_v4(), record).await
    }

    /// Write a record under a caller-supplied identifier
    ///
    /// Reusing an identifier is how an "update" is expressed: a new full set
    /// of partial records is produced and node-side storage overwrites or
    /// appends per its own semantics. Concurrent writes under the same
    /// identifier are not coordinated against each other.
    pub async fn write_with_id(
        &self,
        collection: &str,
        id: Uuid,
        record: &Record,
    ) -> Result<WriteReceipt, WriteError> {
        let schema = self.router.schema(collection)?.to_string();
        if record.fields().any(|(name, _)| name == "_id") {
            return Err(
                ClientError::InvalidRecord("the field name _id is reserved".to_string()).into(),
            );
        }

        // project the logical record onto one partial record per node:
        // partial i carries every plaintext field verbatim and share i of
        // every protected field
        let total = self.config.nodes.len();
        let mut partials: Vec<PartialRecord> = (0..total).map(|_| PartialRecord::new(id)).collect();
        for (name, value) in record.fields() {
            match value {
                FieldValue::Plain(plain) => {
                    for partial in &mut partials {
                        partial.insert_plain(name, plain.clone());
                    }
                }
                FieldValue::Protected(secret) => {
                    let shares = self.engine.split(secret)?;
                    for (partial, share) in partials.iter_mut().zip(shares) {
                        partial.insert_share(name, share);
                    }
                }
            }
        }

        // credentials are minted fresh per operation; a signing failure
        // aborts before any network call is made
        let tokens = self.issuer.issue(&self.config.nodes)?;

        tracing::debug!(
            "writing record {} to {} nodes under schema {}",
            id,
            total,
            schema
        );

        let calls = self
            .config
            .nodes
            .iter()
            .zip(tokens.iter())
            .zip(partials.iter())
            .map(|((node, token), partial)| {
                let schema = schema.as_str();
                async move {
                    NodeClient::new(&self.http, node)
                        .create(token, schema, partial)
                        .await
                }
            });
        let results = join_all(calls).await;

        let mut failures = Vec::new();
        for (node, result) in self.config.nodes.iter().zip(results) {
            if let Err(failure) = result {
                tracing::warn!("write of record {} failed at node {}: {}", id, node.id, failure);
                failures.push((node.id.clone(), failure));
            }
        }

        if failures.is_empty() {
            tracing::info!("wrote record {} to all {} nodes", id, total);
            return Ok(WriteReceipt { id });
        }

        let succeeded = total - failures.len();
        if succeeded > 0 && self.config.cleanup_partial_writes {
            self.cleanup_partial(&schema, id, &tokens, &failures).await;
        }

        Err(WriteError::Partial {
            id,
            total,
            succeeded,
            failures,
        })
    }

    /// Best-effort removal of the shares that did land during a failed write
    ///
    /// Outcomes are logged and never surfaced; the write is already reported
    /// failed either way.
    async fn cleanup_partial(
        &self,
        schema: &str,
        id: Uuid,
        tokens: &[String],
        failures: &[(String, NodeFailure)],
    ) {
        let filter = Self::id_filter(id);
        let filter = &filter;
        let calls = self
            .config
            .nodes
            .iter()
            .zip(tokens.iter())
            .filter(|(node, _)| !failures.iter().any(|(failed, _)| failed == &node.id))
            .map(|(node, token)| async move {
                let outcome = NodeClient::new(&self.http, node)
                    .delete(token, schema, filter)
                    .await;
                (node, outcome)
            });
        for (node, outcome) in join_all(calls).await {
            match outcome {
                Ok(deleted) => tracing::debug!(
                    "cleaned up {} partial record(s) for {} at node {}",
                    deleted,
                    id,
                    node.id
                ),
                Err(failure) => tracing::warn!(
                    "failed to clean up partial write of {} at node {}: {}",
                    id,
                    node.id,
                    failure
                ),
            }
        }
    }
}
