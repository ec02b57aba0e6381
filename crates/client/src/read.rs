//! Read coordinator and aggregator
//!
//! A read fans out to every node concurrently, correlates the returned
//! partial records by record identifier, and reconstructs exactly the
//! records for which every protected field has one share from every node.
//! Identifiers with an incomplete share set are dropped entirely; a
//! reconstruction failure for one identifier never aborts the rest of the
//! read. A node whose read leg failed is reported as degraded instead of
//! being conflated with a node that legitimately had zero matches.

use std::collections::BTreeMap;

use futures::future::join_all;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::error::ClientError;
use crate::node::{NodeClient, NodeFailure};
use crate::VaultClient;
use common::crypto::{CombinedValue, Share, ShareEngine, ShareError};
use common::record::{Filter, PartialField, PartialRecord};

/// Errors raised by the read path before any aggregation happens
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

/// A record reconstructed from a full set of partial records
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedRecord {
    pub id: Uuid,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl ReconstructedRecord {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Result of a fan-out read
///
/// Ordering of `records` is not guaranteed; callers needing a stable order
/// must sort explicitly.
#[derive(Debug)]
pub struct ReadOutcome {
    pub records: Vec<ReconstructedRecord>,
    /// Nodes whose read leg failed; their absence silently reduces the
    /// completeness of `records`
    pub degraded: Vec<(String, NodeFailure)>,
    /// Identifiers discarded for an incomplete share set or a failed
    /// reconstruction
    pub dropped: usize,
}

/// Per-identifier accumulation of one read's partial records
#[derive(Debug, Default)]
struct ShareSlots {
    plain: BTreeMap<String, serde_json::Value>,
    /// field name -> one share slot per node
    shares: BTreeMap<String, Vec<Option<Share>>>,
}

/// Group all returned partial records by identifier
///
/// Each node owns one slot per protected field: a node contributes at most
/// one share per field, and a duplicate identifier from the same node
/// overwrites that node's own slot. Plaintext fields are taken from the
/// first node that contributed them.
fn correlate(
    nodes: usize,
    per_node: Vec<Option<Vec<PartialRecord>>>,
) -> BTreeMap<Uuid, ShareSlots> {
    let mut grouped: BTreeMap<Uuid, ShareSlots> = BTreeMap::new();
    for (slot, records) in per_node.into_iter().enumerate() {
        let Some(records) = records else {
            continue;
        };
        for record in records {
            let entry = grouped.entry(record.id()).or_default();
            for (name, field) in record.fields() {
                match field {
                    PartialField::Plain(value) => {
                        entry
                            .plain
                            .entry(name.to_string())
                            .or_insert_with(|| value.clone());
                    }
                    PartialField::Share(share) => {
                        entry
                            .shares
                            .entry(name.to_string())
                            .or_insert_with(|| vec![None; nodes])[slot] = Some(share.clone());
                    }
                }
            }
        }
    }
    grouped
}

/// Rebuild one record from its accumulated slots
///
/// Fails with `ShareError::WrongCount` when any protected field is missing a
/// node's share, and with other `ShareError`s on malformed or corrupted
/// share sets.
fn reconstruct(
    engine: &ShareEngine,
    id: Uuid,
    slots: ShareSlots,
) -> Result<ReconstructedRecord, ShareError> {
    let mut fields = slots.plain;
    for (name, slot_vec) in slots.shares {
        if fields.contains_key(&name) {
            return Err(anyhow::anyhow!(
                "field {} arrived both plaintext and shared",
                name
            )
            .into());
        }
        let shares: Vec<Share> = slot_vec.into_iter().flatten().collect();
        let value = match engine.combine(&shares)? {
            CombinedValue::Text(text) => serde_json::Value::String(text),
            CombinedValue::Number(number) => serde_json::Value::Number(number.into()),
        };
        fields.insert(name, value);
    }
    Ok(ReconstructedRecord { id, fields })
}

impl VaultClient {
    /// Read and reconstruct the records matching a filter
    ///
    /// The filter is passed through verbatim to every node; matching happens
    /// node-side against each node's own partial records. Use
    /// [`VaultClient::match_filter`] to filter on a matchable protected
    /// field and [`VaultClient::id_filter`] to select by identifier.
    pub async fn read(&self, collection: &str, filter: &Filter) -> Result<ReadOutcome, ReadError> {
        let schema = self.router.schema(collection)?.to_string();
        let tokens = self.issuer.issue(&self.config.nodes)?;
        let total = self.config.nodes.len();

        tracing::debug!("reading from {} nodes under schema {}", total, schema);

        let calls = self
            .config
            .nodes
            .iter()
            .zip(tokens.iter())
            .map(|(node, token)| {
                let schema = schema.as_str();
                async move {
                    NodeClient::new(&self.http, node)
                        .read(token, schema, filter)
                        .await
                }
            });
        let results = join_all(calls).await;

        let mut degraded = Vec::new();
        let mut per_node = Vec::with_capacity(total);
        for (node, result) in self.config.nodes.iter().zip(results) {
            match result {
                Ok(records) => per_node.push(Some(records)),
                Err(failure) => {
                    tracing::warn!("read failed at node {}: {}", node.id, failure);
                    degraded.push((node.id.clone(), failure));
                    per_node.push(None);
                }
            }
        }

        let mut records = Vec::new();
        let mut dropped = 0;
        for (id, slots) in correlate(total, per_node) {
            match reconstruct(&self.engine, id, slots) {
                Ok(record) => records.push(record),
                Err(ShareError::WrongCount { expected, got }) => {
                    dropped += 1;
                    tracing::debug!(
                        "dropping record {}: {} of {} shares present",
                        id,
                        got,
                        expected
                    );
                }
                Err(e) => {
                    dropped += 1;
                    tracing::warn!("dropping record {}: reconstruction failed: {}", id, e);
                }
            }
        }

        tracing::info!(
            "read reconstructed {} record(s), dropped {}, {} degraded node(s)",
            records.len(),
            dropped,
            degraded.len()
        );

        Ok(ReadOutcome {
            records,
            degraded,
            dropped,
        })
    }
}
