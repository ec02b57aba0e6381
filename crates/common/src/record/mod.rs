//! Logical records and their per-node projections
//!
//! A `Record` is what callers hand to the write path: named fields, each
//! either plaintext (stored identically at every node) or protected (split
//! into shares). A `PartialRecord` is the projection of a record onto a
//! single node: the record identifier, all plaintext fields verbatim, and
//! one share per protected field.

mod partial;

use std::collections::BTreeMap;

use crate::crypto::SecretValue;

pub use partial::{PartialField, PartialRecord, RecordError, SHARE_KEY};

/// Opaque key/value match criteria, passed through verbatim to every node
///
/// Filtering happens node-side against each node's own partial records.
/// Matching on a protected field only works for matchable-flavored values,
/// by filtering on the deterministic share itself.
pub type Filter = serde_json::Map<String, serde_json::Value>;

/// One named field of a logical record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Stored identically, unshared, at every node
    Plain(serde_json::Value),
    /// Split into one share per node
    Protected(SecretValue),
}

/// A logical record as supplied by a caller
///
/// Field names are unique; the record identifier is never part of the fields
/// (it is generated by the write path). Fields are kept in name order so the
/// derived partial records serialize deterministically.
///
/// # Examples
///
/// ```ignore
/// let record = Record::new()
///     .plain("status", serde_json::json!("open"))
///     .blind("data", "All customer data anonymized.")
///     .matchable("source", "EU DPO")
///     .sum("amount", 1200);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plaintext field
    pub fn plain(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), FieldValue::Plain(value));
        self
    }

    /// Add a protected field with opaque shares
    pub fn blind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            FieldValue::Protected(SecretValue::Text(value.into())),
        );
        self
    }

    /// Add a protected field with equality-preserving shares
    pub fn matchable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            FieldValue::Protected(SecretValue::Match(value.into())),
        );
        self
    }

    /// Add a protected numeric field with additively-summable shares
    pub fn sum(mut self, name: impl Into<String>, value: u64) -> Self {
        self.fields.insert(
            name.into(),
            FieldValue::Protected(SecretValue::Sum(value)),
        );
        self
    }

    /// Add a field by explicit value
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Iterate fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
