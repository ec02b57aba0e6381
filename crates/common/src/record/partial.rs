use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::Share;

/// Marker key wrapping a share on the wire: `{ "%share": "<string>" }`
///
/// The marker is reserved: a plaintext field must not be an object whose only
/// key is `%share`, or it will be classified as a share on the way back in.
pub const SHARE_KEY: &str = "%share";

/// Errors that can occur translating records to or from the wire shape
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("share error: {0}")]
    Share(#[from] crate::crypto::ShareError),
}

/// One field of a partial record
#[derive(Debug, Clone, PartialEq)]
pub enum PartialField {
    /// Plaintext, identical across all nodes
    Plain(serde_json::Value),
    /// This node's single share of a protected field
    Share(Share),
}

/// The projection of a logical record onto a single node
///
/// Wire shape (bit-exact):
///
/// ```text
/// { "_id": "<uuid>", "<field>": <plain json> | { "%share": "<string>" } }
/// ```
///
/// The identifier is plaintext and stable across all partial records of the
/// same logical record; it is never itself shared.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    id: Uuid,
    fields: BTreeMap<String, PartialField>,
}

impl PartialRecord {
    pub fn new(id: Uuid) -> Self {
        PartialRecord {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn insert_plain(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(name.into(), PartialField::Plain(value));
    }

    pub fn insert_share(&mut self, name: impl Into<String>, share: Share) {
        self.fields.insert(name.into(), PartialField::Share(share));
    }

    /// Iterate fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &PartialField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build from an already-parsed wire object
    ///
    /// Fields arriving as a single-key `%share` object are classified as
    /// shares; everything else is plaintext.
    pub fn from_wire(map: serde_json::Map<String, serde_json::Value>) -> Result<Self, RecordError> {
        let id = map
            .get("_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("partial record missing _id"))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| anyhow::anyhow!("partial record _id is not a uuid"))?;

        let mut record = PartialRecord::new(id);
        for (name, value) in map {
            if name == "_id" {
                continue;
            }
            let share = match share_marker(&value) {
                Some(encoded) => Some(Share::decode(encoded)?),
                None => None,
            };
            match share {
                Some(share) => record.insert_share(name, share),
                None => record.insert_plain(name, value),
            }
        }
        Ok(record)
    }

    /// Render to the wire object
    pub fn to_wire(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert(
            "_id".to_string(),
            serde_json::Value::String(self.id.to_string()),
        );
        for (name, field) in &self.fields {
            let value = match field {
                PartialField::Plain(v) => v.clone(),
                PartialField::Share(share) => {
                    let mut wrapper = serde_json::Map::new();
                    wrapper.insert(
                        SHARE_KEY.to_string(),
                        serde_json::Value::String(share.encode()),
                    );
                    serde_json::Value::Object(wrapper)
                }
            };
            map.insert(name.clone(), value);
        }
        map
    }
}

/// Extract the encoded share string if the value has the share wire shape
fn share_marker(value: &serde_json::Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get(SHARE_KEY)?.as_str()
}

impl Serialize for PartialRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let wire = self.to_wire();
        let mut map = serializer.serialize_map(Some(wire.len()))?;
        for (k, v) in &wire {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PartialRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = serde_json::Map::deserialize(deserializer)?;
        PartialRecord::from_wire(map).map_err(serde::de::Error::custom)
    }
}
