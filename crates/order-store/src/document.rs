use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, Version};

/// A stored aggregate: its serialized state plus the secondary keys it can
/// be found by.
///
/// `version` is the revision the document was read at. Writing a document
/// back succeeds only while the stored revision still matches it.
///
/// A lookup key names at most one document. An index key is shared: every
/// document carrying it is listed under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub version: Version,
    pub updated_at: DateTime<Utc>,
    pub state: serde_json::Value,
    pub lookup_keys: Vec<String>,
    #[serde(default)]
    pub index_keys: Vec<String>,
}

impl Document {
    /// Serializes `state` into a document that has not been stored yet.
    pub fn from_state<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            updated_at: Utc::now(),
            state: serde_json::to_value(state)?,
            lookup_keys: Vec::new(),
            index_keys: Vec::new(),
        })
    }

    pub fn with_lookup_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.lookup_keys = keys.into_iter().collect();
        self.lookup_keys.sort();
        self.lookup_keys.dedup();
        self
    }

    pub fn with_index_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.index_keys = keys.into_iter().collect();
        self.index_keys.sort();
        self.index_keys.dedup();
        self
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.lookup_keys.iter().any(|k| k == key)
    }

    pub fn has_index(&self, key: &str) -> bool {
        self.index_keys.iter().any(|k| k == key)
    }

    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }
}
