//! Supplementary per-feature metadata.
//!
//! Callers attach a flat string map to a feature use. Once a key has been
//! reported with two different values the stored value becomes a list, so a
//! payload accumulates every distinct value seen for the key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::UsageError;

/// Metadata supplied by a caller alongside a feature use.
pub type FeatureData = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Single(String),
    Many(Vec<String>),
}

impl MetadataValue {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            MetadataValue::Single(v) => v == value,
            MetadataValue::Many(values) => values.iter().any(|v| v == value),
        }
    }

    /// Adds `value` unless already present, promoting a single value to a list.
    pub fn absorb(&mut self, value: String) {
        if self.contains(&value) {
            return;
        }
        match self {
            MetadataValue::Many(values) => values.push(value),
            MetadataValue::Single(existing) => {
                let existing = std::mem::take(existing);
                *self = MetadataValue::Many(vec![existing, value]);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMetadata(BTreeMap<String, MetadataValue>);

impl FeatureMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses previously reported metadata. Non-object JSON and values that
    /// are neither strings nor string arrays yield empty metadata.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<FeatureMetadata>(raw) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!("discarding unreadable feature data: {}", err);
                Self::default()
            }
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, UsageError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.0.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Folds `incoming` into this metadata in place.
    pub fn merge(&mut self, incoming: &FeatureData) {
        for (key, value) in incoming {
            match self.0.get_mut(key) {
                Some(existing) => existing.absorb(value.clone()),
                None => {
                    self.0
                        .insert(key.clone(), MetadataValue::Single(value.clone()));
                }
            }
        }
    }
}

impl From<&FeatureData> for FeatureMetadata {
    fn from(data: &FeatureData) -> Self {
        let mut metadata = FeatureMetadata::new();
        metadata.merge(data);
        metadata
    }
}

/// Merges `incoming` with the metadata already stored for the feature.
///
/// Returns empty metadata when nothing new is supplied, in which case the
/// feature use is reported without a payload.
pub fn merge_feature_data(existing: Option<&str>, incoming: Option<&FeatureData>) -> FeatureMetadata {
    let incoming = match incoming {
        Some(data) if !data.is_empty() => data,
        _ => return FeatureMetadata::new(),
    };

    let mut merged = existing.map(FeatureMetadata::from_json).unwrap_or_default();
    merged.merge(incoming);
    merged
}
