use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::ContentKey;
use crate::structure::Structure;

/// One immutable revision of a dataset.
///
/// A record is written once and addressed by the hash of its serialized
/// form. Updating a dataset writes a new record whose `previous` points at
/// the revision it replaces; the root revision has an empty `previous`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub download_url: String,
    /// ISO-8601 repeat interval, e.g. `R/P1W`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub accrual_periodicity: String,
    #[serde(skip_serializing_if = "ContentKey::is_empty")]
    pub previous: ContentKey,
    pub timestamp: Option<DateTime<Utc>>,
    /// Key of the raw data blob.
    pub data: ContentKey,
    /// Size of the raw data in bytes.
    pub length: u64,
    pub structure: Option<Structure>,
    /// Free-form descriptive metadata.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl DatasetRecord {
    /// Overwrite fields of `self` with the set fields of `other`.
    ///
    /// Empty strings, empty keys, zero lengths and `None` count as unset and
    /// leave the existing value in place. Structures are merged field by
    /// field and metadata maps key by key.
    pub fn assign(&mut self, other: &DatasetRecord) {
        fn set(dst: &mut String, src: &str) {
            if !src.is_empty() {
                *dst = src.to_string();
            }
        }
        set(&mut self.title, &other.title);
        set(&mut self.description, &other.description);
        set(&mut self.download_url, &other.download_url);
        set(&mut self.accrual_periodicity, &other.accrual_periodicity);
        if !other.previous.is_empty() {
            self.previous = other.previous.clone();
        }
        if other.timestamp.is_some() {
            self.timestamp = other.timestamp;
        }
        if !other.data.is_empty() {
            self.data = other.data.clone();
        }
        if other.length != 0 {
            self.length = other.length;
        }
        match (&mut self.structure, &other.structure) {
            (Some(mine), Some(theirs)) => mine.assign(theirs),
            (None, Some(theirs)) => self.structure = Some(theirs.clone()),
            _ => {}
        }
        for (k, v) in &other.meta {
            self.meta.insert(k.clone(), v.clone());
        }
    }
}

/// A resolved pointer to a dataset revision.
///
/// `name` is the mutable local alias (empty when referenced by path only),
/// `path` the immutable content address, and `dataset` the hydrated record
/// once loaded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetRef {
    pub name: String,
    pub path: ContentKey,
    pub dataset: Option<DatasetRecord>,
}

impl DatasetRef {
    pub fn new(name: impl Into<String>, path: ContentKey) -> Self {
        Self {
            name: name.into(),
            path,
            dataset: None,
        }
    }

    pub fn with_dataset(mut self, dataset: DatasetRecord) -> Self {
        self.dataset = Some(dataset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::DataFormat;

    #[test]
    fn assign_overwrites_set_fields_only() {
        let mut ds = DatasetRecord {
            title: "old".into(),
            description: "keep me".into(),
            data: ContentKey::new("/map/a"),
            length: 3,
            ..Default::default()
        };
        ds.assign(&DatasetRecord {
            title: "new".into(),
            length: 9,
            ..Default::default()
        });
        assert_eq!(ds.title, "new");
        assert_eq!(ds.description, "keep me");
        assert_eq!(ds.data, ContentKey::new("/map/a"));
        assert_eq!(ds.length, 9);
    }

    #[test]
    fn assign_merges_structure_and_meta() {
        let mut ds = DatasetRecord {
            structure: Some(Structure {
                format: DataFormat::Csv,
                entries: 4,
                ..Default::default()
            }),
            ..Default::default()
        };
        ds.meta.insert("a".into(), serde_json::json!(1));

        let mut changes = DatasetRecord {
            structure: Some(Structure {
                entries: 5,
                ..Default::default()
            }),
            ..Default::default()
        };
        changes.meta.insert("b".into(), serde_json::json!("x"));
        ds.assign(&changes);

        let st = ds.structure.unwrap();
        assert_eq!(st.format, DataFormat::Csv);
        assert_eq!(st.entries, 5);
        assert_eq!(ds.meta.len(), 2);
    }

    #[test]
    fn empty_previous_is_omitted() {
        let json = serde_json::to_value(DatasetRecord::default()).unwrap();
        assert!(json.get("previous").is_none());
        let back: DatasetRecord = serde_json::from_value(json).unwrap();
        assert!(back.previous.is_empty());
    }
}
