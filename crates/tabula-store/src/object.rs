use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tabula_types::ContentKey;

use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw data payload.
    Blob,
    /// Named-file bundle, see [`Package`].
    Package,
}

impl ObjectKind {
    /// Single-byte tag used by on-disk encodings.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Blob => 0x01,
            Self::Package => 0x02,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Blob),
            0x02 => Some(Self::Package),
            _ => None,
        }
    }

    fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Blob => &ContentHasher::BLOB,
            Self::Package => &ContentHasher::PACKAGE,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Package => write!(f, "package"),
        }
    }
}

/// A stored object: kind tag + serialized data + cached size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// A raw data blob.
    pub fn blob(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ObjectKind::Blob, data.into())
    }

    /// Content hash, using the domain of this object's kind.
    pub fn compute_hash(&self) -> [u8; 32] {
        self.kind.hasher().hash(&self.data)
    }

    /// Check that this object hashes to the hash segment of `key`.
    pub fn verify(&self, key: &ContentKey) -> StoreResult<()> {
        let expected = key.hash().map_err(|e| StoreError::InvalidKey {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        if self.kind.hasher().verify(&self.data, &expected) {
            Ok(())
        } else {
            Err(StoreError::HashMismatch {
                key: key.clone(),
                computed: hex::encode(self.compute_hash()),
            })
        }
    }

    /// `[kind tag][data]` encoding used by file-backed stores.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() + 1);
        buf.push(self.kind.tag());
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn decode(key: &ContentKey, bytes: &[u8]) -> StoreResult<Self> {
        let (&tag, data) = bytes.split_first().ok_or_else(|| StoreError::CorruptObject {
            key: key.clone(),
            reason: "empty object file".into(),
        })?;
        let kind = ObjectKind::from_tag(tag).ok_or_else(|| StoreError::CorruptObject {
            key: key.clone(),
            reason: format!("unknown object tag 0x{tag:02x}"),
        })?;
        Ok(Self::new(kind, data.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// A bundle of named files stored as one object.
///
/// Files are addressed as `<package key>/<file name>`. Entries are kept in a
/// `BTreeMap` so the serialized form, and therefore the hash, does not depend
/// on insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.into(), data.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data = bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Package, data))
    }

    pub fn from_stored_object(key: &ContentKey, obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Package {
            return Err(StoreError::CorruptObject {
                key: key.clone(),
                reason: format!("expected package, got {}", obj.kind),
            });
        }
        bincode::deserialize(&obj.data).map_err(|e| StoreError::CorruptObject {
            key: key.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_hash_ignores_insertion_order() {
        let a = Package::new().with_file("a", b"1".to_vec()).with_file("b", b"2".to_vec());
        let b = Package::new().with_file("b", b"2".to_vec()).with_file("a", b"1".to_vec());
        assert_eq!(
            a.to_stored_object().unwrap().compute_hash(),
            b.to_stored_object().unwrap().compute_hash()
        );
    }

    #[test]
    fn package_decode_rejects_blob() {
        let key = ContentKey::new("/map/x");
        let err = Package::from_stored_object(&key, &StoredObject::blob(b"raw".to_vec())).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn encode_decode_preserves_kind() {
        let key = ContentKey::new("/blob/x");
        let obj = StoredObject::blob(b"a,b\n".to_vec());
        let back = StoredObject::decode(&key, &obj.encode()).unwrap();
        assert_eq!(back, obj);
        assert!(StoredObject::decode(&key, &[]).is_err());
        assert!(StoredObject::decode(&key, &[0x7f, 1]).is_err());
    }

    #[test]
    fn verify_against_key() {
        let obj = StoredObject::blob(b"data".to_vec());
        let key = ContentKey::from_hash("map", &obj.compute_hash());
        obj.verify(&key).unwrap();
        let wrong = ContentKey::from_hash("map", &[0u8; 32]);
        assert!(matches!(obj.verify(&wrong), Err(StoreError::HashMismatch { .. })));
    }
}
