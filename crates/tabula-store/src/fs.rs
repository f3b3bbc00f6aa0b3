use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tabula_types::ContentKey;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::{Filestore, Pinner};

const PINS_FILE: &str = "pins.json";
const OBJECTS_DIR: &str = "objects";

/// File-backed blob store.
///
/// Layout under the root directory:
///
/// ```text
/// objects/<hex>   one file per object, `[kind tag][data]`
/// pins.json       sorted list of pinned object hashes
/// ```
///
/// Keys use the `blob` namespace. All writes go through a temp file in the
/// same directory followed by a rename.
pub struct FsBlobStore {
    root: PathBuf,
    pins: RwLock<BTreeSet<String>>,
}

impl FsBlobStore {
    pub const PREFIX: &'static str = "blob";

    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(OBJECTS_DIR))?;
        let pins_path = root.join(PINS_FILE);
        let pins = if pins_path.exists() {
            let bytes = std::fs::read(&pins_path)?;
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?
        } else {
            BTreeSet::new()
        };
        debug!(root = %root.display(), "opened blob store");
        Ok(Self {
            root,
            pins: RwLock::new(pins),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &ContentKey) -> StoreResult<PathBuf> {
        let hash = key.hash().map_err(|e| StoreError::InvalidKey {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.root.join(OBJECTS_DIR).join(hex::encode(hash)))
    }

    /// Hex hash of the root object behind `key`, as recorded in `pins.json`.
    fn pin_id(&self, key: &ContentKey) -> StoreResult<String> {
        let root = self.root_key(key)?;
        let hash = root.hash().map_err(|e| StoreError::InvalidKey {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        Ok(hex::encode(hash))
    }

    fn write_pins(&self, pins: &BTreeSet<String>) -> StoreResult<()> {
        let bytes =
            serde_json::to_vec_pretty(pins).map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(&self.root, &self.root.join(PINS_FILE), &bytes)
    }
}

/// Write `bytes` to `path` via a temp file in `dir` and a rename.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl Filestore for FsBlobStore {
    fn path_prefix(&self) -> &str {
        Self::PREFIX
    }

    fn put_object(&self, object: &StoredObject, pin: bool) -> StoreResult<ContentKey> {
        let hash = object.compute_hash();
        let key = ContentKey::from_hash(Self::PREFIX, &hash);
        let path = self.object_path(&key)?;
        if !path.exists() {
            write_atomic(&self.root.join(OBJECTS_DIR), &path, &object.encode())?;
            debug!(key = %key, kind = %object.kind, size = object.size, "wrote object");
        }
        if pin {
            self.pin(&key, true)?;
        }
        Ok(key)
    }

    fn get_object(&self, key: &ContentKey) -> StoreResult<Option<StoredObject>> {
        let path = self.object_path(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                let object = StoredObject::decode(key, &bytes)?;
                object.verify(key)?;
                Ok(Some(object))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &ContentKey) -> StoreResult<bool> {
        self.unpin(key, true)?;
        let path = self.object_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn as_pinner(&self) -> Option<&dyn Pinner> {
        Some(self)
    }
}

impl Pinner for FsBlobStore {
    fn pin(&self, key: &ContentKey, _recursive: bool) -> StoreResult<()> {
        let hex_hash = self.pin_id(key)?;
        if !self.object_path(key)?.exists() {
            return Err(StoreError::NotFound(key.clone()));
        }
        let mut pins = self.pins.write().expect("lock poisoned");
        if pins.insert(hex_hash) {
            self.write_pins(&pins)?;
        }
        Ok(())
    }

    fn unpin(&self, key: &ContentKey, _recursive: bool) -> StoreResult<bool> {
        let hex_hash = self.pin_id(key)?;
        let mut pins = self.pins.write().expect("lock poisoned");
        let removed = pins.remove(&hex_hash);
        if removed {
            self.write_pins(&pins)?;
        }
        Ok(removed)
    }

    fn is_pinned(&self, key: &ContentKey) -> StoreResult<bool> {
        let hex_hash = self.pin_id(key)?;
        Ok(self.pins.read().expect("lock poisoned").contains(&hex_hash))
    }
}

impl std::fmt::Debug for FsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBlobStore").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Package;
    use tempfile::TempDir;

    #[test]
    fn put_get_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let key = store.put(b"city,pop\ntoronto,40000000\n", false).unwrap();
        assert_eq!(key.namespace(), Some("blob"));
        assert_eq!(store.get(&key).unwrap(), b"city,pop\ntoronto,40000000\n");

        let hex = key.segments().nth(1).unwrap().to_string();
        assert!(dir.path().join("objects").join(hex).exists());
    }

    #[test]
    fn pins_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let key = {
            let store = FsBlobStore::open(dir.path()).unwrap();
            store.put(b"pinned", true).unwrap()
        };
        let store = FsBlobStore::open(dir.path()).unwrap();
        assert!(store.is_pinned(&key).unwrap());
        assert!(store.unpin(&key, true).unwrap());

        let store = FsBlobStore::open(dir.path()).unwrap();
        assert!(!store.is_pinned(&key).unwrap());
    }

    #[test]
    fn package_file_lookup() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let pkg = Package::new().with_file("dataset.json", br#"{"title":"x"}"#.to_vec());
        let root = store.put_package(&pkg, true).unwrap();
        assert_eq!(store.get(&root.child("dataset.json")).unwrap(), br#"{"title":"x"}"#);
        assert!(store.is_pinned(&root.child("dataset.json")).unwrap());
    }

    #[test]
    fn corrupted_file_is_detected() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let key = store.put(b"original", false).unwrap();
        let path = store.object_path(&key).unwrap();
        std::fs::write(&path, [0x01, b'x']).unwrap();
        assert!(matches!(store.get(&key), Err(StoreError::HashMismatch { .. })));
    }

    #[test]
    fn delete_unpins_and_removes() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let key = store.put(b"bye", true).unwrap();
        assert!(store.delete(&key).unwrap());
        assert!(!store.has(&key).unwrap());
        assert!(!store.is_pinned(&key).unwrap());
        assert!(!store.delete(&key).unwrap());
    }

    #[test]
    fn no_fetch_capability() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        assert!(store.as_fetcher().is_none());
        assert!(store.as_pinner().is_some());
    }
}
