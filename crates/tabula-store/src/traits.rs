use tabula_types::ContentKey;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, Package, StoredObject};

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same object always produces the
///   same key.
/// - Writing an object that already exists is a no-op apart from pinning.
/// - Concurrent reads and writes are safe.
/// - The store never interprets blob contents.
pub trait Filestore: Send + Sync {
    /// Namespace segment of every key this store produces (`"map"`, `"blob"`).
    fn path_prefix(&self) -> &str;

    /// Write an object, optionally pinning it, and return its root key.
    fn put_object(&self, object: &StoredObject, pin: bool) -> StoreResult<ContentKey>;

    /// Read an object by its root key. Returns `Ok(None)` if absent.
    fn get_object(&self, key: &ContentKey) -> StoreResult<Option<StoredObject>>;

    /// Delete an object by root key. Returns `true` if it existed.
    fn delete(&self, key: &ContentKey) -> StoreResult<bool>;

    /// Pinning capability, if supported.
    fn as_pinner(&self) -> Option<&dyn Pinner> {
        None
    }

    /// Network fetch capability, if supported.
    fn as_fetcher(&self) -> Option<&dyn Fetcher> {
        None
    }

    /// Store raw bytes as a blob.
    fn put(&self, data: &[u8], pin: bool) -> StoreResult<ContentKey> {
        self.put_object(&StoredObject::blob(data), pin)
    }

    /// Store a package and return its root key.
    fn put_package(&self, package: &Package, pin: bool) -> StoreResult<ContentKey> {
        self.put_object(&package.to_stored_object()?, pin)
    }

    /// Resolve `key` to bytes.
    ///
    /// A root key returns the blob's data; a package file key
    /// (`<root>/<file>`) returns that file's contents.
    fn get(&self, key: &ContentKey) -> StoreResult<Vec<u8>> {
        let root = self.root_key(key)?;
        let object = self
            .get_object(&root)?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        match (key.sub_path(), object.kind) {
            (None, ObjectKind::Blob) => Ok(object.data),
            (Some(file), ObjectKind::Package) => {
                let package = Package::from_stored_object(&root, &object)?;
                package
                    .files
                    .get(&file)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(key.clone()))
            }
            (None, ObjectKind::Package) => Err(StoreError::CorruptObject {
                key: key.clone(),
                reason: "key addresses a package, not a file".into(),
            }),
            (Some(_), ObjectKind::Blob) => Err(StoreError::NotFound(key.clone())),
        }
    }

    /// Whether the object behind `key` exists.
    fn has(&self, key: &ContentKey) -> StoreResult<bool> {
        let root = self.root_key(key)?;
        Ok(self.get_object(&root)?.is_some())
    }

    /// Root key (`/<prefix>/<hex>`) of any key in this store.
    fn root_key(&self, key: &ContentKey) -> StoreResult<ContentKey> {
        if key.namespace() != Some(self.path_prefix()) {
            return Err(StoreError::InvalidKey {
                key: key.clone(),
                reason: format!("expected namespace {:?}", self.path_prefix()),
            });
        }
        let hash = key.hash().map_err(|e| StoreError::InvalidKey {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        Ok(ContentKey::from_hash(self.path_prefix(), &hash))
    }
}

/// Protects objects from eviction.
pub trait Pinner: Send + Sync {
    /// Pin an object. Packages are stored as one object, so `recursive`
    /// pins the same root as a shallow pin.
    fn pin(&self, key: &ContentKey, recursive: bool) -> StoreResult<()>;

    /// Remove a pin. Returns `true` if the object was pinned.
    fn unpin(&self, key: &ContentKey, recursive: bool) -> StoreResult<bool>;

    fn is_pinned(&self, key: &ContentKey) -> StoreResult<bool>;
}

/// Where a [`Fetcher`] should look for content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Any reachable member of the network.
    Any,
    /// A single named member of the network.
    Named(String),
}

/// Retrieves content known only by hash from a wider network.
pub trait Fetcher: Send + Sync {
    /// Fetch the object behind `key` into this store and return its local
    /// root key. The fetched bytes are verified against the key's hash.
    fn fetch(&self, source: &Source, key: &ContentKey) -> StoreResult<ContentKey>;
}
