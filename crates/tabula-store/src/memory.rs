use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tabula_types::ContentKey;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::{Fetcher, Filestore, Pinner, Source};

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and ephemeral nodes. Keys use the `map` namespace.
/// A store built with [`MapStore::with_network`] can also fetch objects it
/// does not hold from the given network members.
pub struct MapStore {
    objects: RwLock<HashMap<ContentKey, StoredObject>>,
    pins: RwLock<HashSet<ContentKey>>,
    network: Vec<(String, Arc<dyn Filestore>)>,
}

impl MapStore {
    pub const PREFIX: &'static str = "map";

    /// Create a new empty store with no network.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            pins: RwLock::new(HashSet::new()),
            network: Vec::new(),
        }
    }

    /// Create an empty store that can fetch from the named network members.
    pub fn with_network(network: Vec<(String, Arc<dyn Filestore>)>) -> Self {
        Self {
            network,
            ..Self::new()
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Filestore for MapStore {
    fn path_prefix(&self) -> &str {
        Self::PREFIX
    }

    fn put_object(&self, object: &StoredObject, pin: bool) -> StoreResult<ContentKey> {
        let key = ContentKey::from_hash(Self::PREFIX, &object.compute_hash());
        self.objects
            .write()
            .expect("lock poisoned")
            .entry(key.clone())
            .or_insert_with(|| object.clone());
        if pin {
            self.pins.write().expect("lock poisoned").insert(key.clone());
        }
        debug!(key = %key, kind = %object.kind, size = object.size, "put object");
        Ok(key)
    }

    fn get_object(&self, key: &ContentKey) -> StoreResult<Option<StoredObject>> {
        Ok(self.objects.read().expect("lock poisoned").get(key).cloned())
    }

    fn delete(&self, key: &ContentKey) -> StoreResult<bool> {
        self.pins.write().expect("lock poisoned").remove(key);
        Ok(self.objects.write().expect("lock poisoned").remove(key).is_some())
    }

    fn as_pinner(&self) -> Option<&dyn Pinner> {
        Some(self)
    }

    fn as_fetcher(&self) -> Option<&dyn Fetcher> {
        if self.network.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl Pinner for MapStore {
    fn pin(&self, key: &ContentKey, _recursive: bool) -> StoreResult<()> {
        let root = self.root_key(key)?;
        if !self.objects.read().expect("lock poisoned").contains_key(&root) {
            return Err(StoreError::NotFound(key.clone()));
        }
        self.pins.write().expect("lock poisoned").insert(root);
        Ok(())
    }

    fn unpin(&self, key: &ContentKey, _recursive: bool) -> StoreResult<bool> {
        let root = self.root_key(key)?;
        Ok(self.pins.write().expect("lock poisoned").remove(&root))
    }

    fn is_pinned(&self, key: &ContentKey) -> StoreResult<bool> {
        let root = self.root_key(key)?;
        Ok(self.pins.read().expect("lock poisoned").contains(&root))
    }
}

impl Fetcher for MapStore {
    fn fetch(&self, source: &Source, key: &ContentKey) -> StoreResult<ContentKey> {
        let root = self.root_key(key)?;
        if self.get_object(&root)?.is_some() {
            return Ok(root);
        }
        let members = self.network.iter().filter(|(name, _)| match source {
            Source::Any => true,
            Source::Named(wanted) => name == wanted,
        });
        for (name, member) in members {
            let remote_root = match member.root_key(key) {
                Ok(k) => k,
                Err(_) => continue,
            };
            if let Some(object) = member.get_object(&remote_root)? {
                object.verify(&remote_root)?;
                debug!(key = %key, member = %name, "fetched object from network");
                return self.put_object(&object, false);
            }
        }
        Err(StoreError::NotFound(key.clone()))
    }
}

impl std::fmt::Debug for MapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("object_count", &self.len())
            .field("network", &self.network.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Package;

    #[test]
    fn put_and_get_blob() {
        let store = MapStore::new();
        let key = store.put(b"a,b\n1,2\n", false).unwrap();
        assert_eq!(key.namespace(), Some("map"));
        assert_eq!(store.get(&key).unwrap(), b"a,b\n1,2\n");
        assert!(store.has(&key).unwrap());
    }

    #[test]
    fn same_content_same_key() {
        let store = MapStore::new();
        let a = store.put(b"same", false).unwrap();
        let b = store.put(b"same", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert!(store.is_pinned(&a).unwrap());
    }

    #[test]
    fn package_files_are_addressable() {
        let store = MapStore::new();
        let pkg = Package::new().with_file("dataset.json", b"{}".to_vec());
        let root = store.put_package(&pkg, false).unwrap();
        assert_eq!(store.get(&root.child("dataset.json")).unwrap(), b"{}");
        assert!(matches!(
            store.get(&root.child("missing.json")),
            Err(StoreError::NotFound(_))
        ));
        assert!(store.get(&root).is_err());
    }

    #[test]
    fn missing_and_foreign_keys() {
        let store = MapStore::new();
        let missing = ContentKey::from_hash("map", &[9u8; 32]);
        assert!(matches!(store.get(&missing), Err(StoreError::NotFound(_))));
        assert!(!store.has(&missing).unwrap());

        let foreign = ContentKey::from_hash("blob", &[9u8; 32]);
        assert!(matches!(store.get(&foreign), Err(StoreError::InvalidKey { .. })));
    }

    #[test]
    fn pin_unpin() {
        let store = MapStore::new();
        let key = store.put(b"pin me", false).unwrap();
        let pinner = store.as_pinner().unwrap();
        assert!(!pinner.is_pinned(&key).unwrap());
        pinner.pin(&key, true).unwrap();
        assert!(pinner.is_pinned(&key).unwrap());
        assert!(pinner.unpin(&key, true).unwrap());
        assert!(!pinner.unpin(&key, true).unwrap());

        let missing = ContentKey::from_hash("map", &[1u8; 32]);
        assert!(pinner.pin(&missing, false).is_err());
    }

    #[test]
    fn delete_removes_object() {
        let store = MapStore::new();
        let key = store.put(b"gone", true).unwrap();
        assert!(store.delete(&key).unwrap());
        assert!(!store.has(&key).unwrap());
        assert!(!store.is_pinned(&key).unwrap());
        assert!(!store.delete(&key).unwrap());
    }

    // -----------------------------------------------------------------------
    // Network fetch
    // -----------------------------------------------------------------------

    #[test]
    fn fetcher_requires_network() {
        assert!(MapStore::new().as_fetcher().is_none());
    }

    #[test]
    fn fetch_copies_from_network() {
        let remote = Arc::new(MapStore::new());
        let key = remote.put(b"remote data", false).unwrap();

        let local = MapStore::with_network(vec![("peer".into(), remote.clone() as Arc<dyn Filestore>)]);
        assert!(!local.has(&key).unwrap());

        let fetcher = local.as_fetcher().unwrap();
        let fetched = fetcher.fetch(&Source::Any, &key).unwrap();
        assert_eq!(fetched, key);
        assert_eq!(local.get(&key).unwrap(), b"remote data");
    }

    #[test]
    fn fetch_from_named_member_only() {
        let remote = Arc::new(MapStore::new());
        let key = remote.put(b"only here", false).unwrap();
        let local = MapStore::with_network(vec![("peer".into(), remote as Arc<dyn Filestore>)]);

        let err = local.fetch(&Source::Named("other".into()), &key).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        local.fetch(&Source::Named("peer".into()), &key).unwrap();
    }
}
