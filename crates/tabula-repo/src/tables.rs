//! Table implementations of the narrow store traits.
//!
//! Every table wraps a [`Persisted`] cell, so the same code backs both the
//! in-memory and the filesystem repository.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabula_store::{load_dataset, Filestore};
use tabula_types::{
    ChangeRequest, ContentKey, DatasetRecord, DatasetRef, PeerId, Profile, QueryLogItem,
};
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::names::validate_name;
use crate::persisted::Persisted;
use crate::traits::{
    window, Analytics, ChangeRequestStore, Datasets, Namestore, Peers, Query, QueryLog,
};

// ---------------------------------------------------------------------------
// Namestore
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct NameEntry {
    name: String,
    path: ContentKey,
    created: DateTime<Utc>,
}

/// Name bindings in creation order.
pub struct NameTable {
    entries: Persisted<Vec<NameEntry>>,
}

impl NameTable {
    pub fn in_memory() -> Self {
        Self {
            entries: Persisted::in_memory(Default::default()),
        }
    }

    /// Open the table mirrored to `dir/namespace.json`.
    pub fn open(dir: &Path) -> RepoResult<Self> {
        Ok(Self {
            entries: Persisted::open(dir.join("namespace.json"))?,
        })
    }
}

impl Namestore for NameTable {
    fn put_name(&self, name: &str, path: &ContentKey) -> RepoResult<()> {
        validate_name(name)?;
        self.entries.update(|entries| {
            if entries.iter().any(|e| e.name == name) {
                return Err(RepoError::NameTaken(name.to_string()));
            }
            entries.push(NameEntry {
                name: name.to_string(),
                path: path.clone(),
                created: Utc::now(),
            });
            Ok(())
        })?;
        debug!(name, path = %path, "bound name");
        Ok(())
    }

    fn get_path(&self, name: &str) -> RepoResult<ContentKey> {
        self.entries
            .read(|entries| entries.iter().find(|e| e.name == name).map(|e| e.path.clone()))
            .ok_or_else(|| RepoError::NotFound(format!("name '{name}'")))
    }

    fn get_name(&self, path: &ContentKey) -> RepoResult<Option<String>> {
        let wanted = path.package_file();
        Ok(self.entries.read(|entries| {
            entries
                .iter()
                .find(|e| e.path.package_file() == wanted)
                .map(|e| e.name.clone())
        }))
    }

    fn delete_name(&self, name: &str) -> RepoResult<()> {
        self.entries.update(|entries| {
            let before = entries.len();
            entries.retain(|e| e.name != name);
            if entries.len() == before {
                Err(RepoError::NotFound(format!("name '{name}'")))
            } else {
                Ok(())
            }
        })?;
        debug!(name, "removed name");
        Ok(())
    }

    fn rebind(&self, name: &str, path: &ContentKey) -> RepoResult<()> {
        self.entries.update(|entries| {
            let entry = entries
                .iter_mut()
                .find(|e| e.name == name)
                .ok_or_else(|| RepoError::NotFound(format!("name '{name}'")))?;
            entry.path = path.clone();
            Ok(())
        })?;
        debug!(name, path = %path, "rebound name");
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> RepoResult<ContentKey> {
        validate_name(new)?;
        let path = self.entries.update(|entries| {
            if entries.iter().any(|e| e.name == new) {
                return Err(RepoError::NameTaken(new.to_string()));
            }
            let entry = entries
                .iter_mut()
                .find(|e| e.name == old)
                .ok_or_else(|| RepoError::NotFound(format!("name '{old}'")))?;
            entry.name = new.to_string();
            Ok(entry.path.clone())
        })?;
        debug!(from = old, to = new, path = %path, "renamed binding");
        Ok(path)
    }

    fn names(&self, limit: usize, offset: usize) -> RepoResult<Vec<DatasetRef>> {
        Ok(self.entries.read(|entries| {
            window(
                entries
                    .iter()
                    .map(|e| DatasetRef::new(e.name.clone(), e.path.clone())),
                limit,
                offset,
            )
        }))
    }

    fn name_count(&self) -> RepoResult<usize> {
        Ok(self.entries.read(Vec::len))
    }
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// Dataset records keyed by content path.
///
/// A table built with a blob store falls back to loading records from the
/// store when they are not held locally.
pub struct DatasetTable {
    records: Persisted<BTreeMap<ContentKey, DatasetRecord>>,
    store: Option<Arc<dyn Filestore>>,
}

impl DatasetTable {
    pub fn in_memory(store: Option<Arc<dyn Filestore>>) -> Self {
        Self {
            records: Persisted::in_memory(BTreeMap::new()),
            store,
        }
    }

    pub fn open(dir: &Path, file: &str, store: Option<Arc<dyn Filestore>>) -> RepoResult<Self> {
        Ok(Self {
            records: Persisted::open(dir.join(file))?,
            store,
        })
    }
}

impl Datasets for DatasetTable {
    fn put_dataset(&self, path: &ContentKey, dataset: &DatasetRecord) -> RepoResult<()> {
        self.records.update(|records| {
            records.insert(path.package_file(), dataset.clone());
            Ok(())
        })
    }

    fn get_dataset(&self, path: &ContentKey) -> RepoResult<DatasetRecord> {
        let key = path.package_file();
        if let Some(ds) = self.records.read(|records| records.get(&key).cloned()) {
            return Ok(ds);
        }
        match &self.store {
            Some(store) => Ok(load_dataset(store.as_ref(), path)?),
            None => Err(RepoError::NotFound(format!("dataset {path}"))),
        }
    }

    fn delete_dataset(&self, path: &ContentKey) -> RepoResult<()> {
        let key = path.package_file();
        self.records.update(|records| {
            records
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| RepoError::NotFound(format!("dataset {key}")))
        })
    }

    fn query(&self, query: &Query) -> RepoResult<Vec<DatasetRef>> {
        Ok(self.records.read(|records| {
            query
                .apply(records.iter())
                .into_iter()
                .map(|(path, ds)| DatasetRef::new("", path.clone()).with_dataset(ds.clone()))
                .collect()
        }))
    }
}

// ---------------------------------------------------------------------------
// Peers
// ---------------------------------------------------------------------------

/// Remote peer profiles keyed by peer id.
///
/// Profiles read back always carry a username, generated from the peer id
/// when the stored profile has none.
pub struct PeerTable {
    profiles: Persisted<BTreeMap<PeerId, Profile>>,
}

impl PeerTable {
    pub fn in_memory() -> Self {
        Self {
            profiles: Persisted::in_memory(Default::default()),
        }
    }

    /// Open the table mirrored to `dir/peers.json`.
    pub fn open(dir: &Path) -> RepoResult<Self> {
        Ok(Self {
            profiles: Persisted::open(dir.join("peers.json"))?,
        })
    }
}

fn with_identity(id: &PeerId, profile: &Profile) -> Profile {
    let mut p = profile.clone();
    if p.id.is_empty() {
        p.id = id.clone();
    }
    p.ensure_username(id.as_str());
    p
}

impl Peers for PeerTable {
    fn put_peer(&self, id: &PeerId, profile: &Profile) -> RepoResult<()> {
        self.profiles.update(|profiles| {
            profiles.insert(id.clone(), profile.clone());
            Ok(())
        })
    }

    fn get_peer(&self, id: &PeerId) -> RepoResult<Profile> {
        self.profiles
            .read(|profiles| profiles.get(id).map(|p| with_identity(id, p)))
            .ok_or_else(|| RepoError::NotFound(format!("peer {id}")))
    }

    fn delete_peer(&self, id: &PeerId) -> RepoResult<()> {
        self.profiles.update(|profiles| {
            profiles
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| RepoError::NotFound(format!("peer {id}")))
        })
    }

    fn query_peers(&self, query: &Query) -> RepoResult<Vec<Profile>> {
        Ok(self.profiles.read(|profiles| {
            query
                .apply(profiles.iter())
                .into_iter()
                .map(|(id, p)| with_identity(id, p))
                .collect()
        }))
    }
}

// ---------------------------------------------------------------------------
// Query log
// ---------------------------------------------------------------------------

/// Query log items in the order they were logged.
pub struct QueryLogTable {
    items: Persisted<Vec<QueryLogItem>>,
}

impl QueryLogTable {
    pub fn in_memory() -> Self {
        Self {
            items: Persisted::in_memory(Default::default()),
        }
    }

    /// Open the table mirrored to `dir/query_log.json`.
    pub fn open(dir: &Path) -> RepoResult<Self> {
        Ok(Self {
            items: Persisted::open(dir.join("query_log.json"))?,
        })
    }
}

impl QueryLog for QueryLogTable {
    fn log_query(&self, item: &QueryLogItem) -> RepoResult<()> {
        let mut item = item.clone();
        if item.time.is_none() {
            item.time = Some(Utc::now());
        }
        self.items.update(|items| {
            items.push(item);
            Ok(())
        })
    }

    fn list_query_logs(&self, limit: usize, offset: usize) -> RepoResult<Vec<QueryLogItem>> {
        Ok(self
            .items
            .read(|items| window(items.iter().rev().cloned(), limit, offset)))
    }

    fn query_log_item(&self, key: &ContentKey) -> RepoResult<QueryLogItem> {
        self.items
            .read(|items| items.iter().rev().find(|i| &i.key == key).cloned())
            .ok_or_else(|| RepoError::NotFound(format!("query log item {key}")))
    }
}

// ---------------------------------------------------------------------------
// Change requests
// ---------------------------------------------------------------------------

pub struct ChangeRequestTable {
    requests: Persisted<BTreeMap<ContentKey, ChangeRequest>>,
}

impl ChangeRequestTable {
    pub fn in_memory() -> Self {
        Self {
            requests: Persisted::in_memory(Default::default()),
        }
    }

    /// Open the table mirrored to `dir/change_requests.json`.
    pub fn open(dir: &Path) -> RepoResult<Self> {
        Ok(Self {
            requests: Persisted::open(dir.join("change_requests.json"))?,
        })
    }
}

impl ChangeRequestStore for ChangeRequestTable {
    fn put_change_request(&self, path: &ContentKey, request: &ChangeRequest) -> RepoResult<()> {
        self.requests.update(|requests| {
            requests.insert(path.clone(), request.clone());
            Ok(())
        })
    }

    fn get_change_request(&self, path: &ContentKey) -> RepoResult<ChangeRequest> {
        self.requests
            .read(|requests| requests.get(path).cloned())
            .ok_or_else(|| RepoError::NotFound(format!("change request {path}")))
    }

    fn delete_change_request(&self, path: &ContentKey) -> RepoResult<()> {
        self.requests.update(|requests| {
            requests
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| RepoError::NotFound(format!("change request {path}")))
        })
    }

    fn list_change_requests(&self, limit: usize, offset: usize) -> RepoResult<Vec<ChangeRequest>> {
        Ok(self
            .requests
            .read(|requests| window(requests.values().cloned(), limit, offset)))
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

pub struct AnalyticsTable {
    counters: Persisted<BTreeMap<String, u64>>,
}

impl AnalyticsTable {
    pub fn in_memory() -> Self {
        Self {
            counters: Persisted::in_memory(Default::default()),
        }
    }

    /// Open the table mirrored to `dir/analytics.json`.
    pub fn open(dir: &Path) -> RepoResult<Self> {
        Ok(Self {
            counters: Persisted::open(dir.join("analytics.json"))?,
        })
    }
}

impl Analytics for AnalyticsTable {
    fn increment(&self, name: &str) -> RepoResult<u64> {
        self.counters.update(|counters| {
            let n = counters.entry(name.to_string()).or_insert(0);
            *n += 1;
            Ok(*n)
        })
    }

    fn count(&self, name: &str) -> RepoResult<u64> {
        Ok(self
            .counters
            .read(|counters| counters.get(name).copied().unwrap_or(0)))
    }
}
