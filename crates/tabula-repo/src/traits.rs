//! Narrow capability traits composed by a [`Repo`](crate::Repo).
//!
//! Each store is usable on its own; a repository holds one instance of each.
//! All implementations must be thread-safe (`Send + Sync`).

use serde::{Deserialize, Serialize};
use tabula_types::{ChangeRequest, ContentKey, DatasetRecord, DatasetRef, PeerId, Profile, QueryLogItem};

use crate::error::RepoResult;

/// Window over a keyed record store.
///
/// Records whose key starts with `prefix` are returned in key order, skipping
/// `offset` and returning at most `limit` (`0` means no limit).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub prefix: String,
    pub limit: usize,
    pub offset: usize,
}

impl Query {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            prefix: String::new(),
            limit,
            offset,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Apply this query to key-ordered entries.
    pub fn apply<K, V, I>(&self, entries: I) -> Vec<(K, V)>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let filtered = entries
            .into_iter()
            .filter(|(k, _)| AsRef::<str>::as_ref(k).starts_with(&self.prefix))
            .skip(self.offset);
        if self.limit == 0 {
            filtered.collect()
        } else {
            filtered.take(self.limit).collect()
        }
    }
}

/// Apply a `(limit, offset)` window to an ordered sequence (`limit == 0` means all).
pub fn window<T>(items: impl IntoIterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    let rest = items.into_iter().skip(offset);
    if limit == 0 {
        rest.collect()
    } else {
        rest.take(limit).collect()
    }
}

/// Mutable name → content path bindings.
///
/// Names are unique and must be valid dataset names. Bindings are listed in
/// the order they were created.
pub trait Namestore: Send + Sync {
    /// Bind `name` to `path`. Fails if the name is invalid or already bound.
    fn put_name(&self, name: &str, path: &ContentKey) -> RepoResult<()>;

    /// Path bound to `name`. Fails with not-found if unbound.
    fn get_path(&self, name: &str) -> RepoResult<ContentKey>;

    /// Name bound to `path`, or `None` when no name points at it.
    ///
    /// A package root and its `dataset.json` key are the same path here.
    fn get_name(&self, path: &ContentKey) -> RepoResult<Option<String>>;

    /// Remove a binding. Fails with not-found if the name is unbound.
    fn delete_name(&self, name: &str) -> RepoResult<()>;

    /// Point a bound `name` at `path` in one step. Fails with not-found if
    /// the name is unbound.
    fn rebind(&self, name: &str, path: &ContentKey) -> RepoResult<()>;

    /// Move the binding of `old` to `new` in one step and return its path.
    /// Fails if `new` is invalid or taken, or with not-found if `old` is
    /// unbound. Either both names change or neither does.
    fn rename(&self, old: &str, new: &str) -> RepoResult<ContentKey>;

    /// A window of bindings in creation order, as refs without datasets.
    fn names(&self, limit: usize, offset: usize) -> RepoResult<Vec<DatasetRef>>;

    /// Total number of bindings.
    fn name_count(&self) -> RepoResult<usize>;
}

/// Dataset records keyed by content path.
pub trait Datasets: Send + Sync {
    fn put_dataset(&self, path: &ContentKey, dataset: &DatasetRecord) -> RepoResult<()>;

    fn put_datasets(&self, refs: &[DatasetRef]) -> RepoResult<()> {
        for r in refs {
            if let Some(ds) = &r.dataset {
                self.put_dataset(&r.path, ds)?;
            }
        }
        Ok(())
    }

    /// Record at `path`. Fails with not-found if absent.
    fn get_dataset(&self, path: &ContentKey) -> RepoResult<DatasetRecord>;

    fn delete_dataset(&self, path: &ContentKey) -> RepoResult<()>;

    fn query(&self, query: &Query) -> RepoResult<Vec<DatasetRef>>;
}

/// Known remote peer profiles keyed by peer id.
pub trait Peers: Send + Sync {
    fn put_peer(&self, id: &PeerId, profile: &Profile) -> RepoResult<()>;

    /// Profile for `id`. Fails with not-found if unknown.
    fn get_peer(&self, id: &PeerId) -> RepoResult<Profile>;

    fn delete_peer(&self, id: &PeerId) -> RepoResult<()>;

    /// Profiles whose id starts with the query prefix, in id order.
    fn query_peers(&self, query: &Query) -> RepoResult<Vec<Profile>>;
}

/// Append-only audit log of executed queries.
pub trait QueryLog: Send + Sync {
    fn log_query(&self, item: &QueryLogItem) -> RepoResult<()>;

    /// A window of log items, newest first.
    fn list_query_logs(&self, limit: usize, offset: usize) -> RepoResult<Vec<QueryLogItem>>;

    /// The most recent item logged under `key`.
    fn query_log_item(&self, key: &ContentKey) -> RepoResult<QueryLogItem>;
}

/// Proposed revisions keyed by the path of the proposal.
pub trait ChangeRequestStore: Send + Sync {
    fn put_change_request(&self, path: &ContentKey, request: &ChangeRequest) -> RepoResult<()>;

    fn get_change_request(&self, path: &ContentKey) -> RepoResult<ChangeRequest>;

    fn delete_change_request(&self, path: &ContentKey) -> RepoResult<()>;

    /// A window of change requests in path order.
    fn list_change_requests(&self, limit: usize, offset: usize) -> RepoResult<Vec<ChangeRequest>>;
}

/// Named counters.
pub trait Analytics: Send + Sync {
    /// Add one to `name` and return the new count.
    fn increment(&self, name: &str) -> RepoResult<u64>;

    fn count(&self, name: &str) -> RepoResult<u64>;
}

/// Parameters for a full-text dataset search.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
}

/// Ranked lookup over dataset names and metadata.
pub trait Searchable: Send + Sync {
    /// Matching refs, best match first. Refs carry name and path only.
    fn search(&self, params: &SearchParams) -> RepoResult<Vec<DatasetRef>>;
}
