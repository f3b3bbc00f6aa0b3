//! The repository facade.

use std::collections::BTreeMap;
use std::sync::Arc;

use tabula_store::Filestore;
use tabula_types::{ContentKey, DatasetRecord, DatasetRef, Profile};
use tracing::{debug, warn};

use crate::error::{RepoError, RepoResult};
use crate::graph::{DatasetGraph, GraphCache};
use crate::search::IndexEntry;
use crate::traits::{
    Analytics, ChangeRequestStore, Datasets, Namestore, Peers, Query, QueryLog, SearchParams,
    Searchable,
};

/// A repository: a blob store plus every record store a node keeps.
///
/// Required methods hand out the component stores; provided methods build
/// the cross-store operations on top of them, so every implementation
/// behaves the same way.
pub trait Repo: Send + Sync {
    /// The content-addressed store holding dataset packages and data.
    fn store(&self) -> Arc<dyn Filestore>;

    fn namestore(&self) -> &dyn Namestore;

    /// Dataset records known to this node.
    fn datasets(&self) -> &dyn Datasets;

    /// Records seen from other peers. Never consulted for local names.
    fn cache(&self) -> &dyn Datasets;

    fn peers(&self) -> &dyn Peers;

    fn query_log(&self) -> &dyn QueryLog;

    fn change_requests(&self) -> &dyn ChangeRequestStore;

    fn analytics(&self) -> &dyn Analytics;

    /// The local node's profile.
    fn profile(&self) -> RepoResult<Profile>;

    fn save_profile(&self, profile: &Profile) -> RepoResult<()>;

    /// The attached search index, if there is one.
    fn search_index(&self) -> RepoResult<Option<Arc<dyn Searchable>>>;

    /// Rebuild the search index from the current namespace.
    fn update_search_index(&self) -> RepoResult<()>;

    fn graph_cache(&self) -> &GraphCache;

    /// Remove all persisted state.
    fn destroy(&self) -> RepoResult<()>;

    // -----------------------------------------------------------------------
    // Provided
    // -----------------------------------------------------------------------

    /// Load the record stored at `path` in the blob store.
    fn load_dataset(&self, path: &ContentKey) -> RepoResult<DatasetRecord> {
        Ok(tabula_store::load_dataset(self.store().as_ref(), path)?)
    }

    /// The dependency graph of all named datasets, built on first use.
    fn graph(&self) -> RepoResult<Arc<DatasetGraph>> {
        self.graph_cache().get_or_build(|| DatasetGraph::build(self))
    }

    /// A page of name bindings with their datasets loaded.
    ///
    /// A failed load is retried once; a second failure fails the page.
    fn namespace(&self, limit: usize, offset: usize) -> RepoResult<Vec<DatasetRef>> {
        let mut refs = self.namestore().names(limit, offset)?;
        for r in &mut refs {
            let ds = match self.load_dataset(&r.path) {
                Ok(ds) => ds,
                Err(e) => {
                    warn!(name = %r.name, path = %r.path, error = %e, "retrying dataset load");
                    self.load_dataset(&r.path)?
                }
            };
            r.dataset = Some(ds);
        }
        Ok(refs)
    }

    /// Ranked search through the attached index.
    ///
    /// Results whose dataset cannot be loaded are kept without one.
    fn search(&self, params: &SearchParams) -> RepoResult<Vec<DatasetRef>> {
        let index = self
            .search_index()?
            .ok_or_else(|| RepoError::Unsupported("search".into()))?;
        let mut refs = index.search(params)?;
        for r in &mut refs {
            if r.name.is_empty() {
                match self.namestore().get_name(&r.path) {
                    Ok(Some(name)) => r.name = name,
                    Ok(None) => {}
                    Err(e) => warn!(path = %r.path, error = %e, "search: name lookup failed"),
                }
            }
            match self.load_dataset(&r.path) {
                Ok(ds) => r.dataset = Some(ds),
                Err(e) => warn!(path = %r.path, error = %e, "search: dataset load failed"),
            }
        }
        Ok(refs)
    }

    /// Whether a named dataset lives at `path` or uses `path` as its data.
    fn has_path(&self, path: &ContentKey) -> RepoResult<bool> {
        if self.namestore().name_count()? == 0 {
            return Ok(false);
        }
        let wanted = path.package_file();
        for r in self.namestore().names(0, 0)? {
            if r.path.package_file() == wanted {
                return Ok(true);
            }
            match self.load_dataset(&r.path) {
                Ok(ds) if &ds.data == path => return Ok(true),
                Ok(_) => {}
                Err(e) => debug!(name = %r.name, error = %e, "has_path: skipping unreadable dataset"),
            }
        }
        Ok(false)
    }

    /// Index entries for every named dataset that can be loaded.
    fn index_entries(&self) -> RepoResult<BTreeMap<ContentKey, IndexEntry>> {
        let mut entries = BTreeMap::new();
        for r in self.namestore().names(0, 0)? {
            match self.load_dataset(&r.path) {
                Ok(ds) => {
                    entries.insert(r.path.clone(), IndexEntry::new(&r.name, &ds));
                }
                Err(e) => warn!(name = %r.name, error = %e, "index: skipping unreadable dataset"),
            }
        }
        Ok(entries)
    }
}

/// Run `query` against `datasets` and collect the records by path.
pub fn datasets_query(
    datasets: &dyn Datasets,
    query: &Query,
) -> RepoResult<BTreeMap<ContentKey, DatasetRecord>> {
    Ok(datasets
        .query(query)?
        .into_iter()
        .filter_map(|r| r.dataset.map(|ds| (r.path, ds)))
        .collect())
}
