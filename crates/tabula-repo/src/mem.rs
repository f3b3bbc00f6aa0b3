use std::fmt;
use std::sync::Arc;

use tabula_store::Filestore;
use tabula_types::Profile;

use crate::error::RepoResult;
use crate::graph::GraphCache;
use crate::persisted::Persisted;
use crate::repo::Repo;
use crate::search::IndexSlot;
use crate::tables::{
    AnalyticsTable, ChangeRequestTable, DatasetTable, NameTable, PeerTable, QueryLogTable,
};
use crate::traits::{
    Analytics, ChangeRequestStore, Datasets, Namestore, Peers, QueryLog, Searchable,
};

/// A repository held entirely in memory.
///
/// Used for tests and ephemeral nodes. Nothing survives the process.
pub struct MemRepo {
    store: Arc<dyn Filestore>,
    names: NameTable,
    datasets: DatasetTable,
    cache: DatasetTable,
    peers: PeerTable,
    query_log: QueryLogTable,
    change_requests: ChangeRequestTable,
    analytics: AnalyticsTable,
    profile: Persisted<Profile>,
    search: IndexSlot,
    graph: GraphCache,
}

impl MemRepo {
    pub fn new(store: Arc<dyn Filestore>, profile: Profile) -> Self {
        Self {
            datasets: DatasetTable::in_memory(Some(Arc::clone(&store))),
            store,
            names: NameTable::in_memory(),
            cache: DatasetTable::in_memory(None),
            peers: PeerTable::in_memory(),
            query_log: QueryLogTable::in_memory(),
            change_requests: ChangeRequestTable::in_memory(),
            analytics: AnalyticsTable::in_memory(),
            profile: Persisted::in_memory(profile),
            search: IndexSlot::in_memory(),
            graph: GraphCache::new(),
        }
    }
}

impl Repo for MemRepo {
    fn store(&self) -> Arc<dyn Filestore> {
        Arc::clone(&self.store)
    }

    fn namestore(&self) -> &dyn Namestore {
        &self.names
    }

    fn datasets(&self) -> &dyn Datasets {
        &self.datasets
    }

    fn cache(&self) -> &dyn Datasets {
        &self.cache
    }

    fn peers(&self) -> &dyn Peers {
        &self.peers
    }

    fn query_log(&self) -> &dyn QueryLog {
        &self.query_log
    }

    fn change_requests(&self) -> &dyn ChangeRequestStore {
        &self.change_requests
    }

    fn analytics(&self) -> &dyn Analytics {
        &self.analytics
    }

    fn profile(&self) -> RepoResult<Profile> {
        Ok(self.profile.read(Profile::clone))
    }

    fn save_profile(&self, profile: &Profile) -> RepoResult<()> {
        self.profile.update(|p| {
            *p = profile.clone();
            Ok(())
        })
    }

    fn search_index(&self) -> RepoResult<Option<Arc<dyn Searchable>>> {
        Ok(self
            .search
            .get()?
            .map(|index| index as Arc<dyn Searchable>))
    }

    fn update_search_index(&self) -> RepoResult<()> {
        self.search.rebuild(self.index_entries()?)
    }

    fn graph_cache(&self) -> &GraphCache {
        &self.graph
    }

    /// Nothing is persisted, so there is nothing to remove.
    fn destroy(&self) -> RepoResult<()> {
        Ok(())
    }
}

impl fmt::Debug for MemRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemRepo")
            .field("store", &self.store.path_prefix())
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_test_repo, run_conformance};
    use tabula_store::MapStore;

    #[test]
    fn conformance() {
        let repo = MemRepo::new(Arc::new(MapStore::new()), Profile::default());
        run_conformance(&repo);
    }

    #[test]
    fn test_repo_is_seeded() {
        let repo = new_test_repo().unwrap();
        assert_eq!(repo.namestore().name_count().unwrap(), 3);
        assert_eq!(repo.profile().unwrap().username, "test_user");
        let ns = repo.namespace(0, 0).unwrap();
        assert!(ns.iter().all(|r| r.dataset.is_some()));
    }

    #[test]
    fn destroy_is_a_no_op() {
        let repo = new_test_repo().unwrap();
        repo.destroy().unwrap();
        assert_eq!(repo.namestore().name_count().unwrap(), 3);
    }
}
