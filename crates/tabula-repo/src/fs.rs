use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tabula_store::Filestore;
use tabula_types::{PeerId, Profile};
use tracing::{debug, info};

use crate::error::RepoResult;
use crate::graph::GraphCache;
use crate::persisted::Persisted;
use crate::repo::Repo;
use crate::search::{IndexSlot, SEARCH_INDEX_FILE};
use crate::tables::{
    AnalyticsTable, ChangeRequestTable, DatasetTable, NameTable, PeerTable, QueryLogTable,
};
use crate::traits::{
    Analytics, ChangeRequestStore, Datasets, Namestore, Peers, QueryLog, Searchable,
};

const PROFILE_FILE: &str = "profile.json";
const DATASETS_FILE: &str = "datasets.json";
const CACHE_FILE: &str = "cache.json";

/// Every file a repository directory may hold.
const REPO_FILES: &[&str] = &[
    PROFILE_FILE,
    "peers.json",
    "namespace.json",
    DATASETS_FILE,
    CACHE_FILE,
    "query_log.json",
    "change_requests.json",
    "analytics.json",
    SEARCH_INDEX_FILE,
];

/// A repository persisted as one JSON file per store under a directory.
///
/// Dataset content lives in the supplied blob store, not in the repository
/// directory.
pub struct FsRepo {
    base: PathBuf,
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

impl FsRepo {
    /// Open (or create) the repository at `base`.
    ///
    /// A profile for `peer_id` is written if none exists yet, and a profile
    /// without a username gets the peer's nickname.
    pub fn open(
        base: impl AsRef<Path>,
        store: Arc<dyn Filestore>,
        peer_id: &PeerId,
    ) -> RepoResult<Self> {
        let base = base.as_ref().to_path_buf();
        std::fs::create_dir_all(&base)?;
        let repo = Self {
            datasets: DatasetTable::open(&base, DATASETS_FILE, Some(Arc::clone(&store)))?,
            cache: DatasetTable::open(&base, CACHE_FILE, None)?,
            names: NameTable::open(&base)?,
            peers: PeerTable::open(&base)?,
            query_log: QueryLogTable::open(&base)?,
            change_requests: ChangeRequestTable::open(&base)?,
            analytics: AnalyticsTable::open(&base)?,
            profile: Persisted::open(base.join(PROFILE_FILE))?,
            search: IndexSlot::open(&base),
            graph: GraphCache::new(),
            store,
            base,
        };
        repo.ensure_profile(peer_id)?;
        info!(path = %repo.base.display(), "opened repo");
        Ok(repo)
    }

    fn ensure_profile(&self, peer_id: &PeerId) -> RepoResult<()> {
        let needs_write = self
            .profile
            .file()
            .is_some_and(|f| !f.exists())
            || self.profile.read(|p| p.id.is_empty() || p.username.is_empty());
        if !needs_write {
            return Ok(());
        }
        self.profile.update(|p| {
            if p.id.is_empty() {
                p.id = peer_id.clone();
            }
            if p.created.is_none() {
                p.created = Some(chrono::Utc::now());
            }
            p.ensure_username(peer_id.as_str());
            debug!(id = %p.id, username = %p.username, "wrote local profile");
            Ok(())
        })
    }

    pub fn path(&self) -> &Path {
        &self.base
    }

    /// Record a batch of peer profiles.
    pub fn save_peers(&self, profiles: &[Profile]) -> RepoResult<()> {
        for p in profiles {
            self.peers.put_peer(&p.id, p)?;
        }
        Ok(())
    }
}

impl Repo for FsRepo {
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

    /// Delete every repository file. Blob content is left to the store.
    fn destroy(&self) -> RepoResult<()> {
        for name in REPO_FILES {
            match std::fs::remove_file(self.base.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(path = %self.base.display(), "destroyed repo");
        Ok(())
    }
}

impl fmt::Debug for FsRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsRepo")
            .field("base", &self.base)
            .field("store", &self.store.path_prefix())
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run_conformance, seed_test_repo};
    use tabula_store::FsBlobStore;
    use tabula_types::{nickname, ContentKey};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FsRepo {
        let store = Arc::new(FsBlobStore::open(dir.path().join("blobs")).unwrap());
        FsRepo::open(dir.path().join("repo"), store, &PeerId::new("QmLocal")).unwrap()
    }

    #[test]
    fn conformance() {
        let dir = TempDir::new().unwrap();
        run_conformance(&open(&dir));
    }

    #[test]
    fn writes_profile_with_nickname() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);
        let p = repo.profile().unwrap();
        assert_eq!(p.id, PeerId::new("QmLocal"));
        assert_eq!(p.username, nickname("QmLocal"));
        assert!(dir.path().join("repo/profile.json").exists());
    }

    #[test]
    fn configured_username_is_kept() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);
        let mut p = repo.profile().unwrap();
        p.username = "cartographer".into();
        repo.save_profile(&p).unwrap();
        drop(repo);
        assert_eq!(open(&dir).profile().unwrap().username, "cartographer");
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let repo = open(&dir);
            seed_test_repo(&repo).unwrap();
            repo.save_peers(&[Profile::new(PeerId::new("QmRemote"))]).unwrap();
            repo.analytics().increment("views").unwrap();
            repo.update_search_index().unwrap();
        }
        let repo = open(&dir);
        assert_eq!(repo.namestore().name_count().unwrap(), 3);
        let ns = repo.namespace(0, 0).unwrap();
        assert_eq!(ns[0].name, "movies");
        assert!(ns[0].dataset.is_some());
        assert!(repo.peers().get_peer(&PeerId::new("QmRemote")).is_ok());
        assert_eq!(repo.analytics().count("views").unwrap(), 1);
        assert!(repo.search_index().unwrap().is_some());
    }

    #[test]
    fn failed_write_does_not_bind_name() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);
        let file = dir.path().join("repo/namespace.json");
        if file.exists() {
            std::fs::remove_file(&file).unwrap();
        }
        std::fs::create_dir(&file).unwrap();

        let ns = repo.namestore();
        assert!(ns.put_name("ghost", &ContentKey::new("/map/abc")).is_err());
        assert!(ns.get_path("ghost").unwrap_err().is_not_found());
        assert_eq!(ns.name_count().unwrap(), 0);
    }

    #[test]
    fn destroy_removes_files() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);
        seed_test_repo(&repo).unwrap();
        assert!(dir.path().join("repo/namespace.json").exists());
        repo.destroy().unwrap();
        for name in REPO_FILES {
            assert!(!dir.path().join("repo").join(name).exists(), "{name} left behind");
        }
    }
}
