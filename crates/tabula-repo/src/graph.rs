//! Dependency graph of every named dataset in a repository.
//!
//! [`DatasetGraph`] maps each content path reachable from the namespace to a
//! [`GraphNode`]. Dataset revisions link to their data blob and to the
//! revision they replaced, so the graph covers whole history chains.
//!
//! # Invariants
//!
//! - Node paths are unique; dataset nodes are keyed by their
//!   `/…/dataset.json` path.
//! - The graph is a snapshot: it is built once per repository instance and
//!   never refreshed.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tabula_types::ContentKey;
use tracing::{debug, warn};

use crate::error::RepoResult;
use crate::repo::Repo;

/// What a graph node stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Dataset,
    Data,
}

/// Why one node points at another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// A dataset revision's raw data blob.
    Data,
    /// The revision this one replaced.
    Previous,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Data => write!(f, "data"),
            LinkKind::Previous => write!(f, "previous"),
        }
    }
}

/// An outgoing edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub to: ContentKey,
}

/// One content path in the graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub path: ContentKey,
    pub kind: NodeKind,
    /// Names bound to this path, if any.
    pub names: Vec<String>,
    pub links: Vec<Link>,
}

impl GraphNode {
    fn new(path: ContentKey, kind: NodeKind) -> Self {
        Self {
            path,
            kind,
            names: Vec::new(),
            links: Vec::new(),
        }
    }
}

/// Aggregate graph of named datasets, their history and their data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatasetGraph {
    nodes: BTreeMap<ContentKey, GraphNode>,
}

impl DatasetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk every name in `repo` and its history chain.
    ///
    /// A revision that cannot be loaded is logged and left as a leaf; it
    /// does not fail the build.
    pub fn build<R: Repo + ?Sized>(repo: &R) -> RepoResult<Self> {
        let mut graph = Self::new();
        let store = repo.store();
        for r in repo.namestore().names(0, 0)? {
            let mut path = r.path.package_file();
            graph.node_mut(&path, NodeKind::Dataset).names.push(r.name.clone());

            let mut seen = HashSet::new();
            while seen.insert(path.clone()) {
                let ds = match tabula_store::load_dataset(store.as_ref(), &path) {
                    Ok(ds) => ds,
                    Err(e) => {
                        warn!(name = %r.name, path = %path, error = %e, "graph: skipping unreadable dataset");
                        break;
                    }
                };
                if !ds.data.is_empty() {
                    graph.link(&path, LinkKind::Data, &ds.data, NodeKind::Data);
                }
                if ds.previous.is_empty() {
                    break;
                }
                let prev = ds.previous.package_file();
                graph.link(&path, LinkKind::Previous, &prev, NodeKind::Dataset);
                path = prev;
            }
        }
        debug!(nodes = graph.len(), "built dataset graph");
        Ok(graph)
    }

    fn node_mut(&mut self, path: &ContentKey, kind: NodeKind) -> &mut GraphNode {
        self.nodes
            .entry(path.clone())
            .or_insert_with(|| GraphNode::new(path.clone(), kind))
    }

    fn link(&mut self, from: &ContentKey, kind: LinkKind, to: &ContentKey, to_kind: NodeKind) {
        self.node_mut(to, to_kind);
        let node = self.node_mut(from, NodeKind::Dataset);
        let link = Link {
            kind,
            to: to.clone(),
        };
        if !node.links.contains(&link) {
            node.links.push(link);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node at `path`. Dataset paths may be given with or without the
    /// `dataset.json` suffix.
    pub fn node(&self, path: &ContentKey) -> Option<&GraphNode> {
        self.nodes
            .get(path)
            .or_else(|| self.nodes.get(&path.package_file()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Nodes with a link pointing at `path`.
    pub fn dependents(&self, path: &ContentKey) -> Vec<&GraphNode> {
        self.nodes
            .values()
            .filter(|n| n.links.iter().any(|l| &l.to == path))
            .collect()
    }
}

/// Memo slot for a repository's graph.
///
/// At most one build succeeds per slot; a failed build leaves the slot empty
/// so the next call tries again. The lock is held while building, so
/// concurrent first calls do not race.
#[derive(Default)]
pub struct GraphCache {
    graph: Mutex<Option<Arc<DatasetGraph>>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        build: impl FnOnce() -> RepoResult<DatasetGraph>,
    ) -> RepoResult<Arc<DatasetGraph>> {
        let mut slot = self.graph.lock().expect("lock poisoned");
        if let Some(graph) = slot.as_ref() {
            return Ok(Arc::clone(graph));
        }
        let graph = Arc::new(build()?);
        *slot = Some(Arc::clone(&graph));
        Ok(graph)
    }

    pub fn is_built(&self) -> bool {
        self.graph.lock().expect("lock poisoned").is_some()
    }
}

impl fmt::Debug for GraphCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphCache")
            .field("built", &self.is_built())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoError;
    use crate::mem::MemRepo;
    use crate::traits::Namestore;
    use tabula_store::{save_data, save_dataset, MapStore};
    use tabula_types::{DatasetRecord, Profile};

    fn repo_with_history() -> (MemRepo, Vec<ContentKey>) {
        let repo = MemRepo::new(Arc::new(MapStore::new()), Profile::default());
        let store = repo.store();
        let data = save_data(store.as_ref(), b"a,b\n1,2\n", true).unwrap();
        let mut previous = ContentKey::empty();
        let mut paths = Vec::new();
        for title in ["one", "two", "three"] {
            let ds = DatasetRecord {
                title: title.into(),
                data: data.clone(),
                previous: previous.clone(),
                ..Default::default()
            };
            previous = save_dataset(store.as_ref(), &ds, true).unwrap();
            paths.push(previous.clone());
        }
        repo.namestore().put_name("history", &previous).unwrap();
        (repo, paths)
    }

    #[test]
    fn builds_history_links() {
        let (repo, paths) = repo_with_history();
        let graph = repo.graph().unwrap();
        // three revisions plus one shared data blob
        assert_eq!(graph.len(), 4);

        let head = graph.node(&paths[2]).unwrap();
        assert_eq!(head.names, vec!["history".to_string()]);
        assert!(head
            .links
            .iter()
            .any(|l| l.kind == LinkKind::Previous && l.to == paths[1]));

        let root = graph.node(&paths[0]).unwrap();
        assert!(root.links.iter().all(|l| l.kind == LinkKind::Data));
        assert_eq!(graph.dependents(&root.links[0].to).len(), 3);
    }

    #[test]
    fn graph_is_memoized() {
        let (repo, _) = repo_with_history();
        let first = repo.graph().unwrap();
        repo.namestore()
            .put_name("later", &ContentKey::new("/map/unknown"))
            .unwrap();
        let second = repo.graph().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_build_is_retried() {
        let cache = GraphCache::new();
        let res = cache.get_or_build(|| Err(RepoError::NotFound("x".into())));
        assert!(res.is_err());
        assert!(!cache.is_built());
        let g = cache.get_or_build(|| Ok(DatasetGraph::new())).unwrap();
        assert!(g.is_empty());
        assert!(cache.is_built());
    }

    #[test]
    fn unreadable_dataset_is_a_leaf() {
        let repo = MemRepo::new(Arc::new(MapStore::new()), Profile::default());
        repo.namestore()
            .put_name("ghost", &ContentKey::new("/map/deadbeef"))
            .unwrap();
        let graph = repo.graph().unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.node(&ContentKey::new("/map/deadbeef")).is_some());
    }
}
