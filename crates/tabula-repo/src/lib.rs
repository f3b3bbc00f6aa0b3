//! Repository layer for Tabula.
//!
//! A [`Repo`] bundles a content-addressed blob store with a set of narrow
//! record stores: the [`Namestore`] of mutable `name -> path` bindings,
//! [`Datasets`] records, remote [`Peers`], and the ancillary query log,
//! change request and analytics stores. Cross-store operations (namespace
//! hydration, search, the dependency graph) are provided methods on the
//! trait, so every backend behaves the same way.
//!
//! # Backends
//!
//! - [`MemRepo`] -- all stores in memory, for tests and ephemeral nodes
//! - [`FsRepo`] -- one versioned JSON file per store under a directory
//!
//! Both pass the same conformance suite (`testing::run_conformance`,
//! behind the `testing` feature).

pub mod error;
pub mod fs;
pub mod graph;
pub mod mem;
pub mod names;
pub mod persisted;
pub mod repo;
pub mod search;
pub mod tables;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;

pub use error::{RepoError, RepoResult};
pub use fs::FsRepo;
pub use graph::{DatasetGraph, GraphCache, GraphNode, Link, LinkKind, NodeKind};
pub use mem::MemRepo;
pub use names::{coerce_dataset_name, ref_type, valid_dataset_name, validate_name, RefType};
pub use repo::{datasets_query, Repo};
pub use search::{IndexEntry, SearchIndex};
pub use traits::{
    Analytics, ChangeRequestStore, Datasets, Namestore, Peers, Query, QueryLog, SearchParams,
    Searchable,
};
