//! Content-addressed blob storage for Tabula.
//!
//! Every dataset revision and every raw data payload is stored as an
//! immutable object keyed by its BLAKE3 hash (domain-separated by object
//! kind). Keys are [`ContentKey`](tabula_types::ContentKey) paths of the form
//! `/<namespace>/<hex>`; a file inside a package is addressed as
//! `/<namespace>/<hex>/<file>`.
//!
//! # Object Types
//!
//! - [`ObjectKind::Blob`] -- raw data (CSV or JSON bytes)
//! - [`Package`] -- a small named-file bundle; a saved dataset record lives at
//!   `<package>/dataset.json`
//!
//! # Storage Backends
//!
//! All backends implement the [`Filestore`] trait:
//!
//! - [`MapStore`] -- `HashMap`-based store for tests and ephemeral nodes; can
//!   fetch from a set of network stores
//! - [`FsBlobStore`] -- one file per object under a directory, with pins
//!   recorded in `pins.json`
//!
//! Optional capabilities are exposed through [`Filestore::as_pinner`] and
//! [`Filestore::as_fetcher`].

pub mod dsfs;
pub mod error;
pub mod fs;
pub mod hasher;
pub mod memory;
pub mod object;
pub mod traits;

pub use dsfs::{load_data, load_dataset, save_data, save_dataset};
pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use hasher::ContentHasher;
pub use memory::MapStore;
pub use object::{ObjectKind, Package, StoredObject};
pub use traits::{Fetcher, Filestore, Pinner, Source};
