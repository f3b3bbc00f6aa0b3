//! Foundation types for Tabula.
//!
//! Tabula is a versioned, content-addressed repository for tabular datasets.
//! Every crate in the workspace depends on `tabula-types`.
//!
//! # Key Types
//!
//! - [`ContentKey`] — Immutable content-addressed path (`/map/<hash>/dataset.json`)
//! - [`PeerId`] — Stable identifier of a node, derived with BLAKE3
//! - [`Profile`] — A peer's identity record with a deterministic nickname
//! - [`DatasetRecord`] — One immutable revision of a dataset
//! - [`DatasetRef`] — A resolved `(name, path, dataset)` pointer
//! - [`Structure`] — Format, format options, and schema of a dataset's data
//! - [`ListParams`] / [`Page`] — Pagination in `(limit, offset)` and `(page, size)` form

pub mod dataset;
pub mod error;
pub mod identity;
pub mod key;
pub mod log;
pub mod params;
pub mod profile;
pub mod structure;

pub use dataset::{DatasetRecord, DatasetRef};
pub use error::TypeError;
pub use identity::{nickname, PeerId};
pub use key::{ContentKey, PACKAGE_FILE_DATASET};
pub use log::{ChangeRequest, ChangeRequestStatus, QueryLogItem};
pub use params::{ListParams, Page, DEFAULT_PAGE_SIZE};
pub use profile::Profile;
pub use structure::{DataFormat, Field, FieldType, FormatConfig, Schema, Structure};
