//! Structured data handling for Tabula datasets.
//!
//! Raw data is CSV or JSON bytes. This crate detects the format of a payload
//! from its file name, checks that it is well formed, infers a
//! [`Structure`](tabula_types::Structure) (columns and value types), and
//! reads or writes rows in any supported encoding.
//!
//! Rows are `Vec<serde_json::Value>`, one value per schema field, so the same
//! row can be re-encoded as a CSV record, a JSON array or a JSON object.

pub mod detect;
pub mod error;
pub mod rows;
pub mod validate;
pub mod writer;

pub use detect::{extension_data_format, structure_from_bytes, structure_from_filename};
pub use error::{DataError, DataResult};
pub use rows::{each_row, RowReader};
pub use writer::StructuredWriter;
