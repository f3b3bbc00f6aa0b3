//! Dataset records on top of a [`Filestore`].
//!
//! A saved record is a [`Package`] holding a single `dataset.json` file; the
//! key returned by [`save_dataset`] addresses that file directly.

use tabula_types::{ContentKey, DatasetRecord, PACKAGE_FILE_DATASET};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::Package;
use crate::traits::Filestore;

/// Persist a dataset record and return the key of its `dataset.json`.
pub fn save_dataset(
    store: &dyn Filestore,
    dataset: &DatasetRecord,
    pin: bool,
) -> StoreResult<ContentKey> {
    let json = serde_json::to_vec(dataset).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let package = Package::new().with_file(PACKAGE_FILE_DATASET, json);
    let root = store.put_package(&package, pin)?;
    let key = root.package_file();
    debug!(key = %key, "saved dataset");
    Ok(key)
}

/// Load a dataset record by package root or `dataset.json` key.
pub fn load_dataset(store: &dyn Filestore, key: &ContentKey) -> StoreResult<DatasetRecord> {
    let file = key.package_file();
    let bytes = store.get(&file)?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptObject {
        key: file,
        reason: e.to_string(),
    })
}

/// Store a raw data payload.
pub fn save_data(store: &dyn Filestore, data: &[u8], pin: bool) -> StoreResult<ContentKey> {
    store.put(data, pin)
}

/// Load the raw data payload a record points at.
pub fn load_data(store: &dyn Filestore, dataset: &DatasetRecord) -> StoreResult<Vec<u8>> {
    if dataset.data.is_empty() {
        return Err(StoreError::NotFound(ContentKey::empty()));
    }
    store.get(&dataset.data)
}
