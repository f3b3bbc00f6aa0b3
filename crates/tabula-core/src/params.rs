//! Request and response bodies shared by local and remote handlers.
//!
//! Every type here serializes to JSON unchanged, so a remote call carries
//! exactly the value the local handler would have received.

use serde::{Deserialize, Serialize};
use tabula_types::{ContentKey, DataFormat, DatasetRecord, FormatConfig, ListParams};

/// Arguments to `DatasetRequests::init_dataset`.
///
/// Either `url` or `data` must be set. `data_filename` supplies the extension
/// used for format detection when the bytes are given directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitDatasetParams {
    /// Name to bind. Derived from the file name when empty.
    pub name: String,
    pub url: String,
    pub data_filename: String,
    pub data: Option<Vec<u8>>,
    /// JSON metadata merged into the new record.
    pub metadata: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetDatasetParams {
    pub path: ContentKey,
    pub name: String,
    pub hash: String,
}

/// Arguments to `DatasetRequests::update`.
///
/// `changes.previous` names the revision being replaced, either by dataset
/// name or by content path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateParams {
    pub changes: DatasetRecord,
    /// When set, its extension must name the format the dataset already holds.
    pub data_filename: String,
    /// Replacement data. The previous revision's data is kept when unset.
    pub data: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameParams {
    pub current: String,
    pub new: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteParams {
    pub path: ContentKey,
    pub name: String,
}

/// Arguments to `DatasetRequests::structured_data`.
///
/// Rows `offset..offset + limit` are returned unless `all` is set. The output
/// encoding is `format` with `format_config`, falling back to the dataset's
/// own format when `format` is unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredDataParams {
    pub format: DataFormat,
    pub format_config: Option<FormatConfig>,
    pub path: ContentKey,
    pub limit: i64,
    pub offset: i64,
    pub all: bool,
}

/// Encoded rows alongside the path they were read from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredData {
    pub path: ContentKey,
    pub data: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddParams {
    pub name: String,
    /// Content path of the dataset on the network.
    pub hash: String,
}

/// Arguments to `HistoryRequests::log`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogParams {
    #[serde(flatten)]
    pub list: ListParams,
    /// Revision to start walking back from.
    pub path: ContentKey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceParams {
    pub peer_id: String,
    pub limit: i64,
    pub offset: i64,
}

/// Peer lookup by id (`hash`) or nickname (`username`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetParams {
    pub username: String,
    pub name: String,
    pub hash: String,
}

/// Payload of a `Datasets` peer message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetsRequest {
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_params_flatten_list() {
        let p = LogParams {
            list: ListParams::new("", 2, 0),
            path: ContentKey::new("/map/abc/dataset.json"),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["limit"], 2);
        assert_eq!(v["path"], "/map/abc/dataset.json");
        let back: LogParams = serde_json::from_value(v).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn partial_params_decode() {
        let p: InitDatasetParams =
            serde_json::from_str(r#"{"url": "https://example.com/a.csv"}"#).unwrap();
        assert_eq!(p.url, "https://example.com/a.csv");
        assert!(p.data.is_none());
        let p: DeleteParams = serde_json::from_str(r#"{"name": "movies"}"#).unwrap();
        assert!(p.path.is_empty());
    }
}
