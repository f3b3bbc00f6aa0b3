//! Dataset request handlers: create, read, revise, rename, remove, import
//! and page through datasets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tabula_data::{
    extension_data_format, structure_from_bytes, validate, DataError, RowReader, StructuredWriter,
};
use tabula_repo::{coerce_dataset_name, ref_type, validate_name, RefType, Repo, RepoError};
use tabula_store::{load_data, load_dataset, save_data, save_dataset, Source};
use tabula_types::{ContentKey, DatasetRecord, DatasetRef, ListParams, Structure};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_LIST_LIMIT;
use crate::error::{CoreError, CoreResult};
use crate::fetch::{fetch_url, url_filename};
use crate::params::{
    AddParams, DeleteParams, GetDatasetParams, InitDatasetParams, RenameParams, StructuredData,
    StructuredDataParams, UpdateParams,
};
use crate::rpc::RpcClient;

/// Accrual periodicity given to datasets sourced from a URL: weekly.
const URL_ACCRUAL_PERIODICITY: &str = "R/P1W";

/// Operations on datasets, executed locally or on a remote node.
#[async_trait]
pub trait DatasetRequests: Send + Sync {
    fn requests_name(&self) -> &'static str {
        "datasets"
    }

    /// A page of named datasets with their records loaded.
    ///
    /// `limit <= 0` means [`DEFAULT_LIST_LIMIT`]; a negative offset means 0.
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<DatasetRef>>;

    async fn get(&self, params: &GetDatasetParams) -> CoreResult<DatasetRef>;

    /// Create and name a new dataset from a URL or raw bytes.
    async fn init_dataset(&self, params: &InitDatasetParams) -> CoreResult<DatasetRef>;

    /// Write a new revision on top of `params.changes.previous`.
    async fn update(&self, params: &UpdateParams) -> CoreResult<DatasetRef>;

    async fn rename(&self, params: &RenameParams) -> CoreResult<DatasetRef>;

    /// Unpin a dataset and drop its name. Returns `true` on success.
    async fn delete(&self, params: &DeleteParams) -> CoreResult<bool>;

    /// Import a dataset known on the network by hash.
    async fn add_dataset(&self, params: &AddParams) -> CoreResult<DatasetRef>;

    /// Rows of a dataset re-encoded in the requested format.
    async fn structured_data(&self, params: &StructuredDataParams) -> CoreResult<StructuredData>;
}

/// Build dataset handlers over exactly one of a local repo or an RPC client.
///
/// # Panics
///
/// Panics if both or neither are supplied.
pub fn new_dataset_requests(
    repo: Option<Arc<dyn Repo>>,
    client: Option<Arc<RpcClient>>,
) -> Box<dyn DatasetRequests> {
    match (repo, client) {
        (Some(repo), None) => Box::new(LocalDatasetRequests::new(repo)),
        (None, Some(client)) => Box::new(RemoteDatasetRequests::new(client)),
        (Some(_), Some(_)) => panic!("both repo and client supplied to new_dataset_requests"),
        (None, None) => panic!("neither repo nor client supplied to new_dataset_requests"),
    }
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

pub struct LocalDatasetRequests {
    repo: Arc<dyn Repo>,
    fetch_timeout: Duration,
}

impl LocalDatasetRequests {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self {
            repo,
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Resolve the source bytes and the file name used for format detection.
    async fn source(&self, params: &InitDatasetParams) -> CoreResult<(Vec<u8>, String)> {
        if !params.url.is_empty() {
            let data = fetch_url(&params.url, self.fetch_timeout).await?;
            Ok((data, url_filename(&params.url).to_string()))
        } else if let Some(data) = &params.data {
            Ok((data.clone(), params.data_filename.clone()))
        } else {
            Err(CoreError::Required(
                "either a file or a url is required to create a dataset",
            ))
        }
    }
}

/// A record must point at data and carry a usable structure.
fn validate_dataset(ds: &DatasetRecord) -> CoreResult<()> {
    if ds.data.is_empty() {
        return Err(CoreError::Required("dataset data is required"));
    }
    let st = ds
        .structure
        .as_ref()
        .ok_or(CoreError::Required("dataset structure is required"))?;
    validate::structure(st).map_err(CoreError::stage("invalid structure"))
}

#[async_trait]
impl DatasetRequests for LocalDatasetRequests {
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<DatasetRef>> {
        let limit = if params.limit <= 0 {
            DEFAULT_LIST_LIMIT
        } else {
            params.limit
        };
        let offset = params.offset.max(0);
        self.repo
            .namespace(limit as usize, offset as usize)
            .map_err(CoreError::stage("error getting namespace"))
    }

    async fn get(&self, params: &GetDatasetParams) -> CoreResult<DatasetRef> {
        if params.path.is_empty() {
            return Err(CoreError::Required("path is required"));
        }
        let ds = load_dataset(self.repo.store().as_ref(), &params.path)
            .map_err(CoreError::stage("error loading dataset"))?;
        let name = match self.repo.namestore().get_name(&params.path) {
            Ok(Some(name)) => name,
            Ok(None) => params.name.clone(),
            Err(e) => {
                warn!(path = %params.path, error = %e, "get: name lookup failed");
                params.name.clone()
            }
        };
        Ok(DatasetRef::new(name, params.path.clone()).with_dataset(ds))
    }

    async fn init_dataset(&self, params: &InitDatasetParams) -> CoreResult<DatasetRef> {
        let (data, filename) = self.source(params).await?;

        if !params.name.is_empty() {
            validate_name(&params.name).map_err(CoreError::stage("invalid name"))?;
        }

        let format = extension_data_format(&filename)
            .map_err(CoreError::stage("error detecting format extension"))?;
        validate::data_format(format, &data).map_err(CoreError::stage("invalid data format"))?;
        let st = structure_from_bytes(format, &data)
            .map_err(CoreError::stage("error determining dataset schema"))?;
        validate::structure(&st).map_err(CoreError::stage("invalid structure"))?;
        validate::data(&st, &data).map_err(CoreError::stage("invalid data format"))?;

        let store = self.repo.store();
        let data_key = save_data(store.as_ref(), &data, false)
            .map_err(CoreError::stage("error putting data file in store"))?;
        if self
            .repo
            .has_path(&data_key)
            .map_err(CoreError::stage("error checking repo for already-existing data"))?
        {
            return Err(CoreError::AlreadyExists("this data already exists".into()));
        }

        let name = if params.name.is_empty() {
            coerce_dataset_name(&filename)
        } else {
            params.name.clone()
        };

        let mut ds = DatasetRecord::default();
        if !params.url.is_empty() {
            ds.download_url = params.url.clone();
            ds.accrual_periodicity = URL_ACCRUAL_PERIODICITY.to_string();
        }
        if let Some(meta) = &params.metadata {
            let meta: DatasetRecord = serde_json::from_slice(meta)
                .map_err(CoreError::stage("error parsing metadata json"))?;
            ds.assign(&meta);
        }
        ds.timestamp = Some(Utc::now());
        if ds.title.is_empty() {
            ds.title = name.clone();
        }
        ds.data = data_key;
        ds.length = data.len() as u64;
        let mut structure = st;
        if let Some(given) = &ds.structure {
            structure.assign(given);
        }
        ds.structure = Some(structure);
        validate_dataset(&ds)?;

        let path = save_dataset(store.as_ref(), &ds, true)
            .map_err(CoreError::stage("error saving dataset"))?;
        self.repo
            .datasets()
            .put_dataset(&path, &ds)
            .map_err(CoreError::stage("error putting dataset in repo"))?;
        self.repo
            .namestore()
            .put_name(&name, &path)
            .map_err(CoreError::stage("error adding dataset name to repo"))?;

        let ds = match self.repo.datasets().get_dataset(&path) {
            Ok(ds) => ds,
            Err(e) => {
                if let Err(undo) = self.repo.namestore().delete_name(&name) {
                    warn!(name = %name, error = %undo, "init: failed to drop name after read error");
                }
                return Err(CoreError::stage("error reading dataset")(e));
            }
        };
        info!(name = %name, path = %path, "initialized dataset");
        Ok(DatasetRef::new(name, path).with_dataset(ds))
    }

    async fn update(&self, params: &UpdateParams) -> CoreResult<DatasetRef> {
        let reference = params.changes.previous.as_str();
        if reference.is_empty() {
            return Err(CoreError::Required("previous dataset name or path is required"));
        }
        let names = self.repo.namestore();
        let (name, prev_path) = match ref_type(reference) {
            RefType::Name(name) => {
                let path = names
                    .get_path(&name)
                    .map_err(CoreError::stage("error getting previous dataset path"))?;
                (name, path)
            }
            RefType::Path(path) => {
                let name = names.get_name(&path)?.unwrap_or_default();
                (name, path)
            }
        };

        let mut ds = self
            .repo
            .datasets()
            .get_dataset(&prev_path)
            .map_err(CoreError::stage("error getting previous dataset"))?;
        ds.assign(&params.changes);

        let store = self.repo.store();
        if let Some(data) = &params.data {
            if !params.data_filename.is_empty() {
                let format = extension_data_format(&params.data_filename)
                    .map_err(CoreError::stage("error detecting format extension"))?;
                if let Some(st) = ds.structure.as_ref().filter(|st| st.format != format) {
                    return Err(CoreError::stage("invalid data format")(DataError::InvalidData(
                        format!("dataset holds {} data, got a {format} file", st.format),
                    )));
                }
            }
            if let Some(st) = ds.structure.as_mut() {
                st.length = data.len() as u64;
                validate::data(st, data).map_err(CoreError::stage("invalid data format"))?;
            }
            ds.data = save_data(store.as_ref(), data, false)
                .map_err(CoreError::stage("error putting data in store"))?;
            ds.length = data.len() as u64;
        }
        ds.previous = prev_path.clone();
        validate_dataset(&ds)?;

        ds.timestamp = Some(Utc::now());
        let path = save_dataset(store.as_ref(), &ds, true)
            .map_err(CoreError::stage("error saving dataset"))?;
        self.repo
            .datasets()
            .put_dataset(&path, &ds)
            .map_err(CoreError::stage("error putting dataset in repo"))?;

        if !name.is_empty() {
            names
                .rebind(&name, &path)
                .map_err(CoreError::stage("error updating name"))?;
        }
        info!(name = %name, previous = %prev_path, path = %path, "updated dataset");
        Ok(DatasetRef::new(name, path).with_dataset(ds))
    }

    async fn rename(&self, params: &RenameParams) -> CoreResult<DatasetRef> {
        if params.current.is_empty() {
            return Err(CoreError::Required(
                "current name is required to rename a dataset",
            ));
        }
        validate_name(&params.new).map_err(CoreError::stage("invalid name"))?;

        let names = self.repo.namestore();
        match names.get_path(&params.new) {
            Ok(_) => {
                return Err(CoreError::AlreadyExists(format!(
                    "name '{}' already exists",
                    params.new
                )))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        let path = names
            .rename(&params.current, &params.new)
            .map_err(|e| match e {
                RepoError::NameTaken(name) => {
                    CoreError::AlreadyExists(format!("name '{name}' already exists"))
                }
                e => CoreError::stage("error getting dataset")(e),
            })?;

        let ds = self
            .repo
            .load_dataset(&path)
            .map_err(CoreError::stage("error loading dataset"))?;
        info!(from = %params.current, to = %params.new, "renamed dataset");
        Ok(DatasetRef::new(params.new.clone(), path).with_dataset(ds))
    }

    async fn delete(&self, params: &DeleteParams) -> CoreResult<bool> {
        if params.name.is_empty() && params.path.is_empty() {
            return Err(CoreError::Required("either name or path is required"));
        }
        let names = self.repo.namestore();
        let path = if params.path.is_empty() {
            names.get_path(&params.name)?
        } else {
            params.path.clone()
        };
        let name = names
            .get_name(&path)?
            .ok_or_else(|| CoreError::NotFound(format!("dataset {path}")))?;

        let store = self.repo.store();
        if let Some(pinner) = store.as_pinner() {
            pinner.unpin(&path.package_root(), true)?;
        }
        names.delete_name(&name)?;
        match self.repo.datasets().delete_dataset(&path) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        info!(name = %name, path = %path, "deleted dataset");
        Ok(true)
    }

    async fn add_dataset(&self, params: &AddParams) -> CoreResult<DatasetRef> {
        let store = self.repo.store();
        let (fetcher, pinner) = match (store.as_fetcher(), store.as_pinner()) {
            (Some(f), Some(p)) => (f, p),
            _ => {
                return Err(CoreError::Unsupported(
                    "can only add datasets when the blob store can fetch from a network".into(),
                ))
            }
        };

        let key = ContentKey::new(&params.hash).package_root();
        let root = fetcher
            .fetch(&Source::Any, &key)
            .map_err(CoreError::stage("error fetching file"))?;
        pinner
            .pin(&root, true)
            .map_err(CoreError::stage("error pinning root key"))?;

        let path = root.package_file();
        let ds = load_dataset(store.as_ref(), &path)
            .map_err(CoreError::stage("error loading newly saved dataset"))?;
        self.repo
            .datasets()
            .put_dataset(&path, &ds)
            .map_err(CoreError::stage("error putting dataset in repo"))?;
        self.repo
            .namestore()
            .put_name(&params.name, &path)
            .map_err(CoreError::stage("error putting dataset name in repo"))?;
        info!(name = %params.name, path = %path, "added dataset");
        Ok(DatasetRef::new(params.name.clone(), path).with_dataset(ds))
    }

    async fn structured_data(&self, params: &StructuredDataParams) -> CoreResult<StructuredData> {
        let store = self.repo.store();
        let ds = load_dataset(store.as_ref(), &params.path)
            .map_err(CoreError::stage("error loading dataset"))?;
        let data = load_data(store.as_ref(), &ds).map_err(CoreError::stage("error getting file bytes"))?;

        let st = ds.structure.clone().unwrap_or_default();
        let mut out = st.clone();
        out.assign(&Structure {
            format: params.format,
            format_config: params.format_config.clone(),
            ..Default::default()
        });

        let mut writer =
            StructuredWriter::new(&out).map_err(CoreError::stage("error allocating result buffer"))?;
        let reader =
            RowReader::new(&st, &data).map_err(CoreError::stage("error allocating data reader"))?;

        let window = ListParams::new("", params.limit, params.offset);
        let start = usize::try_from(window.offset).unwrap_or(usize::MAX);
        let end = usize::try_from(window.offset.saturating_add(window.limit)).unwrap_or(usize::MAX);
        for (i, row) in reader.enumerate() {
            let row = row.map_err(CoreError::stage("row iteration error"))?;
            if !params.all {
                if i < start {
                    continue;
                }
                if i >= end {
                    break;
                }
            }
            writer
                .write_row(row)
                .map_err(CoreError::stage("row iteration error"))?;
        }

        let bytes = writer
            .finish()
            .map_err(CoreError::stage("error closing row buffer"))?;
        let data = String::from_utf8(bytes).map_err(CoreError::stage("error closing row buffer"))?;
        debug!(path = %params.path, format = %out.format, bytes = data.len(), "structured data");
        Ok(StructuredData {
            path: params.path.clone(),
            data,
        })
    }
}

impl std::fmt::Debug for LocalDatasetRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDatasetRequests")
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Forwards every call to a remote node's `DatasetRequests`.
#[derive(Debug)]
pub struct RemoteDatasetRequests {
    client: Arc<RpcClient>,
}

impl RemoteDatasetRequests {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DatasetRequests for RemoteDatasetRequests {
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<DatasetRef>> {
        self.client.call("DatasetRequests.List", params).await
    }

    async fn get(&self, params: &GetDatasetParams) -> CoreResult<DatasetRef> {
        self.client.call("DatasetRequests.Get", params).await
    }

    async fn init_dataset(&self, params: &InitDatasetParams) -> CoreResult<DatasetRef> {
        self.client.call("DatasetRequests.InitDataset", params).await
    }

    async fn update(&self, params: &UpdateParams) -> CoreResult<DatasetRef> {
        self.client.call("DatasetRequests.Update", params).await
    }

    async fn rename(&self, params: &RenameParams) -> CoreResult<DatasetRef> {
        self.client.call("DatasetRequests.Rename", params).await
    }

    async fn delete(&self, params: &DeleteParams) -> CoreResult<bool> {
        self.client.call("DatasetRequests.Delete", params).await
    }

    async fn add_dataset(&self, params: &AddParams) -> CoreResult<DatasetRef> {
        self.client.call("DatasetRequests.AddDataset", params).await
    }

    async fn structured_data(&self, params: &StructuredDataParams) -> CoreResult<StructuredData> {
        self.client.call("DatasetRequests.StructuredData", params).await
    }
}
