use std::sync::Arc;

use async_trait::async_trait;
use tabula_repo::Repo;
use tabula_types::DatasetRef;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::params::LogParams;
use crate::rpc::RpcClient;

/// The revision history of datasets.
#[async_trait]
pub trait HistoryRequests: Send + Sync {
    fn requests_name(&self) -> &'static str {
        "history"
    }

    /// Revisions from `params.path` back towards the root, newest first.
    ///
    /// Stops after `params.list.limit` revisions (`<= 0` means no limit) or
    /// at the root. Any unreadable revision fails the whole call.
    async fn log(&self, params: &LogParams) -> CoreResult<Vec<DatasetRef>>;
}

/// # Panics
///
/// Panics if both or neither of `repo` and `client` are supplied.
pub fn new_history_requests(
    repo: Option<Arc<dyn Repo>>,
    client: Option<Arc<RpcClient>>,
) -> Box<dyn HistoryRequests> {
    match (repo, client) {
        (Some(repo), None) => Box::new(LocalHistoryRequests::new(repo)),
        (None, Some(client)) => Box::new(RemoteHistoryRequests::new(client)),
        (Some(_), Some(_)) => panic!("both repo and client supplied to new_history_requests"),
        (None, None) => panic!("neither repo nor client supplied to new_history_requests"),
    }
}

pub struct LocalHistoryRequests {
    repo: Arc<dyn Repo>,
}

impl LocalHistoryRequests {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl HistoryRequests for LocalHistoryRequests {
    async fn log(&self, params: &LogParams) -> CoreResult<Vec<DatasetRef>> {
        if params.path.is_empty() {
            return Err(CoreError::Required("path is required"));
        }
        let limit = usize::try_from(params.list.limit).ok().filter(|l| *l > 0);

        let mut log = Vec::new();
        let mut path = params.path.clone();
        loop {
            let ds = self.repo.load_dataset(&path)?;
            let previous = ds.previous.clone();
            log.push(DatasetRef::new("", path).with_dataset(ds));
            if previous.is_empty() || limit.is_some_and(|l| log.len() >= l) {
                break;
            }
            path = previous.package_file();
        }
        debug!(path = %params.path, revisions = log.len(), "walked history");
        Ok(log)
    }
}

#[derive(Debug)]
pub struct RemoteHistoryRequests {
    client: Arc<RpcClient>,
}

impl RemoteHistoryRequests {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HistoryRequests for RemoteHistoryRequests {
    async fn log(&self, params: &LogParams) -> CoreResult<Vec<DatasetRef>> {
        self.client.call("HistoryRequests.Log", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{DatasetRequests, LocalDatasetRequests};
    use crate::params::UpdateParams;
    use tabula_repo::testing::new_test_repo;
    use tabula_types::{ContentKey, DatasetRecord, ListParams};

    fn repo() -> Arc<dyn Repo> {
        Arc::new(new_test_repo().unwrap())
    }

    /// Revise `name` `times` times, returning every path newest first.
    async fn revise(repo: &Arc<dyn Repo>, name: &str, times: usize) -> Vec<ContentKey> {
        let datasets = LocalDatasetRequests::new(repo.clone());
        let mut paths = vec![repo.namestore().get_path(name).unwrap()];
        for i in 0..times {
            let r = datasets
                .update(&UpdateParams {
                    changes: DatasetRecord {
                        title: format!("{name} revision {}", i + 1),
                        previous: ContentKey::new(name),
                        ..Default::default()
                    },
                    ..Default::default()
                })
                .await
                .unwrap();
            paths.push(r.path);
        }
        paths.reverse();
        paths
    }

    fn log_params(path: &ContentKey, limit: i64) -> LogParams {
        LogParams {
            list: ListParams {
                limit,
                ..Default::default()
            },
            path: path.clone(),
        }
    }

    #[tokio::test]
    async fn root_revision_has_a_single_entry() {
        let repo = repo();
        let path = repo.namestore().get_path("movies").unwrap();
        let log = LocalHistoryRequests::new(repo)
            .log(&log_params(&path, 0))
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].path, path);
    }

    #[tokio::test]
    async fn full_chain_newest_first() {
        let repo = repo();
        let paths = revise(&repo, "cities", 3).await;
        let log = LocalHistoryRequests::new(repo)
            .log(&log_params(&paths[0], 0))
            .await
            .unwrap();
        let got: Vec<_> = log.iter().map(|r| r.path.clone()).collect();
        assert_eq!(got, paths);
        assert_eq!(log[0].dataset.as_ref().unwrap().title, "cities revision 3");
        assert!(log[3].dataset.as_ref().unwrap().previous.is_empty());
    }

    #[tokio::test]
    async fn limit_bounds_the_walk() {
        let repo = repo();
        let paths = revise(&repo, "counter", 3).await;
        let log = LocalHistoryRequests::new(repo)
            .log(&log_params(&paths[0], 2))
            .await
            .unwrap();
        let got: Vec<_> = log.iter().map(|r| r.path.clone()).collect();
        assert_eq!(got, paths[..2].to_vec());
    }

    #[tokio::test]
    async fn broken_chain_fails_whole_call() {
        let repo = repo();
        let datasets = LocalDatasetRequests::new(repo.clone());
        let r = datasets
            .update(&UpdateParams {
                changes: DatasetRecord {
                    previous: ContentKey::new("movies"),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        // point a new revision at a path that was never stored
        let mut orphan = r.dataset.unwrap();
        orphan.previous = ContentKey::from_hash("map", &[7u8; 32]).package_file();
        let path = tabula_store::save_dataset(repo.store().as_ref(), &orphan, false).unwrap();

        let err = LocalHistoryRequests::new(repo)
            .log(&log_params(&path, 0))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[tokio::test]
    async fn path_is_required() {
        let err = LocalHistoryRequests::new(repo())
            .log(&LogParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "path is required");
        assert_eq!(LocalHistoryRequests::new(repo()).requests_name(), "history");
    }
}
