use std::sync::Arc;

use async_trait::async_trait;
use tabula_repo::Repo;
use tabula_types::{ListParams, QueryLogItem};

use crate::error::CoreResult;
use crate::rpc::RpcClient;

/// Read access to the log of executed queries.
#[async_trait]
pub trait QueryLogRequests: Send + Sync {
    fn requests_name(&self) -> &'static str {
        "queries"
    }

    /// A page of logged queries, newest first.
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<QueryLogItem>>;
}

/// # Panics
///
/// Panics if both or neither of `repo` and `client` are supplied.
pub fn new_query_log_requests(
    repo: Option<Arc<dyn Repo>>,
    client: Option<Arc<RpcClient>>,
) -> Box<dyn QueryLogRequests> {
    match (repo, client) {
        (Some(repo), None) => Box::new(LocalQueryLogRequests::new(repo)),
        (None, Some(client)) => Box::new(RemoteQueryLogRequests::new(client)),
        (Some(_), Some(_)) => panic!("both repo and client supplied to new_query_log_requests"),
        (None, None) => panic!("neither repo nor client supplied to new_query_log_requests"),
    }
}

pub struct LocalQueryLogRequests {
    repo: Arc<dyn Repo>,
}

impl LocalQueryLogRequests {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl QueryLogRequests for LocalQueryLogRequests {
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<QueryLogItem>> {
        let window = ListParams::new(params.order_by.clone(), params.limit, params.offset);
        Ok(self
            .repo
            .query_log()
            .list_query_logs(window.limit as usize, window.offset as usize)?)
    }
}

#[derive(Debug)]
pub struct RemoteQueryLogRequests {
    client: Arc<RpcClient>,
}

impl RemoteQueryLogRequests {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryLogRequests for RemoteQueryLogRequests {
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<QueryLogItem>> {
        self.client.call("QueryLogRequests.List", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_repo::testing::new_test_repo;
    use tabula_types::ContentKey;

    fn logged_repo() -> Arc<dyn Repo> {
        let repo = new_test_repo().unwrap();
        for (i, q) in ["select * from movies", "select city from cities", "select count from counter"]
            .iter()
            .enumerate()
        {
            repo.query_log()
                .log_query(&QueryLogItem {
                    query: q.to_string(),
                    key: ContentKey::new(format!("/map/q{i}")),
                    time: Some(chrono::Utc::now()),
                    ..Default::default()
                })
                .unwrap();
        }
        Arc::new(repo)
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let req = LocalQueryLogRequests::new(logged_repo());
        let items = req.list(&ListParams::new("", 2, 0)).await.unwrap();
        let queries: Vec<_> = items.iter().map(|q| q.query.as_str()).collect();
        assert_eq!(queries, ["select count from counter", "select city from cities"]);
    }

    #[tokio::test]
    async fn window_is_normalized() {
        let req = LocalQueryLogRequests::new(logged_repo());
        let items = req
            .list(&ListParams {
                order_by: String::new(),
                limit: -1,
                offset: -3,
            })
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(req.requests_name(), "queries");
    }
}
