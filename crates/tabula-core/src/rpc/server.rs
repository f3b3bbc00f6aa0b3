use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tabula_protocol::{
    decode_json, encode_json, read_frame, write_frame, ErrorKind, ProtocolError, RpcMessage,
    PROTOCOL_VERSION,
};
use tabula_repo::Repo;
use tabula_types::{ListParams, PeerId};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::datasets::{DatasetRequests, LocalDatasetRequests};
use crate::error::{CoreError, CoreResult};
use crate::history::{HistoryRequests, LocalHistoryRequests};
use crate::node::handle_peer_message;
use crate::params::{
    AddParams, DeleteParams, GetDatasetParams, GetParams, InitDatasetParams, LogParams,
    NamespaceParams, RenameParams, StructuredDataParams, UpdateParams,
};
use crate::peers::{LocalPeerRequests, PeerNode, PeerRequests};
use crate::queries::{LocalQueryLogRequests, QueryLogRequests};

/// Serves the local request handlers to [`RpcClient`](super::RpcClient)s.
///
/// Each connection is handled on its own task. Peer requests are only
/// available when the server runs with a [`PeerNode`].
pub struct RpcServer {
    repo: Arc<dyn Repo>,
    datasets: LocalDatasetRequests,
    history: LocalHistoryRequests,
    queries: LocalQueryLogRequests,
    peers: Option<LocalPeerRequests>,
}

impl RpcServer {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self {
            datasets: LocalDatasetRequests::new(Arc::clone(&repo)),
            history: LocalHistoryRequests::new(Arc::clone(&repo)),
            queries: LocalQueryLogRequests::new(Arc::clone(&repo)),
            peers: None,
            repo,
        }
    }

    pub fn with_node(mut self, node: Arc<dyn PeerNode>) -> Self {
        self.peers = Some(LocalPeerRequests::new(node));
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.datasets = self.datasets.with_fetch_timeout(timeout);
        self
    }

    /// Bind `addr` and serve until the listener fails.
    pub async fn listen(self: Arc<Self>, addr: SocketAddr) -> CoreResult<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> CoreResult<()> {
        info!(addr = %listener.local_addr()?, "rpc server listening");
        loop {
            let (stream, addr) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!(%addr, error = %e, "rpc connection closed with error");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> CoreResult<()> {
        match read_frame(&mut stream).await? {
            Some(RpcMessage::Hello { version }) if version == PROTOCOL_VERSION => {
                write_frame(
                    &mut stream,
                    &RpcMessage::HelloAck {
                        version: PROTOCOL_VERSION,
                    },
                )
                .await?;
            }
            Some(RpcMessage::Hello { version }) => {
                let err = ProtocolError::VersionMismatch {
                    local: PROTOCOL_VERSION,
                    remote: version,
                };
                write_frame(
                    &mut stream,
                    &RpcMessage::error(0, ErrorKind::Unsupported, err.to_string()),
                )
                .await?;
                return Err(err.into());
            }
            Some(other) => {
                return Err(ProtocolError::Unexpected {
                    expected: "Hello",
                    got: other.type_name(),
                }
                .into())
            }
            None => return Ok(()),
        }

        while let Some(msg) = read_frame(&mut stream).await? {
            let reply = match msg {
                RpcMessage::Request { id, method, params } => {
                    match self.dispatch(&method, &params).await {
                        Ok(result) => RpcMessage::Response { id, result },
                        Err(e) => {
                            debug!(id, %method, error = %e, "request failed");
                            RpcMessage::error(id, e.kind(), e.to_string())
                        }
                    }
                }
                RpcMessage::Peer { message } => {
                    match handle_peer_message(self.repo.as_ref(), &message) {
                        Ok(message) => RpcMessage::Peer { message },
                        Err(e) => RpcMessage::error(0, e.kind(), e.to_string()),
                    }
                }
                other => RpcMessage::error(
                    0,
                    ErrorKind::Other,
                    format!("unexpected {} message", other.type_name()),
                ),
            };
            write_frame(&mut stream, &reply).await?;
        }
        Ok(())
    }

    /// Run one `"<Service>.<Method>"` call against the local handlers.
    async fn dispatch(&self, method: &str, raw: &[u8]) -> CoreResult<Vec<u8>> {
        match method {
            "DatasetRequests.List" => reply(
                &self
                    .datasets
                    .list(&params::<ListParams>(raw)?)
                    .await?,
            ),
            "DatasetRequests.Get" => {
                reply(&self.datasets.get(&params::<GetDatasetParams>(raw)?).await?)
            }
            "DatasetRequests.InitDataset" => reply(
                &self
                    .datasets
                    .init_dataset(&params::<InitDatasetParams>(raw)?)
                    .await?,
            ),
            "DatasetRequests.Update" => {
                reply(&self.datasets.update(&params::<UpdateParams>(raw)?).await?)
            }
            "DatasetRequests.Rename" => {
                reply(&self.datasets.rename(&params::<RenameParams>(raw)?).await?)
            }
            "DatasetRequests.Delete" => {
                reply(&self.datasets.delete(&params::<DeleteParams>(raw)?).await?)
            }
            "DatasetRequests.AddDataset" => reply(
                &self
                    .datasets
                    .add_dataset(&params::<AddParams>(raw)?)
                    .await?,
            ),
            "DatasetRequests.StructuredData" => reply(
                &self
                    .datasets
                    .structured_data(&params::<StructuredDataParams>(raw)?)
                    .await?,
            ),
            "HistoryRequests.Log" => {
                reply(&self.history.log(&params::<LogParams>(raw)?).await?)
            }
            "QueryLogRequests.List" => {
                reply(&self.queries.list(&params::<ListParams>(raw)?).await?)
            }
            m if m.starts_with("PeerRequests.") => self.dispatch_peers(m, raw).await,
            _ => Err(CoreError::Unsupported(format!("unknown method {method}"))),
        }
    }

    async fn dispatch_peers(&self, method: &str, raw: &[u8]) -> CoreResult<Vec<u8>> {
        let peers = self.peers.as_ref().ok_or_else(|| {
            CoreError::Unsupported("peer requests need a running node".to_string())
        })?;
        match method {
            "PeerRequests.List" => reply(&peers.list(&params::<ListParams>(raw)?).await?),
            "PeerRequests.ConnectedPeers" => {
                reply(&peers.connected_peers(params::<i64>(raw)?).await?)
            }
            "PeerRequests.ConnectToPeer" => {
                reply(&peers.connect_to_peer(&params::<PeerId>(raw)?).await?)
            }
            "PeerRequests.Get" => reply(&peers.get(&params::<GetParams>(raw)?).await?),
            "PeerRequests.GetNamespace" => reply(
                &peers
                    .get_namespace(&params::<NamespaceParams>(raw)?)
                    .await?,
            ),
            _ => Err(CoreError::Unsupported(format!("unknown method {method}"))),
        }
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("peers", &self.peers.is_some())
            .finish_non_exhaustive()
    }
}

fn params<P: DeserializeOwned>(raw: &[u8]) -> CoreResult<P> {
    decode_json(raw).map_err(CoreError::stage("error decoding params"))
}

fn reply<R: Serialize>(result: &R) -> CoreResult<Vec<u8>> {
    Ok(encode_json(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::new_dataset_requests;
    use crate::history::new_history_requests;
    use crate::node::TcpPeerNode;
    use crate::peers::new_peer_requests;
    use crate::rpc::RpcClient;
    use tabula_protocol::{Message, MsgType};
    use tabula_repo::testing::new_test_repo;
    use tabula_types::{ContentKey, DatasetRef, Profile};

    async fn start(server: RpcServer) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::new(server).serve(listener));
        addr
    }

    async fn serve_test_repo() -> (Arc<dyn Repo>, Arc<RpcClient>) {
        let repo: Arc<dyn Repo> = Arc::new(new_test_repo().unwrap());
        let addr = start(RpcServer::new(Arc::clone(&repo))).await;
        let client = RpcClient::connect(addr).await.unwrap();
        (repo, Arc::new(client))
    }

    #[tokio::test]
    async fn remote_list_matches_local() {
        let (repo, client) = serve_test_repo().await;
        let local = new_dataset_requests(Some(repo), None);
        let remote = new_dataset_requests(None, Some(client));
        let params = ListParams::new("", 10, 0);
        let want: Vec<DatasetRef> = local.list(&params).await.unwrap();
        let got = remote.list(&params).await.unwrap();
        assert_eq!(got, want);
        assert_eq!(got.len(), 3);
    }

    #[tokio::test]
    async fn remote_errors_keep_their_kind() {
        let (repo, client) = serve_test_repo().await;
        let local = new_dataset_requests(Some(repo), None);
        let remote = new_dataset_requests(None, Some(client));

        let missing = DeleteParams {
            path: ContentKey::new("/map/nothing/dataset.json"),
            ..Default::default()
        };
        let want = local.delete(&missing).await.unwrap_err();
        let got = remote.delete(&missing).await.unwrap_err();
        assert!(want.is_not_found());
        assert!(got.is_not_found());
        assert_eq!(got.to_string(), want.to_string());

        let renames = [
            (
                RenameParams {
                    current: "movies".into(),
                    new: "cities".into(),
                },
                ErrorKind::AlreadyExists,
            ),
            (RenameParams::default(), ErrorKind::Required),
        ];
        for (params, kind) in renames {
            let want = local.rename(&params).await.unwrap_err();
            let got = remote.rename(&params).await.unwrap_err();
            assert_eq!(want.kind(), kind, "{want}");
            assert_eq!(got.kind(), kind, "{got}");
            assert_eq!(got.to_string(), want.to_string());
        }

        let add = AddParams {
            name: "x".into(),
            hash: "/map/abc".into(),
        };
        let want = local.add_dataset(&add).await.unwrap_err();
        let got = remote.add_dataset(&add).await.unwrap_err();
        assert_eq!(want.kind(), ErrorKind::Unsupported);
        assert_eq!(got.kind(), ErrorKind::Unsupported);
        assert!(matches!(got, CoreError::Remote { .. }));
    }

    #[tokio::test]
    async fn remote_init_then_history() {
        let (_repo, client) = serve_test_repo().await;
        let datasets = new_dataset_requests(None, Some(Arc::clone(&client)));
        let created = datasets
            .init_dataset(&InitDatasetParams {
                name: "tally".into(),
                data_filename: "tally.csv".into(),
                data: Some(b"tally\n10\n20\n30\n".to_vec()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.name, "tally");

        let log = new_history_requests(None, Some(client))
            .log(&LogParams {
                path: created.path.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].path, created.path);
    }

    #[tokio::test]
    async fn unknown_method_is_unsupported() {
        let (_repo, client) = serve_test_repo().await;
        let err = client
            .call::<_, ()>("DatasetRequests.Frobnicate", &())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown method DatasetRequests.Frobnicate");
        let err = client
            .call::<_, Vec<Profile>>("PeerRequests.List", &ListParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "peer requests need a running node");
    }

    #[tokio::test]
    async fn peer_messages_are_answered() {
        let (_repo, client) = serve_test_repo().await;
        let request = Message::request("QmAsker", MsgType::Profile, &()).unwrap();
        let reply = client.send_peer(request.clone()).await.unwrap();
        assert_eq!(reply.id, request.id);
        let profile: Profile = reply.decode_payload().unwrap();
        assert_eq!(profile.username, "test_user");
    }

    #[tokio::test]
    async fn version_mismatch_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let repo: Arc<dyn Repo> = Arc::new(new_test_repo().unwrap());
        tokio::spawn(Arc::new(RpcServer::new(repo)).serve(listener));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, &RpcMessage::Hello { version: 99 })
            .await
            .unwrap();
        match read_frame(&mut stream).await.unwrap() {
            Some(RpcMessage::Error { kind, message, .. }) => {
                assert_eq!(kind, ErrorKind::Unsupported);
                assert!(message.contains("99"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn namespace_of_a_networked_peer() {
        let remote_id = PeerId::derive(b"remote");
        let remote_addr = start(RpcServer::new(Arc::new(new_test_repo().unwrap()))).await;

        let local_repo: Arc<dyn Repo> = Arc::new(new_test_repo().unwrap());
        let node = TcpPeerNode::new(PeerId::derive(b"local"), Arc::clone(&local_repo))
            .with_peer(remote_id.clone(), remote_addr.to_string());
        let node: Arc<dyn PeerNode> = Arc::new(node);
        let local_addr = start(RpcServer::new(local_repo).with_node(node)).await;

        let client = Arc::new(RpcClient::connect(local_addr).await.unwrap());
        let peers = new_peer_requests(None, Some(client));
        let profile = peers.connect_to_peer(&remote_id).await.unwrap();
        assert_eq!(profile.id, remote_id);
        assert_eq!(peers.connected_peers(0).await.unwrap(), vec![remote_id.to_string()]);

        let refs = peers
            .get_namespace(&NamespaceParams {
                peer_id: remote_id.to_string(),
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["movies", "cities", "counter"]);
    }
}
