//! Peer profile requests and the node abstraction they run against.

use std::sync::Arc;

use async_trait::async_trait;
use tabula_protocol::{Message, MsgType};
use tabula_repo::{Query, Repo};
use tabula_types::{DatasetRef, ListParams, PeerId, Profile};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::params::{DatasetsRequest, GetParams, NamespaceParams};
use crate::rpc::RpcClient;

/// A running node: a local repo plus connections to other peers.
#[async_trait]
pub trait PeerNode: Send + Sync {
    fn repo(&self) -> Arc<dyn Repo>;

    fn peer_id(&self) -> PeerId;

    /// Connect to `id` and record its profile in the peer store.
    async fn connect(&self, id: &PeerId) -> CoreResult<()>;

    fn connected_peers(&self) -> Vec<PeerId>;

    /// Send an overlay message to `id` and wait for the reply.
    async fn send_message(&self, id: &PeerId, message: Message) -> CoreResult<Message>;
}

/// Lookups and exchanges with other peers.
#[async_trait]
pub trait PeerRequests: Send + Sync {
    fn requests_name(&self) -> &'static str {
        "peers"
    }

    /// Known peer profiles, excluding the local one.
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<Profile>>;

    /// Ids of currently connected peers, at most `limit` when positive.
    async fn connected_peers(&self, limit: i64) -> CoreResult<Vec<String>>;

    /// Connect to a peer and return its profile.
    async fn connect_to_peer(&self, id: &PeerId) -> CoreResult<Profile>;

    /// A known peer by id (`hash`) or nickname (`username`).
    async fn get(&self, params: &GetParams) -> CoreResult<Profile>;

    /// A page of a remote peer's named datasets.
    async fn get_namespace(&self, params: &NamespaceParams) -> CoreResult<Vec<DatasetRef>>;
}

/// # Panics
///
/// Panics if both or neither of `node` and `client` are supplied.
pub fn new_peer_requests(
    node: Option<Arc<dyn PeerNode>>,
    client: Option<Arc<RpcClient>>,
) -> Box<dyn PeerRequests> {
    match (node, client) {
        (Some(node), None) => Box::new(LocalPeerRequests::new(node)),
        (None, Some(client)) => Box::new(RemotePeerRequests::new(client)),
        (Some(_), Some(_)) => panic!("both node and client supplied to new_peer_requests"),
        (None, None) => panic!("neither node nor client supplied to new_peer_requests"),
    }
}

pub struct LocalPeerRequests {
    node: Arc<dyn PeerNode>,
}

impl LocalPeerRequests {
    pub fn new(node: Arc<dyn PeerNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl PeerRequests for LocalPeerRequests {
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<Profile>> {
        let window = ListParams::new(params.order_by.clone(), params.limit, params.offset);
        let repo = self.node.repo();
        let local = repo.profile()?;
        let peers = repo
            .peers()
            .query_peers(&Query::default())
            .map_err(CoreError::stage("error querying peers"))?;
        Ok(peers
            .into_iter()
            .filter(|p| p.id != local.id)
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .collect())
    }

    async fn connected_peers(&self, limit: i64) -> CoreResult<Vec<String>> {
        let ids = self.node.connected_peers().into_iter().map(|id| id.to_string());
        Ok(match usize::try_from(limit) {
            Ok(limit) if limit > 0 => ids.take(limit).collect(),
            _ => ids.collect(),
        })
    }

    async fn connect_to_peer(&self, id: &PeerId) -> CoreResult<Profile> {
        self.node
            .connect(id)
            .await
            .map_err(CoreError::stage("error connecting to peer"))?;
        self.node
            .repo()
            .peers()
            .get_peer(id)
            .map_err(CoreError::stage("error getting peer profile"))
    }

    async fn get(&self, params: &GetParams) -> CoreResult<Profile> {
        let peers = self.node.repo().peers().query_peers(&Query::default())?;
        peers
            .into_iter()
            .find(|p| {
                (!params.hash.is_empty() && p.id.as_str() == params.hash)
                    || (!params.username.is_empty() && p.username == params.username)
            })
            .ok_or_else(|| {
                let wanted = if params.hash.is_empty() {
                    &params.username
                } else {
                    &params.hash
                };
                CoreError::NotFound(format!("peer {wanted}"))
            })
    }

    async fn get_namespace(&self, params: &NamespaceParams) -> CoreResult<Vec<DatasetRef>> {
        let id: PeerId = params
            .peer_id
            .parse()
            .map_err(CoreError::stage("error decoding peer id"))?;
        self.node.repo().peers().get_peer(&id)?;

        let request = Message::request(
            self.node.peer_id().to_string(),
            MsgType::Datasets,
            &DatasetsRequest {
                limit: params.limit,
                offset: params.offset,
            },
        )?;
        let reply = self
            .node
            .send_message(&id, request)
            .await
            .map_err(CoreError::stage("error sending message to peer"))?;
        let refs: Vec<DatasetRef> = reply
            .decode_payload()
            .map_err(CoreError::stage("error parsing peer response"))?;
        debug!(peer = %id, datasets = refs.len(), "received peer namespace");
        Ok(refs)
    }
}

#[derive(Debug)]
pub struct RemotePeerRequests {
    client: Arc<RpcClient>,
}

impl RemotePeerRequests {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PeerRequests for RemotePeerRequests {
    async fn list(&self, params: &ListParams) -> CoreResult<Vec<Profile>> {
        self.client.call("PeerRequests.List", params).await
    }

    async fn connected_peers(&self, limit: i64) -> CoreResult<Vec<String>> {
        self.client.call("PeerRequests.ConnectedPeers", &limit).await
    }

    async fn connect_to_peer(&self, id: &PeerId) -> CoreResult<Profile> {
        self.client.call("PeerRequests.ConnectToPeer", id).await
    }

    async fn get(&self, params: &GetParams) -> CoreResult<Profile> {
        self.client.call("PeerRequests.Get", params).await
    }

    async fn get_namespace(&self, params: &NamespaceParams) -> CoreResult<Vec<DatasetRef>> {
        self.client.call("PeerRequests.GetNamespace", params).await
    }
}
