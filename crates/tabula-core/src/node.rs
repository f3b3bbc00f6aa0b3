//! A networked node: repo opening, peer connections and the responder for
//! overlay messages.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tabula_protocol::{Message, MsgPhase, MsgType, ProtocolError};
use tabula_repo::{FsRepo, Repo};
use tabula_store::FsBlobStore;
use tabula_types::{PeerId, Profile};
use tracing::{debug, info};

use crate::config::{NodeConfig, DEFAULT_LIST_LIMIT};
use crate::error::{CoreError, CoreResult};
use crate::params::DatasetsRequest;
use crate::peers::PeerNode;
use crate::rpc::RpcClient;

/// Open the filesystem repo and blob store named by `config`.
pub fn open_repo(config: &NodeConfig) -> CoreResult<FsRepo> {
    let store = Arc::new(FsBlobStore::open(&config.blob_path)?);
    Ok(FsRepo::open(&config.repo_path, store, &config.peer_id())?)
}

/// Answer an overlay request from another peer.
///
/// `Datasets` gets a page of the local namespace, `Profile` the local
/// profile.
pub fn handle_peer_message(repo: &dyn Repo, message: &Message) -> CoreResult<Message> {
    if message.phase != MsgPhase::Request {
        return Err(ProtocolError::Unexpected {
            expected: "Request",
            got: "Response",
        }
        .into());
    }
    debug!(from = %message.initiator, kind = %message.msg_type, "peer request");
    let reply = match message.msg_type {
        MsgType::Datasets => {
            let req: DatasetsRequest = message.decode_payload()?;
            let limit = if req.limit <= 0 {
                DEFAULT_LIST_LIMIT
            } else {
                req.limit
            };
            let refs = repo.namespace(limit as usize, req.offset.max(0) as usize)?;
            message.response(&refs)?
        }
        MsgType::Profile => message.response(&repo.profile()?)?,
    };
    Ok(reply)
}

/// A [`PeerNode`] that reaches other peers over the RPC transport.
///
/// Peer addresses come from configuration; connections are opened on first
/// use and kept.
pub struct TcpPeerNode {
    id: PeerId,
    repo: Arc<dyn Repo>,
    addrs: BTreeMap<PeerId, String>,
    connected: RwLock<BTreeMap<PeerId, Arc<RpcClient>>>,
}

impl TcpPeerNode {
    pub fn new(id: PeerId, repo: Arc<dyn Repo>) -> Self {
        Self {
            id,
            repo,
            addrs: BTreeMap::new(),
            connected: RwLock::new(BTreeMap::new()),
        }
    }

    /// Node for `repo` with the id and peer addresses from `config`.
    pub fn from_config(config: &NodeConfig, repo: Arc<dyn Repo>) -> Self {
        let mut node = Self::new(config.peer_id(), repo);
        for (id, addr) in &config.peers {
            node = node.with_peer(PeerId::new(id), addr.clone());
        }
        node
    }

    pub fn with_peer(mut self, id: PeerId, addr: impl Into<String>) -> Self {
        self.addrs.insert(id, addr.into());
        self
    }

    fn client(&self, id: &PeerId) -> Option<Arc<RpcClient>> {
        self.connected.read().expect("lock poisoned").get(id).cloned()
    }
}

#[async_trait]
impl PeerNode for TcpPeerNode {
    fn repo(&self) -> Arc<dyn Repo> {
        Arc::clone(&self.repo)
    }

    fn peer_id(&self) -> PeerId {
        self.id.clone()
    }

    async fn connect(&self, id: &PeerId) -> CoreResult<()> {
        let addr = self
            .addrs
            .get(id)
            .ok_or_else(|| CoreError::NotFound(format!("no address for peer {id}")))?;
        let client = RpcClient::connect(addr.as_str()).await?;
        let request = Message::request(self.id.to_string(), MsgType::Profile, &())?;
        let mut profile: Profile = client.send_peer(request).await?.decode_payload()?;
        if profile.id.is_empty() {
            profile.id = id.clone();
        }
        self.repo.peers().put_peer(id, &profile)?;
        self.connected
            .write()
            .expect("lock poisoned")
            .insert(id.clone(), Arc::new(client));
        info!(peer = %id, addr = %addr, username = %profile.username, "connected to peer");
        Ok(())
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    async fn send_message(&self, id: &PeerId, message: Message) -> CoreResult<Message> {
        let client = match self.client(id) {
            Some(client) => client,
            None => {
                self.connect(id).await?;
                self.client(id)
                    .ok_or_else(|| CoreError::NotFound(format!("peer {id}")))?
            }
        };
        client.send_peer(message).await
    }
}

impl std::fmt::Debug for TcpPeerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPeerNode")
            .field("id", &self.id)
            .field("peers", &self.addrs.len())
            .field("connected", &self.connected_peers().len())
            .finish()
    }
}
