//! Request handlers for Tabula.
//!
//! Every operation a user can perform on a repository lives behind one of
//! four handler traits. Each has a local implementation that runs against a
//! [`Repo`](tabula_repo::Repo) (or a [`PeerNode`] for peer operations) and a
//! remote one that forwards the same call over RPC, so callers pick a mode
//! once and never branch again:
//!
//! - [`DatasetRequests`] — list, get, init, update, rename, delete, add, read rows
//! - [`HistoryRequests`] — walk a dataset's revision chain
//! - [`PeerRequests`] — known peers, connections and remote namespaces
//! - [`QueryLogRequests`] — the log of executed queries
//!
//! A node serves the local handlers with [`RpcServer`].

pub mod config;
pub mod datasets;
pub mod error;
pub mod fetch;
pub mod history;
pub mod node;
pub mod params;
pub mod peers;
pub mod queries;
pub mod rpc;

pub use config::{NodeConfig, DEFAULT_LIST_LIMIT};
pub use datasets::{
    new_dataset_requests, DatasetRequests, LocalDatasetRequests, RemoteDatasetRequests,
};
pub use error::{CoreError, CoreResult};
pub use history::{new_history_requests, HistoryRequests, LocalHistoryRequests, RemoteHistoryRequests};
pub use node::{handle_peer_message, open_repo, TcpPeerNode};
pub use params::{
    AddParams, DatasetsRequest, DeleteParams, GetDatasetParams, GetParams, InitDatasetParams,
    LogParams, NamespaceParams, RenameParams, StructuredData, StructuredDataParams, UpdateParams,
};
pub use peers::{new_peer_requests, LocalPeerRequests, PeerNode, PeerRequests, RemotePeerRequests};
pub use queries::{
    new_query_log_requests, LocalQueryLogRequests, QueryLogRequests, RemoteQueryLogRequests,
};
pub use rpc::{RpcClient, RpcServer};
