//! Request/response transport between a client and a node.
//!
//! Remote request handlers call `"<Service>.<Method>"` through an
//! [`RpcClient`]; the [`RpcServer`] dispatches those calls to the local
//! handlers and answers overlay messages from other peers.

mod client;
mod server;

pub use client::RpcClient;
pub use server::RpcServer;
