use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tabula_protocol::{
    decode_json, read_frame, write_frame, Message, ProtocolError, RpcMessage, PROTOCOL_VERSION,
};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{CoreError, CoreResult};

/// Connection to a node's RPC listener.
///
/// Calls on one client are serialized over a single TCP stream; open more
/// clients for parallel calls.
pub struct RpcClient {
    addr: SocketAddr,
    stream: Mutex<TcpStream>,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Connect and exchange protocol versions.
    pub async fn connect(addr: impl ToSocketAddrs) -> CoreResult<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let addr = stream.peer_addr()?;
        write_frame(
            &mut stream,
            &RpcMessage::Hello {
                version: PROTOCOL_VERSION,
            },
        )
        .await?;
        match read_frame(&mut stream).await? {
            Some(RpcMessage::HelloAck { version }) if version == PROTOCOL_VERSION => {}
            Some(RpcMessage::HelloAck { version }) => {
                return Err(ProtocolError::VersionMismatch {
                    local: PROTOCOL_VERSION,
                    remote: version,
                }
                .into())
            }
            Some(RpcMessage::Error { kind, message, .. }) => {
                return Err(CoreError::Remote { kind, message })
            }
            Some(other) => {
                return Err(ProtocolError::Unexpected {
                    expected: "HelloAck",
                    got: other.type_name(),
                }
                .into())
            }
            None => return Err(ProtocolError::ConnectionClosed.into()),
        }
        debug!(%addr, "rpc connected");
        Ok(Self {
            addr,
            stream: Mutex::new(stream),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Invoke `method` on the remote node and decode its result.
    ///
    /// An error on the remote side comes back as [`CoreError::Remote`]
    /// carrying the remote error text and its kind.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> CoreResult<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcMessage::request(id, method, params)?;
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &request).await?;
        trace!(id, method, "rpc call");
        match read_frame(&mut *stream).await? {
            Some(RpcMessage::Response { id: got, result }) if got == id => Ok(decode_json(&result)?),
            Some(RpcMessage::Error {
                id: got,
                kind,
                message,
            }) if got == id => Err(CoreError::Remote { kind, message }),
            Some(RpcMessage::Response { id: got, .. }) | Some(RpcMessage::Error { id: got, .. }) => {
                Err(ProtocolError::FramingError(format!(
                    "reply to request {got} while waiting for {id}"
                ))
                .into())
            }
            Some(other) => Err(ProtocolError::Unexpected {
                expected: "Response",
                got: other.type_name(),
            }
            .into()),
            None => Err(ProtocolError::ConnectionClosed.into()),
        }
    }

    /// Send an overlay message and wait for the peer's reply.
    pub async fn send_peer(&self, message: Message) -> CoreResult<Message> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &RpcMessage::Peer { message }).await?;
        match read_frame(&mut *stream).await? {
            Some(RpcMessage::Peer { message }) => Ok(message),
            Some(RpcMessage::Error { kind, message, .. }) => Err(CoreError::Remote { kind, message }),
            Some(other) => Err(ProtocolError::Unexpected {
                expected: "Peer",
                got: other.type_name(),
            }
            .into()),
            None => Err(ProtocolError::ConnectionClosed.into()),
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("addr", &self.addr)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
