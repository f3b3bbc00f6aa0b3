use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::peer::Message;

pub const PROTOCOL_VERSION: u32 = 2;
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Class of a failed request, so callers can branch on it remotely the same
/// way they would locally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[default]
    Other,
    NotFound,
    AlreadyExists,
    Required,
    Unsupported,
}

/// All message types carried on an RPC connection.
///
/// Params and results travel as JSON bytes so dataset metadata of any shape
/// survives the binary envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMessage {
    Hello { version: u32 },
    HelloAck { version: u32 },
    /// Call `method` (`"<Service>.<Method>"`) with JSON-encoded params.
    Request { id: u64, method: String, params: Vec<u8> },
    /// JSON-encoded result of the request with the same id.
    Response { id: u64, result: Vec<u8> },
    /// An overlay message between peers.
    Peer { message: Message },
    /// The request with this id failed; `message` is the remote error text.
    Error {
        id: u64,
        kind: ErrorKind,
        message: String,
    },
}

impl RpcMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Hello { .. } => 1,
            Self::HelloAck { .. } => 2,
            Self::Request { .. } => 3,
            Self::Response { .. } => 4,
            Self::Peer { .. } => 5,
            Self::Error { .. } => 255,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "Hello",
            Self::HelloAck { .. } => "HelloAck",
            Self::Request { .. } => "Request",
            Self::Response { .. } => "Response",
            Self::Peer { .. } => "Peer",
            Self::Error { .. } => "Error",
        }
    }

    pub fn is_known_tag(tag: u8) -> bool {
        matches!(tag, 1..=5 | 255)
    }

    /// Build a request, encoding `params` as JSON.
    pub fn request<P: Serialize>(id: u64, method: &str, params: &P) -> ProtocolResult<Self> {
        Ok(Self::Request {
            id,
            method: method.to_string(),
            params: encode_json(params)?,
        })
    }

    pub fn error(id: u64, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            kind,
            message: message.into(),
        }
    }

    /// Build a response, encoding `result` as JSON.
    pub fn response<R: Serialize>(id: u64, result: &R) -> ProtocolResult<Self> {
        Ok(Self::Response {
            id,
            result: encode_json(result)?,
        })
    }
}

pub fn encode_json<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialization(e.to_string()))
}
