//! Overlay messages exchanged between peers.
//!
//! A [`Message`] is either a request or the response to one; the response
//! keeps the request's id so the initiator can match them up.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolResult;
use crate::message::{decode_json, encode_json};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgPhase {
    Request,
    Response,
}

/// What a peer message asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgType {
    /// A page of the peer's namespace.
    Datasets,
    /// The peer's own profile.
    Profile,
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsgType::Datasets => write!(f, "datasets"),
            MsgType::Profile => write!(f, "profile"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Peer id of the node that sent the request.
    pub initiator: String,
    pub phase: MsgPhase,
    pub msg_type: MsgType,
    /// JSON-encoded body.
    pub payload: Vec<u8>,
}

impl Message {
    /// A new request with a fresh id.
    pub fn request<T: Serialize>(
        initiator: impl Into<String>,
        msg_type: MsgType,
        payload: &T,
    ) -> ProtocolResult<Self> {
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            initiator: initiator.into(),
            phase: MsgPhase::Request,
            msg_type,
            payload: encode_json(payload)?,
        })
    }

    /// The response to this message, carrying `payload`.
    pub fn response<T: Serialize>(&self, payload: &T) -> ProtocolResult<Self> {
        Ok(Self {
            id: self.id.clone(),
            initiator: self.initiator.clone(),
            phase: MsgPhase::Response,
            msg_type: self.msg_type,
            payload: encode_json(payload)?,
        })
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        decode_json(&self.payload)
    }
}
