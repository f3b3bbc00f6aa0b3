//! Wire protocol for Tabula.
//!
//! Defines the framing and message types used between a remote request
//! client and a node's RPC listener, plus the overlay [`Message`] peers
//! exchange to ask each other for datasets and profiles.
//!
//! Frames are `[u32 BE length][u8 tag][bincode payload]`; request params and
//! results inside the payload are JSON bytes.

pub mod codec;
pub mod error;
pub mod message;
pub mod peer;

pub use codec::{read_frame, write_frame, TabulaCodec};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    decode_json, encode_json, ErrorKind, RpcMessage, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
pub use peer::{Message, MsgPhase, MsgType};
