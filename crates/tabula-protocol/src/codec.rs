use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{RpcMessage, MAX_MESSAGE_SIZE};

/// Codec for encoding/decoding RPC messages.
pub struct TabulaCodec;

impl TabulaCodec {
    /// Encode a message with framing: [4 bytes len][1 byte tag][payload]
    pub fn encode(msg: &RpcMessage) -> ProtocolResult<Vec<u8>> {
        let payload = Self::encode_payload(msg)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode a framed message. Returns (message, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(RpcMessage, usize)> {
        if data.len() < 5 {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        check_len(len)?;
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let msg = Self::decode_tagged(data[4], &data[5..total])?;
        Ok((msg, total))
    }

    /// Encode payload only (no framing).
    pub fn encode_payload(msg: &RpcMessage) -> ProtocolResult<Vec<u8>> {
        bincode::serialize(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode payload only (no framing).
    pub fn decode_payload(data: &[u8]) -> ProtocolResult<RpcMessage> {
        bincode::deserialize(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    fn decode_tagged(tag: u8, payload: &[u8]) -> ProtocolResult<RpcMessage> {
        if !RpcMessage::is_known_tag(tag) {
            return Err(ProtocolError::InvalidMessageType(tag));
        }
        let msg = Self::decode_payload(payload)?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::FramingError(format!(
                "tag {tag} does not match {} payload",
                msg.type_name()
            )));
        }
        Ok(msg)
    }
}

fn check_len(len: usize) -> ProtocolResult<()> {
    if len < 1 {
        return Err(ProtocolError::FramingError("zero-length frame".into()));
    }
    if len - 1 > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len - 1,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// Write one framed message.
pub async fn write_frame<W>(writer: &mut W, msg: &RpcMessage) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let buf = TabulaCodec::encode(msg)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    trace!(kind = msg.type_name(), bytes = buf.len(), "wrote frame");
    Ok(())
}

/// Read one framed message.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// frames.
pub async fn read_frame<R>(reader: &mut R) -> ProtocolResult<Option<RpcMessage>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    check_len(len)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let msg = TabulaCodec::decode_tagged(body[0], &body[1..])?;
    trace!(kind = msg.type_name(), bytes = len + 4, "read frame");
    Ok(Some(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ErrorKind, PROTOCOL_VERSION};
    use crate::peer::{Message, MsgType};

    fn all_messages() -> Vec<RpcMessage> {
        vec![
            RpcMessage::Hello {
                version: PROTOCOL_VERSION,
            },
            RpcMessage::HelloAck {
                version: PROTOCOL_VERSION,
            },
            RpcMessage::request(7, "DatasetRequests.Get", &serde_json::json!({"path": "/map/a"}))
                .unwrap(),
            RpcMessage::response(7, &true).unwrap(),
            RpcMessage::Peer {
                message: Message::request("QmA", MsgType::Datasets, &()).unwrap(),
            },
            RpcMessage::error(7, ErrorKind::NotFound, "not found: dataset /map/a"),
        ]
    }

    #[test]
    fn frames_roundtrip() {
        for msg in all_messages() {
            let encoded = TabulaCodec::encode(&msg).unwrap();
            let (decoded, consumed) = TabulaCodec::decode(&encoded).unwrap();
            assert_eq!(consumed, encoded.len());
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn type_tags_unique() {
        let mut tags: Vec<u8> = all_messages().iter().map(|m| m.type_tag()).collect();
        let len = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), len, "type tags should be unique");
        assert!(tags.iter().all(|t| RpcMessage::is_known_tag(*t)));
    }

    #[test]
    fn decode_truncated() {
        let err = TabulaCodec::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_zero_length() {
        let data = [0u8, 0, 0, 0, 0];
        let err = TabulaCodec::decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_unknown_tag() {
        let mut encoded = TabulaCodec::encode(&RpcMessage::Hello { version: 1 }).unwrap();
        encoded[4] = 42;
        let err = TabulaCodec::decode(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessageType(42)));
    }

    #[test]
    fn decode_mismatched_tag() {
        let mut encoded = TabulaCodec::encode(&RpcMessage::Hello { version: 1 }).unwrap();
        encoded[4] = 2;
        let err = TabulaCodec::decode(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[tokio::test]
    async fn stream_frames() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        for msg in all_messages() {
            write_frame(&mut a, &msg).await.unwrap();
        }
        drop(a);
        let mut got = Vec::new();
        while let Some(msg) = read_frame(&mut b).await.unwrap() {
            got.push(msg);
        }
        let tags: Vec<u8> = got.iter().map(RpcMessage::type_tag).collect();
        assert_eq!(tags, vec![1, 2, 3, 4, 5, 255]);
    }
}
