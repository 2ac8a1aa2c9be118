//! Offline inspection of captured link bytes
//!
//! Accepts either an HDLC frame (starting with the flag byte) or a bare
//! message, as hex, and breaks it down into header fields and payload.

use dotlink_proto::{Message, MessageError, Payload};
use dotlink_transport::hdlc::{self, FrameError, HDLC_FLAG};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("nothing to decode")]
    Empty,

    #[error("bad frame: {0}")]
    Frame(#[from] FrameError),

    #[error("bad message: {0}")]
    Message(#[from] MessageError),
}

/// Decoded view of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSummary {
    /// Whether the input carried HDLC framing
    pub framed: bool,
    pub destination: String,
    pub source: String,
    pub swarm_id: u16,
    pub application: String,
    pub version: u8,
    pub payload_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Decode a hex string; whitespace and a leading `0x` are ignored.
pub fn inspect_hex(input: &str) -> Result<FrameSummary, InspectError> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    inspect(&hex::decode(cleaned)?)
}

pub fn inspect(bytes: &[u8]) -> Result<FrameSummary, InspectError> {
    let (framed, payload) = match bytes.first() {
        None => return Err(InspectError::Empty),
        Some(&HDLC_FLAG) => (true, hdlc::decode(bytes)?),
        Some(_) => (false, bytes.to_vec()),
    };
    let message = Message::from_bytes(&payload)?;

    Ok(FrameSummary {
        framed,
        destination: format!("{:016x}", message.header.destination),
        source: format!("{:016x}", message.header.source),
        swarm_id: message.header.swarm_id,
        application: format!("{:?}", message.header.application),
        version: message.header.version,
        payload_type: format!("{:?}", message.payload_type()),
        body: match &message.payload {
            Payload::Advertisement => None,
            Payload::EdhocMessage(body) => Some(hex::encode(body)),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotlink_proto::Header;

    #[test]
    fn test_inspect_framed_message_3() {
        let message = Message::edhoc(Header::to_gateway(0xa104_4101), vec![0x27, 0xaa, 0xbb]);
        let frame = hdlc::encode(&message.to_bytes());

        let summary = inspect_hex(&hex::encode(&frame)).unwrap();
        assert!(summary.framed);
        assert_eq!(summary.destination, "0000000000000000");
        assert_eq!(summary.source, "00000000a1044101");
        assert_eq!(summary.payload_type, "EdhocMessage");
        assert_eq!(summary.body.as_deref(), Some("27aabb"));
    }

    #[test]
    fn test_inspect_bare_advertisement() {
        let message = Message::advertisement(Header::to_gateway(0xa104_4102));
        let spaced = format!("0x{}", hex::encode(message.to_bytes()));

        let summary = inspect_hex(&spaced).unwrap();
        assert!(!summary.framed);
        assert_eq!(summary.payload_type, "Advertisement");
        assert_eq!(summary.body, None);
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(matches!(inspect_hex("zz"), Err(InspectError::Hex(_))));
        assert!(matches!(inspect_hex(""), Err(InspectError::Empty)));
        assert!(matches!(inspect_hex("0102"), Err(InspectError::Message(_))));
    }
}
