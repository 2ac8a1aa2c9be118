//! Tagged payloads and the full message codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{Header, HEADER_LEN};

/// Malformed message on the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("message truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("unknown payload type 0x{0:02x}")]
    UnknownPayloadType(u8),

    #[error("unknown application type {0}")]
    UnknownApplication(u8),

    #[error("{0} unexpected trailing bytes after {1:?} payload")]
    TrailingBytes(usize, PayloadType),
}

/// One-byte payload discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    Advertisement = 0x04,
    EdhocMessage = 0x10,
}

impl TryFrom<u8> for PayloadType {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x04 => Ok(PayloadType::Advertisement),
            0x10 => Ok(PayloadType::EdhocMessage),
            other => Err(MessageError::UnknownPayloadType(other)),
        }
    }
}

/// Payload variants. The tag is derived from the variant, never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Robot announces it is ready; no body.
    Advertisement,
    /// Opaque key-exchange message.
    EdhocMessage(Bytes),
}

impl Payload {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Payload::Advertisement => PayloadType::Advertisement,
            Payload::EdhocMessage(_) => PayloadType::EdhocMessage,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Payload::Advertisement => 0,
            Payload::EdhocMessage(body) => body.len(),
        }
    }
}

/// Header plus payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Message {
    pub fn new(header: Header, payload: Payload) -> Self {
        Self { header, payload }
    }

    pub fn advertisement(header: Header) -> Self {
        Self::new(header, Payload::Advertisement)
    }

    pub fn edhoc(header: Header, body: impl Into<Bytes>) -> Self {
        Self::new(header, Payload::EdhocMessage(body.into()))
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload.payload_type()
    }

    /// Serialize as header || payload type || body.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 1 + self.payload.body_len());
        self.header.encode(&mut buf);
        buf.put_u8(self.payload_type() as u8);
        if let Payload::EdhocMessage(body) = &self.payload {
            buf.extend_from_slice(body);
        }
        buf.freeze()
    }

    /// Parse a message produced by [`Message::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() < HEADER_LEN + 1 {
            return Err(MessageError::Truncated {
                needed: HEADER_LEN + 1,
                got: bytes.len(),
            });
        }

        let mut buf = bytes;
        let header = Header::decode(&mut buf)?;
        let payload_type = PayloadType::try_from(buf.get_u8())?;

        let payload = match payload_type {
            PayloadType::Advertisement => {
                if buf.has_remaining() {
                    return Err(MessageError::TrailingBytes(
                        buf.remaining(),
                        PayloadType::Advertisement,
                    ));
                }
                Payload::Advertisement
            }
            PayloadType::EdhocMessage => Payload::EdhocMessage(Bytes::copy_from_slice(buf)),
        };

        Ok(Self { header, payload })
    }
}
