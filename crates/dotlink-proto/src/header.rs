//! Fixed-width message header.

use bytes::{Buf, BufMut};

use crate::{MessageError, GATEWAY_ADDRESS_DEFAULT, PROTOCOL_VERSION, SWARM_ID_DEFAULT};

/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 8 + 8 + 2 + 1 + 1;

/// Kind of application running on the robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum ApplicationType {
    DotBot = 0,
    SailBot = 1,
}

impl TryFrom<u8> for ApplicationType {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ApplicationType::DotBot),
            1 => Ok(ApplicationType::SailBot),
            other => Err(MessageError::UnknownApplication(other)),
        }
    }
}

/// Addressing header that precedes every payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Header {
    pub destination: u64,
    pub source: u64,
    pub swarm_id: u16,
    pub application: ApplicationType,
    pub version: u8,
}

impl Header {
    /// Header for a robot talking to the default gateway.
    pub fn to_gateway(source: u64) -> Self {
        Self {
            destination: GATEWAY_ADDRESS_DEFAULT,
            source,
            swarm_id: SWARM_ID_DEFAULT,
            application: ApplicationType::DotBot,
            version: PROTOCOL_VERSION,
        }
    }

    /// Header answering `self`: source and destination swapped.
    pub fn reply(&self) -> Self {
        Self {
            destination: self.source,
            source: self.destination,
            ..*self
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.destination);
        buf.put_u64_le(self.source);
        buf.put_u16_le(self.swarm_id);
        buf.put_u8(self.application as u8);
        buf.put_u8(self.version);
    }

    /// Destination of an encoded message, read without validating anything
    /// after it. Lets a receiver route frames whose type it does not know.
    pub fn peek_destination(bytes: &[u8]) -> Result<u64, MessageError> {
        let Some(field) = bytes.get(..8) else {
            return Err(MessageError::Truncated {
                needed: 8,
                got: bytes.len(),
            });
        };
        let mut field = field;
        Ok(field.get_u64_le())
    }

    /// Decode a header from the front of `buf`, advancing it.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, MessageError> {
        if buf.remaining() < HEADER_LEN {
            return Err(MessageError::Truncated {
                needed: HEADER_LEN,
                got: buf.remaining(),
            });
        }

        let destination = buf.get_u64_le();
        let source = buf.get_u64_le();
        let swarm_id = buf.get_u16_le();
        let application = ApplicationType::try_from(buf.get_u8())?;
        let version = buf.get_u8();

        Ok(Self {
            destination,
            source,
            swarm_id,
            application,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_is_little_endian() {
        let header = Header {
            destination: 0x0102_0304_0506_0708,
            source: 0xa104_412b,
            swarm_id: 0x1234,
            application: ApplicationType::SailBot,
            version: PROTOCOL_VERSION,
        };

        let mut buf = Vec::new();
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(
            hex::encode(&buf),
            "0807060504030201\
             2b4104a100000000\
             3412\
             01\
             08"
        );
    }

    #[test]
    fn test_header_rejects_short_input() {
        let mut buf = &[0u8; HEADER_LEN - 1][..];
        let err = Header::decode(&mut buf).unwrap_err();
        assert_eq!(
            err,
            MessageError::Truncated {
                needed: HEADER_LEN,
                got: HEADER_LEN - 1
            }
        );
    }

    #[test]
    fn test_header_rejects_unknown_application() {
        let mut bytes = Vec::new();
        Header::to_gateway(7).encode(&mut bytes);
        bytes[18] = 9;

        let err = Header::decode(&mut bytes.as_slice()).unwrap_err();
        assert_eq!(err, MessageError::UnknownApplication(9));
    }

    #[test]
    fn test_peek_destination_ignores_unknown_fields() {
        let mut bytes = Vec::new();
        Header::to_gateway(7).reply().encode(&mut bytes);
        bytes[18] = 9;
        bytes.push(0x00);

        assert_eq!(Header::peek_destination(&bytes), Ok(7));
        assert_eq!(
            Header::peek_destination(&bytes[..5]),
            Err(MessageError::Truncated { needed: 8, got: 5 })
        );
    }

    #[test]
    fn test_reply_swaps_addresses() {
        let header = Header::to_gateway(0xa104_4101);
        let reply = header.reply();
        assert_eq!(reply.destination, 0xa104_4101);
        assert_eq!(reply.source, GATEWAY_ADDRESS_DEFAULT);
        assert_eq!(reply.swarm_id, header.swarm_id);
    }
}
