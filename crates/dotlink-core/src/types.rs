//! Identities, credentials and the small value types exchanged with the
//! key-exchange engine.

use std::fmt;

use bytes::{BufMut, Bytes};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::ake::AkeError;

/// Longest device identifier that still fits a 64-bit wire address.
pub const MAX_DEVICE_ID_LEN: usize = 8;

/// Errors raised while building an [`Identity`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("device id is empty")]
    EmptyId,
    #[error("device id is {0} bytes, at most {MAX_DEVICE_ID_LEN} fit a wire address")]
    IdTooLong(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Opaque device identifier; its big-endian value is the device's wire address.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(Vec<u8>);

impl DeviceId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, IdentityError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(IdentityError::EmptyId);
        }
        if bytes.len() > MAX_DEVICE_ID_LEN {
            return Err(IdentityError::IdTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wire address: `a104412b` is `0xa104412b`.
    pub fn address(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({self})")
    }
}

/// Long-term private key. Zeroized on drop, never printed.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<Vec<u8>>);

impl PrivateKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<{} bytes>)", self.0.len())
    }
}

/// Credential blob binding an identifier to a public key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(Bytes);

impl Credential {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", hex::encode(&self.0))
    }
}

/// Reference to a credential as carried in a handshake message (ID_CRED).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialRef(Vec<u8>);

impl CredentialRef {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialRef({self})")
    }
}

/// A robot identity loaded by the caller.
#[derive(Clone, Debug)]
pub struct Identity {
    id: DeviceId,
    private_key: PrivateKey,
    credential: Credential,
}

impl Identity {
    pub fn new(id: DeviceId, private_key: PrivateKey, credential: Credential) -> Self {
        Self {
            id,
            private_key,
            credential,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn address(&self) -> u64 {
        self.id.address()
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Where the authorization exchange is bootstrapped from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerReference {
    /// Public key of the enrollment server (G_W).
    pub gateway_public_key: [u8; 32],
    /// Location of the enrollment server (LOC_W).
    pub location: String,
}

/// Single-byte connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnId(pub u8);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Cipher suite identifier as negotiated in message 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u8);

impl CipherSuite {
    /// ChaCha20-Poly1305, SHA-256, X25519.
    pub const CHACHA20_X25519_SHA256: CipherSuite = CipherSuite(4);
}

/// Hash of message 1, shared with the authorization device.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TranscriptHash(pub [u8; 32]);

impl fmt::Debug for TranscriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TranscriptHash({})", hex::encode(self.0))
    }
}

/// Ephemeral Diffie-Hellman output handed to the authorization device.
pub struct EphemeralSecret(Zeroizing<[u8; 32]>);

impl EphemeralSecret {
    pub fn new(bytes: Zeroizing<[u8; 32]>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Key material derived by a completed handshake.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; 32]);

impl KeyMaterial {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// How the initiator's credential is conveyed in message 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialTransfer {
    ByReference,
    ByValue,
}

/// One external authorization data item piggybacked on a handshake message.
///
/// Wire form: `label (u8) | flags (u8, bit 0 = critical) | len (u16 BE) | value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EadItem {
    pub label: u8,
    pub critical: bool,
    pub value: Bytes,
}

impl EadItem {
    const HEADER_LEN: usize = 4;

    pub fn new(label: u8, critical: bool, value: impl Into<Bytes>) -> Self {
        Self {
            label,
            critical,
            value: value.into(),
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), AkeError> {
        let len = u16::try_from(self.value.len())
            .map_err(|_| AkeError::Malformed(format!("EAD value of {} bytes", self.value.len())))?;
        buf.put_u8(self.label);
        buf.put_u8(u8::from(self.critical));
        buf.put_u16(len);
        buf.put_slice(&self.value);
        Ok(())
    }

    /// Encoding of an optional item; empty when absent.
    pub fn encode_optional(item: Option<&EadItem>) -> Result<Vec<u8>, AkeError> {
        let mut buf = Vec::new();
        if let Some(item) = item {
            item.encode(&mut buf)?;
        }
        Ok(buf)
    }

    /// Decode zero or one item spanning all of `bytes`.
    pub fn decode_optional(bytes: &[u8]) -> Result<Option<EadItem>, AkeError> {
        if bytes.is_empty() {
            return Ok(None);
        }
        if bytes.len() < Self::HEADER_LEN {
            return Err(AkeError::Malformed(format!("EAD item of {} bytes", bytes.len())));
        }

        let label = bytes[0];
        let flags = bytes[1];
        let len = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));
        let value = &bytes[Self::HEADER_LEN..];
        if value.len() != len {
            return Err(AkeError::Malformed(format!(
                "EAD item declares {len} value bytes, {} present",
                value.len()
            )));
        }
        if flags & !0x01 != 0 {
            return Err(AkeError::Malformed(format!("EAD flags 0x{flags:02x}")));
        }

        Ok(Some(EadItem {
            label,
            critical: flags & 0x01 != 0,
            value: Bytes::copy_from_slice(value),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_address_is_big_endian() {
        let id = DeviceId::from_hex("a104412b").unwrap();
        assert_eq!(id.address(), 0xa104_412b);
        assert_eq!(id.to_string(), "a104412b");
    }

    #[test]
    fn test_device_id_bounds() {
        assert_eq!(DeviceId::new(Vec::new()), Err(IdentityError::EmptyId));
        assert_eq!(DeviceId::new(vec![0u8; 9]), Err(IdentityError::IdTooLong(9)));
        assert_eq!(
            DeviceId::new(vec![0xff; 8]).unwrap().address(),
            u64::MAX
        );
        assert!(matches!(
            DeviceId::from_hex("zz"),
            Err(IdentityError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_secrets_are_not_printed() {
        let key = PrivateKey::new(vec![0x42; 32]);
        assert_eq!(format!("{key:?}"), "PrivateKey(<32 bytes>)");
        let km = KeyMaterial::new([0x42; 32]);
        assert!(!format!("{km:?}").contains("42"));
    }

    #[test]
    fn test_ead_item_round_trip() {
        let item = EadItem::new(1, true, vec![0xaa, 0xbb]);
        let bytes = EadItem::encode_optional(Some(&item)).unwrap();
        assert_eq!(bytes, vec![0x01, 0x01, 0x00, 0x02, 0xaa, 0xbb]);
        assert_eq!(EadItem::decode_optional(&bytes).unwrap(), Some(item));
        assert_eq!(EadItem::decode_optional(&[]).unwrap(), None);
    }

    #[test]
    fn test_ead_item_length_must_match() {
        assert!(EadItem::decode_optional(&[0x01, 0x00, 0x00, 0x03, 0xaa]).is_err());
        assert!(EadItem::decode_optional(&[0x01, 0x00]).is_err());
        assert!(EadItem::decode_optional(&[0x01, 0x80, 0x00, 0x00]).is_err());
    }
}
