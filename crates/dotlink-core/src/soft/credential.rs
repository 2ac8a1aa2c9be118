//! Raw-public-key credentials.

use dotlink_crypto::{DhSecret, X25519_LEN};

use crate::ake::AkeError;
use crate::types::{Credential, CredentialRef};

/// Longest key identifier; keeps a by-value credential within one length byte.
pub const MAX_KID_LEN: usize = 255 - 1 - X25519_LEN;

/// A credential that is nothing but a key identifier and an X25519 public key.
///
/// Encoded as `kid_len | kid | public_key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpkCredential {
    kid: Vec<u8>,
    public_key: [u8; X25519_LEN],
}

impl RpkCredential {
    pub fn new(kid: impl Into<Vec<u8>>, public_key: [u8; X25519_LEN]) -> Result<Self, AkeError> {
        let kid = kid.into();
        if kid.is_empty() || kid.len() > MAX_KID_LEN {
            return Err(AkeError::InvalidKey(format!("key identifier of {} bytes", kid.len())));
        }
        Ok(Self { kid, public_key })
    }

    pub fn for_secret(kid: impl Into<Vec<u8>>, secret: &DhSecret) -> Result<Self, AkeError> {
        Self::new(kid, secret.public_key())
    }

    pub fn kid(&self) -> &[u8] {
        &self.kid
    }

    pub fn public_key(&self) -> &[u8; X25519_LEN] {
        &self.public_key
    }

    /// The ID_CRED that points at this credential.
    pub fn reference(&self) -> CredentialRef {
        CredentialRef::new(self.kid.clone())
    }

    pub fn to_credential(&self) -> Credential {
        let mut bytes = Vec::with_capacity(1 + self.kid.len() + X25519_LEN);
        // Fits: new() bounds the kid length.
        bytes.push(self.kid.len() as u8);
        bytes.extend_from_slice(&self.kid);
        bytes.extend_from_slice(&self.public_key);
        Credential::new(bytes)
    }

    pub fn parse(credential: &Credential) -> Result<Self, AkeError> {
        let bytes = credential.as_bytes();
        let Some((&kid_len, rest)) = bytes.split_first() else {
            return Err(AkeError::InvalidKey("empty credential".into()));
        };
        let kid_len = usize::from(kid_len);
        if rest.len() != kid_len + X25519_LEN {
            return Err(AkeError::InvalidKey(format!(
                "credential of {} bytes for a {kid_len}-byte kid",
                bytes.len()
            )));
        }

        let mut public_key = [0u8; X25519_LEN];
        public_key.copy_from_slice(&rest[kid_len..]);
        Self::new(&rest[..kid_len], public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_layout() {
        let rpk = RpkCredential::new(vec![0x32], [0xab; 32]).unwrap();
        let credential = rpk.to_credential();

        assert_eq!(credential.as_bytes()[0], 1);
        assert_eq!(credential.as_bytes()[1], 0x32);
        assert_eq!(credential.as_bytes().len(), 34);
        assert_eq!(RpkCredential::parse(&credential).unwrap(), rpk);
        assert_eq!(rpk.reference(), CredentialRef::new(vec![0x32]));
    }

    #[test]
    fn test_parse_rejects_bad_lengths() {
        assert!(RpkCredential::parse(&Credential::new(Vec::new())).is_err());
        assert!(RpkCredential::parse(&Credential::new(vec![1, 0x32, 0x00])).is_err());
        assert!(RpkCredential::parse(&Credential::new(vec![0; 33])).is_err());
    }

    #[test]
    fn test_kid_bounds() {
        assert!(RpkCredential::new(Vec::new(), [0; 32]).is_err());
        assert!(RpkCredential::new(vec![0; MAX_KID_LEN], [0; 32]).is_ok());
        assert!(RpkCredential::new(vec![0; MAX_KID_LEN + 1], [0; 32]).is_err());
    }
}
