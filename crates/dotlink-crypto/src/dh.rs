//! X25519 key agreement.

use getrandom::getrandom;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::CryptoError;

pub const X25519_LEN: usize = 32;

/// X25519 private scalar usable for more than one agreement.
///
/// The inner secret is zeroized on drop by x25519-dalek.
pub struct DhSecret(StaticSecret);

impl DhSecret {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut seed = random_bytes::<X25519_LEN>()?;
        let secret = Self::from_bytes(seed);
        seed.zeroize();
        Ok(secret)
    }

    pub fn from_bytes(bytes: [u8; X25519_LEN]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; X25519_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: X25519_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self::from_bytes(arr))
    }

    pub fn public_key(&self) -> [u8; X25519_LEN] {
        PublicKey::from(&self.0).to_bytes()
    }

    /// Shared secret with `peer_public`.
    pub fn agree(&self, peer_public: &[u8; X25519_LEN]) -> Zeroizing<[u8; X25519_LEN]> {
        let shared = self.0.diffie_hellman(&PublicKey::from(*peer_public));
        Zeroizing::new(*shared.as_bytes())
    }
}

impl std::fmt::Debug for DhSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhSecret")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Fill an array from the OS RNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    getrandom(&mut buf).map_err(|_| CryptoError::Rng)?;
    Ok(buf)
}
