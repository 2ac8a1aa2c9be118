//! ChaCha20-Poly1305 sealing for handshake ciphertexts.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::CryptoError;

pub const AEAD_KEY_LEN: usize = 32;
pub const AEAD_NONCE_LEN: usize = 12;
pub const AEAD_TAG_LEN: usize = 16;

pub fn seal(
    key: &[u8; AEAD_KEY_LEN],
    nonce: &[u8; AEAD_NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encryption)
}

pub fn open(
    key: &[u8; AEAD_KEY_LEN],
    nonce: &[u8; AEAD_NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tampering_is_detected() {
        let key = [7u8; 32];
        let nonce = [1u8; 12];
        let mut sealed = seal(&key, &nonce, b"aad", b"plaintext").unwrap();
        assert_eq!(sealed.len(), 9 + AEAD_TAG_LEN);

        assert!(matches!(open(&key, &nonce, b"other", &sealed), Err(CryptoError::Decryption)));
        sealed[0] ^= 0x80;
        assert!(matches!(open(&key, &nonce, b"aad", &sealed), Err(CryptoError::Decryption)));
    }

    proptest! {
        #[test]
        fn prop_seal_open(
            key in any::<[u8; 32]>(),
            nonce in any::<[u8; 12]>(),
            msg in any::<Vec<u8>>(),
        ) {
            let sealed = seal(&key, &nonce, b"", &msg)?;
            prop_assert_eq!(open(&key, &nonce, b"", &sealed)?, msg);
        }
    }
}
