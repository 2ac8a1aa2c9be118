//! Cryptographic helpers for the DotBot handshake.
//!
//! Thin, allocation-light wrappers around the RustCrypto and dalek crates so
//! the handshake code reads in terms of the key schedule rather than crate
//! APIs.

#![forbid(unsafe_code)]

pub mod aead;
pub mod dh;
pub mod hash;
pub mod kdf;
pub mod mac;

pub use aead::{open, seal, AEAD_KEY_LEN, AEAD_NONCE_LEN, AEAD_TAG_LEN};
pub use dh::{random_bytes, DhSecret, X25519_LEN};
pub use hash::{sha256, sha256_parts};
pub use kdf::{expand_labeled, hkdf_extract};
pub use mac::{hmac_sha256, tag_matches, truncated_tag, TAG_LEN};

/// Error type for crypto helper operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("requested {0} bytes of key material, more than HKDF can produce")]
    OutputTooLong(usize),
    #[error("RNG failed")]
    Rng,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
}
