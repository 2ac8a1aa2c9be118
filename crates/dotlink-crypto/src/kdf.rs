//! HKDF-SHA256 key schedule helpers.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::CryptoError;

/// HKDF-Extract(salt, ikm) -> 32-byte PRK.
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&prk);
    arr
}

/// HKDF-Expand(prk, label || context, len).
pub fn expand_labeled(
    prk: &[u8],
    label: &str,
    context: &[u8],
    len: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::from_prk(prk).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        got: prk.len(),
    })?;

    let mut info = Vec::with_capacity(label.len() + context.len());
    info.extend_from_slice(label.as_bytes());
    info.extend_from_slice(context);

    let mut okm = vec![0u8; len];
    hk.expand(&info, &mut okm)
        .map_err(|_| CryptoError::OutputTooLong(len))?;
    Ok(okm)
}
