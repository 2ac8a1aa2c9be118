use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of truncated handshake MACs.
pub const TAG_LEN: usize = 16;

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take keys of any size");
    for part in parts {
        mac.update(part);
    }
    let out = mac.finalize().into_bytes();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// HMAC-SHA256 truncated to [`TAG_LEN`] bytes.
pub fn truncated_tag(key: &[u8], parts: &[&[u8]]) -> [u8; TAG_LEN] {
    let full = hmac_sha256(key, parts);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&full[..TAG_LEN]);
    tag
}

/// Constant-time tag comparison.
pub fn tag_matches(expected: &[u8], received: &[u8]) -> bool {
    constant_time_eq(expected, received)
}
