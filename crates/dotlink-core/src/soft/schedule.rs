//! Key schedule and plaintext layouts shared by both ends of the exchange.
//!
//! ```text
//! message_1 = METHOD | suite | G_X | C_I | EAD_1?
//! message_2 = G_Y | (PLAINTEXT_2 xor KEYSTREAM_2)
//!   PLAINTEXT_2 = C_R | kid_len | kid | EAD_2? | MAC_2
//! message_3 = AEAD(K_3, IV_3, aad = TH_3; PLAINTEXT_3)
//!   PLAINTEXT_3 = mode | id_len | ID_CRED_I | EAD_3? | MAC_3
//! ```

use dotlink_crypto::{
    expand_labeled, hkdf_extract, sha256_parts, truncated_tag, CryptoError, AEAD_KEY_LEN,
    AEAD_NONCE_LEN, TAG_LEN, X25519_LEN,
};
use zeroize::Zeroizing;

use crate::ake::{AkeError, AuthzError};
use crate::types::{
    CipherSuite, ConnId, CredentialRef, CredentialTransfer, EadItem, KeyMaterial, TranscriptHash,
};

/// Both sides authenticate with static Diffie-Hellman keys.
pub const METHOD_STATIC_DH: u8 = 3;

/// The only suite this engine speaks.
pub const SUITE: CipherSuite = CipherSuite::CHACHA20_X25519_SHA256;

/// EAD label of the enrollment request (EAD_1) and voucher (EAD_2).
pub const EAD_AUTHZ_LABEL: u8 = 1;

const MESSAGE_1_MIN_LEN: usize = 2 + X25519_LEN + 1;
const PLAINTEXT_2_MIN_LEN: usize = 2 + TAG_LEN;
const PLAINTEXT_3_MIN_LEN: usize = 2 + TAG_LEN;

pub type Prk = Zeroizing<[u8; 32]>;

impl From<CryptoError> for AkeError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKeyLength { .. } => AkeError::InvalidKey(e.to_string()),
            other => AkeError::Crypto(other.to_string()),
        }
    }
}

impl From<CryptoError> for AuthzError {
    fn from(e: CryptoError) -> Self {
        AuthzError::Crypto(e.to_string())
    }
}

fn malformed(what: impl Into<String>) -> AkeError {
    AkeError::Malformed(what.into())
}

fn read_tag(bytes: &[u8]) -> [u8; TAG_LEN] {
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&bytes[..TAG_LEN]);
    tag
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message1 {
    pub suite: CipherSuite,
    pub g_x: [u8; X25519_LEN],
    pub c_i: ConnId,
    pub ead_1: Option<EadItem>,
}

impl Message1 {
    pub fn encode(&self) -> Result<Vec<u8>, AkeError> {
        let mut buf = Vec::with_capacity(MESSAGE_1_MIN_LEN + 64);
        buf.push(METHOD_STATIC_DH);
        buf.push(self.suite.0);
        buf.extend_from_slice(&self.g_x);
        buf.push(self.c_i.0);
        if let Some(ead) = &self.ead_1 {
            ead.encode(&mut buf)?;
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AkeError> {
        if bytes.len() < MESSAGE_1_MIN_LEN {
            return Err(malformed(format!("message_1 of {} bytes", bytes.len())));
        }
        if bytes[0] != METHOD_STATIC_DH {
            return Err(malformed(format!("method {}", bytes[0])));
        }
        if bytes[1] != SUITE.0 {
            return Err(AkeError::UnsupportedSuite(bytes[1]));
        }

        let mut g_x = [0u8; X25519_LEN];
        g_x.copy_from_slice(&bytes[2..2 + X25519_LEN]);

        Ok(Self {
            suite: SUITE,
            g_x,
            c_i: ConnId(bytes[2 + X25519_LEN]),
            ead_1: EadItem::decode_optional(&bytes[MESSAGE_1_MIN_LEN..])?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plaintext2 {
    pub c_r: ConnId,
    pub id_cred_r: CredentialRef,
    pub ead_2: Option<EadItem>,
    pub mac_2: [u8; TAG_LEN],
}

impl Plaintext2 {
    pub fn encode(&self) -> Result<Vec<u8>, AkeError> {
        let kid = self.id_cred_r.as_bytes();
        let kid_len = u8::try_from(kid.len()).map_err(|_| malformed("ID_CRED_R too long"))?;

        let mut buf = Vec::with_capacity(PLAINTEXT_2_MIN_LEN + kid.len() + 32);
        buf.push(self.c_r.0);
        buf.push(kid_len);
        buf.extend_from_slice(kid);
        if let Some(ead) = &self.ead_2 {
            ead.encode(&mut buf)?;
        }
        buf.extend_from_slice(&self.mac_2);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AkeError> {
        if bytes.len() < PLAINTEXT_2_MIN_LEN {
            return Err(malformed(format!("plaintext_2 of {} bytes", bytes.len())));
        }
        let kid_len = usize::from(bytes[1]);
        let kid_end = 2 + kid_len;
        if bytes.len() < kid_end + TAG_LEN {
            return Err(malformed(format!("ID_CRED_R of {kid_len} bytes overruns plaintext_2")));
        }
        let mac_start = bytes.len() - TAG_LEN;

        Ok(Self {
            c_r: ConnId(bytes[0]),
            id_cred_r: CredentialRef::new(&bytes[2..kid_end]),
            ead_2: EadItem::decode_optional(&bytes[kid_end..mac_start])?,
            mac_2: read_tag(&bytes[mac_start..]),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plaintext3 {
    pub transfer: CredentialTransfer,
    pub id_cred_i: Vec<u8>,
    pub ead_3: Option<EadItem>,
    pub mac_3: [u8; TAG_LEN],
}

impl Plaintext3 {
    pub fn encode(&self) -> Result<Vec<u8>, AkeError> {
        let id_len =
            u8::try_from(self.id_cred_i.len()).map_err(|_| malformed("ID_CRED_I too long"))?;
        let mode = match self.transfer {
            CredentialTransfer::ByReference => 0,
            CredentialTransfer::ByValue => 1,
        };

        let mut buf = Vec::with_capacity(PLAINTEXT_3_MIN_LEN + self.id_cred_i.len());
        buf.push(mode);
        buf.push(id_len);
        buf.extend_from_slice(&self.id_cred_i);
        if let Some(ead) = &self.ead_3 {
            ead.encode(&mut buf)?;
        }
        buf.extend_from_slice(&self.mac_3);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AkeError> {
        if bytes.len() < PLAINTEXT_3_MIN_LEN {
            return Err(malformed(format!("plaintext_3 of {} bytes", bytes.len())));
        }
        let transfer = match bytes[0] {
            0 => CredentialTransfer::ByReference,
            1 => CredentialTransfer::ByValue,
            other => return Err(malformed(format!("credential transfer mode {other}"))),
        };
        let id_end = 2 + usize::from(bytes[1]);
        if bytes.len() < id_end + TAG_LEN {
            return Err(malformed("ID_CRED_I overruns plaintext_3"));
        }
        let mac_start = bytes.len() - TAG_LEN;

        Ok(Self {
            transfer,
            id_cred_i: bytes[2..id_end].to_vec(),
            ead_3: EadItem::decode_optional(&bytes[id_end..mac_start])?,
            mac_3: read_tag(&bytes[mac_start..]),
        })
    }
}

// ============================================================================
// Key schedule
// ============================================================================

pub fn th_2(g_y: &[u8; X25519_LEN], h_message_1: &TranscriptHash) -> [u8; 32] {
    sha256_parts(&[g_y.as_slice(), h_message_1.0.as_slice()])
}

pub fn prk_2e(th_2: &[u8; 32], g_xy: &[u8; X25519_LEN]) -> Prk {
    Zeroizing::new(hkdf_extract(th_2, g_xy))
}

pub fn keystream_2(prk_2e: &[u8; 32], th_2: &[u8; 32], len: usize) -> Result<Vec<u8>, AkeError> {
    Ok(expand_labeled(prk_2e, "keystream_2", th_2, len)?)
}

pub fn xor_keystream(buf: &mut [u8], keystream: &[u8]) {
    for (byte, k) in buf.iter_mut().zip(keystream) {
        *byte ^= k;
    }
}

pub fn prk_3e2m(prk_2e: &[u8; 32], g_rx: &[u8; X25519_LEN]) -> Prk {
    Zeroizing::new(hkdf_extract(prk_2e, g_rx))
}

pub fn mac_2(
    prk_3e2m: &[u8; 32],
    th_2: &[u8; 32],
    c_r: ConnId,
    id_cred_r: &CredentialRef,
    cred_r: &[u8],
    ead_2: &[u8],
) -> [u8; TAG_LEN] {
    truncated_tag(
        prk_3e2m,
        &[b"mac_2".as_slice(), th_2, &[c_r.0], id_cred_r.as_bytes(), cred_r, ead_2],
    )
}

pub fn th_3(th_2: &[u8; 32], plaintext_2: &[u8], cred_r: &[u8]) -> [u8; 32] {
    sha256_parts(&[th_2.as_slice(), plaintext_2, cred_r])
}

pub fn key_iv_3(
    prk_3e2m: &[u8; 32],
    th_3: &[u8; 32],
) -> Result<(Zeroizing<[u8; AEAD_KEY_LEN]>, [u8; AEAD_NONCE_LEN]), AkeError> {
    let okm = Zeroizing::new(expand_labeled(prk_3e2m, "k_3", th_3, AEAD_KEY_LEN)?);
    let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    key.copy_from_slice(&okm);

    let okm = expand_labeled(prk_3e2m, "iv_3", th_3, AEAD_NONCE_LEN)?;
    let mut iv = [0u8; AEAD_NONCE_LEN];
    iv.copy_from_slice(&okm);
    Ok((key, iv))
}

pub fn prk_4e3m(prk_3e2m: &[u8; 32], g_iy: &[u8; X25519_LEN]) -> Prk {
    Zeroizing::new(hkdf_extract(prk_3e2m, g_iy))
}

pub fn mac_3(
    prk_4e3m: &[u8; 32],
    th_3: &[u8; 32],
    id_cred_i: &[u8],
    cred_i: &[u8],
    ead_3: &[u8],
) -> [u8; TAG_LEN] {
    truncated_tag(
        prk_4e3m,
        &[b"mac_3".as_slice(), th_3, id_cred_i, cred_i, ead_3],
    )
}

pub fn th_4(th_3: &[u8; 32], plaintext_3: &[u8], cred_i: &[u8]) -> [u8; 32] {
    sha256_parts(&[th_3.as_slice(), plaintext_3, cred_i])
}

pub fn prk_out(prk_4e3m: &[u8; 32], th_4: &[u8; 32]) -> Result<KeyMaterial, AkeError> {
    let okm = Zeroizing::new(expand_labeled(prk_4e3m, "prk_out", th_4, 32)?);
    let mut out = [0u8; 32];
    out.copy_from_slice(&okm);
    Ok(KeyMaterial::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_1_layout() {
        let message = Message1 {
            suite: SUITE,
            g_x: [0x11; 32],
            c_i: ConnId(0x37),
            ead_1: Some(EadItem::new(EAD_AUTHZ_LABEL, true, vec![0xaa])),
        };
        let bytes = message.encode().unwrap();

        assert_eq!(bytes[0], METHOD_STATIC_DH);
        assert_eq!(bytes[1], 4);
        assert_eq!(bytes[34], 0x37);
        assert_eq!(&bytes[35..], &[0x01, 0x01, 0x00, 0x01, 0xaa]);
        assert_eq!(Message1::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_message_1_rejects_other_suites() {
        let mut bytes = Message1 {
            suite: SUITE,
            g_x: [0; 32],
            c_i: ConnId(0),
            ead_1: None,
        }
        .encode()
        .unwrap();
        bytes[1] = 2;
        assert_eq!(Message1::decode(&bytes), Err(AkeError::UnsupportedSuite(2)));
        assert!(Message1::decode(&bytes[..20]).is_err());
    }

    #[test]
    fn test_plaintext_2_splits_ead_from_mac() {
        let plaintext = Plaintext2 {
            c_r: ConnId(0x27),
            id_cred_r: CredentialRef::new(vec![0x32]),
            ead_2: Some(EadItem::new(EAD_AUTHZ_LABEL, true, vec![0x5a; 16])),
            mac_2: [0x77; TAG_LEN],
        };
        let bytes = plaintext.encode().unwrap();
        assert_eq!(Plaintext2::decode(&bytes).unwrap(), plaintext);

        let bare = Plaintext2 {
            ead_2: None,
            ..plaintext
        };
        assert_eq!(bare.encode().unwrap().len(), 3 + TAG_LEN);
    }

    #[test]
    fn test_plaintext_2_kid_overrun() {
        let mut bytes = vec![0x27, 0x40];
        bytes.extend_from_slice(&[0u8; TAG_LEN]);
        assert!(matches!(Plaintext2::decode(&bytes), Err(AkeError::Malformed(_))));
    }

    #[test]
    fn test_plaintext_3_modes() {
        let plaintext = Plaintext3 {
            transfer: CredentialTransfer::ByValue,
            id_cred_i: vec![1, 2, 3],
            ead_3: None,
            mac_3: [0x01; TAG_LEN],
        };
        let bytes = plaintext.encode().unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(Plaintext3::decode(&bytes).unwrap(), plaintext);

        let mut bad = bytes.clone();
        bad[0] = 9;
        assert!(Plaintext3::decode(&bad).is_err());
    }

    #[test]
    fn test_keystream_is_an_involution() {
        let th_2 = [0x01; 32];
        let prk = prk_2e(&th_2, &[0x02; 32]);
        let keystream = keystream_2(&prk, &th_2, 40).unwrap();

        let mut buf = b"plaintext that is forty bytes long......".to_vec();
        let original = buf.clone();
        xor_keystream(&mut buf, &keystream);
        assert_ne!(buf, original);
        xor_keystream(&mut buf, &keystream);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_mac_2_binds_every_input() {
        let prk = [0x03; 32];
        let th_2 = [0x04; 32];
        let kid = CredentialRef::new(vec![0x32]);
        let base = mac_2(&prk, &th_2, ConnId(1), &kid, b"cred", b"");

        assert_ne!(base, mac_2(&prk, &th_2, ConnId(2), &kid, b"cred", b""));
        assert_ne!(base, mac_2(&prk, &th_2, ConnId(1), &kid, b"cred", b"ead"));
        assert_ne!(base, mac_2(&prk, &[0x05; 32], ConnId(1), &kid, b"cred", b""));
        assert_ne!(base, mac_2(&prk, &th_2, ConnId(1), &kid, b"other", b""));
    }
}
