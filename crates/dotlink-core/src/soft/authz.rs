//! Zero-touch authorization: enrollment request in EAD_1, voucher in EAD_2.
//!
//! The device encrypts its identifier for the enrollment server under a key
//! derived from `G_XW`, the ephemeral secret shared with that server. The
//! server answers, through the responder, with a voucher binding the hash of
//! message 1 to the responder's credential. Only a server holding the private
//! key behind `G_W` can produce it.

use dotlink_crypto::{
    expand_labeled, hkdf_extract, open, seal, tag_matches, truncated_tag, AEAD_KEY_LEN,
    AEAD_NONCE_LEN, TAG_LEN,
};
use zeroize::Zeroizing;

use crate::ake::{AuthzDevice, AuthzError, VoucherError};
use crate::soft::schedule::{Prk, EAD_AUTHZ_LABEL};
use crate::types::{CipherSuite, Credential, EadItem, EphemeralSecret, TranscriptHash};

/// PRK shared between the device and the enrollment server.
pub fn enrollment_prk(secret: &EphemeralSecret) -> Prk {
    Zeroizing::new(hkdf_extract(&[], secret.as_bytes()))
}

fn id_key(
    prk: &[u8; 32],
) -> Result<(Zeroizing<[u8; AEAD_KEY_LEN]>, [u8; AEAD_NONCE_LEN]), AuthzError> {
    let okm = Zeroizing::new(expand_labeled(prk, "k_1", &[], AEAD_KEY_LEN)?);
    let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    key.copy_from_slice(&okm);

    let okm = expand_labeled(prk, "iv_1", &[], AEAD_NONCE_LEN)?;
    let mut iv = [0u8; AEAD_NONCE_LEN];
    iv.copy_from_slice(&okm);
    Ok((key, iv))
}

pub fn encrypt_id(prk: &[u8; 32], suite: CipherSuite, id_u: &[u8]) -> Result<Vec<u8>, AuthzError> {
    let (key, iv) = id_key(prk)?;
    Ok(seal(&key, &iv, &[suite.0], id_u)?)
}

pub fn decrypt_id(
    prk: &[u8; 32],
    suite: CipherSuite,
    encrypted: &[u8],
) -> Result<Vec<u8>, AuthzError> {
    let (key, iv) = id_key(prk)?;
    Ok(open(&key, &iv, &[suite.0], encrypted)?)
}

/// Voucher over the message 1 hash and the responder credential.
pub fn voucher(prk: &[u8; 32], h_message_1: &TranscriptHash, cred_r: &Credential) -> [u8; TAG_LEN] {
    truncated_tag(
        prk,
        &[b"voucher".as_slice(), h_message_1.0.as_slice(), cred_r.as_bytes()],
    )
}

/// Decoded value of an enrollment request: `loc_len | LOC_W | ENC_ID`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub location: String,
    pub encrypted_id: Vec<u8>,
}

impl EnrollmentRequest {
    pub fn encode(&self) -> Result<Vec<u8>, AuthzError> {
        let loc_len = u8::try_from(self.location.len())
            .map_err(|_| AuthzError::LocationTooLong(self.location.len()))?;
        let mut value = Vec::with_capacity(1 + self.location.len() + self.encrypted_id.len());
        value.push(loc_len);
        value.extend_from_slice(self.location.as_bytes());
        value.extend_from_slice(&self.encrypted_id);
        Ok(value)
    }

    pub fn decode(value: &[u8]) -> Result<Self, AuthzError> {
        let Some((&loc_len, rest)) = value.split_first() else {
            return Err(AuthzError::Malformed("empty enrollment request".into()));
        };
        let loc_len = usize::from(loc_len);
        if rest.len() < loc_len {
            return Err(AuthzError::Malformed("location overruns enrollment request".into()));
        }
        let location = std::str::from_utf8(&rest[..loc_len])
            .map_err(|_| AuthzError::Malformed("location is not UTF-8".into()))?;
        Ok(Self {
            location: location.to_owned(),
            encrypted_id: rest[loc_len..].to_vec(),
        })
    }
}

/// Device side of the authorization exchange for one handshake.
pub struct SoftAuthzDevice {
    id_u: Vec<u8>,
    loc_w: String,
    prk: Option<Prk>,
    h_message_1: Option<TranscriptHash>,
}

impl SoftAuthzDevice {
    /// The enrollment server's key enters through the ephemeral secret the
    /// engine derives from it, not through the device.
    pub fn new(id_u: impl Into<Vec<u8>>, loc_w: impl Into<String>) -> Self {
        Self {
            id_u: id_u.into(),
            loc_w: loc_w.into(),
            prk: None,
            h_message_1: None,
        }
    }
}

impl AuthzDevice for SoftAuthzDevice {
    fn prepare_ead_1(
        &mut self,
        secret: &EphemeralSecret,
        suite: CipherSuite,
    ) -> Result<EadItem, AuthzError> {
        let prk = enrollment_prk(secret);
        let request = EnrollmentRequest {
            location: self.loc_w.clone(),
            encrypted_id: encrypt_id(&prk, suite, &self.id_u)?,
        };
        let value = request.encode()?;

        self.prk = Some(prk);
        Ok(EadItem::new(EAD_AUTHZ_LABEL, true, value))
    }

    fn set_h_message_1(&mut self, hash: TranscriptHash) {
        self.h_message_1 = Some(hash);
    }

    fn process_ead_2(
        &mut self,
        ead_2: Option<&EadItem>,
        cred_r: &Credential,
    ) -> Result<(), VoucherError> {
        let (Some(prk), Some(h_message_1)) = (self.prk.as_ref(), self.h_message_1.as_ref()) else {
            return Err(VoucherError::NotPrepared);
        };
        let ead_2 = ead_2.ok_or(VoucherError::Missing)?;
        if ead_2.label != EAD_AUTHZ_LABEL {
            return Err(VoucherError::UnexpectedLabel(ead_2.label));
        }

        let expected = voucher(prk, h_message_1, cred_r);
        if !tag_matches(&expected, &ead_2.value) {
            return Err(VoucherError::Mismatch);
        }
        Ok(())
    }
}
