//! Capability interfaces the orchestrator drives.
//!
//! The handshake state machine never touches key material directly. It
//! sequences calls into an [`AkeInitiator`] (the key-exchange engine), an
//! [`AuthzDevice`] (the zero-touch authorization participant) and a
//! [`CredentialResolver`], and moves their opaque outputs over the wire.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    CipherSuite, ConnId, Credential, CredentialRef, CredentialTransfer, EadItem,
    EphemeralSecret, KeyMaterial, PrivateKey, TranscriptHash,
};

// ============================================================================
// Errors
// ============================================================================

/// Errors reported by a key-exchange engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AkeError {
    #[error("malformed handshake message: {0}")]
    Malformed(String),

    #[error("unsupported cipher suite {0}")]
    UnsupportedSuite(u8),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("peer authentication failed")]
    VerificationFailed,

    #[error("operation not valid in engine state {0}")]
    WrongState(&'static str),

    #[error("cryptographic failure: {0}")]
    Crypto(String),
}

/// Errors reported while preparing authorization data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("enrollment location is {0} bytes, at most 255 fit")]
    LocationTooLong(usize),

    #[error("malformed authorization data: {0}")]
    Malformed(String),

    #[error("cryptographic failure: {0}")]
    Crypto(String),
}

/// Why an authorization voucher was not accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoucherError {
    #[error("message_2 carried no authorization data")]
    Missing,

    #[error("unexpected authorization data label {0}")]
    UnexpectedLabel(u8),

    #[error("voucher does not match the responder credential")]
    Mismatch,

    #[error("voucher checked before message_1 was bound")]
    NotPrepared,
}

/// Why a credential reference could not be turned into a credential.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no credential known for {0}")]
    Unknown(CredentialRef),

    #[error("credential lookup failed: {0}")]
    Lookup(String),
}

// ============================================================================
// Engine
// ============================================================================

/// Fields recovered from message 2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedMessage2 {
    /// Responder connection identifier (C_R), echoed in front of message 3.
    pub c_r: ConnId,
    /// Responder credential reference (ID_CRED_R).
    pub id_cred_r: CredentialRef,
    /// Authorization data carrying the voucher, if any.
    pub ead_2: Option<EadItem>,
}

/// Initiator side of the authenticated key exchange.
///
/// One instance serves exactly one handshake; calls are expected in the order
/// the methods are declared.
pub trait AkeInitiator: Send {
    /// Cipher suite the engine will offer in message 1.
    fn selected_cipher_suite(&self) -> CipherSuite;

    /// Ephemeral secret shared with the owner of `peer_public_key`.
    fn compute_ephemeral_secret(
        &self,
        peer_public_key: &[u8; 32],
    ) -> Result<EphemeralSecret, AkeError>;

    /// Build message 1. `c_i` of `None` lets the engine choose.
    fn prepare_message_1(
        &mut self,
        c_i: Option<ConnId>,
        ead_1: Option<EadItem>,
    ) -> Result<Vec<u8>, AkeError>;

    /// Hash of the message 1 just produced.
    fn h_message_1(&self) -> Result<TranscriptHash, AkeError>;

    /// Connection identifier this side used, once message 1 exists.
    fn local_connection_id(&self) -> Option<ConnId>;

    /// Decrypt and split message 2.
    fn parse_message_2(&mut self, message_2: &[u8]) -> Result<ParsedMessage2, AkeError>;

    /// Authenticate the responder with its resolved credential.
    ///
    /// Returns [`AkeError::VerificationFailed`] when message 2 does not
    /// authenticate against `cred_r`.
    fn verify_message_2(
        &mut self,
        private_key: &PrivateKey,
        cred_i: &Credential,
        cred_r: &Credential,
    ) -> Result<(), AkeError>;

    /// Build message 3 and derive the session key material.
    fn prepare_message_3(
        &mut self,
        transfer: CredentialTransfer,
        ead_3: Option<EadItem>,
    ) -> Result<(Vec<u8>, KeyMaterial), AkeError>;
}

// ============================================================================
// Authorization
// ============================================================================

/// Zero-touch authorization participant on the initiator side.
pub trait AuthzDevice: Send {
    /// Authorization data to attach to message 1.
    fn prepare_ead_1(
        &mut self,
        secret: &EphemeralSecret,
        suite: CipherSuite,
    ) -> Result<EadItem, AuthzError>;

    /// Bind the voucher check to the message 1 actually sent.
    fn set_h_message_1(&mut self, hash: TranscriptHash);

    /// Check the voucher in `ead_2` against the responder credential.
    fn process_ead_2(
        &mut self,
        ead_2: Option<&EadItem>,
        cred_r: &Credential,
    ) -> Result<(), VoucherError>;
}

// ============================================================================
// Credentials
// ============================================================================

/// Turns an ID_CRED reference into a full credential.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// `hint` is an inline credential offered by the peer, if any.
    async fn resolve(
        &self,
        reference: &CredentialRef,
        hint: Option<&Credential>,
    ) -> Result<Credential, ResolveError>;
}
