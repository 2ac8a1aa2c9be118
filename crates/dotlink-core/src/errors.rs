//! Handshake failure taxonomy.

use std::fmt;
use std::time::Duration;

use dotlink_proto::{MessageError, PayloadType};
use dotlink_transport::{FrameError, TransportError};
use thiserror::Error;

use crate::ake::{AkeError, AuthzError, ResolveError, VoucherError};
use crate::config::ConfigError;
use crate::types::{CredentialRef, DeviceId};

/// Every way a single handshake can end early.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("invalid handshake configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] MessageError),

    #[error("frame addressed to {got:#018x}, expected {expected:#018x}")]
    AddressMismatch { expected: u64, got: u64 },

    #[error("unexpected payload type {got:?}, expected {expected:?}")]
    TypeMismatch { expected: PayloadType, got: PayloadType },

    #[error("credential {reference} could not be resolved: {source}")]
    UnresolvedCredential {
        reference: CredentialRef,
        #[source]
        source: ResolveError,
    },

    #[error("authorization voucher rejected: {0}")]
    VoucherInvalid(#[source] VoucherError),

    #[error("message_2 failed cryptographic verification")]
    CryptoVerification,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no reply within {waited:?} ({attempts} reads)")]
    TransportTimeout { waited: Duration, attempts: u32 },

    #[error("key exchange engine error: {0}")]
    Engine(#[from] AkeError),

    #[error("authorization device error: {0}")]
    Authorization(#[from] AuthzError),

    #[error("handshake session is missing {0}")]
    SessionIncomplete(&'static str),
}

/// Coarse classification of [`HandshakeError`], cheap to copy into state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Config,
    Frame,
    MalformedMessage,
    AddressMismatch,
    TypeMismatch,
    UnresolvedCredential,
    VoucherInvalid,
    CryptoVerification,
    Transport,
    TransportTimeout,
    Engine,
    Internal,
}

impl HandshakeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            HandshakeError::Config(_) => FailureKind::Config,
            HandshakeError::Frame(_) => FailureKind::Frame,
            HandshakeError::MalformedMessage(_) => FailureKind::MalformedMessage,
            HandshakeError::AddressMismatch { .. } => FailureKind::AddressMismatch,
            HandshakeError::TypeMismatch { .. } => FailureKind::TypeMismatch,
            HandshakeError::UnresolvedCredential { .. } => FailureKind::UnresolvedCredential,
            HandshakeError::VoucherInvalid(_) => FailureKind::VoucherInvalid,
            HandshakeError::CryptoVerification => FailureKind::CryptoVerification,
            HandshakeError::Transport(_) => FailureKind::Transport,
            HandshakeError::TransportTimeout { .. } => FailureKind::TransportTimeout,
            HandshakeError::Engine(_) | HandshakeError::Authorization(_) => FailureKind::Engine,
            HandshakeError::SessionIncomplete(_) => FailureKind::Internal,
        }
    }
}

/// Non-terminal handshake state in which a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    Sent1,
    Received2,
    VoucherChecked,
    Sent3,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Sent1 => "sent-1",
            Stage::Received2 => "received-2",
            Stage::VoucherChecked => "voucher-checked",
            Stage::Sent3 => "sent-3",
        };
        f.write_str(name)
    }
}

/// A failed handshake: which device, where it stopped, and why.
#[derive(Debug, Error)]
#[error("handshake for {device} failed in state {stage}: {error}")]
pub struct HandshakeFailure {
    pub device: DeviceId,
    pub stage: Stage,
    #[source]
    pub error: HandshakeError,
}

impl HandshakeFailure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_device_and_stage() {
        let failure = HandshakeFailure {
            device: DeviceId::from_hex("a1044101").unwrap(),
            stage: Stage::Sent1,
            error: HandshakeError::TypeMismatch {
                expected: PayloadType::EdhocMessage,
                got: PayloadType::Advertisement,
            },
        };

        let text = failure.to_string();
        assert!(text.contains("a1044101"));
        assert!(text.contains("sent-1"));
        assert_eq!(failure.kind(), FailureKind::TypeMismatch);
    }

    #[test]
    fn test_kinds_are_distinct_for_verification_failures() {
        assert_eq!(
            HandshakeError::VoucherInvalid(VoucherError::Mismatch).kind(),
            FailureKind::VoucherInvalid
        );
        assert_eq!(HandshakeError::CryptoVerification.kind(), FailureKind::CryptoVerification);
        assert_eq!(
            HandshakeError::AddressMismatch { expected: 1, got: 2 }.kind(),
            FailureKind::AddressMismatch
        );
    }
}
