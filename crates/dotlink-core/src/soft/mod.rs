//! Software implementations of the handshake capabilities.
//!
//! A compact EDHOC-style exchange (static-DH method, X25519 / SHA-256 /
//! ChaCha20-Poly1305) with zero-touch authorization vouchers. It is what the
//! initiator binary runs and what [`crate::harness`] answers.

pub mod authz;
pub mod credential;
pub mod initiator;
pub mod resolver;
pub mod schedule;

pub use authz::SoftAuthzDevice;
pub use credential::RpkCredential;
pub use initiator::SoftInitiator;
pub use resolver::StaticResolver;

use crate::ake::{AkeError, AuthzError};
use crate::runner::SessionFactory;
use crate::types::{Identity, PeerReference};

/// Fresh [`SoftInitiator`] and [`SoftAuthzDevice`] per identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftFactory;

impl SessionFactory for SoftFactory {
    type Engine = SoftInitiator;
    type Device = SoftAuthzDevice;

    fn engine(&self, _identity: &Identity) -> Result<SoftInitiator, AkeError> {
        SoftInitiator::new()
    }

    fn device(
        &self,
        identity: &Identity,
        peer: &PeerReference,
    ) -> Result<SoftAuthzDevice, AuthzError> {
        Ok(SoftAuthzDevice::new(identity.id().as_bytes(), peer.location.clone()))
    }
}
