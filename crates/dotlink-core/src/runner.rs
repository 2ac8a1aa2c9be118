//! Sequential multi-identity runs over one shared transport.

use std::sync::Arc;

use dotlink_transport::Transport;
use tracing::{info, warn};

use crate::ake::{AkeError, AkeInitiator, AuthzDevice, AuthzError, CredentialResolver};
use crate::config::HandshakeConfig;
use crate::errors::{HandshakeError, HandshakeFailure, Stage};
use crate::handshake::{HandshakeOrchestrator, HandshakeReport};
use crate::types::{DeviceId, Identity, PeerReference};

/// Builds a fresh engine and authorization device for every handshake.
pub trait SessionFactory {
    type Engine: AkeInitiator;
    type Device: AuthzDevice;

    fn engine(&self, identity: &Identity) -> Result<Self::Engine, AkeError>;

    fn device(&self, identity: &Identity, peer: &PeerReference) -> Result<Self::Device, AuthzError>;
}

/// Result of one identity's handshake.
#[derive(Debug)]
pub struct IdentityOutcome {
    pub device: DeviceId,
    pub result: Result<HandshakeReport, HandshakeFailure>,
}

impl IdentityOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run one complete handshake per identity, strictly in order.
///
/// Handshakes never overlap on the transport. A failure is recorded and the
/// next identity still runs.
pub async fn run_sequential<T, F, R>(
    transport: &mut T,
    identities: &[Identity],
    peer: &PeerReference,
    factory: &F,
    resolver: Arc<R>,
    config: &HandshakeConfig,
) -> Vec<IdentityOutcome>
where
    T: Transport + ?Sized,
    F: SessionFactory,
    R: CredentialResolver,
{
    let mut outcomes = Vec::with_capacity(identities.len());

    for (index, identity) in identities.iter().enumerate() {
        info!(index, total = identities.len(), device = %identity.id(), "running handshake");

        let result = match build_parts(factory, identity, peer) {
            Ok((engine, device)) => {
                HandshakeOrchestrator::new(
                    identity.clone(),
                    peer.clone(),
                    engine,
                    device,
                    Arc::clone(&resolver),
                    config.clone(),
                )
                .run(transport)
                .await
            }
            Err(error) => {
                warn!(device = %identity.id(), error = %error, "could not set up handshake");
                Err(HandshakeFailure {
                    device: identity.id().clone(),
                    stage: Stage::Init,
                    error,
                })
            }
        };

        outcomes.push(IdentityOutcome {
            device: identity.id().clone(),
            result,
        });
    }

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    info!(succeeded, failed = outcomes.len() - succeeded, "all handshakes finished");
    outcomes
}

fn build_parts<F: SessionFactory>(
    factory: &F,
    identity: &Identity,
    peer: &PeerReference,
) -> Result<(F::Engine, F::Device), HandshakeError> {
    let engine = factory.engine(identity)?;
    let device = factory.device(identity, peer)?;
    Ok((engine, device))
}
