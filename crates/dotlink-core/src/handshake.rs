//! Handshake orchestration for one robot identity.
//!
//! ```text
//! Init --msg1--> Sent1 --msg2--> Received2 --voucher ok--> VoucherChecked
//!      --msg3--> Sent3 --settle, advertise--> Advertised
//! ```
//!
//! Any error moves the machine to `Failed` and ends the handshake. Both
//! terminal states are absorbing.

use std::sync::Arc;
use std::time::Duration;

use dotlink_proto::{Header, Message, Payload, PayloadType, PROTOCOL_VERSION};
use dotlink_transport::{hdlc, HdlcDecoder, Transport};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::ake::{AkeError, AkeInitiator, AuthzDevice, CredentialResolver};
use crate::config::{ForeignFramePolicy, HandshakeConfig};
use crate::errors::{FailureKind, HandshakeError, HandshakeFailure, Stage};
use crate::types::{
    CipherSuite, ConnId, Credential, CredentialRef, CredentialTransfer, DeviceId, EadItem,
    Identity, KeyMaterial, PeerReference, TranscriptHash,
};

// ============================================================================
// State
// ============================================================================

/// Handshake progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    Sent1,
    Received2,
    VoucherChecked,
    Sent3,
    Advertised,
    Failed { stage: Stage, kind: FailureKind },
}

impl HandshakeState {
    /// The stage this state represents, or `None` once terminal.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            HandshakeState::Init => Some(Stage::Init),
            HandshakeState::Sent1 => Some(Stage::Sent1),
            HandshakeState::Received2 => Some(Stage::Received2),
            HandshakeState::VoucherChecked => Some(Stage::VoucherChecked),
            HandshakeState::Sent3 => Some(Stage::Sent3),
            HandshakeState::Advertised | HandshakeState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }
}

/// Intermediate values carried between states. Dropped with the orchestrator.
#[derive(Debug, Default)]
struct HandshakeSession {
    cipher_suite: Option<CipherSuite>,
    h_message_1: Option<TranscriptHash>,
    local_conn_id: Option<ConnId>,
    peer_conn_id: Option<ConnId>,
    peer_credential_ref: Option<CredentialRef>,
    ead_2: Option<EadItem>,
    peer_credential: Option<Credential>,
    key_material: Option<KeyMaterial>,
}

/// Outcome of a completed handshake.
#[derive(Debug)]
pub struct HandshakeReport {
    pub device: DeviceId,
    pub cipher_suite: CipherSuite,
    /// Hash of the message 1 this session was bound to.
    pub h_message_1: TranscriptHash,
    pub local_conn_id: Option<ConnId>,
    pub peer_conn_id: ConnId,
    pub key_material: KeyMaterial,
    /// Transport reads spent waiting for message 2.
    pub read_attempts: u32,
    /// Frames for other devices skipped while waiting.
    pub discarded_frames: u32,
    pub elapsed: Duration,
}

// ============================================================================
// Inbound checks
// ============================================================================

/// Accept an encoded message only if it is addressed to `local_address`.
///
/// Only the destination field is read, so frames for other devices are
/// rejected whatever their payload type or content.
pub fn check_destination(bytes: &[u8], local_address: u64) -> Result<(), HandshakeError> {
    let destination = Header::peek_destination(bytes)?;
    if destination != local_address {
        return Err(HandshakeError::AddressMismatch {
            expected: local_address,
            got: destination,
        });
    }
    Ok(())
}

/// Accept `message` only if it is addressed to `local_address` and carries
/// the `expected` payload type. The destination is checked first.
pub fn check_inbound(
    message: &Message,
    local_address: u64,
    expected: PayloadType,
) -> Result<(), HandshakeError> {
    if message.header.destination != local_address {
        return Err(HandshakeError::AddressMismatch {
            expected: local_address,
            got: message.header.destination,
        });
    }
    let got = message.payload_type();
    if got != expected {
        return Err(HandshakeError::TypeMismatch { expected, got });
    }
    Ok(())
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one identity through the handshake over a borrowed transport.
pub struct HandshakeOrchestrator<E, D, R> {
    identity: Identity,
    peer: PeerReference,
    config: HandshakeConfig,
    engine: E,
    device: D,
    resolver: Arc<R>,
    state: HandshakeState,
    session: HandshakeSession,
    read_attempts: u32,
    discarded_frames: u32,
}

impl<E, D, R> HandshakeOrchestrator<E, D, R>
where
    E: AkeInitiator,
    D: AuthzDevice,
    R: CredentialResolver,
{
    pub fn new(
        identity: Identity,
        peer: PeerReference,
        engine: E,
        device: D,
        resolver: Arc<R>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            identity,
            peer,
            config,
            engine,
            device,
            resolver,
            state: HandshakeState::Init,
            session: HandshakeSession::default(),
            read_attempts: 0,
            discarded_frames: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the handshake to a terminal state.
    pub async fn run<T>(mut self, transport: &mut T) -> Result<HandshakeReport, HandshakeFailure>
    where
        T: Transport + ?Sized,
    {
        let started = Instant::now();
        info!(
            device = %self.identity.id(),
            address = format_args!("{:#x}", self.identity.address()),
            "starting handshake"
        );

        while let Some(stage) = self.state.stage() {
            let step = match stage {
                Stage::Init => self.send_message_1(transport).await,
                Stage::Sent1 => self.receive_message_2(transport).await,
                Stage::Received2 => self.check_voucher().await,
                Stage::VoucherChecked => self.send_message_3(transport).await,
                Stage::Sent3 => self.advertise(transport).await,
            };

            match step {
                Ok(next) => {
                    debug!(
                        device = %self.identity.id(),
                        from = %stage,
                        to = ?next,
                        "handshake transition"
                    );
                    self.state = next;
                }
                Err(error) => return Err(self.fail(stage, error)),
            }
        }

        self.into_report(started.elapsed())
    }

    fn fail(&mut self, stage: Stage, error: HandshakeError) -> HandshakeFailure {
        self.state = HandshakeState::Failed {
            stage,
            kind: error.kind(),
        };
        warn!(device = %self.identity.id(), %stage, error = %error, "handshake failed");
        HandshakeFailure {
            device: self.identity.id().clone(),
            stage,
            error,
        }
    }

    fn into_report(mut self, elapsed: Duration) -> Result<HandshakeReport, HandshakeFailure> {
        let session = std::mem::take(&mut self.session);
        let (Some(cipher_suite), Some(h_message_1), Some(peer_conn_id), Some(key_material)) = (
            session.cipher_suite,
            session.h_message_1,
            session.peer_conn_id,
            session.key_material,
        )
        else {
            return Err(self.fail(
                Stage::Sent3,
                HandshakeError::SessionIncomplete("negotiated session parameters"),
            ));
        };

        Ok(HandshakeReport {
            device: self.identity.id().clone(),
            cipher_suite,
            h_message_1,
            local_conn_id: session.local_conn_id,
            peer_conn_id,
            key_material,
            read_attempts: self.read_attempts,
            discarded_frames: self.discarded_frames,
            elapsed,
        })
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    async fn send_message_1<T>(
        &mut self,
        transport: &mut T,
    ) -> Result<HandshakeState, HandshakeError>
    where
        T: Transport + ?Sized,
    {
        self.config.validate()?;

        let suite = self.engine.selected_cipher_suite();
        let secret = self
            .engine
            .compute_ephemeral_secret(&self.peer.gateway_public_key)?;
        let ead_1 = self.device.prepare_ead_1(&secret, suite)?;
        drop(secret);

        let message_1 = self.engine.prepare_message_1(None, Some(ead_1))?;
        let h_message_1 = self.engine.h_message_1()?;
        self.device.set_h_message_1(h_message_1);

        self.session.cipher_suite = Some(suite);
        self.session.h_message_1 = Some(h_message_1);
        self.session.local_conn_id = self.engine.local_connection_id();

        let len = message_1.len();
        self.send(transport, Payload::EdhocMessage(message_1.into())).await?;
        debug!(device = %self.identity.id(), len, suite = suite.0, "sent message_1");
        Ok(HandshakeState::Sent1)
    }

    async fn receive_message_2<T>(
        &mut self,
        transport: &mut T,
    ) -> Result<HandshakeState, HandshakeError>
    where
        T: Transport + ?Sized,
    {
        let message = self.receive(transport, PayloadType::EdhocMessage).await?;
        let body = match message.payload {
            Payload::EdhocMessage(body) => body,
            other => {
                return Err(HandshakeError::TypeMismatch {
                    expected: PayloadType::EdhocMessage,
                    got: other.payload_type(),
                })
            }
        };

        let parsed = self.engine.parse_message_2(&body)?;
        debug!(
            device = %self.identity.id(),
            c_r = %parsed.c_r,
            id_cred_r = %parsed.id_cred_r,
            voucher = parsed.ead_2.is_some(),
            "received message_2"
        );

        self.session.peer_conn_id = Some(parsed.c_r);
        self.session.peer_credential_ref = Some(parsed.id_cred_r);
        self.session.ead_2 = parsed.ead_2;
        Ok(HandshakeState::Received2)
    }

    async fn check_voucher(&mut self) -> Result<HandshakeState, HandshakeError> {
        let reference = self
            .session
            .peer_credential_ref
            .clone()
            .ok_or(HandshakeError::SessionIncomplete("responder credential reference"))?;

        let credential = match self.resolver.resolve(&reference, None).await {
            Ok(credential) => credential,
            Err(source) => return Err(HandshakeError::UnresolvedCredential { reference, source }),
        };

        // The voucher is single-use.
        let ead_2 = self.session.ead_2.take();
        self.device
            .process_ead_2(ead_2.as_ref(), &credential)
            .map_err(HandshakeError::VoucherInvalid)?;

        info!(
            device = %self.identity.id(),
            id_cred_r = %reference,
            "authorization voucher accepted"
        );
        self.session.peer_credential = Some(credential);
        Ok(HandshakeState::VoucherChecked)
    }

    async fn send_message_3<T>(
        &mut self,
        transport: &mut T,
    ) -> Result<HandshakeState, HandshakeError>
    where
        T: Transport + ?Sized,
    {
        let cred_r = self
            .session
            .peer_credential
            .as_ref()
            .ok_or(HandshakeError::SessionIncomplete("responder credential"))?;
        let c_r = self
            .session
            .peer_conn_id
            .ok_or(HandshakeError::SessionIncomplete("responder connection id"))?;

        self.engine
            .verify_message_2(self.identity.private_key(), self.identity.credential(), cred_r)
            .map_err(|e| match e {
                AkeError::VerificationFailed => HandshakeError::CryptoVerification,
                other => HandshakeError::Engine(other),
            })?;

        let (message_3, key_material) = self
            .engine
            .prepare_message_3(CredentialTransfer::ByReference, None)?;
        self.session.key_material = Some(key_material);

        let mut body = Vec::with_capacity(1 + message_3.len());
        body.push(c_r.0);
        body.extend_from_slice(&message_3);

        let len = body.len();
        self.send(transport, Payload::EdhocMessage(body.into())).await?;
        debug!(device = %self.identity.id(), len, "sent message_3");
        Ok(HandshakeState::Sent3)
    }

    async fn advertise<T>(&mut self, transport: &mut T) -> Result<HandshakeState, HandshakeError>
    where
        T: Transport + ?Sized,
    {
        sleep(self.config.settle_delay.as_duration()).await;
        self.send(transport, Payload::Advertisement).await?;
        info!(device = %self.identity.id(), "handshake complete, advertisement sent");
        Ok(HandshakeState::Advertised)
    }

    // ------------------------------------------------------------------------
    // I/O
    // ------------------------------------------------------------------------

    fn outbound_header(&self) -> Header {
        Header {
            destination: self.config.gateway_address,
            source: self.identity.address(),
            swarm_id: self.config.swarm_id,
            application: self.config.application,
            version: PROTOCOL_VERSION,
        }
    }

    async fn send<T>(&self, transport: &mut T, payload: Payload) -> Result<(), HandshakeError>
    where
        T: Transport + ?Sized,
    {
        let message = Message::new(self.outbound_header(), payload);
        let frame = hdlc::encode(&message.to_bytes());
        transport.write(&frame).await?;
        Ok(())
    }

    /// Read frames until one for this device arrives or the deadline passes.
    async fn receive<T>(
        &mut self,
        transport: &mut T,
        expected: PayloadType,
    ) -> Result<Message, HandshakeError>
    where
        T: Transport + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + self.config.receive_deadline();
        let local_address = self.identity.address();
        let mut decoder = HdlcDecoder::new(self.config.max_frame_len);

        loop {
            while let Some(frame) = decoder.next_frame()? {
                match check_destination(&frame, local_address) {
                    Ok(()) => {}
                    Err(HandshakeError::AddressMismatch { got, .. })
                        if self.config.foreign_frames == ForeignFramePolicy::Discard =>
                    {
                        self.discarded_frames += 1;
                        debug!(
                            device = %self.identity.id(),
                            destination = format_args!("{got:#x}"),
                            len = frame.len(),
                            "discarding frame for another device"
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                }

                let message = Message::from_bytes(&frame)?;
                check_inbound(&message, local_address, expected)?;
                return Ok(message);
            }

            let now = Instant::now();
            let attempts_exhausted =
                matches!(self.config.max_read_attempts, Some(max) if self.read_attempts >= max);
            if now >= deadline || attempts_exhausted {
                debug!(
                    device = %self.identity.id(),
                    attempts = self.read_attempts,
                    buffered = decoder.buffered(),
                    "gave up waiting for a reply"
                );
                return Err(HandshakeError::TransportTimeout {
                    waited: now - started,
                    attempts: self.read_attempts,
                });
            }

            let wait = self.config.read_timeout().min(deadline - now);
            self.read_attempts += 1;
            let chunk = transport.read(self.config.read_chunk_len, wait).await?;
            if chunk.is_empty() {
                trace!(device = %self.identity.id(), attempt = self.read_attempts, "no data yet");
                continue;
            }
            decoder.extend(&chunk);
        }
    }
}
