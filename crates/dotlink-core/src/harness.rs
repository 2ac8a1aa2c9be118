//! Simulated gateway for exercising robots without a serial line.
//!
//! [`SimulatedGateway`] plays both the responder and the enrollment server of
//! the soft engine. It consumes frames written by an initiator, answers
//! message 1 with message 2 (and a voucher when the device is enrolled) and
//! checks message 3. Faults can be switched on to drive the initiator down
//! its failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dotlink_crypto::{open, sha256, sha256_parts, tag_matches, CryptoError, DhSecret, X25519_LEN};
use dotlink_proto::{Header, Message, MessageError, Payload, GATEWAY_ADDRESS_DEFAULT};
use dotlink_transport::{hdlc, FrameError};
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ake::{AkeError, AuthzError};
use crate::soft::authz::{decrypt_id, enrollment_prk, voucher, EnrollmentRequest};
use crate::soft::credential::RpkCredential;
use crate::soft::resolver::StaticResolver;
use crate::soft::schedule::{self, Message1, Plaintext2, Plaintext3, Prk, EAD_AUTHZ_LABEL};
use crate::types::{
    ConnId, Credential, CredentialRef, CredentialTransfer, DeviceId, EadItem, EphemeralSecret,
    Identity, IdentityError, KeyMaterial, PeerReference, PrivateKey, TranscriptHash,
};

/// Enrollment server location used by the demo deployment.
pub const DEMO_LOCATION: &str = "http://localhost:18000";

/// Key identifier of the demo responder credential.
pub const DEMO_RESPONDER_KID: u8 = 0x32;

/// Misbehaviour switches.
#[derive(Clone, Debug, Default)]
pub struct GatewayFaults {
    /// Flip a bit in the voucher.
    pub tamper_voucher: bool,
    /// Answer without a voucher.
    pub omit_voucher: bool,
    /// Name a responder credential nobody can resolve.
    pub unknown_credential: bool,
    /// Corrupt MAC_2.
    pub forge_mac_2: bool,
    /// Send a copy of message 2 to this address before the real one.
    pub foreign_frame_first: Option<u64>,
    /// Reply to message 1 with an advertisement.
    pub wrong_reply_type: bool,
    /// Never reply.
    pub silent: bool,
}

/// Why the gateway refused a frame.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Ake(#[from] AkeError),

    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("device {0} is not enrolled")]
    NotEnrolled(String),

    #[error("unknown initiator credential {0}")]
    UnknownInitiator(String),

    #[error("message_3 for connection {got}, expected {expected}")]
    WrongConnId { expected: ConnId, got: ConnId },

    #[error("message_3 failed authentication")]
    Message3Rejected,
}

struct Pending {
    c_r: ConnId,
    ephemeral: DhSecret,
    th_3: [u8; 32],
    prk_3e2m: Prk,
}

/// Responder and enrollment server behind one gateway address.
pub struct SimulatedGateway {
    address: u64,
    responder: DhSecret,
    responder_credential: RpkCredential,
    enrollment: DhSecret,
    enrolled: HashSet<Vec<u8>>,
    initiators: HashMap<Vec<u8>, RpkCredential>,
    faults: GatewayFaults,
    next_c_r: u8,
    pending: HashMap<u64, Pending>,
    established: Vec<(u64, KeyMaterial)>,
    advertised: Vec<u64>,
    rejected: Vec<(u64, GatewayError)>,
}

impl SimulatedGateway {
    pub fn new(
        responder: DhSecret,
        responder_kid: Vec<u8>,
        enrollment: DhSecret,
    ) -> Result<Self, GatewayError> {
        let responder_credential = RpkCredential::for_secret(responder_kid, &responder)?;
        Ok(Self {
            address: GATEWAY_ADDRESS_DEFAULT,
            responder,
            responder_credential,
            enrollment,
            enrolled: HashSet::new(),
            initiators: HashMap::new(),
            faults: GatewayFaults::default(),
            next_c_r: 0x27,
            pending: HashMap::new(),
            established: Vec::new(),
            advertised: Vec::new(),
            rejected: Vec::new(),
        })
    }

    pub fn with_faults(mut self, faults: GatewayFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn set_faults(&mut self, faults: GatewayFaults) {
        self.faults = faults;
    }

    /// Authorize `identity` and learn its credential.
    pub fn enroll(&mut self, identity: &Identity) -> Result<(), GatewayError> {
        let credential = RpkCredential::parse(identity.credential())?;
        self.initiators.insert(credential.kid().to_vec(), credential);
        self.enrolled.insert(identity.id().as_bytes().to_vec());
        Ok(())
    }

    /// G_W, the key devices encrypt their enrollment request to.
    pub fn enrollment_public_key(&self) -> [u8; X25519_LEN] {
        self.enrollment.public_key()
    }

    pub fn responder_credential(&self) -> &RpkCredential {
        &self.responder_credential
    }

    /// Session keys of completed handshakes, by initiator address.
    pub fn established(&self) -> &[(u64, KeyMaterial)] {
        &self.established
    }

    pub fn key_for(&self, address: u64) -> Option<&KeyMaterial> {
        self.established
            .iter()
            .find(|(source, _)| *source == address)
            .map(|(_, key)| key)
    }

    /// Sources of advertisements received, in order.
    pub fn advertised(&self) -> &[u64] {
        &self.advertised
    }

    pub fn rejected(&self) -> &[(u64, GatewayError)] {
        &self.rejected
    }

    pub fn into_shared(self) -> SharedGateway {
        SharedGateway(Arc::new(Mutex::new(self)))
    }

    /// Consume one written frame and return the frames to send back.
    pub fn handle(&mut self, written: &[u8]) -> Vec<Vec<u8>> {
        let message = match decode_frame(written) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "gateway could not decode frame");
                self.rejected.push((0, e));
                return Vec::new();
            }
        };

        let source = message.header.source;
        if message.header.destination != self.address {
            debug!(
                source = format_args!("{source:#x}"),
                destination = format_args!("{:#x}", message.header.destination),
                "ignoring frame for another node"
            );
            return Vec::new();
        }

        let result = match message.payload {
            Payload::Advertisement => {
                debug!(source = format_args!("{source:#x}"), "advertisement received");
                self.advertised.push(source);
                Ok(Vec::new())
            }
            Payload::EdhocMessage(body) => match self.pending.remove(&source) {
                Some(pending) => self.on_message_3(source, pending, &body).map(|()| Vec::new()),
                None => self.on_message_1(&message.header, &body),
            },
        };

        result.unwrap_or_else(|e| {
            warn!(source = format_args!("{source:#x}"), error = %e, "gateway rejected message");
            self.rejected.push((source, e));
            Vec::new()
        })
    }

    fn on_message_1(&mut self, header: &Header, body: &[u8]) -> Result<Vec<Vec<u8>>, GatewayError> {
        if self.faults.silent {
            return Ok(Vec::new());
        }

        let message_1 = Message1::decode(body)?;
        let h_message_1 = TranscriptHash(sha256(body));
        let cred_r = self.responder_credential.to_credential();
        let ead_2 = self.voucher_for(&message_1, &h_message_1, &cred_r)?;

        let ephemeral = DhSecret::generate()?;
        let g_y = ephemeral.public_key();
        let th_2 = schedule::th_2(&g_y, &h_message_1);
        let prk_2e = schedule::prk_2e(&th_2, &ephemeral.agree(&message_1.g_x));
        let prk_3e2m = schedule::prk_3e2m(&prk_2e, &self.responder.agree(&message_1.g_x));

        let c_r = ConnId(self.next_c_r);
        self.next_c_r = self.next_c_r.wrapping_add(1);
        let id_cred_r = if self.faults.unknown_credential {
            CredentialRef::new(vec![0xee])
        } else {
            self.responder_credential.reference()
        };

        let ead_2_bytes = EadItem::encode_optional(ead_2.as_ref())?;
        let mut mac_2 = schedule::mac_2(
            &prk_3e2m,
            &th_2,
            c_r,
            &id_cred_r,
            cred_r.as_bytes(),
            &ead_2_bytes,
        );
        if self.faults.forge_mac_2 {
            mac_2[0] ^= 0xff;
        }

        let plaintext_2 = Plaintext2 {
            c_r,
            id_cred_r,
            ead_2,
            mac_2,
        }
        .encode()?;
        let keystream = schedule::keystream_2(&prk_2e, &th_2, plaintext_2.len())?;

        let mut message_2 = Vec::with_capacity(X25519_LEN + plaintext_2.len());
        message_2.extend_from_slice(&g_y);
        message_2.extend_from_slice(&plaintext_2);
        schedule::xor_keystream(&mut message_2[X25519_LEN..], &keystream);

        self.pending.insert(
            header.source,
            Pending {
                c_r,
                ephemeral,
                th_3: schedule::th_3(&th_2, &plaintext_2, cred_r.as_bytes()),
                prk_3e2m,
            },
        );

        let reply = header.reply();
        let mut frames = Vec::with_capacity(2);
        if let Some(other) = self.faults.foreign_frame_first {
            let decoy = Header {
                destination: other,
                ..reply
            };
            frames.push(encode_frame(Message::edhoc(decoy, message_2.clone())));
        }
        let payload = if self.faults.wrong_reply_type {
            Payload::Advertisement
        } else {
            Payload::EdhocMessage(message_2.into())
        };
        frames.push(encode_frame(Message::new(reply, payload)));

        debug!(source = format_args!("{:#x}", header.source), c_r = %c_r, "answered message_1");
        Ok(frames)
    }

    fn voucher_for(
        &self,
        message_1: &Message1,
        h_message_1: &TranscriptHash,
        cred_r: &Credential,
    ) -> Result<Option<EadItem>, GatewayError> {
        if self.faults.omit_voucher {
            return Ok(None);
        }
        let Some(ead_1) = message_1.ead_1.as_ref().filter(|e| e.label == EAD_AUTHZ_LABEL) else {
            return Ok(None);
        };

        let request = EnrollmentRequest::decode(&ead_1.value)?;
        let prk = enrollment_prk(&EphemeralSecret::new(self.enrollment.agree(&message_1.g_x)));
        let id_u = decrypt_id(&prk, message_1.suite, &request.encrypted_id)?;
        if !self.enrolled.contains(&id_u) {
            return Err(GatewayError::NotEnrolled(hex::encode(&id_u)));
        }

        let mut tag = voucher(&prk, h_message_1, cred_r);
        if self.faults.tamper_voucher {
            tag[0] ^= 0x01;
        }
        debug!(device = %hex::encode(&id_u), location = %request.location, "voucher issued");
        Ok(Some(EadItem::new(EAD_AUTHZ_LABEL, true, tag.to_vec())))
    }

    fn on_message_3(
        &mut self,
        source: u64,
        pending: Pending,
        body: &[u8],
    ) -> Result<(), GatewayError> {
        let Some((&c_r, ciphertext_3)) = body.split_first() else {
            return Err(AkeError::Malformed("empty message_3".into()).into());
        };
        if c_r != pending.c_r.0 {
            return Err(GatewayError::WrongConnId {
                expected: pending.c_r,
                got: ConnId(c_r),
            });
        }

        let (k_3, iv_3) = schedule::key_iv_3(&pending.prk_3e2m, &pending.th_3)?;
        let plaintext_3 = open(&k_3, &iv_3, &pending.th_3, ciphertext_3)
            .map_err(|_| GatewayError::Message3Rejected)?;
        let fields = Plaintext3::decode(&plaintext_3)?;

        let initiator = match fields.transfer {
            CredentialTransfer::ByReference => self
                .initiators
                .get(&fields.id_cred_i)
                .cloned()
                .ok_or_else(|| GatewayError::UnknownInitiator(hex::encode(&fields.id_cred_i)))?,
            CredentialTransfer::ByValue => {
                RpkCredential::parse(&Credential::new(fields.id_cred_i.clone()))?
            }
        };
        let cred_i = initiator.to_credential();

        let g_iy = pending.ephemeral.agree(initiator.public_key());
        let prk_4e3m = schedule::prk_4e3m(&pending.prk_3e2m, &g_iy);
        let ead_3 = EadItem::encode_optional(fields.ead_3.as_ref())?;
        let expected = schedule::mac_3(
            &prk_4e3m,
            &pending.th_3,
            &fields.id_cred_i,
            cred_i.as_bytes(),
            &ead_3,
        );
        if !tag_matches(&expected, &fields.mac_3) {
            return Err(GatewayError::Message3Rejected);
        }

        let th_4 = schedule::th_4(&pending.th_3, &plaintext_3, cred_i.as_bytes());
        let key_material = schedule::prk_out(&prk_4e3m, &th_4)?;
        info!(source = format_args!("{source:#x}"), "gateway completed handshake");
        self.established.push((source, key_material));
        Ok(())
    }
}

fn decode_frame(frame: &[u8]) -> Result<Message, GatewayError> {
    let payload = hdlc::decode(frame)?;
    Ok(Message::from_bytes(&payload)?)
}

fn encode_frame(message: Message) -> Vec<u8> {
    hdlc::encode(&message.to_bytes())
}

/// A gateway shared between a mock transport and the test inspecting it.
#[derive(Clone)]
pub struct SharedGateway(Arc<Mutex<SimulatedGateway>>);

impl SharedGateway {
    pub fn lock(&self) -> MutexGuard<'_, SimulatedGateway> {
        self.0.lock()
    }

    /// Responder callback for [`dotlink_transport::MockTransport::with_responder`].
    pub fn responder(&self) -> impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static {
        let gateway = self.clone();
        move |written| gateway.lock().handle(written)
    }
}

// ============================================================================
// Demo deployment
// ============================================================================

/// Deterministic identity `a10441NN` with an X25519 credential keyed by its id.
pub fn demo_identity(index: u8) -> Result<Identity, GatewayError> {
    let id = DeviceId::new(vec![0xa1, 0x04, 0x41, index])?;
    let secret = sha256_parts(&[b"dotlink-demo-identity".as_slice(), id.as_bytes()]);
    let credential = RpkCredential::for_secret(id.as_bytes(), &DhSecret::from_bytes(secret))?;
    Ok(Identity::new(
        id,
        PrivateKey::new(secret.to_vec()),
        credential.to_credential(),
    ))
}

/// Everything needed to run `count` robots against a simulated gateway.
pub struct DemoDeployment {
    pub peer: PeerReference,
    pub identities: Vec<Identity>,
    pub resolver: StaticResolver,
    pub gateway: SimulatedGateway,
}

/// Identities `a1044101..=a10441{count}`, all enrolled.
pub fn demo_deployment(count: u8) -> Result<DemoDeployment, GatewayError> {
    let responder = DhSecret::from_bytes(sha256(b"dotlink-demo-responder"));
    let enrollment = DhSecret::from_bytes(sha256(b"dotlink-demo-enrollment"));
    let mut gateway = SimulatedGateway::new(responder, vec![DEMO_RESPONDER_KID], enrollment)?;

    let identities = (1..=count).map(demo_identity).collect::<Result<Vec<_>, _>>()?;
    for identity in &identities {
        gateway.enroll(identity)?;
    }

    Ok(DemoDeployment {
        peer: PeerReference {
            gateway_public_key: gateway.enrollment_public_key(),
            location: DEMO_LOCATION.to_owned(),
        },
        identities,
        resolver: StaticResolver::new().with_rpk(gateway.responder_credential()),
        gateway,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ake::{AkeInitiator, AuthzDevice};
    use crate::soft::{SoftAuthzDevice, SoftInitiator};

    #[test]
    fn test_demo_identities_match_addresses() {
        let identity = demo_identity(3).unwrap();
        assert_eq!(identity.id().to_string(), "a1044103");
        assert_eq!(identity.address(), 0xa104_4103);
        assert!(RpkCredential::parse(identity.credential()).is_ok());
    }

    #[test]
    fn test_garbage_is_recorded_not_answered() {
        let mut demo = demo_deployment(1).unwrap();
        assert!(demo.gateway.handle(&[0x01, 0x02]).is_empty());
        assert_eq!(demo.gateway.rejected().len(), 1);
    }

    #[test]
    fn test_frames_for_other_nodes_are_ignored() {
        let mut demo = demo_deployment(1).unwrap();
        let header = Header {
            destination: 0xdead_beef,
            ..Header::to_gateway(0xa104_4101)
        };
        let frame = encode_frame(Message::edhoc(header, vec![0x01]));

        assert!(demo.gateway.handle(&frame).is_empty());
        assert!(demo.gateway.rejected().is_empty());
    }

    #[test]
    fn test_message_1_answered_to_sender_with_voucher() {
        let mut demo = demo_deployment(1).unwrap();
        let identity = &demo.identities[0];

        let mut engine = SoftInitiator::new().unwrap();
        let mut device = SoftAuthzDevice::new(identity.id().as_bytes(), DEMO_LOCATION);
        let secret = engine
            .compute_ephemeral_secret(&demo.peer.gateway_public_key)
            .unwrap();
        let ead_1 = device.prepare_ead_1(&secret, engine.selected_cipher_suite()).unwrap();
        let message_1 = engine.prepare_message_1(None, Some(ead_1)).unwrap();

        let frame = encode_frame(Message::edhoc(Header::to_gateway(identity.address()), message_1));
        let replies = demo.gateway.handle(&frame);

        assert_eq!(replies.len(), 1);
        let reply = decode_frame(&replies[0]).unwrap();
        assert_eq!(reply.header.destination, identity.address());
        let Payload::EdhocMessage(message_2) = reply.payload else {
            panic!("expected message_2");
        };
        let parsed = engine.parse_message_2(&message_2).unwrap();
        assert!(parsed.ead_2.is_some());
        assert_eq!(parsed.id_cred_r, demo.gateway.responder_credential().reference());
    }

    #[test]
    fn test_unenrolled_device_gets_no_reply() {
        let mut demo = demo_deployment(1).unwrap();
        let stranger = demo_identity(9).unwrap();

        let mut engine = SoftInitiator::new().unwrap();
        let mut device = SoftAuthzDevice::new(stranger.id().as_bytes(), DEMO_LOCATION);
        let secret = engine.compute_ephemeral_secret(&demo.peer.gateway_public_key).unwrap();
        let ead_1 = device.prepare_ead_1(&secret, engine.selected_cipher_suite()).unwrap();
        let message_1 = engine.prepare_message_1(None, Some(ead_1)).unwrap();

        let frame = encode_frame(Message::edhoc(Header::to_gateway(stranger.address()), message_1));
        assert!(demo.gateway.handle(&frame).is_empty());
        assert!(matches!(
            demo.gateway.rejected(),
            [(_, GatewayError::NotEnrolled(_))]
        ));
    }
}
