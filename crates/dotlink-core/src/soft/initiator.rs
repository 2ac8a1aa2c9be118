//! Software key-exchange initiator.

use std::mem;

use dotlink_crypto::{random_bytes, seal, sha256, tag_matches, DhSecret, X25519_LEN};

use crate::ake::{AkeError, AkeInitiator, ParsedMessage2};
use crate::soft::credential::RpkCredential;
use crate::soft::schedule::{self, Message1, Plaintext2, Plaintext3, Prk, SUITE};
use crate::types::{
    CipherSuite, ConnId, Credential, CredentialTransfer, EadItem, EphemeralSecret, KeyMaterial,
    PrivateKey, TranscriptHash,
};

enum InitiatorState {
    Start,
    WaitMessage2 {
        h_message_1: TranscriptHash,
    },
    Parsed(Box<Parsed2>),
    Verified(Box<Verified2>),
    /// Finished, or poisoned by an earlier error.
    Done,
}

struct Parsed2 {
    g_y: [u8; X25519_LEN],
    th_2: [u8; 32],
    prk_2e: Prk,
    plaintext_2: Vec<u8>,
    fields: Plaintext2,
}

struct Verified2 {
    g_y: [u8; X25519_LEN],
    th_3: [u8; 32],
    prk_3e2m: Prk,
    static_secret: DhSecret,
    cred_i: Credential,
}

/// Initiator engine speaking suite 4 with static Diffie-Hellman authentication.
pub struct SoftInitiator {
    ephemeral: DhSecret,
    g_x: [u8; X25519_LEN],
    c_i: ConnId,
    state: InitiatorState,
}

impl SoftInitiator {
    /// Fresh ephemeral key and a random connection identifier.
    pub fn new() -> Result<Self, AkeError> {
        let ephemeral = DhSecret::generate()?;
        let [c_i] = random_bytes::<1>()?;
        Ok(Self::with_ephemeral(ephemeral, ConnId(c_i)))
    }

    pub fn with_ephemeral(ephemeral: DhSecret, c_i: ConnId) -> Self {
        let g_x = ephemeral.public_key();
        Self {
            ephemeral,
            g_x,
            c_i,
            state: InitiatorState::Start,
        }
    }

    fn take_state(&mut self) -> InitiatorState {
        mem::replace(&mut self.state, InitiatorState::Done)
    }
}

impl AkeInitiator for SoftInitiator {
    fn selected_cipher_suite(&self) -> CipherSuite {
        SUITE
    }

    fn compute_ephemeral_secret(
        &self,
        peer_public_key: &[u8; 32],
    ) -> Result<EphemeralSecret, AkeError> {
        Ok(EphemeralSecret::new(self.ephemeral.agree(peer_public_key)))
    }

    fn prepare_message_1(
        &mut self,
        c_i: Option<ConnId>,
        ead_1: Option<EadItem>,
    ) -> Result<Vec<u8>, AkeError> {
        if !matches!(self.state, InitiatorState::Start) {
            return Err(AkeError::WrongState("message_1 already prepared"));
        }
        if let Some(c_i) = c_i {
            self.c_i = c_i;
        }

        let message_1 = Message1 {
            suite: SUITE,
            g_x: self.g_x,
            c_i: self.c_i,
            ead_1,
        }
        .encode()?;

        self.state = InitiatorState::WaitMessage2 {
            h_message_1: TranscriptHash(sha256(&message_1)),
        };
        Ok(message_1)
    }

    fn h_message_1(&self) -> Result<TranscriptHash, AkeError> {
        match &self.state {
            InitiatorState::WaitMessage2 { h_message_1 } => Ok(*h_message_1),
            _ => Err(AkeError::WrongState("message_1 not prepared")),
        }
    }

    fn local_connection_id(&self) -> Option<ConnId> {
        match self.state {
            InitiatorState::Start => None,
            _ => Some(self.c_i),
        }
    }

    fn parse_message_2(&mut self, message_2: &[u8]) -> Result<ParsedMessage2, AkeError> {
        let InitiatorState::WaitMessage2 { h_message_1 } = self.take_state() else {
            return Err(AkeError::WrongState("not waiting for message_2"));
        };
        if message_2.len() <= X25519_LEN {
            return Err(AkeError::Malformed(format!("message_2 of {} bytes", message_2.len())));
        }

        let (g_y_bytes, ciphertext_2) = message_2.split_at(X25519_LEN);
        let mut g_y = [0u8; X25519_LEN];
        g_y.copy_from_slice(g_y_bytes);

        let th_2 = schedule::th_2(&g_y, &h_message_1);
        let prk_2e = schedule::prk_2e(&th_2, &self.ephemeral.agree(&g_y));
        let keystream = schedule::keystream_2(&prk_2e, &th_2, ciphertext_2.len())?;

        let mut plaintext_2 = ciphertext_2.to_vec();
        schedule::xor_keystream(&mut plaintext_2, &keystream);
        let fields = Plaintext2::decode(&plaintext_2)?;

        let parsed = ParsedMessage2 {
            c_r: fields.c_r,
            id_cred_r: fields.id_cred_r.clone(),
            ead_2: fields.ead_2.clone(),
        };
        self.state = InitiatorState::Parsed(Box::new(Parsed2 {
            g_y,
            th_2,
            prk_2e,
            plaintext_2,
            fields,
        }));
        Ok(parsed)
    }

    fn verify_message_2(
        &mut self,
        private_key: &PrivateKey,
        cred_i: &Credential,
        cred_r: &Credential,
    ) -> Result<(), AkeError> {
        let InitiatorState::Parsed(parsed) = self.take_state() else {
            return Err(AkeError::WrongState("message_2 not parsed"));
        };

        let responder = RpkCredential::parse(cred_r)?;
        if responder.reference() != parsed.fields.id_cred_r {
            return Err(AkeError::VerificationFailed);
        }

        let g_rx = self.ephemeral.agree(responder.public_key());
        let prk_3e2m = schedule::prk_3e2m(&parsed.prk_2e, &g_rx);
        let ead_2 = EadItem::encode_optional(parsed.fields.ead_2.as_ref())?;
        let expected = schedule::mac_2(
            &prk_3e2m,
            &parsed.th_2,
            parsed.fields.c_r,
            &parsed.fields.id_cred_r,
            cred_r.as_bytes(),
            &ead_2,
        );
        if !tag_matches(&expected, &parsed.fields.mac_2) {
            return Err(AkeError::VerificationFailed);
        }

        let static_secret = DhSecret::from_slice(private_key.as_bytes())?;
        if RpkCredential::parse(cred_i)?.public_key() != &static_secret.public_key() {
            return Err(AkeError::InvalidKey("credential does not match private key".into()));
        }

        self.state = InitiatorState::Verified(Box::new(Verified2 {
            g_y: parsed.g_y,
            th_3: schedule::th_3(&parsed.th_2, &parsed.plaintext_2, cred_r.as_bytes()),
            prk_3e2m,
            static_secret,
            cred_i: cred_i.clone(),
        }));
        Ok(())
    }

    fn prepare_message_3(
        &mut self,
        transfer: CredentialTransfer,
        ead_3: Option<EadItem>,
    ) -> Result<(Vec<u8>, KeyMaterial), AkeError> {
        let InitiatorState::Verified(verified) = self.take_state() else {
            return Err(AkeError::WrongState("message_2 not verified"));
        };
        let cred_i = verified.cred_i.as_bytes();

        let prk_4e3m = schedule::prk_4e3m(
            &verified.prk_3e2m,
            &verified.static_secret.agree(&verified.g_y),
        );
        let id_cred_i = match transfer {
            CredentialTransfer::ByReference => {
                RpkCredential::parse(&verified.cred_i)?.kid().to_vec()
            }
            CredentialTransfer::ByValue => cred_i.to_vec(),
        };
        let ead_3_bytes = EadItem::encode_optional(ead_3.as_ref())?;
        let mac_3 = schedule::mac_3(&prk_4e3m, &verified.th_3, &id_cred_i, cred_i, &ead_3_bytes);

        let plaintext_3 = Plaintext3 {
            transfer,
            id_cred_i,
            ead_3,
            mac_3,
        }
        .encode()?;

        let (k_3, iv_3) = schedule::key_iv_3(&verified.prk_3e2m, &verified.th_3)?;
        let message_3 = seal(&k_3, &iv_3, &verified.th_3, &plaintext_3)?;

        let th_4 = schedule::th_4(&verified.th_3, &plaintext_3, cred_i);
        let key_material = schedule::prk_out(&prk_4e3m, &th_4)?;
        Ok((message_3, key_material))
    }
}
