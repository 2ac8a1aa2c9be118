//! Handshake orchestration for DotBot robots.
//!
//! A robot joins a swarm by running an EDHOC-style authenticated key
//! exchange with its gateway over a serial link, carrying zero-touch
//! authorization data so the gateway can vouch for itself:
//!
//! 1. message 1 with an enrollment request (EAD_1)
//! 2. message 2 with the gateway's voucher (EAD_2)
//! 3. message 3, then an advertisement once the gateway has settled
//!
//! The state machine lives in [`handshake`]. Cryptography sits behind the
//! traits in [`ake`]; [`soft`] provides software implementations and
//! [`harness`] a simulated gateway to run them against.

#![forbid(unsafe_code)]

pub mod ake;
pub mod config;
pub mod errors;
pub mod handshake;
pub mod harness;
pub mod runner;
pub mod soft;
pub mod types;

pub use ake::{
    AkeError, AkeInitiator, AuthzDevice, AuthzError, CredentialResolver, ParsedMessage2,
    ResolveError, VoucherError,
};
pub use config::{ConfigError, ForeignFramePolicy, HandshakeConfig, SettleDelay};
pub use errors::{FailureKind, HandshakeError, HandshakeFailure, Stage};
pub use handshake::{
    check_destination, check_inbound, HandshakeOrchestrator, HandshakeReport, HandshakeState,
};
pub use runner::{run_sequential, IdentityOutcome, SessionFactory};
pub use types::*;
