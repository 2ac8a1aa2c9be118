//! dotlink-initiator - run DotBot handshakes from the command line
//!
//! This crate provides:
//! - A deployment file format naming the serial port, the enrollment server
//!   and the robot identities to bring up
//! - `run`: one handshake per identity over the serial link, in order
//! - `decode`: offline inspection of captured frames
//! - `demo`: the same flow against an in-process simulated gateway

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod frames;
pub mod output;

pub use cli::Cli;
pub use config::{ConfigError, DeploymentConfig};
pub use output::{OutputFormat, OutputFormatter};

/// Exit codes for CLI operations
///
/// - 0: every handshake completed
/// - 1: general error (config, port, setup)
/// - 2: at least one handshake failed
/// - 3: every failure was a receive timeout
/// - 5: invalid input to `decode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    HandshakeFailed = 2,
    Timeout = 3,
    InvalidInput = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }
}
