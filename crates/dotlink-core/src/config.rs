//! Handshake tuning knobs.

use std::time::Duration;

use dotlink_proto::{ApplicationType, GATEWAY_ADDRESS_DEFAULT, HEADER_LEN, SWARM_ID_DEFAULT};
use dotlink_transport::MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be {requirement}")]
    Invalid {
        field: &'static str,
        requirement: &'static str,
    },
}

/// Pause between sending message 3 and the advertisement, giving the gateway
/// time to finish its side of the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettleDelay(u64);

impl SettleDelay {
    pub const DEFAULT: SettleDelay = SettleDelay(1_000);

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Default for SettleDelay {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What to do with a frame addressed to another device while waiting for a reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignFramePolicy {
    /// Count it, log it and keep waiting.
    #[default]
    Discard,
    /// End the handshake with an address mismatch.
    Fail,
}

/// Per-handshake configuration.
///
/// Every field has a default, so an empty `[handshake]` table is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Destination of outbound frames.
    pub gateway_address: u64,
    pub swarm_id: u16,
    pub application: ApplicationType,
    #[serde(rename = "settle_delay_ms")]
    pub settle_delay: SettleDelay,
    /// Timeout of a single transport read.
    pub read_timeout_ms: u64,
    /// Total time allowed for message 2 to arrive.
    pub receive_deadline_ms: u64,
    /// Optional cap on transport reads while waiting for message 2.
    pub max_read_attempts: Option<u32>,
    /// Bytes requested per transport read.
    pub read_chunk_len: usize,
    pub max_frame_len: usize,
    pub foreign_frames: ForeignFramePolicy,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            gateway_address: GATEWAY_ADDRESS_DEFAULT,
            swarm_id: SWARM_ID_DEFAULT,
            application: ApplicationType::DotBot,
            settle_delay: SettleDelay::DEFAULT,
            read_timeout_ms: 1_000,
            receive_deadline_ms: 30_000,
            max_read_attempts: None,
            read_chunk_len: 256,
            max_frame_len: MAX_FRAME_LEN,
            foreign_frames: ForeignFramePolicy::Discard,
        }
    }
}

impl HandshakeConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn receive_deadline(&self) -> Duration {
        Duration::from_millis(self.receive_deadline_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "read_timeout_ms",
                requirement: "greater than zero",
            });
        }
        if self.receive_deadline_ms < self.read_timeout_ms {
            return Err(ConfigError::Invalid {
                field: "receive_deadline_ms",
                requirement: "at least read_timeout_ms",
            });
        }
        if self.max_read_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_read_attempts",
                requirement: "absent or greater than zero",
            });
        }
        if self.read_chunk_len == 0 {
            return Err(ConfigError::Invalid {
                field: "read_chunk_len",
                requirement: "greater than zero",
            });
        }
        // Flags, header and payload type at minimum.
        if self.max_frame_len < HEADER_LEN + 3 {
            return Err(ConfigError::Invalid {
                field: "max_frame_len",
                requirement: "large enough for a header",
            });
        }
        Ok(())
    }
}
