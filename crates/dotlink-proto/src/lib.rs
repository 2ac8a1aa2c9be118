//! Wire messages exchanged between a DotBot gateway and its robots.
//!
//! A message is a fixed 20-byte header followed by a one-byte payload type
//! and the payload body:
//!
//! ```text
//! destination (u64 LE) | source (u64 LE) | swarm_id (u16 LE) | application (u8) | version (u8)
//! payload_type (u8) | body...
//! ```
//!
//! The field widths, byte order and tag values are a contract shared with the
//! gateway firmware. They live in this crate only.

#![forbid(unsafe_code)]

pub mod header;
pub mod message;

#[cfg(test)]
mod proptests;

pub use header::*;
pub use message::*;

/// Protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 8;

/// Address of the gateway when none is configured.
pub const GATEWAY_ADDRESS_DEFAULT: u64 = 0x0000_0000_0000_0000;

/// Swarm identifier when none is configured.
pub const SWARM_ID_DEFAULT: u16 = 0x0000;
