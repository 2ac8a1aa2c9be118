//! Framing and transport abstractions for DotBot serial links.
//!
//! The serial line is a plain byte stream. Messages are delimited with HDLC
//! byte stuffing ([`hdlc`]) and moved through the [`Transport`] trait, which
//! keeps the handshake logic independent of the actual serial driver.

#![forbid(unsafe_code)]

pub mod hdlc;
pub mod io;
pub mod testing;
pub mod traits;

pub use hdlc::*;
pub use io::*;
pub use testing::*;
pub use traits::*;
