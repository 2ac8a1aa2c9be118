//! Byte-stream transport used by the handshake.

use std::io;
use std::time::Duration;

use async_trait::async_trait;

/// Blocking-style byte transport with a caller supplied read timeout.
///
/// One handshake owns the transport at a time; implementations need no
/// internal locking.
#[async_trait]
pub trait Transport: Send {
    /// Write all of `bytes` to the stream.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read at most `max_len` bytes, waiting no longer than `timeout`.
    ///
    /// Returns an empty buffer when the timeout expires without data.
    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// Common transport error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("transport closed by peer")]
    Closed,
}
