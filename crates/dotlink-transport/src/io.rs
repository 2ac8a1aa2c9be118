//! [`Transport`] over any tokio byte stream (serial device, pty, pipe).

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::traits::{Transport, TransportError};

/// Transport built from separate read and write halves.
///
/// Serial devices opened as files should be given two handles so that a
/// pending read never holds up a write.
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> StreamTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; max_len];
        match tokio::time::timeout(timeout, self.reader.read(&mut buf)).await {
            Err(_elapsed) => Ok(Vec::new()),
            Ok(Ok(0)) if max_len > 0 => Err(TransportError::Closed),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e))
                if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
            {
                Ok(Vec::new())
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split};

    #[tokio::test]
    async fn test_write_then_read_across_duplex() {
        let (a, b) = duplex(64);
        let (ra, wa) = split(a);
        let (rb, wb) = split(b);
        let mut left = StreamTransport::new(ra, wa);
        let mut right = StreamTransport::new(rb, wb);

        left.write(b"hello").await.unwrap();
        let got = right.read(64, Duration::from_secs(1)).await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn test_read_respects_max_len() {
        let (a, b) = duplex(64);
        let (ra, wa) = split(a);
        let (rb, wb) = split(b);
        let mut left = StreamTransport::new(ra, wa);
        let mut right = StreamTransport::new(rb, wb);

        left.write(b"0123456789").await.unwrap();
        assert_eq!(right.read(4, Duration::from_secs(1)).await.unwrap(), b"0123");
        assert_eq!(right.read(64, Duration::from_secs(1)).await.unwrap(), b"456789");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_returns_empty() {
        let (_a, b) = duplex(64);
        let (rb, wb) = split(b);
        let mut transport = StreamTransport::new(rb, wb);

        let got = transport.read(64, Duration::from_millis(500)).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_read_after_peer_drop_is_closed() {
        let (a, b) = duplex(64);
        drop(a);
        let (rb, wb) = split(b);
        let mut transport = StreamTransport::new(rb, wb);

        let err = transport.read(64, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
