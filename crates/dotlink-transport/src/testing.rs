//! Testing utilities for transport consumers.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::traits::{Transport, TransportError};

/// Callback invoked with every written buffer; returns byte chunks to queue
/// for subsequent reads.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// A buffer written to the mock, with the (tokio) time it was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Written {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

/// Mock transport for testing
///
/// Reads are served from an inbound queue. When the queue is empty a read
/// sleeps for its full timeout and returns nothing, like a quiet serial line.
pub struct MockTransport {
    written: Vec<Written>,
    inbound: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    chunk_size: Option<usize>,
    read_calls: usize,
    closed: bool,
    /// Writes still allowed before every write fails.
    write_budget: Option<usize>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            inbound: VecDeque::new(),
            responder: None,
            chunk_size: None,
            read_calls: 0,
            closed: false,
            write_budget: None,
        }
    }

    /// Answer every write through `responder`.
    pub fn with_responder(
        mut self,
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Split every injected buffer into chunks of at most `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Inject bytes to the receive queue
    pub fn inject(&mut self, bytes: Vec<u8>) {
        match self.chunk_size {
            Some(size) => self
                .inbound
                .extend(bytes.chunks(size).map(<[u8]>::to_vec)),
            None => self.inbound.push_back(bytes),
        }
    }

    /// Everything written so far, in order.
    pub fn written(&self) -> &[Written] {
        &self.written
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls
    }

    /// Reads fail with [`TransportError::Closed`] once the queue drains.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&mut self) {
        self.write_budget = Some(0);
    }

    /// Let `count` more writes through, then fail every one after.
    pub fn fail_writes_after(&mut self, count: usize) {
        self.write_budget = Some(count);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.write_budget.as_mut() {
            Some(0) => {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "mock write failure",
                )));
            }
            Some(remaining) => *remaining -= 1,
            None => {}
        }

        self.written.push(Written {
            at: Instant::now(),
            bytes: bytes.to_vec(),
        });

        let replies = match self.responder.as_mut() {
            Some(responder) => responder(bytes),
            None => Vec::new(),
        };
        for reply in replies {
            self.inject(reply);
        }
        Ok(())
    }

    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.read_calls += 1;

        if let Some(mut chunk) = self.inbound.pop_front() {
            if chunk.len() > max_len {
                let rest = chunk.split_off(max_len);
                self.inbound.push_front(rest);
            }
            return Ok(chunk);
        }

        if self.closed {
            return Err(TransportError::Closed);
        }

        sleep(timeout).await;
        Ok(Vec::new())
    }
}
