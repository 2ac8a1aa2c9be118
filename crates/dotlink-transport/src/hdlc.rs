//! HDLC-style byte stuffing for delimiting messages on a byte stream.
//!
//! Frame format: `FLAG || stuffed payload || FLAG`. Any payload byte equal to
//! `FLAG` or `ESCAPE` is written as `ESCAPE, byte ^ 0x20`, so a frame never
//! contains a bare `FLAG` except at its two boundaries.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tracing::trace;

/// Frame delimiter.
pub const HDLC_FLAG: u8 = 0x7E;

/// Escape marker preceding a stuffed byte.
pub const HDLC_ESCAPE: u8 = 0x7D;

/// Value XOR-ed into a stuffed byte.
pub const HDLC_ESCAPE_XOR: u8 = 0x20;

/// Default upper bound for an encoded frame on the serial link.
pub const MAX_FRAME_LEN: usize = 1024;

/// Framing error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: {0} bytes")]
    Truncated(usize),

    #[error("frame does not start with a flag byte")]
    MissingStartFlag,

    #[error("frame is not terminated by a flag byte")]
    MissingEndFlag,

    #[error("unescaped flag byte inside frame at offset {0}")]
    UnexpectedFlag(usize),

    #[error("invalid escape sequence 0x7d 0x{0:02x}")]
    InvalidEscape(u8),

    #[error("frame ends in the middle of an escape sequence")]
    DanglingEscape,

    #[error("frame too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),
}

/// Wrap `payload` into a single frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + payload.len() / 8 + 2);
    frame.push(HDLC_FLAG);
    for &byte in payload {
        if byte == HDLC_FLAG || byte == HDLC_ESCAPE {
            frame.push(HDLC_ESCAPE);
            frame.push(byte ^ HDLC_ESCAPE_XOR);
        } else {
            frame.push(byte);
        }
    }
    frame.push(HDLC_FLAG);
    frame
}

/// Recover the payload of exactly one frame.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, FrameError> {
    if frame.len() < 2 {
        return Err(FrameError::Truncated(frame.len()));
    }
    if frame[0] != HDLC_FLAG {
        return Err(FrameError::MissingStartFlag);
    }
    if frame[frame.len() - 1] != HDLC_FLAG {
        return Err(FrameError::MissingEndFlag);
    }

    let body = &frame[1..frame.len() - 1];
    let mut payload = Vec::with_capacity(body.len());
    let mut bytes = body.iter().enumerate();

    while let Some((offset, &byte)) = bytes.next() {
        match byte {
            HDLC_FLAG => return Err(FrameError::UnexpectedFlag(offset + 1)),
            HDLC_ESCAPE => {
                let (_, &stuffed) = bytes.next().ok_or(FrameError::DanglingEscape)?;
                let value = stuffed ^ HDLC_ESCAPE_XOR;
                if value != HDLC_FLAG && value != HDLC_ESCAPE {
                    return Err(FrameError::InvalidEscape(stuffed));
                }
                payload.push(value);
            }
            _ => payload.push(byte),
        }
    }

    Ok(payload)
}

/// Streaming decoder for partial reads.
///
/// Bytes are appended as they arrive; complete frames are handed out one at a
/// time. Bytes before the first flag are dropped, and back-to-back flags are
/// treated as the end of one frame followed by the start of the next.
#[derive(Debug)]
pub struct HdlcDecoder {
    buf: BytesMut,
    max_frame_len: usize,
}

impl HdlcDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            max_frame_len,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns Some(payload) when a complete frame is available, None if more data needed.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            let Some(start) = self.buf.iter().position(|&b| b == HDLC_FLAG) else {
                if !self.buf.is_empty() {
                    trace!(discarded = self.buf.len(), "dropping bytes outside a frame");
                    self.buf.clear();
                }
                return Ok(None);
            };
            if start > 0 {
                trace!(discarded = start, "dropping bytes before start flag");
                self.buf.advance(start);
            }

            let Some(end) = self.buf[1..].iter().position(|&b| b == HDLC_FLAG).map(|p| p + 1)
            else {
                if self.buf.len() > self.max_frame_len {
                    let len = self.buf.len();
                    self.buf.clear();
                    return Err(FrameError::TooLarge(len, self.max_frame_len));
                }
                return Ok(None);
            };

            if end == 1 {
                // Closing flag of the previous frame directly followed by an opening flag.
                self.buf.advance(1);
                continue;
            }

            let frame = self.buf.split_to(end + 1);
            if frame.len() > self.max_frame_len {
                return Err(FrameError::TooLarge(frame.len(), self.max_frame_len));
            }
            return decode(&frame).map(Some);
        }
    }
}

impl Default for HdlcDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_plain_payload() {
        assert_eq!(encode(b"abc"), vec![0x7e, b'a', b'b', b'c', 0x7e]);
    }

    #[test]
    fn test_encode_escapes_flag_and_escape() {
        assert_eq!(
            encode(&[0x01, 0x7e, 0x7d, 0x02]),
            vec![0x7e, 0x01, 0x7d, 0x5e, 0x7d, 0x5d, 0x02, 0x7e]
        );
    }

    #[test]
    fn test_empty_payload() {
        let frame = encode(&[]);
        assert_eq!(frame, vec![0x7e, 0x7e]);
        assert_eq!(decode(&frame).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(&[0x7e]), Err(FrameError::Truncated(1)));
        assert_eq!(decode(&[0x01, 0x02, 0x7e]), Err(FrameError::MissingStartFlag));
        assert_eq!(decode(&[0x7e, 0x01, 0x02]), Err(FrameError::MissingEndFlag));
        assert_eq!(decode(&[0x7e, 0x01, 0x7e, 0x02, 0x7e]), Err(FrameError::UnexpectedFlag(2)));
        assert_eq!(decode(&[0x7e, 0x7d, 0x41, 0x7e]), Err(FrameError::InvalidEscape(0x41)));
        assert_eq!(decode(&[0x7e, 0x01, 0x7d, 0x7e]), Err(FrameError::DanglingEscape));
    }

    #[test]
    fn test_streaming_decoder_partial_reads() {
        let frame = encode(&[0x10, 0x7e, 0x20]);
        let mut decoder = HdlcDecoder::default();

        decoder.extend(&frame[..3]);
        assert_eq!(decoder.next_frame().unwrap(), None);

        decoder.extend(&frame[3..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(vec![0x10, 0x7e, 0x20]));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_streaming_decoder_back_to_back_frames() {
        let mut stream = encode(b"one");
        stream.extend(encode(b"two"));
        let mut decoder = HdlcDecoder::default();
        decoder.extend(&stream);

        assert_eq!(decoder.next_frame().unwrap(), Some(b"one".to_vec()));
        assert_eq!(decoder.next_frame().unwrap(), Some(b"two".to_vec()));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_streaming_decoder_skips_line_noise() {
        let mut stream = vec![0x00, 0x55, 0xaa];
        stream.extend(encode(b"payload"));
        let mut decoder = HdlcDecoder::default();
        decoder.extend(&stream);

        assert_eq!(decoder.next_frame().unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_streaming_decoder_recovers_after_bad_frame() {
        let mut stream = vec![0x7e, 0x7d, 0x41, 0x7e];
        stream.extend(encode(b"ok"));
        let mut decoder = HdlcDecoder::default();
        decoder.extend(&stream);

        assert_eq!(decoder.next_frame(), Err(FrameError::InvalidEscape(0x41)));
        assert_eq!(decoder.next_frame().unwrap(), Some(b"ok".to_vec()));
    }

    #[test]
    fn test_streaming_decoder_limits_frame_size() {
        let mut decoder = HdlcDecoder::new(8);
        decoder.extend(&[0x7e, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decoder.next_frame(), Err(FrameError::TooLarge(9, 8)));
        assert_eq!(decoder.buffered(), 0);
    }

    proptest! {
        #[test]
        fn prop_framing_round_trip(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let frame = encode(&data);
            prop_assert!(!frame[1..frame.len() - 1].contains(&HDLC_FLAG));
            prop_assert_eq!(decode(&frame)?, data);
        }

        #[test]
        fn prop_round_trip_with_dense_delimiters(
            data in prop::collection::vec(
                prop_oneof![Just(HDLC_FLAG), Just(HDLC_ESCAPE), any::<u8>()],
                0..128,
            )
        ) {
            prop_assert_eq!(decode(&encode(&data))?, data);
        }

        #[test]
        fn prop_streaming_any_chunking(
            frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..6),
            chunk in 1usize..16,
        ) {
            let stream: Vec<u8> = frames.iter().flat_map(|f| encode(f)).collect();
            let mut decoder = HdlcDecoder::default();
            let mut out = Vec::new();
            for piece in stream.chunks(chunk) {
                decoder.extend(piece);
                while let Some(frame) = decoder.next_frame()? {
                    out.push(frame);
                }
            }
            prop_assert_eq!(out, frames);
        }
    }
}
