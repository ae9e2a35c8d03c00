/// Newline Framing
///
/// Every message on the wire is one line of compact JSON. Serialized JSON
/// never contains a raw newline (newlines inside strings are escaped), so
/// the newline byte is an unambiguous frame delimiter.
///
/// `LineCodec` is an immutable configuration shared by both directions of a
/// connection; `FrameDecoder` owns the receive buffer of one reader.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::core::error::TransportError;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const DELIMITER: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCodec {
    max_frame_bytes: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl LineCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Serialize `message` into one delimited frame.
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<Bytes, TransportError> {
        let mut writer = BytesMut::new().writer();
        serde_json::to_writer(&mut writer, message)?;
        let mut frame = writer.into_inner();
        if frame.len() > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }
        frame.put_u8(DELIMITER);
        Ok(frame.freeze())
    }

    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder {
            codec: *self,
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
            discarding: false,
        }
    }
}

/// Accumulates raw bytes and yields complete frames.
#[derive(Debug)]
pub struct FrameDecoder {
    codec: LineCodec,
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no delimiter.
    scanned: usize,
    /// Set while skipping the remainder of an oversized frame.
    discarding: bool,
}

impl FrameDecoder {
    /// Buffer the reader appends freshly received bytes to.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Next complete frame, without its delimiter, or `None` when more
    /// bytes are needed. An oversized frame is reported once, after its
    /// delimiter has been consumed, so the stream stays aligned.
    pub fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            let found = self.buffer[self.scanned..]
                .iter()
                .position(|&byte| byte == DELIMITER);

            let Some(offset) = found else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > self.codec.max_frame_bytes {
                    self.buffer.clear();
                    self.scanned = 0;
                    self.discarding = true;
                }
                return None;
            };

            let end = self.scanned + offset;
            let mut line = self.buffer.split_to(end + 1);
            self.scanned = 0;
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            if std::mem::take(&mut self.discarding) || line.len() > self.codec.max_frame_bytes {
                return Some(Err(TransportError::FrameTooLarge {
                    limit: self.codec.max_frame_bytes,
                }));
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(Ok(line.freeze()));
        }
    }

    /// Bytes buffered after the last delimiter.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// Whether an unterminated frame is pending. At end-of-stream such a
    /// frame is incomplete and gets discarded.
    pub fn has_partial_frame(&self) -> bool {
        self.discarding || self.buffer.iter().any(|byte| !byte.is_ascii_whitespace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(decoder: &mut FrameDecoder, bytes: &[u8]) {
        decoder.buffer_mut().extend_from_slice(bytes);
    }

    #[test]
    fn encode_appends_single_delimiter() {
        let frame = LineCodec::default()
            .encode(&json!({"text": "line one\nline two"}))
            .unwrap();
        assert_eq!(frame.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(frame.last(), Some(&b'\n'));
    }

    #[test]
    fn frames_split_across_reads_are_reassembled() {
        let mut decoder = LineCodec::default().decoder();
        feed(&mut decoder, b"{\"a\":");
        assert!(decoder.next_frame().is_none());
        feed(&mut decoder, b"1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], b"{\"a\":1}");
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], b"{\"b\":2}");
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.remaining(), 4);
    }

    #[test]
    fn blank_lines_and_carriage_returns_are_ignored() {
        let mut decoder = LineCodec::default().decoder();
        feed(&mut decoder, b"\n  \r\n{\"x\":true}\r\n");
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], b"{\"x\":true}");
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn oversized_frame_is_reported_once_and_skipped() {
        let mut decoder = LineCodec::new(8).decoder();
        feed(&mut decoder, b"0123456789");
        assert!(decoder.next_frame().is_none());
        feed(&mut decoder, b"abcdef\n{\"ok\":1}\n");
        assert!(matches!(
            decoder.next_frame(),
            Some(Err(TransportError::FrameTooLarge { limit: 8 }))
        ));
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], b"{\"ok\":1}");
    }

    #[test]
    fn oversized_complete_frame_is_rejected() {
        let mut decoder = LineCodec::new(4).decoder();
        feed(&mut decoder, b"123456\n");
        assert!(matches!(
            decoder.next_frame(),
            Some(Err(TransportError::FrameTooLarge { .. }))
        ));
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn encode_rejects_oversized_messages() {
        let err = LineCodec::new(4).encode(&json!("too long")).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { limit: 4 }));
    }
}
