//! Line codec for the device link
//!
//! Both directions are newline-terminated ASCII text:
//! ```text
//! host -> device:  home\n   x 120\n   y -40\n
//! device -> host:  home done\r\n   x done\r\n   y done\r\n
//! ```
//!
//! The device may add its own chatter; anything that does not contain one of
//! the acknowledgement phrases is ignored by the host.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::{protocol, AckKind, Axis, Directive};

/// Errors that can occur while assembling inbound lines
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Line too long: {0} bytes without a terminator (max: {1})")]
    LineTooLong(usize, usize),
}

/// Encode a directive as one terminated line
pub fn encode(directive: &Directive) -> Bytes {
    Bytes::from(format!("{}\n", directive))
}

/// Recognize an acknowledgement phrase anywhere in a line, ignoring case.
///
/// Phrases are checked in the order home, x, y.
pub fn parse_ack(line: &str) -> Option<AckKind> {
    let line = line.to_ascii_lowercase();

    if line.contains(protocol::HOME_DONE) {
        Some(AckKind::Home)
    } else if line.contains(protocol::X_DONE) {
        Some(AckKind::Axis(Axis::X))
    } else if line.contains(protocol::Y_DONE) {
        Some(AckKind::Axis(Axis::Y))
    } else {
        None
    }
}

/// Reassembles a byte stream into complete lines
#[derive(Debug)]
pub struct LineDecoder {
    buffer: BytesMut,
    max_line_len: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(protocol::MAX_LINE_LEN)
    }
}

impl LineDecoder {
    /// Create a decoder that rejects partial lines longer than `max_line_len`
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_line_len),
            max_line_len,
        }
    }

    /// Add received bytes to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete line, terminator included.
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain every complete
    /// line. An unterminated run longer than the limit is discarded and
    /// reported once.
    pub fn decode_next(&mut self) -> Result<Option<Bytes>, CodecError> {
        if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            return Ok(Some(self.buffer.split_to(pos + 1).freeze()));
        }

        if self.buffer.len() > self.max_line_len {
            let len = self.buffer.len();
            self.buffer.advance(len);
            return Err(CodecError::LineTooLong(len, self.max_line_len));
        }

        Ok(None)
    }

    /// Bytes held for an incomplete line
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
