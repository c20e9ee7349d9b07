//! Record-separator framing for JSON hub messages
//!
//! Every frame is one JSON document followed by `0x1E`. Stream reads can split or
//! coalesce frames arbitrarily, so inbound bytes go through [`FrameDecoder`].

use crate::error::Result;

use serde::Serialize;

/// Terminates every frame
pub const RECORD_SEPARATOR: u8 = 0x1e;

/// Upper bound for a single buffered frame
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Serialize `message` and append the record separator
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(RECORD_SEPARATOR);
    Ok(bytes)
}

/// Reassembles frames from a byte stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, without its separator
    ///
    /// Empty frames are skipped.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let end = self.buffer.iter().position(|b| *b == RECORD_SEPARATOR)?;
            let mut frame: Vec<u8> = self.buffer.drain(..=end).collect();
            frame.pop();
            if !frame.is_empty() {
                return Some(frame);
            }
        }
    }

    /// Bytes waiting for their separator
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the partial frame has grown past [`MAX_FRAME_LEN`]
    pub fn is_overflowing(&self) -> bool {
        self.buffer.len() > MAX_FRAME_LEN
    }
}
