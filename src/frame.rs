use log::{debug, warn};

use crate::proto::{CRC_DIGITS, CRC_MARKER, PREAMBLE, RECV_BUF_SIZE};

pub type FrameBuf = heapless::Vec<u8, RECV_BUF_SIZE>;

/// Cuts complete frames out of a raw receive byte stream.
///
/// A frame starts at `!` and ends four bytes after the first `#`. Bytes
/// outside a frame (line endings, noise) are discarded, and a `!` inside a
/// partial frame restarts assembly.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: FrameBuf,
    marker_at: Option<usize>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) -> FrameBuf {
        self.marker_at = None;
        core::mem::take(&mut self.buf)
    }

    /// Feed one byte; returns a frame when one completes.
    ///
    /// A frame overflowing the receive buffer is returned as-is so the link
    /// can reject it.
    pub fn push(&mut self, byte: u8) -> Option<FrameBuf> {
        if byte == PREAMBLE {
            if !self.buf.is_empty() {
                debug!("discarding {} byte partial frame", self.buf.len());
            }
            self.reset();
        } else if self.buf.is_empty() {
            return None;
        }

        if self.buf.push(byte).is_err() {
            warn!("frame exceeds {} bytes", RECV_BUF_SIZE);
            return Some(self.reset());
        }

        let len = self.buf.len();
        match self.marker_at {
            None if byte == CRC_MARKER => self.marker_at = Some(len - 1),
            Some(m) if len == m + 1 + CRC_DIGITS => return Some(self.reset()),
            _ => {}
        }
        None
    }

    /// Feed a chunk, calling `on_frame` for every completed frame.
    pub fn extend(&mut self, bytes: &[u8], mut on_frame: impl FnMut(&[u8])) {
        for &b in bytes {
            if let Some(frame) = self.push(b) {
                on_frame(&frame[..]);
            }
        }
    }
}
