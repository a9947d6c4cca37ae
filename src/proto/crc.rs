//! CRC-16/CCITT as computed by the peripheral firmware (reflected, seed 0,
//! no final xor; the catalogue name is CRC-16/KERMIT).
//!
//! The checksummed span of a frame runs from the preamble up to and including
//! the `#` marker. The hex digits after the marker are never part of it.

use super::CRC_MARKER;

/// CCITT polynomial in normal (MSB-first) notation.
pub const CRC_POLY: u16 = 0x1021;

/// Table-less CRC-16 over `bytes` for the given normal-form polynomial.
pub fn crc16(poly: u16, bytes: &[u8]) -> u16 {
    let poly = poly.reverse_bits();
    let mut crc: u16 = 0;
    for &b in bytes {
        crc ^= b as u16;
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Checksum of a frame span (preamble through `#`).
pub fn frame_crc(span: &[u8]) -> u16 {
    debug_assert_eq!(span.last(), Some(&CRC_MARKER));
    crc16(CRC_POLY, span)
}

/// Length of the checksummed span of `frame`, i.e. the index of the first
/// `#` plus one. `None` when the frame carries no marker.
pub fn span_len(frame: &[u8]) -> Option<usize> {
    frame.iter().position(|&b| b == CRC_MARKER).map(|i| i + 1)
}
