//! Wire protocol: vocabulary, checksum, frame rendering and frame parsing.
//!
//! Frame grammar (ASCII):
//!
//! ```text
//! !<command>,<key>:<value>,...,msg:<msg_num>#<crc-hex4>
//! ```

pub mod command;
pub mod crc;
pub mod parser;
pub mod serializer;

/// Leading byte of every frame.
pub const PREAMBLE: u8 = b'!';
/// Separates tokens (command, parameters, message number).
pub const ITEM_SEP: u8 = b',';
/// Separates a key from its value.
pub const KEY_VALUE_SEP: u8 = b':';
/// Marks the end of the checksummed span; followed by the checksum digits.
pub const CRC_MARKER: u8 = b'#';
/// Number of lowercase hex digits carrying the checksum.
pub const CRC_DIGITS: usize = 4;

pub const MAX_PARAMS: usize = 8;
pub const MAX_KEY_LEN: usize = 16;
pub const MAX_VALUE_LEN: usize = 16;
pub const MAX_CMD_LEN: usize = 32;
/// Digits needed to render any `u16` message number.
pub const MAX_MSG_NUM_DIGITS: usize = 5;
/// Command + parameters + message number.
pub const MAX_TOKENS: usize = MAX_PARAMS + 2;
pub const MAX_TOKEN_LEN: usize = if MAX_CMD_LEN > MAX_KEY_LEN + MAX_VALUE_LEN + 1 {
    MAX_CMD_LEN
} else {
    MAX_KEY_LEN + MAX_VALUE_LEN + 1
};

/// Largest frame the serializer can ever emit.
pub const MAX_FRAME_LEN: usize = 1 // preamble
    + MAX_CMD_LEN
    + 1 // ','
    + MAX_PARAMS * (MAX_KEY_LEN + 1 + MAX_VALUE_LEN + 1)
    + command::MSG_KEY.len()
    + 1 // ':'
    + MAX_MSG_NUM_DIGITS
    + 1 // '#'
    + CRC_DIGITS;

/// Suggested capacity for the transport receive buffer.
pub const RECV_BUF_SIZE: usize = 512;
