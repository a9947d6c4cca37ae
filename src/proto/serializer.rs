use std::fmt::{self, Write as _};

use thiserror::Error;

use super::command::{Command, Key, MSG_KEY, Param, Value};
use super::{CRC_MARKER, ITEM_SEP, KEY_VALUE_SEP, MAX_KEY_LEN, MAX_VALUE_LEN, PREAMBLE, crc};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SerializeError {
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("{field} longer than {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("command has no wire name: {0:?}")]
    InvalidCommand(Command),
    #[error("key has no wire name: {0:?}")]
    InvalidKey(Key),
}

/// Result of rendering one frame into a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serialized {
    /// Exact wire length. Nothing past it belongs to the frame.
    pub len: usize,
    pub crc: u16,
}

/// Bounds-checked writer over a caller buffer. Fails closed instead of
/// truncating.
struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        let end = self.pos + bytes.len();
        let available = self.buf.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(SerializeError::BufferTooSmall {
                needed: end,
                available,
            })?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_byte(&mut self, b: u8) -> Result<(), SerializeError> {
        self.put(&[b])
    }
}

impl fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

fn dec_len(mut v: Value) -> usize {
    let mut n = 1;
    while v >= 10 {
        v /= 10;
        n += 1;
    }
    n
}

fn command_name(command: Command) -> Result<&'static str, SerializeError> {
    command
        .name()
        .ok_or(SerializeError::InvalidCommand(command))
}

fn key_name(key: Key) -> Result<&'static str, SerializeError> {
    key.name().ok_or(SerializeError::InvalidKey(key))
}

/// Exact number of bytes [`serialize`] will write for this frame.
pub fn encoded_len(
    command: Command,
    params: &[Param],
    msg_num: u16,
) -> Result<usize, SerializeError> {
    let mut len = 1 + command_name(command)?.len() + 1;
    for p in params {
        len += key_name(p.key)?.len() + 1 + dec_len(p.value) + 1;
    }
    len += MSG_KEY.len() + 1 + dec_len(msg_num);
    len += 1 + super::CRC_DIGITS;
    Ok(len)
}

/// Render `!<command>,<key>:<value>,...,msg:<msg_num>#<crc>` into `out`.
///
/// The buffer is checked against the exact frame size before anything is
/// written. A [`SerializeError::FieldTooLong`] may leave a partial frame in
/// `out`; callers must discard the buffer on any error.
pub fn serialize(
    command: Command,
    params: &[Param],
    msg_num: u16,
    out: &mut [u8],
) -> Result<Serialized, SerializeError> {
    let needed = encoded_len(command, params, msg_num)?;
    if out.len() < needed {
        return Err(SerializeError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }

    let mut cur = Cursor::new(out);
    cur.put_byte(PREAMBLE)?;
    cur.put(command_name(command)?.as_bytes())?;
    cur.put_byte(ITEM_SEP)?;

    for p in params {
        let key = key_name(p.key)?;
        if key.len() > MAX_KEY_LEN {
            return Err(SerializeError::FieldTooLong {
                field: "key",
                max: MAX_KEY_LEN,
            });
        }
        let mut value = heapless::String::<MAX_VALUE_LEN>::new();
        write!(value, "{}", p.value).map_err(|_| SerializeError::FieldTooLong {
            field: "value",
            max: MAX_VALUE_LEN,
        })?;
        cur.put(key.as_bytes())?;
        cur.put_byte(KEY_VALUE_SEP)?;
        cur.put(value.as_bytes())?;
        cur.put_byte(ITEM_SEP)?;
    }

    // msg segment is last and carries no trailing separator
    cur.put(MSG_KEY.as_bytes())?;
    cur.put_byte(KEY_VALUE_SEP)?;
    write!(cur, "{}", msg_num).map_err(|_| overflow(needed))?;
    cur.put_byte(CRC_MARKER)?;

    let span = cur.pos;
    let crc = crc::frame_crc(&cur.buf[..span]);
    write!(cur, "{:04x}", crc).map_err(|_| overflow(needed))?;

    Ok(Serialized { len: cur.pos, crc })
}

fn overflow(needed: usize) -> SerializeError {
    SerializeError::BufferTooSmall {
        needed,
        available: needed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::MAX_FRAME_LEN;

    fn render(command: Command, params: &[Param], msg_num: u16) -> String {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let s = serialize(command, params, msg_num, &mut buf).unwrap();
        String::from_utf8(buf[..s.len].to_vec()).unwrap()
    }

    #[test]
    fn set_rgb_frame() {
        let params = [Param::new(Key::Red, 255), Param::new(Key::Green, 11)];
        let mut buf = [0u8; 64];
        let s = serialize(Command::SetRgb, &params, 15, &mut buf).unwrap();
        assert_eq!(&buf[..s.len], b"!set_rgb,red:255,green:11,msg:15#53b5");
        assert_eq!(s.len, 37);
        assert_eq!(s.crc, 0x53b5);
        // nothing written past the frame
        assert_eq!(buf[s.len], 0);
    }

    #[test]
    fn ack_frame_has_no_params() {
        assert_eq!(render(Command::Ack, &[], 11), "!ack,msg:11#4a4d");
        assert_eq!(render(Command::Nack, &[], 0), "!nack,msg:0#5c0c");
    }

    #[test]
    fn crc_digits_are_zero_padded_lowercase() {
        let frame = render(Command::Ack, &[], 3);
        let digits = &frame[frame.len() - 4..];
        assert_eq!(digits.len(), 4);
        assert!(
            digits
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        );
    }

    #[test]
    fn encoded_len_is_exact() {
        let params = [
            Param::new(Key::Red, 10),
            Param::new(Key::Green, 20),
            Param::new(Key::Blue, 30),
        ];
        let frame = render(Command::SetRgb, &params, 42);
        assert_eq!(frame, "!set_rgb,red:10,green:20,blue:30,msg:42#477b");
        assert_eq!(
            encoded_len(Command::SetRgb, &params, 42).unwrap(),
            frame.len()
        );
        assert_eq!(encoded_len(Command::Ack, &[], 65535).unwrap(), 19);
    }

    #[test]
    fn buffer_exactly_sized() {
        let needed = encoded_len(Command::Ack, &[], 11).unwrap();
        let mut buf = vec![0u8; needed];
        let s = serialize(Command::Ack, &[], 11, &mut buf).unwrap();
        assert_eq!(s.len, needed);
    }

    #[test]
    fn buffer_too_small_writes_nothing() {
        let needed = encoded_len(Command::Ack, &[], 11).unwrap();
        let mut buf = vec![0u8; needed - 1];
        let err = serialize(Command::Ack, &[], 11, &mut buf).unwrap_err();
        assert_eq!(
            err,
            SerializeError::BufferTooSmall {
                needed,
                available: needed - 1
            }
        );
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn invalid_command_or_key_rejected() {
        let mut buf = [0u8; 64];
        assert_eq!(
            serialize(Command::Invalid, &[], 1, &mut buf),
            Err(SerializeError::InvalidCommand(Command::Invalid))
        );
        assert_eq!(
            serialize(
                Command::SetRgb,
                &[Param::new(Key::Invalid, 1)],
                1,
                &mut buf
            ),
            Err(SerializeError::InvalidKey(Key::Invalid))
        );
    }

    #[test]
    fn largest_frame_fits_max_len() {
        let params = [Param::new(Key::Green, 65535); crate::proto::MAX_PARAMS];
        let len = encoded_len(Command::SetRgb, &params, 65535).unwrap();
        assert!(len <= MAX_FRAME_LEN);
    }
}
