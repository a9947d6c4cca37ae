use std::ops::Deref;
use std::str;

use log::{debug, warn};
use thiserror::Error;

use super::command::{Command, Key, MSG_KEY, Param, Value, validate};
use super::{
    CRC_DIGITS, CRC_MARKER, ITEM_SEP, KEY_VALUE_SEP, MAX_PARAMS, MAX_TOKEN_LEN, MAX_TOKENS,
    MAX_VALUE_LEN, PREAMBLE, crc,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty byte stream")]
    InvalidBytes,
    #[error("frame does not start with preamble")]
    InvalidPreamble,
    #[error("checksum missing or mismatched")]
    InvalidCrc,
    #[error("unknown command")]
    InvalidCmd,
    #[error("invalid parameter(s) for command")]
    InvalidParams,
    #[error("missing or malformed message number")]
    InvalidMsgNum,
}

/// Coarse grouping of decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The bytes are not a usable frame.
    Framing,
    /// The frame is intact but breaks protocol rules.
    Semantic,
}

impl ParseError {
    pub fn class(self) -> ErrorClass {
        match self {
            ParseError::InvalidBytes | ParseError::InvalidPreamble | ParseError::InvalidCrc => {
                ErrorClass::Framing
            }
            ParseError::InvalidCmd | ParseError::InvalidParams | ParseError::InvalidMsgNum => {
                ErrorClass::Semantic
            }
        }
    }
}

/// A decoded frame. Parameters keep wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub command: Command,
    pub params: heapless::Vec<Param, MAX_PARAMS>,
    pub msg_num: u16,
}

impl ParsedFrame {
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// Value of `key` if present (first occurrence).
    pub fn get(&self, key: Key) -> Option<Value> {
        self.params.iter().find(|p| p.key == key).map(|p| p.value)
    }
}

/// Tokens of one frame body, in wire order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tokens<'a> {
    items: heapless::Vec<&'a [u8], MAX_TOKENS>,
    truncated: bool,
}

impl<'a> Tokens<'a> {
    /// True when capacity ran out before the `#` was reached.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Deref for Tokens<'a> {
    type Target = [&'a [u8]];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

/// Split a frame body (everything after the preamble) into tokens.
///
/// Tokens end at `,`, except the last which ends at `#`. Tokenizing stops at
/// the `#`, when no delimiter remains, or once [`MAX_TOKENS`] tokens are held
/// (flagged by [`Tokens::truncated`]). Tokens longer than [`MAX_TOKEN_LEN`]
/// are skipped.
pub fn tokenize(body: &[u8]) -> Tokens<'_> {
    let mut tokens = Tokens::default();
    let mut rest = body;

    while let Some(end) = rest.iter().position(|&b| b == ITEM_SEP || b == CRC_MARKER) {
        let tok = &rest[..end];
        let last = rest[end] == CRC_MARKER;

        if tok.len() > MAX_TOKEN_LEN {
            warn!(
                "skipping token of {} bytes (max {})",
                tok.len(),
                MAX_TOKEN_LEN
            );
        } else if tokens.items.push(tok).is_err() {
            warn!("token limit {} reached, ignoring remainder", MAX_TOKENS);
            tokens.truncated = true;
            break;
        }

        if last {
            break;
        }
        rest = &rest[end + 1..];
    }

    tokens
}

/// Decode one frame from `bytes`.
///
/// Bytes after the four checksum digits are ignored.
pub fn parse(bytes: &[u8]) -> Result<ParsedFrame, ParseError> {
    let Some(&first) = bytes.first() else {
        return Err(ParseError::InvalidBytes);
    };
    if first != PREAMBLE {
        return Err(ParseError::InvalidPreamble);
    }

    let span = crc::span_len(bytes).ok_or(ParseError::InvalidCrc)?;
    let received = bytes
        .get(span..span + CRC_DIGITS)
        .and_then(parse_crc_digits)
        .ok_or(ParseError::InvalidCrc)?;
    let computed = crc::frame_crc(&bytes[..span]);
    if computed != received {
        debug!("crc mismatch: computed {:04x} received {:04x}", computed, received);
        return Err(ParseError::InvalidCrc);
    }

    let tokens = tokenize(&bytes[1..span]);
    let mut it = tokens.iter();

    let command = it
        .next()
        .and_then(|t| str::from_utf8(t).ok())
        .map_or(Command::Invalid, Command::from_name);
    if command == Command::Invalid {
        return Err(ParseError::InvalidCmd);
    }

    let mut params = heapless::Vec::<Param, MAX_PARAMS>::new();
    let mut msg_num = None;
    let mut msg_tokens = 0usize;
    let mut bad_params = tokens.truncated();

    for &tok in it {
        let Some((name, value)) = split_pair(tok) else {
            debug!("malformed pair {:?}", String::from_utf8_lossy(tok));
            bad_params = true;
            continue;
        };

        if name == MSG_KEY {
            msg_tokens += 1;
            msg_num = parse_value(value);
            continue;
        }

        let key = Key::for_command(command, name);
        match parse_value(value) {
            Some(v) if validate(command, key, v) => {
                if params.push(Param::new(key, v)).is_err() {
                    bad_params = true;
                }
            }
            _ => {
                debug!("rejecting {}:{} for {}", name, String::from_utf8_lossy(value), command);
                bad_params = true;
            }
        }
    }

    if bad_params {
        return Err(ParseError::InvalidParams);
    }
    if msg_tokens > 1 {
        debug!("{} {} tokens in one frame", msg_tokens, MSG_KEY);
        return Err(ParseError::InvalidMsgNum);
    }
    let msg_num = msg_num.ok_or(ParseError::InvalidMsgNum)?;

    Ok(ParsedFrame {
        command,
        params,
        msg_num,
    })
}

/* ---------- helpers ---------- */

fn split_pair(tok: &[u8]) -> Option<(&str, &[u8])> {
    let sep = tok.iter().position(|&b| b == KEY_VALUE_SEP)?;
    let name = str::from_utf8(&tok[..sep]).ok()?;
    Some((name, &tok[sep + 1..]))
}

fn parse_value(digits: &[u8]) -> Option<Value> {
    if digits.is_empty() || digits.len() > MAX_VALUE_LEN || !digits.iter().all(u8::is_ascii_digit)
    {
        return None;
    }
    str::from_utf8(digits).ok()?.parse::<Value>().ok()
}

fn parse_crc_digits(digits: &[u8]) -> Option<u16> {
    if !digits
        .iter()
        .all(|&b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }
    u16::from_str_radix(str::from_utf8(digits).ok()?, 16).ok()
}

/* ---------- tests ---------- */
