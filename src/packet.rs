use std::sync::Arc;

use log::warn;
use thiserror::Error;

use crate::pool::{PacketPool, PoolExhausted, PoolSlot};
use crate::proto::command::{Command, Key, Param, Value, validate};
use crate::proto::serializer::{self, SerializeError, Serialized};
use crate::proto::{MAX_CMD_LEN, MAX_FRAME_LEN, MAX_KEY_LEN, MAX_PARAMS};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    #[error("command cannot be sent: {0:?}")]
    InvalidCommand(Command),
    #[error("command name too long")]
    CommandTooLong,
    #[error("too many parameters: {0}")]
    TooManyParams(usize),
    #[error("key {0} too long")]
    FieldTooLong(Key),
    #[error("{key}:{value} is not valid for {command}")]
    InvalidParam {
        command: Command,
        key: Key,
        value: Value,
    },
    #[error(transparent)]
    OutOfMemory(#[from] PoolExhausted),
    #[error("serialization failed: {0}")]
    SerializeFailed(#[from] SerializeError),
}

/// An outgoing message, serialized at creation and holding one pool slot for
/// as long as it lives.
#[derive(Debug)]
pub struct Packet {
    command: Command,
    params: heapless::Vec<Param, MAX_PARAMS>,
    msg_num: u16,
    crc: u16,
    resend: bool,
    frame: heapless::Vec<u8, MAX_FRAME_LEN>,
    _slot: PoolSlot,
}

impl Packet {
    /// Validate, allocate and serialize a packet.
    ///
    /// Every parameter is checked against the command's rules even if it came
    /// from a parsed frame. `msg_num: None` draws a random message number.
    /// Nothing is allocated when validation fails, and the slot is returned
    /// when serialization fails.
    pub fn create(
        pool: &Arc<PacketPool>,
        command: Command,
        params: &[Param],
        msg_num: Option<u16>,
    ) -> Result<Packet, CreateError> {
        let name = command
            .name()
            .ok_or(CreateError::InvalidCommand(command))?;
        if name.len() > MAX_CMD_LEN {
            return Err(CreateError::CommandTooLong);
        }
        if params.len() > MAX_PARAMS {
            return Err(CreateError::TooManyParams(params.len()));
        }
        for p in params {
            if p.key.name().is_some_and(|n| n.len() > MAX_KEY_LEN) {
                return Err(CreateError::FieldTooLong(p.key));
            }
            if !validate(command, p.key, p.value) {
                return Err(CreateError::InvalidParam {
                    command,
                    key: p.key,
                    value: p.value,
                });
            }
        }

        let slot = pool.acquire().inspect_err(|e| warn!("{}", e))?;
        let msg_num = msg_num.unwrap_or_else(new_msg_num);

        let mut frame = heapless::Vec::<u8, MAX_FRAME_LEN>::new();
        frame
            .resize(MAX_FRAME_LEN, 0)
            .map_err(|_| SerializeError::BufferTooSmall {
                needed: MAX_FRAME_LEN,
                available: 0,
            })?;
        let out = serializer::serialize(command, params, msg_num, &mut frame)?;
        frame.truncate(out.len);

        let params = heapless::Vec::from_slice(params)
            .map_err(|_| CreateError::TooManyParams(params.len()))?;

        Ok(Packet {
            command,
            params,
            msg_num,
            crc: out.crc,
            resend: false,
            frame,
            _slot: slot,
        })
    }

    /// Acknowledge `msg_num`.
    pub fn ack(pool: &Arc<PacketPool>, msg_num: u16) -> Result<Packet, CreateError> {
        Packet::create(pool, Command::Ack, &[], Some(msg_num))
    }

    /// Reject a frame. The message number carries no meaning for a NACK of an
    /// unreadable frame, so `None` is usual.
    pub fn nack(pool: &Arc<PacketPool>, msg_num: Option<u16>) -> Result<Packet, CreateError> {
        Packet::create(pool, Command::Nack, &[], msg_num)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn msg_num(&self) -> u16 {
        self.msg_num
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    pub fn resend(&self) -> bool {
        self.resend
    }

    pub(crate) fn set_resend(&mut self, resend: bool) {
        self.resend = resend;
    }

    /// Exact wire bytes.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Whether the peer is expected to acknowledge this packet.
    pub fn expects_ack(&self) -> bool {
        !matches!(self.command, Command::Ack | Command::Nack)
    }

    /// Render the packet again into a caller buffer.
    pub fn serialize_into(&self, out: &mut [u8]) -> Result<Serialized, SerializeError> {
        serializer::serialize(self.command, &self.params, self.msg_num, out)
    }
}

fn new_msg_num() -> u16 {
    rand::random::<u16>()
}
