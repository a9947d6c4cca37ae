//! Command/acknowledgement link for an addressable-LED peripheral.
//!
//! Frames are CRC-protected ASCII (`!set_rgb,red:255,msg:7#1a2b`) and at most
//! one unacknowledged packet is outstanding per link.

pub mod arq;
pub mod frame;
pub mod packet;
pub mod pool;
pub mod proto;
pub mod stats;
pub mod timer;

pub use arq::{LinkConfig, LinkContext, LinkState, SendError, TimerOutcome};
pub use packet::{CreateError, Packet};
pub use pool::{PacketPool, PoolExhausted};
pub use proto::command::{Command, Key, Param, Value};
pub use proto::parser::{ParseError, ParsedFrame, parse};
pub use proto::serializer::{SerializeError, serialize};
pub use timer::{DeadlineTimer, ResendTimer};
