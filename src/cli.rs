use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use rgb_link::arq::{DEFAULT_MAX_RETRIES, LinkConfig};
use rgb_link::pool::DEFAULT_POOL_SLOTS;
use rgb_link::{Key, Param};

#[derive(Parser, Debug, Clone)]
#[command(name = "rgb-link", about = "Serial command/ACK link for an RGB LED peripheral")]
pub struct Cli {
    /// Debug logging (RUST_LOG is honoured otherwise)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Act as the LED peripheral: ACK colour commands, NACK bad frames
    Peripheral(PeripheralOpts),
    /// Send one colour and wait for the ACK
    Send(SendOpts),
    /// Print the wire frame for a command
    Encode(EncodeOpts),
    /// Parse a frame given on the command line
    Decode(DecodeOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyS0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LinkOpts {
    /// Timer expiries before an unacknowledged packet is dropped
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub retries: u8,
    /// Resend timeout in milliseconds
    #[arg(long, default_value_t = 500)]
    pub timeout_ms: u64,
    /// Packet pool slots
    #[arg(long, default_value_t = DEFAULT_POOL_SLOTS)]
    pub pool_slots: usize,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 5.0)]
    pub stats: f64,
}

impl LinkOpts {
    pub fn config(&self) -> LinkConfig {
        LinkConfig {
            max_retries: self.retries,
            resend_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs_f64(self.stats.max(0.1))
    }
}

#[derive(Args, Debug, Clone)]
pub struct PeripheralOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    #[command(flatten)]
    pub link: LinkOpts,
}

#[derive(Args, Debug, Clone)]
pub struct SendOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    #[command(flatten)]
    pub link: LinkOpts,
    /// Red channel (0-255)
    #[arg(long, default_value_t = 0)]
    pub red: u16,
    /// Green channel (0-255)
    #[arg(long, default_value_t = 0)]
    pub green: u16,
    /// Blue channel (0-255)
    #[arg(long, default_value_t = 0)]
    pub blue: u16,
}

#[derive(Args, Debug, Clone)]
pub struct EncodeOpts {
    /// Command name, e.g. set_rgb, ack, nack
    pub command: String,
    /// Parameter as key:value, repeatable
    #[arg(short, long = "param", value_parser = parse_param)]
    pub params: Vec<Param>,
    /// Message number (random if omitted)
    #[arg(long)]
    pub msg: Option<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct DecodeOpts {
    /// Frame text, e.g. '!ack,msg:11#4a4d'
    pub frame: String,
}

fn parse_param(s: &str) -> Result<Param, String> {
    let (k, v) = s
        .split_once(':')
        .ok_or_else(|| format!("expected key:value, got '{}'", s))?;
    let key = Key::from_name(k);
    if key == Key::Invalid {
        return Err(format!("unknown key '{}'", k));
    }
    let value = v
        .parse()
        .map_err(|_| format!("value must be 0-65535, got '{}'", v))?;
    Ok(Param::new(key, value))
}
