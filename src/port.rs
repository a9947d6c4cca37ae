use anyhow::{Context, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use rgb_link::{LinkContext, ResendTimer};

use crate::cli::SerialOpts;

/// Short read timeout so the event loop can service the resend timer.
const READ_TIMEOUT: Duration = Duration::from_millis(20);

pub fn open_port(opts: &SerialOpts) -> Result<Box<dyn SerialPort>> {
    let builder = serialport::new(&opts.dev, opts.baud)
        .timeout(READ_TIMEOUT)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if opts.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        });

    builder
        .open()
        .map_err(|e| anyhow::anyhow!("open {}: {}", opts.dev, e))
}

/// Read whatever is available; a timeout is an empty read.
pub fn read_chunk(port: &mut dyn SerialPort, buf: &mut [u8]) -> Result<usize> {
    match port.read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
        Err(e) => Err(e).context("serial read"),
    }
}

/// Write the link's pending frame, if any, and confirm it to the context.
pub fn drain_output<T: ResendTimer>(
    port: &mut dyn SerialPort,
    ctx: &mut LinkContext<T>,
) -> Result<()> {
    if let Some(bytes) = ctx.pending_output() {
        log::debug!("[tx] {}", String::from_utf8_lossy(bytes));
        port.write_all(bytes).context("serial write")?;
        ctx.mark_sent();
    }
    Ok(())
}
