use anyhow::Result;
use log::{debug, info, warn};

use rgb_link::frame::FrameAssembler;
use rgb_link::proto::RECV_BUF_SIZE;
use rgb_link::{Command, DeadlineTimer, Key, LinkContext, PacketPool, ParsedFrame, TimerOutcome};

use crate::cli::PeripheralOpts;
use crate::port::{drain_output, open_port, read_chunk};

/// Colour most recently applied to the LED.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Rgb {
    red: u16,
    green: u16,
    blue: u16,
}

impl Rgb {
    /// Channels absent from the frame keep their previous value.
    fn apply(&mut self, frame: &ParsedFrame) {
        if let Some(v) = frame.get(Key::Red) {
            self.red = v;
        }
        if let Some(v) = frame.get(Key::Green) {
            self.green = v;
        }
        if let Some(v) = frame.get(Key::Blue) {
            self.blue = v;
        }
    }
}

pub fn run(opts: PeripheralOpts) -> Result<()> {
    info!("peripheral: {:?}", opts);
    let mut port = open_port(&opts.ser)?;
    let pool = PacketPool::new(opts.link.pool_slots);
    let mut ctx = LinkContext::new(pool, opts.link.config(), DeadlineTimer::new());
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; RECV_BUF_SIZE];
    let mut led = Rgb::default();
    let interval = opts.link.stats_interval();

    info!("Starting receive loop");

    loop {
        let n = read_chunk(&mut *port, &mut buf)?;
        for &b in &buf[..n] {
            let Some(frame) = assembler.push(b) else {
                continue;
            };
            match ctx.handle_incoming(&frame) {
                Ok(f) if f.command == Command::SetRgb => {
                    led.apply(&f);
                    info!(
                        "[led] msg={} rgb=({}, {}, {})",
                        f.msg_num, led.red, led.green, led.blue
                    );
                }
                Ok(f) => debug!("[rx] {} msg={}", f.command, f.msg_num),
                Err(e) => debug!("[rx] {} in {:?}", e, String::from_utf8_lossy(&frame)),
            }
            drain_output(&mut *port, &mut ctx)?;
        }

        if ctx.timer_mut().poll_expired()
            && let TimerOutcome::DeliveryFailed { msg_num } = ctx.on_timer_expired()
        {
            warn!("[rx] msg={} never acknowledged", msg_num);
        }
        drain_output(&mut *port, &mut ctx)?;
        ctx.stats_mut().maybe_print(interval);
    }
}
