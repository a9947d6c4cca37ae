use anyhow::{Context, Result, bail};
use log::{debug, info};

use rgb_link::frame::FrameAssembler;
use rgb_link::proto::RECV_BUF_SIZE;
use rgb_link::{
    Command, DeadlineTimer, Key, LinkContext, LinkState, PacketPool, Param, ResendTimer,
    TimerOutcome,
};

use crate::cli::SendOpts;
use crate::port::{drain_output, open_port, read_chunk};

/// Feed one received frame to the link, logging what it was.
fn absorb<T: ResendTimer>(ctx: &mut LinkContext<T>, frame: &[u8]) -> bool {
    match ctx.handle_incoming(frame) {
        Ok(f) => {
            debug!("[rx] {} msg={}", f.command, f.msg_num);
            true
        }
        Err(e) => {
            debug!("[rx] {} in {:?}", e, String::from_utf8_lossy(frame));
            false
        }
    }
}

pub fn run(opts: SendOpts) -> Result<()> {
    let mut port = open_port(&opts.ser)?;
    let pool = PacketPool::new(opts.link.pool_slots);
    let mut ctx = LinkContext::new(pool, opts.link.config(), DeadlineTimer::new());

    let params = [
        Param::new(Key::Red, opts.red),
        Param::new(Key::Green, opts.green),
        Param::new(Key::Blue, opts.blue),
    ];
    let msg_num = ctx
        .send(Command::SetRgb, &params)
        .context("building set_rgb")?;
    info!(
        "[tx] dev={} baud={} set_rgb ({}, {}, {}) msg={}",
        opts.ser.dev, opts.ser.baud, opts.red, opts.green, opts.blue, msg_num
    );
    drain_output(&mut *port, &mut ctx)?;

    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; RECV_BUF_SIZE];

    loop {
        let n = read_chunk(&mut *port, &mut buf)?;
        assembler.extend(&buf[..n], |frame| {
            absorb(&mut ctx, frame);
        });

        if ctx.state() == LinkState::Idle {
            info!("[tx] msg={} acknowledged", msg_num);
            return Ok(());
        }

        if ctx.timer_mut().poll_expired() {
            match ctx.on_timer_expired() {
                TimerOutcome::DeliveryFailed { msg_num } => {
                    bail!(
                        "msg={} not acknowledged after {} attempts",
                        msg_num,
                        opts.link.retries
                    );
                }
                TimerOutcome::Resend => info!("[tx] timeout, resending msg={}", msg_num),
                TimerOutcome::Idle => {}
            }
        }
        drain_output(&mut *port, &mut ctx)?;
    }
}
