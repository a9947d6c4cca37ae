//! Stop-and-wait ARQ over a single outgoing packet slot.
//!
//! The context does no I/O. The host feeds received frames to
//! [`LinkContext::handle_incoming`], drains [`LinkContext::pending_output`]
//! to the transport (confirming with [`LinkContext::mark_sent`]) and reports
//! timer expiry through [`LinkContext::on_timer_expired`]. All calls for one
//! context must come from one logical thread.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::packet::{CreateError, Packet};
use crate::pool::PacketPool;
use crate::proto::command::{Command, Param};
use crate::proto::parser::{ParseError, ParsedFrame, parse};
use crate::stats::LinkStats;
use crate::timer::{DeadlineTimer, ResendTimer};

pub const DEFAULT_MAX_RETRIES: u8 = 5;
pub const DEFAULT_RESEND_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Timer expiries tolerated per packet before it is abandoned.
    pub max_retries: u8,
    pub resend_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            resend_timeout: DEFAULT_RESEND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing outstanding.
    Idle,
    /// One packet held, timer running.
    AwaitingAck,
    /// Packet flagged for retransmission.
    ResendPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Nothing was outstanding.
    Idle,
    /// Packet flagged for retransmission and timer re-armed.
    Resend,
    /// Retries exhausted; the packet was dropped.
    DeliveryFailed { msg_num: u16 },
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("packet msg={0} still outstanding")]
    Busy(u16),
    #[error(transparent)]
    Create(#[from] CreateError),
}

pub struct LinkContext<T: ResendTimer = DeadlineTimer> {
    pool: Arc<PacketPool>,
    config: LinkConfig,
    to_send: Option<Packet>,
    /// Whether `to_send` has been written at least once.
    sent: bool,
    retry_attempts: u8,
    resend_timer: T,
    stats: LinkStats,
}

impl<T: ResendTimer> LinkContext<T> {
    pub fn new(pool: Arc<PacketPool>, config: LinkConfig, resend_timer: T) -> Self {
        Self {
            pool,
            config,
            to_send: None,
            sent: false,
            retry_attempts: 0,
            resend_timer,
            stats: LinkStats::new(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut LinkStats {
        &mut self.stats
    }

    pub fn timer(&self) -> &T {
        &self.resend_timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.resend_timer
    }

    pub fn to_send(&self) -> Option<&Packet> {
        self.to_send.as_ref()
    }

    pub fn retry_attempts(&self) -> u8 {
        self.retry_attempts
    }

    pub fn state(&self) -> LinkState {
        match &self.to_send {
            None => LinkState::Idle,
            Some(p) if p.resend() => LinkState::ResendPending,
            Some(_) => LinkState::AwaitingAck,
        }
    }

    /// Install `packet` as the outstanding packet. Returns false (and drops
    /// the packet) when the slot is already taken.
    pub fn queue_packet(&mut self, packet: Packet) -> bool {
        if let Some(current) = &self.to_send {
            warn!(
                "[arq] slot busy with {} msg={}, dropping {} msg={}",
                current.command(),
                current.msg_num(),
                packet.command(),
                packet.msg_num()
            );
            self.stats.dropped += 1;
            return false;
        }
        debug!("[arq] queued {} msg={}", packet.command(), packet.msg_num());
        self.to_send = Some(packet);
        self.sent = false;
        self.retry_attempts = self.config.max_retries;
        self.resend_timer.start(self.config.resend_timeout);
        true
    }

    /// Clear the outstanding packet and stop the timer. Safe to call when idle.
    pub fn cancel(&mut self) {
        if let Some(p) = self.to_send.take() {
            debug!("[arq] released {} msg={}", p.command(), p.msg_num());
        }
        self.sent = false;
        self.resend_timer.stop();
    }

    /// Queue an application packet with a fresh message number.
    pub fn send(&mut self, command: Command, params: &[Param]) -> Result<u16, SendError> {
        if let Some(p) = &self.to_send {
            return Err(SendError::Busy(p.msg_num()));
        }
        let packet = Packet::create(&self.pool, command, params, None)?;
        let msg_num = packet.msg_num();
        self.queue_packet(packet);
        Ok(msg_num)
    }

    /// Decode one received frame and advance the state machine.
    ///
    /// The parsed frame is handed back so the application can act on it.
    /// Every decode failure answers with a NACK.
    pub fn handle_incoming(&mut self, rx: &[u8]) -> Result<ParsedFrame, ParseError> {
        self.stats.add_bytes_in(rx.len());

        let frame = match parse(rx) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.rx_bad += 1;
                warn!("[arq] rejected frame ({:?}): {}", e.class(), e);
                match Packet::nack(&self.pool, None) {
                    Ok(nack) => {
                        self.queue_packet(nack);
                    }
                    Err(ce) => warn!("[arq] could not build nack: {}", ce),
                }
                return Err(e);
            }
        };
        self.stats.rx_ok += 1;

        match frame.command {
            Command::SetRgb => match Packet::ack(&self.pool, frame.msg_num) {
                Ok(ack) => {
                    self.queue_packet(ack);
                }
                Err(e) => warn!("[arq] could not build ack for msg={}: {}", frame.msg_num, e),
            },
            Command::Ack => {
                self.stats.acks += 1;
                if self
                    .to_send
                    .as_ref()
                    .is_some_and(|p| p.msg_num() == frame.msg_num)
                {
                    debug!("[arq] msg={} acknowledged", frame.msg_num);
                    self.stats.delivered += 1;
                    self.cancel();
                } else {
                    debug!("[arq] ignoring ack for msg={}", frame.msg_num);
                }
            }
            Command::Nack => {
                self.stats.nacks += 1;
                if let Some(p) = self.to_send.as_mut() {
                    debug!("[arq] nack, flagging msg={} for resend", p.msg_num());
                    p.set_resend(true);
                }
            }
            Command::Invalid => {}
        }

        Ok(frame)
    }

    /// Bytes the transport should write now: a packet not yet sent, or one
    /// flagged for resend.
    pub fn pending_output(&self) -> Option<&[u8]> {
        self.to_send
            .as_ref()
            .filter(|p| !self.sent || p.resend())
            .map(Packet::frame)
    }

    /// Confirm that the bytes from [`Self::pending_output`] were written.
    ///
    /// ACK and NACK packets are not acknowledged by the peer, so they are
    /// released here. Other packets stay outstanding and the timer restarts.
    pub fn mark_sent(&mut self) {
        let Some(p) = self.to_send.as_mut() else {
            return;
        };
        self.stats.add_bytes_out(p.frame().len());
        if p.resend() {
            self.stats.resends += 1;
        }
        if !p.expects_ack() {
            self.cancel();
            return;
        }
        p.set_resend(false);
        self.sent = true;
        self.resend_timer.start(self.config.resend_timeout);
    }

    /// Resend timer expired.
    pub fn on_timer_expired(&mut self) -> TimerOutcome {
        let Some(p) = self.to_send.as_mut() else {
            return TimerOutcome::Idle;
        };
        self.retry_attempts = self.retry_attempts.saturating_sub(1);
        if self.retry_attempts > 0 {
            debug!(
                "[arq] timeout msg={}, {} attempt(s) left",
                p.msg_num(),
                self.retry_attempts
            );
            p.set_resend(true);
            self.resend_timer.start(self.config.resend_timeout);
            TimerOutcome::Resend
        } else {
            let msg_num = p.msg_num();
            info!("[arq] giving up on {} msg={}", p.command(), msg_num);
            self.stats.failed += 1;
            self.cancel();
            TimerOutcome::DeliveryFailed { msg_num }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::command::Key;

    #[derive(Debug, Default)]
    struct MockTimer {
        running: bool,
        starts: u32,
    }

    impl ResendTimer for MockTimer {
        fn start(&mut self, _duration: Duration) {
            self.running = true;
            self.starts += 1;
        }
        fn stop(&mut self) {
            self.running = false;
        }
    }

    fn ctx_with(pool: Arc<PacketPool>, max_retries: u8) -> LinkContext<MockTimer> {
        LinkContext::new(
            pool,
            LinkConfig {
                max_retries,
                resend_timeout: Duration::from_millis(10),
            },
            MockTimer::default(),
        )
    }

    fn ctx() -> LinkContext<MockTimer> {
        ctx_with(PacketPool::new(4), DEFAULT_MAX_RETRIES)
    }

    const SET_RGB_15: &[u8] = b"!set_rgb,red:255,green:11,msg:15#53b5";

    #[test]
    fn set_rgb_is_acked_with_same_msg_num() {
        let mut ctx = ctx();
        let frame = ctx.handle_incoming(SET_RGB_15).unwrap();
        assert_eq!(frame.get(Key::Red), Some(255));

        let pkt = ctx.to_send().unwrap();
        assert_eq!(pkt.command(), Command::Ack);
        assert_eq!(pkt.msg_num(), 15);
        assert_eq!(ctx.state(), LinkState::AwaitingAck);
        assert!(ctx.timer().running);
        assert_eq!(ctx.pending_output(), Some(&b"!ack,msg:15#2d2d"[..]));
    }

    #[test]
    fn second_set_rgb_does_not_replace_queued_ack() {
        let mut ctx = ctx();
        ctx.handle_incoming(SET_RGB_15).unwrap();
        let second = {
            let pool = PacketPool::new(1);
            let p = Packet::create(
                &pool,
                Command::SetRgb,
                &[Param::new(Key::Blue, 1)],
                Some(99),
            )
            .unwrap();
            p.frame().to_vec()
        };
        assert!(ctx.handle_incoming(&second).is_ok());
        assert_eq!(ctx.to_send().unwrap().msg_num(), 15);
        assert_eq!(ctx.stats().dropped, 1);
        // the dropped ack went back to the pool
        assert_eq!(ctx.pool.in_use(), 1);
    }

    #[test]
    fn matching_ack_clears_slot() {
        let pool = PacketPool::new(4);
        let mut ctx = ctx_with(Arc::clone(&pool), DEFAULT_MAX_RETRIES);
        let pkt = Packet::create(&pool, Command::SetRgb, &[Param::new(Key::Red, 1)], Some(11))
            .unwrap();
        assert!(ctx.queue_packet(pkt));
        ctx.mark_sent();

        // stale ack for another message changes nothing
        let stale = Packet::ack(&pool, 12).unwrap().frame().to_vec();
        ctx.handle_incoming(&stale).unwrap();
        assert_eq!(ctx.state(), LinkState::AwaitingAck);

        let frame = ctx.handle_incoming(b"!ack,msg:11#4a4d").unwrap();
        assert_eq!(frame.command, Command::Ack);
        assert!(ctx.to_send().is_none());
        assert_eq!(ctx.state(), LinkState::Idle);
        assert!(!ctx.timer().running);
        assert_eq!(ctx.stats().delivered, 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn nack_flags_resend_without_touching_packet() {
        let mut ctx = ctx();
        let msg = ctx
            .send(Command::SetRgb, &[Param::new(Key::Green, 200)])
            .unwrap();
        let before = ctx.to_send().unwrap().frame().to_vec();
        ctx.mark_sent();
        assert_eq!(ctx.pending_output(), None);

        ctx.handle_incoming(b"!nack,msg:0#5c0c").unwrap();
        let pkt = ctx.to_send().unwrap();
        assert!(pkt.resend());
        assert_eq!(pkt.msg_num(), msg);
        assert_eq!(pkt.frame(), &before[..]);
        assert_eq!(ctx.state(), LinkState::ResendPending);
        assert_eq!(ctx.pending_output(), Some(&before[..]));

        ctx.mark_sent();
        assert_eq!(ctx.state(), LinkState::AwaitingAck);
        assert_eq!(ctx.stats().resends, 1);
        assert_eq!(ctx.pending_output(), None);
    }

    #[test]
    fn nack_when_idle_is_ignored() {
        let mut ctx = ctx();
        ctx.handle_incoming(b"!nack,msg:0#5c0c").unwrap();
        assert_eq!(ctx.state(), LinkState::Idle);
        assert_eq!(ctx.stats().nacks, 1);
    }

    #[test]
    fn bad_frame_queues_nack() {
        let mut ctx = ctx();
        assert_eq!(
            ctx.handle_incoming(b"!ack,msg:11#0000"),
            Err(ParseError::InvalidCrc)
        );
        let pkt = ctx.to_send().unwrap();
        assert_eq!(pkt.command(), Command::Nack);
        assert_eq!(ctx.stats().rx_bad, 1);

        // slot taken: second failure is not queued
        assert_eq!(
            ctx.handle_incoming(b"!set_rgb,red:256,msg:1#5674"),
            Err(ParseError::InvalidParams)
        );
        assert_eq!(ctx.stats().dropped, 1);
        assert_eq!(ctx.to_send().unwrap().command(), Command::Nack);
    }

    #[test]
    fn control_packets_released_after_write() {
        let pool = PacketPool::new(2);
        let mut ctx = ctx_with(Arc::clone(&pool), DEFAULT_MAX_RETRIES);
        ctx.handle_incoming(SET_RGB_15).unwrap();
        assert!(ctx.pending_output().is_some());
        ctx.mark_sent();
        assert_eq!(ctx.state(), LinkState::Idle);
        assert!(!ctx.timer().running);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(ctx.stats().bytes_out, 16);
    }

    #[test]
    fn retries_then_delivery_failure() {
        let mut ctx = ctx_with(PacketPool::new(2), 3);
        let msg = ctx.send(Command::SetRgb, &[]).unwrap();
        ctx.mark_sent();
        assert_eq!(ctx.retry_attempts(), 3);

        assert_eq!(ctx.on_timer_expired(), TimerOutcome::Resend);
        assert!(ctx.to_send().unwrap().resend());
        ctx.mark_sent();
        assert_eq!(ctx.on_timer_expired(), TimerOutcome::Resend);
        assert_eq!(ctx.retry_attempts(), 1);
        assert_eq!(
            ctx.on_timer_expired(),
            TimerOutcome::DeliveryFailed { msg_num: msg }
        );
        assert!(ctx.to_send().is_none());
        assert!(!ctx.timer().running);
        assert_eq!(ctx.stats().failed, 1);
        assert_eq!(ctx.on_timer_expired(), TimerOutcome::Idle);
    }

    #[test]
    fn send_respects_single_slot() {
        let mut ctx = ctx();
        let msg = ctx.send(Command::SetRgb, &[]).unwrap();
        assert!(matches!(
            ctx.send(Command::SetRgb, &[]),
            Err(SendError::Busy(m)) if m == msg
        ));
        assert!(matches!(
            ctx.send(Command::Invalid, &[]),
            Err(SendError::Busy(_))
        ));
        ctx.cancel();
        assert!(matches!(
            ctx.send(Command::SetRgb, &[Param::new(Key::Red, 300)]),
            Err(SendError::Create(CreateError::InvalidParam { .. }))
        ));
        assert_eq!(ctx.state(), LinkState::Idle);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut ctx = ctx();
        ctx.cancel();
        ctx.send(Command::SetRgb, &[]).unwrap();
        ctx.cancel();
        ctx.cancel();
        assert_eq!(ctx.state(), LinkState::Idle);
        assert!(!ctx.timer().running);
        assert_eq!(ctx.pool.in_use(), 0);
    }

    #[test]
    fn pool_exhaustion_leaves_state_unchanged() {
        let pool = PacketPool::new(1);
        let mut ctx = ctx_with(Arc::clone(&pool), DEFAULT_MAX_RETRIES);
        let held = Packet::ack(&pool, 1).unwrap();
        assert!(ctx.handle_incoming(SET_RGB_15).is_ok());
        assert!(ctx.to_send().is_none());
        assert!(ctx.handle_incoming(b"garbage").is_err());
        assert!(ctx.to_send().is_none());
        drop(held);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn controller_and_peripheral_exchange() {
        let pool = PacketPool::new(crate::pool::DEFAULT_POOL_SLOTS);
        let mut controller = ctx_with(Arc::clone(&pool), DEFAULT_MAX_RETRIES);
        let mut peripheral = ctx_with(Arc::clone(&pool), DEFAULT_MAX_RETRIES);

        let params = [
            Param::new(Key::Red, 1),
            Param::new(Key::Green, 2),
            Param::new(Key::Blue, 3),
        ];
        let msg = controller.send(Command::SetRgb, &params).unwrap();
        let wire = controller.pending_output().unwrap().to_vec();
        controller.mark_sent();

        // corrupted in transit: peripheral nacks, controller resends
        let mut noisy = wire.clone();
        noisy[3] ^= 0x01;
        assert!(peripheral.handle_incoming(&noisy).is_err());
        let nack = peripheral.pending_output().unwrap().to_vec();
        peripheral.mark_sent();
        controller.handle_incoming(&nack).unwrap();
        let resent = controller.pending_output().unwrap().to_vec();
        assert_eq!(resent, wire);
        controller.mark_sent();

        let frame = peripheral.handle_incoming(&resent).unwrap();
        assert_eq!(frame.params(), &params);
        let ack = peripheral.pending_output().unwrap().to_vec();
        peripheral.mark_sent();

        controller.handle_incoming(&ack).unwrap();
        assert_eq!(controller.state(), LinkState::Idle);
        assert_eq!(controller.stats().delivered, 1);
        assert_eq!(frame.msg_num, msg);
        assert_eq!(pool.in_use(), 0);
    }
}
