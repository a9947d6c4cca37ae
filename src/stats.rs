use std::time::{Duration, Instant};

use log::info;

/// Link counters, reported periodically at info level.
#[derive(Debug, Clone)]
pub struct LinkStats {
    pub rx_ok: u64,
    pub rx_bad: u64,
    pub acks: u64,
    pub nacks: u64,
    pub resends: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    last: Instant,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            rx_ok: 0,
            rx_bad: 0,
            acks: 0,
            nacks: 0,
            resends: 0,
            delivered: 0,
            failed: 0,
            dropped: 0,
            bytes_in: 0,
            bytes_out: 0,
            last: Instant::now(),
        }
    }

    pub fn add_bytes_in(&mut self, n: usize) {
        self.bytes_in += n as u64;
    }
    pub fn add_bytes_out(&mut self, n: usize) {
        self.bytes_out += n as u64;
    }

    pub fn maybe_print(&mut self, interval: Duration) {
        if self.last.elapsed() >= interval {
            info!(
                "[link] ok={} bad={} acks={} nacks={} resends={} delivered={} failed={} dropped={} in={}B out={}B",
                self.rx_ok,
                self.rx_bad,
                self.acks,
                self.nacks,
                self.resends,
                self.delivered,
                self.failed,
                self.dropped,
                self.bytes_in,
                self.bytes_out,
            );
            self.last = Instant::now();
        }
    }
}
