use std::time::{Duration, Instant};

/// One-shot timer driving retransmission. Expiry is reported by the host
/// calling [`crate::arq::LinkContext::on_timer_expired`].
pub trait ResendTimer {
    /// Arm (or re-arm) the timer.
    fn start(&mut self, duration: Duration);
    /// Disarm. Must be harmless when not running.
    fn stop(&mut self);
}

/// Polled timer for hosted event loops.
#[derive(Debug, Default, Clone)]
pub struct DeadlineTimer {
    deadline: Option<Instant>,
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before expiry, zero if already due.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns true exactly once per expiry and disarms the timer.
    pub fn poll_expired(&mut self) -> bool {
        match self.deadline {
            Some(d) if Instant::now() >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl ResendTimer for DeadlineTimer {
    fn start(&mut self, duration: Duration) {
        self.deadline = Some(Instant::now() + duration);
    }

    fn stop(&mut self) {
        self.deadline = None;
    }
}
