//! Countdown sources.
//!
//! One slot per timer contract. The loop arms a slot when its first
//! subscription appears and recomputes the deadline after every fire.

/// Timer behavior after expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Fires once, then disarms until re-subscribed.
    OneShot,
    /// Fires on every period boundary.
    Periodic,
}

pub(crate) struct TimerSlot {
    pub contract: u16,
    pub mode: TimerMode,
    pub period_ms: u32,
    pub deadline: u64,
    pub armed: bool,
}

impl TimerSlot {
    pub fn new(contract: u16, mode: TimerMode, period_ms: u32) -> Self {
        Self {
            contract,
            mode,
            period_ms,
            deadline: 0,
            armed: false,
        }
    }

    pub fn arm(&mut self, now: u64) {
        self.deadline = now + u64::from(self.period_ms);
        self.armed = true;
    }

    pub fn due(&self, now: u64) -> bool {
        self.armed && self.deadline <= now
    }

    /// Advance after a fire.
    ///
    /// Periodic deadlines move along the original grid — previous
    /// deadline plus period, never `now` plus period — so dispatch
    /// latency does not accumulate as drift. Periods that elapsed
    /// entirely while the loop was busy collapse into the first grid
    /// point after `now`: at most one fire per poll.
    pub fn rearm(&mut self, now: u64) {
        match self.mode {
            TimerMode::OneShot => self.armed = false,
            TimerMode::Periodic => {
                let period = u64::from(self.period_ms);
                self.deadline += period;
                if self.deadline <= now {
                    let missed = (now - self.deadline) / period + 1;
                    self.deadline += missed * period;
                }
            }
        }
    }
}
