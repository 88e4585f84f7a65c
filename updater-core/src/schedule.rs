/// When the main loop should run the next update check
use core::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSchedule {
    interval: Duration,
    last: Option<Duration>,
}

impl CheckSchedule {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Due on the first poll, then once per interval.
    pub fn is_due(&self, now: Duration) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        }
    }

    /// Returns true and restarts the interval when a check is due.
    pub fn poll(&mut self, now: Duration) -> bool {
        if self.is_due(now) {
            self.last = Some(now);
            true
        } else {
            false
        }
    }

    /// Make the next poll fire immediately, e.g. after the network comes back.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
