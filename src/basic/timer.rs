//! The Timer object: a periodic source of Tick events

use std::time::{Duration, Instant};

use tracing::debug;

use crate::basic::value::parse_number;

pub const MIN_INTERVAL_MS: u64 = 10;
pub const MAX_INTERVAL_MS: u64 = 100_000_000;

#[derive(Debug)]
pub struct Timer {
    interval_ms: u64,
    /// When the next tick is due; `None` while paused
    next_due: Option<Instant>,
    /// First body statement of the bound Tick subroutine
    handler: Option<usize>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            interval_ms: MAX_INTERVAL_MS,
            next_due: None,
            handler: None,
        }
    }

    pub fn interval(&self) -> String {
        self.interval_ms.to_string()
    }

    /// Set the interval, clamped to the allowed range, and restart.
    /// Non-numeric input selects the shortest interval.
    pub fn set_interval(&mut self, value: &str, now: Instant) {
        self.interval_ms = match parse_number(value) {
            Some(ms) => (ms.trunc().max(0.0) as u64).clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS),
            None => MIN_INTERVAL_MS,
        };
        debug!(interval_ms = self.interval_ms, "timer interval set");
        self.resume(now);
    }

    pub fn pause(&mut self) {
        self.next_due = None;
    }

    /// Start counting a full interval from `now`
    pub fn resume(&mut self, now: Instant) {
        self.next_due = Some(now + Duration::from_millis(self.interval_ms));
    }

    pub fn bind_tick(&mut self, handler: usize) {
        self.handler = Some(handler);
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Whether this timer can still fire a handler
    pub fn is_live(&self) -> bool {
        self.is_running() && self.handler.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// The handler to run if a tick is due at `now`; schedules the next one
    pub fn poll(&mut self, now: Instant) -> Option<usize> {
        let due = self.next_due?;
        if now < due {
            return None;
        }
        self.next_due = Some(now + Duration::from_millis(self.interval_ms));
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_clamped() {
        let now = Instant::now();
        let mut timer = Timer::new();
        assert_eq!(timer.interval(), "100000000");

        timer.set_interval("1", now);
        assert_eq!(timer.interval(), "10");
        timer.set_interval("999999999999", now);
        assert_eq!(timer.interval(), "100000000");
        timer.set_interval("soon", now);
        assert_eq!(timer.interval(), "10");
        timer.set_interval("250", now);
        assert_eq!(timer.interval(), "250");
    }

    #[test]
    fn test_fires_only_when_due_and_bound() {
        let start = Instant::now();
        let mut timer = Timer::new();
        timer.set_interval("100", start);
        assert!(timer.is_running());
        assert!(!timer.is_live());
        assert_eq!(timer.poll(start + Duration::from_millis(150)), None);

        timer.bind_tick(7);
        let t = start + Duration::from_millis(300);
        timer.resume(start);
        assert_eq!(timer.poll(start + Duration::from_millis(50)), None);
        assert_eq!(timer.poll(t), Some(7));
        assert_eq!(timer.poll(t), None);
        assert_eq!(timer.next_due(), Some(t + Duration::from_millis(100)));
    }

    #[test]
    fn test_pause_stops_ticks() {
        let start = Instant::now();
        let mut timer = Timer::new();
        timer.bind_tick(1);
        timer.set_interval("10", start);
        timer.pause();
        assert!(!timer.is_live());
        assert_eq!(timer.poll(start + Duration::from_secs(1)), None);
    }
}
