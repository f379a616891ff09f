//! Throttle scheduler.
//!
//! One timer per session. Scheduling while the timer is already armed keeps
//! the existing deadline, so a burst of snapshots inside one window produces a
//! single flush carrying only the latest text.

use std::time::Duration;

use tokio::time::Instant;

/// Single-deadline coalescing timer.
#[derive(Clone, Debug)]
pub struct Throttle {
    interval: Duration,
    deadline: Option<Instant>,
}

impl Throttle {
    /// Timer firing `interval` after it is scheduled.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Arm the timer unless it is already running. Returns whether it was armed now.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.interval);
        true
    }

    /// When the armed timer fires.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the timer is armed.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume a firing at `now`. Returns false when nothing was due.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Disarm without firing.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_keeps_first_deadline() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(500));
        assert!(throttle.schedule(start));
        assert!(!throttle.schedule(start + Duration::from_millis(300)));
        assert_eq!(throttle.deadline(), Some(start + Duration::from_millis(500)));
    }

    #[test]
    fn fire_only_when_due() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(500));
        let _ = throttle.schedule(start);
        assert!(!throttle.fire(start + Duration::from_millis(499)));
        assert!(throttle.is_pending());
        assert!(throttle.fire(start + Duration::from_millis(500)));
        assert!(!throttle.is_pending());
        assert!(!throttle.fire(start + Duration::from_secs(5)));
    }

    #[test]
    fn cancel_disarms() {
        let mut throttle = Throttle::new(Duration::from_millis(50));
        assert!(!throttle.cancel());
        let _ = throttle.schedule(Instant::now());
        assert!(throttle.cancel());
        assert_eq!(throttle.deadline(), None);
    }
}
