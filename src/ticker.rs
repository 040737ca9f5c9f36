use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    next: Option<Instant>,
}

impl Ticker {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    #[cfg(test)]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.next.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// (Re)arms the ticker; the first fire is one interval from `now`.
    pub fn start_at(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    /// Changes the interval. An active ticker is re-armed from `now`.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        if self.is_active() {
            self.start_at(now);
        }
    }

    /// Returns true when the deadline has passed and schedules the next
    /// one. Missed intervals are not replayed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next {
            Some(at) if now >= at => {
                let mut next = at + self.interval;
                if next <= now {
                    next = now + self.interval;
                }
                self.next = Some(next);
                true
            }
            _ => false,
        }
    }
}

/// The earliest of a set of optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}
