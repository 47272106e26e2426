use std::time::{Duration, Instant};

/// Gate for warnings that would otherwise fire on every frame.
///
/// Occurrences swallowed between two admitted warnings are counted so the next
/// warning can say how many it stands for.
#[derive(Debug)]
pub struct RateLimitedWarn {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl RateLimitedWarn {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(n)` at most once per interval, where `n` is the number of occurrences
    /// suppressed since the previous admitted one. `None` otherwise.
    pub fn admit(&mut self) -> Option<u64> {
        self.admit_at(Instant::now())
    }

    fn admit_at(&mut self, now: Instant) -> Option<u64> {
        let due = self
            .last
            .map_or(true, |prev| now.saturating_duration_since(prev) >= self.interval);
        if !due {
            self.suppressed += 1;
            return None;
        }
        self.last = Some(now);
        Some(std::mem::take(&mut self.suppressed))
    }

    /// Occurrences swallowed since the last admitted one.
    pub fn pending(&self) -> u64 {
        self.suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warns_once_per_interval() {
        let mut limiter = RateLimitedWarn::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at(t0), Some(0));
        assert_eq!(limiter.admit_at(t0 + Duration::from_secs(1)), None);
        assert_eq!(limiter.admit_at(t0 + Duration::from_secs(4)), None);
        assert_eq!(limiter.pending(), 2);
    }

    #[test]
    fn next_warning_reports_what_was_swallowed() {
        let mut limiter = RateLimitedWarn::new(Duration::from_secs(5));
        let t0 = Instant::now();

        limiter.admit_at(t0);
        for i in 1..=3 {
            assert_eq!(limiter.admit_at(t0 + Duration::from_secs(i)), None);
        }
        assert_eq!(limiter.admit_at(t0 + Duration::from_secs(5)), Some(3));
        assert_eq!(limiter.pending(), 0);
        assert_eq!(limiter.admit_at(t0 + Duration::from_secs(6)), None);
        assert_eq!(limiter.admit_at(t0 + Duration::from_secs(11)), Some(1));
    }

    #[test]
    fn zero_interval_always_logs() {
        let mut limiter = RateLimitedWarn::new(Duration::ZERO);
        assert_eq!(limiter.admit(), Some(0));
        assert_eq!(limiter.admit(), Some(0));
    }
}
