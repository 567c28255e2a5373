use std::time::Duration;

/// Wait schedule for a producer facing a full queue
///
/// The n-th consecutive attempt waits `floor(log2(n))` units, capped at
/// `max`. The first retry is immediate, the second and third wait one unit,
/// the fourth through seventh two units, and so on.
#[derive(Debug, Clone, Copy)]
pub struct QueueBackoff {
    unit: Duration,
    max: Duration,
}

impl QueueBackoff {
    pub const fn new(unit: Duration, max: Duration) -> Self {
        Self { unit, max }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.unit.saturating_mul(attempt.ilog2()).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logarithmic_growth() {
        let backoff = QueueBackoff::new(Duration::from_millis(100), Duration::from_secs(60));
        assert_eq!(backoff.delay(0).as_millis(), 0);
        assert_eq!(backoff.delay(1).as_millis(), 0);
        assert_eq!(backoff.delay(2).as_millis(), 100);
        assert_eq!(backoff.delay(3).as_millis(), 100);
        assert_eq!(backoff.delay(4).as_millis(), 200);
        assert_eq!(backoff.delay(7).as_millis(), 200);
        assert_eq!(backoff.delay(8).as_millis(), 300);
        assert_eq!(backoff.delay(1024).as_millis(), 1000);
    }

    #[test]
    fn test_max_cap() {
        let backoff = QueueBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(5));
    }
}
