use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Estimated number of seconds the tracked log position is behind real time.
///
/// Written by the task applying the change log and read concurrently by the catch-up loop.
#[derive(Debug, Clone)]
pub struct LagEstimate {
    seconds: Arc<AtomicI64>,
}

impl LagEstimate {
    /// Value meaning that no entry was applied yet.
    pub const UNBOUNDED: i64 = i64::MAX;

    pub fn new() -> Self {
        Self {
            seconds: Arc::new(AtomicI64::new(Self::UNBOUNDED)),
        }
    }

    pub fn reset(&self) {
        self.seconds.store(Self::UNBOUNDED, Ordering::SeqCst);
    }

    pub fn set(&self, seconds: i64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }

    /// Sets the lag from the commit timestamp of the last applied entry. A timestamp in the
    /// future counts as no lag.
    pub fn record_from_timestamp(&self, timestamp: DateTime<Utc>) -> i64 {
        let seconds = (Utc::now() - timestamp).num_seconds().max(0);
        self.set(seconds);

        seconds
    }

    pub fn seconds(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }

    /// Returns `true` if the lag is known and not above `max`.
    pub fn is_within(&self, max: Duration) -> bool {
        let max = i64::try_from(max.as_secs()).unwrap_or(i64::MAX);
        let seconds = self.seconds();

        seconds != Self::UNBOUNDED && seconds <= max
    }
}

impl Default for LagEstimate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn unbounded_until_recorded() {
        let lag = LagEstimate::new();
        assert!(!lag.is_within(Duration::from_secs(u64::MAX)));

        lag.record_from_timestamp(Utc::now() - TimeDelta::seconds(30));
        assert!(lag.seconds() >= 30);
        assert!(!lag.is_within(Duration::from_secs(1)));
        assert!(lag.is_within(Duration::from_secs(3600)));

        lag.reset();
        assert_eq!(lag.seconds(), LagEstimate::UNBOUNDED);
    }

    #[test]
    fn future_timestamps_count_as_no_lag() {
        let lag = LagEstimate::new();
        assert_eq!(lag.record_from_timestamp(Utc::now() + TimeDelta::seconds(60)), 0);
        assert!(lag.is_within(Duration::ZERO));
    }
}
