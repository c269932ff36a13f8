//! Wall-clock helpers and the injectable clock the task poller runs on.

use std::time::Duration;

use async_trait::async_trait;

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns true when `expires_unix` is present and no longer in the future.
pub fn is_expired_unix(expires_unix: Option<u64>, now_unix: u64) -> bool {
    matches!(expires_unix, Some(value) if value <= now_unix)
}

#[async_trait]
/// Time source for polling loops.
///
/// `now` is monotonic and measured from an arbitrary origin; only differences
/// between readings are meaningful.
pub trait PollClock: Send + Sync {
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
/// [`PollClock`] backed by the tokio timer.
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PollClock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        current_unix_timestamp, current_unix_timestamp_ms, is_expired_unix, PollClock, TokioClock,
    };

    #[test]
    fn unix_helpers_agree_within_a_second() {
        let now_s = current_unix_timestamp();
        let now_ms_s = current_unix_timestamp_ms() / 1_000;
        assert!(now_ms_s >= now_s);
        assert!(now_ms_s <= now_s.saturating_add(1));
    }

    #[test]
    fn expiry_treats_missing_as_never() {
        assert!(!is_expired_unix(None, 10));
        assert!(is_expired_unix(Some(10), 10));
        assert!(!is_expired_unix(Some(11), 10));
    }

    #[tokio::test]
    async fn tokio_clock_advances_across_sleep() {
        let clock = TokioClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() >= before + Duration::from_millis(5));
    }
}
