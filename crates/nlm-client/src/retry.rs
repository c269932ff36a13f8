use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::clock::current_unix_timestamp_ms;

/// Distance between consecutive `_reqid` values, as the web client steps.
pub const REQUEST_ID_STEP: u64 = 100_000;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Statuses after which the same request may succeed later: request
/// timeout, too early, rate limiting and server-side failures.
pub fn should_retry_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500..=599)
}

/// Returns a value in [50%, 100%] of `base_ms`.
pub fn jittered_ms(base_ms: u64) -> u64 {
    if base_ms <= 1 {
        return base_ms;
    }
    let low = base_ms / 2;
    let width = base_ms.saturating_sub(low);
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17) ^ 0xA24B_AED4_963E_E407;
    low.saturating_add(mixed % width.saturating_add(1))
}

/// Server-requested back-off from `Retry-After`, in milliseconds.
pub fn parse_retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    retry_after_delay_ms(raw, Utc::now())
}

/// Interprets a `Retry-After` value as delta-seconds or an HTTP date
/// relative to `now`. Dates in the past mean no wait.
pub fn retry_after_delay_ms(raw: &str, now: DateTime<Utc>) -> Option<u64> {
    let raw = raw.trim();
    match raw.parse::<u64>() {
        Ok(seconds) => Some(seconds.saturating_mul(1_000)),
        Err(_) => {
            let retry_at = DateTime::parse_from_rfc2822(raw).ok()?;
            let delay = retry_at.with_timezone(&Utc) - now;
            Some(u64::try_from(delay.num_milliseconds()).unwrap_or(0))
        }
    }
}

#[derive(Debug)]
/// Monotonic `_reqid` source, seeded from the clock.
pub struct RequestIdSequence {
    next: AtomicU64,
}

impl RequestIdSequence {
    pub fn new() -> Self {
        Self::starting_at(current_unix_timestamp_ms() % REQUEST_ID_STEP)
    }

    pub fn starting_at(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next
            .fetch_add(REQUEST_ID_STEP, Ordering::Relaxed)
            .saturating_add(REQUEST_ID_STEP)
    }
}

impl Default for RequestIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlation id sent in `x-nlm-request-id`.
pub fn new_request_id() -> String {
    let millis = current_unix_timestamp_ms();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("nlm-rs-{millis}-{count}")
}
