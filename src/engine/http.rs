// Lorekeep: HTTP retry helpers
//
// Used by the generation and embedding clients. Transient statuses (429 and
// the 5xx gateway family) are retried up to MAX_RETRIES times with doubling
// backoff from 1s to 30s, jittered by a quarter either way. An integer
// `Retry-After` header stretches the wait, up to 60s.

use std::time::{Duration, SystemTime};

/// Maximum number of retry attempts per request.
pub const MAX_RETRIES: u32 = 3;

const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Transient statuses worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Backoff before retry number `attempt + 1`, without sleeping.
pub fn backoff_ms(attempt: u32, retry_after_secs: Option<u64>) -> u64 {
    let base_ms = INITIAL_RETRY_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt.min(16)));
    let capped_ms = base_ms.min(MAX_RETRY_DELAY_MS);
    match retry_after_secs {
        // Server hint capped at 60s, never shorter than our own backoff.
        Some(secs) => (secs.min(60) * 1000).max(capped_ms),
        None => capped_ms,
    }
}

/// Sleep with exponential backoff + jitter. Returns the delay for logging.
pub async fn retry_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let delay = Duration::from_millis(apply_jitter(backoff_ms(attempt, retry_after_secs)));
    tokio::time::sleep(delay).await;
    delay
}

fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 4) as i64;
    if jitter_range == 0 {
        return base_ms.max(100);
    }
    let offset = (rand_jitter() % (2 * jitter_range + 1)) - jitter_range;
    (base_ms as i64 + offset).max(100) as u64
}

/// Jitter source from the clock's sub-second nanos.
fn rand_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}

/// Parse a Retry-After header value (integer seconds only).
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

/// Truncate to at most `max_bytes` without splitting a UTF-8 char.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for s in [429, 500, 502, 503, 504, 529] {
            assert!(is_retryable_status(s));
        }
        for s in [200, 400, 401, 403, 404] {
            assert!(!is_retryable_status(s));
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_ms(0, None), 1_000);
        assert_eq!(backoff_ms(2, None), 4_000);
        assert_eq!(backoff_ms(10, None), 30_000);
        assert_eq!(backoff_ms(0, Some(5)), 5_000);
        assert_eq!(backoff_ms(0, Some(600)), 60_000);
        assert_eq!(backoff_ms(3, Some(1)), 8_000);
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        for _ in 0..20 {
            let j = apply_jitter(4_000);
            assert!((3_000..=5_000).contains(&j));
        }
        assert_eq!(apply_jitter(1), 100);
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after(" 30 "), Some(30));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn truncate_utf8_respects_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }
}
