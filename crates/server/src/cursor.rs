//! Time-bucketed CDN cursor.
//!
//! The cursor divides wall time into fixed intervals counted from a fixed
//! epoch, so identical `(offset, cursor)` GETs collapse in intermediate
//! caches within one interval and roll over cleanly at the boundary. It is a
//! cache token, not consumer state.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Cursor bucket parameters.
#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Interval duration in seconds.
    pub interval_seconds: u64,
    /// Fixed epoch the buckets are counted from.
    pub epoch: DateTime<Utc>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            interval_seconds: 20,
            epoch: DateTime::parse_from_rfc3339("2024-10-09T00:00:00Z")
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
        }
    }
}

/// The bucket the given instant falls into.
pub fn cursor_at(now: DateTime<Utc>, options: &CursorOptions) -> u64 {
    let elapsed = now.signed_duration_since(options.epoch).num_seconds().max(0) as u64;
    elapsed / options.interval_seconds.max(1)
}

/// The current bucket.
pub fn current_cursor(options: &CursorOptions) -> u64 {
    cursor_at(Utc::now(), options)
}

/// Compute the cursor to return for a request.
///
/// Clients behind the current bucket are pulled up to it. A client at or
/// ahead of the current bucket gets a strictly larger value with bounded
/// random jitter, keeping per-client cursors monotonic even when clocks
/// disagree.
pub fn response_cursor(client_cursor: Option<u64>, options: &CursorOptions) -> u64 {
    let current = current_cursor(options);
    match client_cursor {
        Some(cursor) if cursor >= current => {
            let jitter_seconds: u64 = rand::thread_rng().gen_range(1..=3600);
            let jitter_intervals = jitter_seconds / options.interval_seconds.max(1);
            cursor + jitter_intervals.max(1)
        }
        Some(cursor) => current.max(cursor),
        None => current,
    }
}

/// Parse a cursor query value.
pub fn parse_cursor(cursor: &str) -> Option<u64> {
    cursor.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_buckets_by_interval() {
        let options = CursorOptions {
            interval_seconds: 20,
            epoch: Utc::now() - chrono::Duration::seconds(100),
        };
        let cursor = current_cursor(&options);
        assert!((4..=6).contains(&cursor));
    }

    #[test]
    fn test_cursor_rolls_over_at_boundary() {
        let options = CursorOptions::default();
        let at = options.epoch + chrono::Duration::seconds(19);
        assert_eq!(cursor_at(at, &options), 0);
        let at = options.epoch + chrono::Duration::seconds(20);
        assert_eq!(cursor_at(at, &options), 1);
    }

    #[test]
    fn test_response_cursor_without_client() {
        let options = CursorOptions::default();
        assert_eq!(response_cursor(None, &options), current_cursor(&options));
    }

    #[test]
    fn test_response_cursor_client_behind() {
        let options = CursorOptions {
            interval_seconds: 20,
            epoch: Utc::now() - chrono::Duration::seconds(1000),
        };
        let current = current_cursor(&options);
        assert_eq!(response_cursor(Some(current - 10), &options), current);
    }

    #[test]
    fn test_response_cursor_client_ahead_advances() {
        let options = CursorOptions::default();
        let ahead = current_cursor(&options) + 100;
        assert!(response_cursor(Some(ahead), &options) > ahead);
    }

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor("12345"), Some(12345));
        assert_eq!(parse_cursor("not-a-cursor"), None);
    }
}
