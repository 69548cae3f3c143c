//! Core types for the durable streams server.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::producer::ProducerClaim;

/// A message stored in a stream.
///
/// Immutable once appended. The offset is the message's own end position,
/// pre-formatted so readers can emit position headers without re-formatting.
#[derive(Debug, Clone)]
pub struct Message {
    /// Raw message bytes. Never empty.
    pub data: Bytes,
    /// Server-minted offset through the tail of this message.
    pub offset: String,
    /// Append time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// Configuration supplied at stream creation.
///
/// The configuration identity for idempotent creates is the normalized
/// content type plus whichever of TTL / expires-at is set.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub content_type: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Options accompanying a single append request.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Request Content-Type; must match the stream's when both are set.
    pub content_type: Option<String>,
    /// Per-stream monotonic writer coordination token (`Stream-Seq`).
    pub stream_seq: Option<String>,
    /// Producer fence triple (`Producer-Id`/`Producer-Epoch`/`Producer-Seq`).
    pub producer: Option<ProducerClaim>,
    /// Close the stream after this append (`Stream-Closed: true`).
    pub close: bool,
}

/// Result of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Data accepted; `next_offset` is the new tail.
    Appended { next_offset: String, closed: bool },
    /// Idempotent replay; `next_offset` repeats the original acknowledgement.
    Duplicate { next_offset: String, closed: bool },
}

impl AppendOutcome {
    pub fn next_offset(&self) -> &str {
        match self {
            AppendOutcome::Appended { next_offset, .. } => next_offset,
            AppendOutcome::Duplicate { next_offset, .. } => next_offset,
        }
    }

    pub fn closed(&self) -> bool {
        match self {
            AppendOutcome::Appended { closed, .. } => *closed,
            AppendOutcome::Duplicate { closed, .. } => *closed,
        }
    }
}

/// Result of reading from a stream.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Messages strictly after the requested offset.
    pub messages: Vec<Message>,
    /// Next offset to use for subsequent reads.
    pub next_offset: String,
    /// Whether the response covers everything up to the tail.
    pub up_to_date: bool,
    /// Whether the stream is closed to further appends.
    pub closed: bool,
}

/// Stream metadata snapshot, as served on HEAD.
#[derive(Debug, Clone)]
pub struct HeadInfo {
    pub content_type: Option<String>,
    pub tail: String,
    pub closed: bool,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Port to listen on (0 for auto-assign).
    pub port: u16,
    /// Host to bind to.
    pub host: String,
    /// Long-poll timeout in milliseconds.
    pub long_poll_timeout_ms: u64,
    /// Enable gzip/deflate response compression.
    pub compression: bool,
    /// Cursor interval in seconds.
    pub cursor_interval_seconds: u64,
    /// Cursor epoch for interval calculation.
    pub cursor_epoch: DateTime<Utc>,
    /// Registry sweep cadence in milliseconds.
    pub sweep_interval_ms: u64,
    /// Idle window after which per-stream producer state is collected.
    pub producer_idle_seconds: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: 4437,
            host: "127.0.0.1".to_string(),
            long_poll_timeout_ms: 30_000,
            compression: true,
            cursor_interval_seconds: 20,
            // Fixed server constant so cursors are comparable across restarts
            cursor_epoch: DateTime::parse_from_rfc3339("2024-10-09T00:00:00Z")
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
            sweep_interval_ms: 1_000,
            producer_idle_seconds: 7 * 24 * 3600,
        }
    }
}

/// Normalize a content type: strip parameters, trim, lowercase.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Whether a content type selects JSON mode.
pub fn is_json_content_type(content_type: &str) -> bool {
    normalize_content_type(content_type) == "application/json"
}
