//! Stream object: message log, producer fence, metadata, and waiter wakeup
//! behind a single lock.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::StreamError;
use crate::json;
use crate::log::MessageLog;
use crate::offset::{compare_offsets, zero_offset, StartOffset};
use crate::producer::{FenceDecision, ProducerClaim, ProducerTable};
use crate::types::{
    is_json_content_type, normalize_content_type, AppendOptions, AppendOutcome, HeadInfo,
    ReadResult, StreamConfig,
};

/// Snapshot broadcast to waiters whenever the tail, closed flag, or liveness
/// of the stream changes. The per-stream watch channel plays the condvar
/// role: waiters re-check state on every change notification.
#[derive(Debug, Clone)]
pub struct TailSignal {
    pub tail: String,
    pub closed: bool,
    pub deleted: bool,
}

/// Outcome of waiting for the tail to advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailWait {
    /// New data or a close landed past the waited-for offset.
    Ready,
    /// The timeout elapsed with nothing new.
    TimedOut,
    /// The stream was deleted mid-wait.
    Deleted,
}

/// Mutable state guarded by the stream lock.
struct StreamInner {
    log: MessageLog,
    producers: ProducerTable,
    last_stream_seq: Option<String>,
    closed: bool,
    closed_by: Option<ProducerClaim>,
}

/// One stream: append-only log plus metadata, exclusively owned by the
/// registry. Configuration is immutable after creation; everything mutable
/// lives behind one `parking_lot::Mutex`.
pub struct StreamEntry {
    path: String,
    content_type: Option<String>,
    created_at_ms: i64,
    ttl_seconds: Option<u64>,
    expires_at: Option<DateTime<Utc>>,
    producer_idle_ms: i64,
    inner: Mutex<StreamInner>,
    tail_tx: watch::Sender<TailSignal>,
}

impl StreamEntry {
    pub(crate) fn new(
        path: String,
        config: StreamConfig,
        producer_idle_ms: i64,
        now_ms: i64,
    ) -> Arc<Self> {
        let (tail_tx, _) = watch::channel(TailSignal {
            tail: zero_offset(),
            closed: false,
            deleted: false,
        });
        Arc::new(Self {
            path,
            content_type: config.content_type,
            created_at_ms: now_ms,
            ttl_seconds: config.ttl_seconds,
            expires_at: config.expires_at,
            producer_idle_ms,
            inner: Mutex::new(StreamInner {
                log: MessageLog::new(),
                producers: ProducerTable::new(),
                last_stream_seq: None,
                closed: false,
                closed_by: None,
            }),
            tail_tx,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(is_json_content_type)
    }

    /// Whether the stream's TTL or absolute expiry has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            return now >= expires_at;
        }
        if let Some(ttl) = self.ttl_seconds {
            return now.timestamp_millis() >= self.created_at_ms + ttl as i64 * 1000;
        }
        false
    }

    /// Whether a create request carries the same configuration identity.
    pub fn config_matches(&self, config: &StreamConfig) -> bool {
        let same_content_type = match (&self.content_type, &config.content_type) {
            (Some(a), Some(b)) => normalize_content_type(a) == normalize_content_type(b),
            (None, None) => true,
            _ => false,
        };
        same_content_type
            && self.ttl_seconds == config.ttl_seconds
            && self.expires_at == config.expires_at
    }

    /// Subscribe to tail changes. Used by long-poll and SSE waiters.
    pub fn subscribe(&self) -> watch::Receiver<TailSignal> {
        self.tail_tx.subscribe()
    }

    /// Metadata snapshot.
    pub fn head(&self) -> HeadInfo {
        let inner = self.inner.lock();
        HeadInfo {
            content_type: self.content_type.clone(),
            tail: inner.log.tail().to_string(),
            closed: inner.closed,
            ttl_seconds: self.ttl_seconds,
            expires_at: self.expires_at,
        }
    }

    /// The current tail offset.
    pub fn tail(&self) -> String {
        self.inner.lock().log.tail().to_string()
    }

    /// Append a request body.
    ///
    /// Validation, JSON splitting, the fence decision, the log writes, the
    /// close flag, and the waiter wakeup all land in one critical section,
    /// so fence state and log contents are never observed out of step.
    pub fn append(
        &self,
        body: Bytes,
        opts: &AppendOptions,
        now_ms: i64,
    ) -> Result<AppendOutcome, StreamError> {
        if let (Some(request_ct), Some(stream_ct)) = (&opts.content_type, &self.content_type) {
            if normalize_content_type(request_ct) != normalize_content_type(stream_ct) {
                return Err(StreamError::ContentTypeMismatch {
                    expected: stream_ct.clone(),
                    actual: request_ct.clone(),
                });
            }
        }

        // An empty body is only meaningful as a bare close
        let close_only = body.is_empty() && opts.close;
        if body.is_empty() && !opts.close {
            return Err(StreamError::EmptyBody);
        }

        let payloads = if close_only {
            Vec::new()
        } else if self.is_json() {
            let payloads = json::split_json_body(&body)?;
            if payloads.is_empty() {
                return Err(StreamError::EmptyJsonArray);
            }
            payloads
        } else {
            vec![body]
        };

        let mut inner = self.inner.lock();

        if inner.closed {
            // A retried closing append replays idempotently
            if let (Some(claim), Some(closed_by)) = (&opts.producer, &inner.closed_by) {
                if claim == closed_by {
                    return Ok(AppendOutcome::Duplicate {
                        next_offset: inner.log.tail().to_string(),
                        closed: true,
                    });
                }
            }
            if close_only {
                return Ok(AppendOutcome::Appended {
                    next_offset: inner.log.tail().to_string(),
                    closed: true,
                });
            }
            return Err(StreamError::Closed);
        }

        if let Some(claim) = &opts.producer {
            match inner.producers.check(claim) {
                FenceDecision::Accepted => {}
                FenceDecision::Duplicate { offset } => {
                    return Ok(AppendOutcome::Duplicate {
                        next_offset: offset,
                        closed: inner.closed,
                    });
                }
                FenceDecision::StaleEpoch { current_epoch } => {
                    return Err(StreamError::StaleEpoch { current_epoch });
                }
                FenceDecision::SequenceGap { expected, received } => {
                    return Err(StreamError::SequenceGap { expected, received });
                }
                FenceDecision::SequenceBehind { last_seq, received } => {
                    return Err(StreamError::SequenceBehind { last_seq, received });
                }
            }
        }

        if let Some(seq) = &opts.stream_seq {
            if let Some(last) = &inner.last_stream_seq {
                if seq.as_str() <= last.as_str() {
                    return Err(StreamError::SeqRegression {
                        last: last.clone(),
                        received: seq.clone(),
                    });
                }
            }
        }

        let mut next_offset = inner.log.tail().to_string();
        for payload in payloads {
            next_offset = inner.log.append(payload, now_ms);
        }
        if let Some(seq) = &opts.stream_seq {
            inner.last_stream_seq = Some(seq.clone());
        }
        if let Some(claim) = &opts.producer {
            inner.producers.record(claim, next_offset.clone(), now_ms);
            inner.producers.collect_idle(now_ms, self.producer_idle_ms);
        }
        if opts.close {
            inner.closed = true;
            inner.closed_by = opts.producer.clone();
        }

        // Wake waiters while still holding the lock so a waiter that saw the
        // old tail is guaranteed to be signalled about this one
        self.tail_tx.send_replace(TailSignal {
            tail: next_offset.clone(),
            closed: inner.closed,
            deleted: false,
        });

        debug!(path = %self.path, offset = %next_offset, "appended to stream");

        Ok(AppendOutcome::Appended {
            next_offset,
            closed: inner.closed,
        })
    }

    /// Read everything strictly after the requested position.
    pub fn read(&self, from: &StartOffset) -> ReadResult {
        let inner = self.inner.lock();
        let tail = inner.log.tail().to_string();

        let (messages, next_offset) = match from {
            StartOffset::Beginning => {
                let messages = inner.log.all().to_vec();
                let next = messages
                    .last()
                    .map(|m| m.offset.clone())
                    .unwrap_or_else(|| tail.clone());
                (messages, next)
            }
            StartOffset::Now => (Vec::new(), tail.clone()),
            StartOffset::At(offset) => {
                let messages = inner.log.messages_after(offset).to_vec();
                let next = messages
                    .last()
                    .map(|m| m.offset.clone())
                    .unwrap_or_else(|| offset.clone());
                (messages, next)
            }
        };

        let up_to_date = compare_offsets(&next_offset, &tail) != std::cmp::Ordering::Less;

        ReadResult {
            messages,
            next_offset,
            up_to_date,
            closed: inner.closed,
        }
    }

    /// Mark the stream closed. Idempotent; the first closer is recorded.
    pub fn close(&self, by: Option<ProducerClaim>) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.closed_by = by;
        self.tail_tx.send_replace(TailSignal {
            tail: inner.log.tail().to_string(),
            closed: true,
            deleted: false,
        });
    }

    /// Block until the tail advances past `after`, the stream closes, the
    /// stream is deleted, or the timeout elapses. Spurious wakeups loop and
    /// re-check, condvar style.
    pub async fn wait_for_tail(&self, after: &str, timeout: Duration) -> TailWait {
        let mut rx = self.tail_tx.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let signal = rx.borrow_and_update();
                if signal.deleted {
                    return TailWait::Deleted;
                }
                if signal.closed
                    || compare_offsets(&signal.tail, after) == std::cmp::Ordering::Greater
                {
                    return TailWait::Ready;
                }
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return TailWait::Deleted;
                    }
                }
                () = tokio::time::sleep_until(deadline) => return TailWait::TimedOut,
            }
        }
    }

    /// Flag the stream as deleted and wake all waiters. Called by the
    /// registry when the stream is removed or expires.
    pub(crate) fn mark_deleted(&self) {
        self.tail_tx.send_modify(|signal| signal.deleted = true);
    }
}

impl std::fmt::Debug for StreamEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEntry")
            .field("path", &self.path)
            .field("content_type", &self.content_type)
            .field("created_at_ms", &self.created_at_ms)
            .finish_non_exhaustive()
    }
}
