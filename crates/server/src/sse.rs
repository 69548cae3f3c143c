//! Server-Sent Events delivery.
//!
//! Frames on the wire alternate between data events (one per message) and
//! control events carrying the reader's new position, so a client that
//! reconnects with the last control offset resumes with no gaps and no
//! duplicates:
//!
//! ```text
//! event: data
//! data: {"a":1}
//!
//! event: control
//! data: {"offset":"0000000000000001_0000000000000007","upToDate":true,"cursor":"123"}
//!
//! : keepalive
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::Stream;

use crate::cursor::{current_cursor, CursorOptions};
use crate::offset::{compare_offsets, StartOffset};
use crate::stream::StreamEntry;

/// How often a comment keep-alive goes out while the stream is idle.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Per-connection SSE settings.
#[derive(Debug, Clone)]
pub struct SseSettings {
    pub cursor: CursorOptions,
    /// Base64-encode payloads (`encoding=base64`, for binary streams).
    pub base64: bool,
}

/// Build the SSE response for a reader positioned at `position`.
pub fn sse_response(
    entry: Arc<StreamEntry>,
    position: String,
    initial_cursor: u64,
    settings: SseSettings,
) -> Response {
    let stream = event_stream(entry, position, initial_cursor, settings);
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(KEEPALIVE_INTERVAL)
                .text("keepalive"),
        )
        .into_response()
}

/// The event loop: drain what is readable, emit a control frame, then park
/// on the stream's tail signal until something changes.
fn event_stream(
    entry: Arc<StreamEntry>,
    mut position: String,
    initial_cursor: u64,
    settings: SseSettings,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut rx = entry.subscribe();
        let mut last_cursor = initial_cursor;

        'session: loop {
            let result = entry.read(&StartOffset::At(position.clone()));
            for message in &result.messages {
                yield Ok(Event::default()
                    .event("data")
                    .data(encode_payload(&message.data, settings.base64)));
            }
            position = result.next_offset.clone();

            last_cursor = last_cursor.max(current_cursor(&settings.cursor));
            yield Ok(Event::default()
                .event("control")
                .data(control_payload(&result.next_offset, result.up_to_date, last_cursor)));

            if result.closed && result.up_to_date {
                break 'session;
            }

            // Park until the tail moves past us, the stream closes, or it is
            // deleted out from under us
            loop {
                {
                    let signal = rx.borrow_and_update();
                    if signal.deleted {
                        break 'session;
                    }
                    if signal.closed
                        || compare_offsets(&signal.tail, &position) == std::cmp::Ordering::Greater
                    {
                        break;
                    }
                }
                if rx.changed().await.is_err() {
                    break 'session;
                }
            }
        }
    }
}

/// Message bytes as an SSE payload: UTF-8 text for textual/JSON streams,
/// base64 when requested for binary ones.
fn encode_payload(data: &[u8], base64: bool) -> String {
    if base64 {
        BASE64.encode(data)
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}

/// The control frame body.
fn control_payload(offset: &str, up_to_date: bool, cursor: u64) -> String {
    serde_json::json!({
        "offset": offset,
        "upToDate": up_to_date,
        "cursor": cursor.to_string(),
    })
    .to_string()
}
