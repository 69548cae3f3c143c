//! HTTP surface for the durable streams protocol.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, Method, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, head, options, post, put};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::cursor::{parse_cursor, response_cursor, CursorOptions};
use crate::error::StreamError;
use crate::json::join_json_array;
use crate::offset::{StartOffset, OFFSET_BEGINNING};
use crate::producer::ProducerClaim;
use crate::registry::StreamRegistry;
use crate::sse::{sse_response, SseSettings};
use crate::stream::{StreamEntry, TailWait};
use crate::types::{AppendOptions, AppendOutcome, ReadResult, ServerOptions, StreamConfig};

// Protocol headers. Lowercase so they double as `HeaderName::from_static`
// inputs for the CORS expose list.
pub const HEADER_STREAM_NEXT_OFFSET: &str = "stream-next-offset";
pub const HEADER_STREAM_UP_TO_DATE: &str = "stream-up-to-date";
pub const HEADER_STREAM_CURSOR: &str = "stream-cursor";
pub const HEADER_STREAM_CLOSED: &str = "stream-closed";
pub const HEADER_STREAM_SEQ: &str = "stream-seq";
pub const HEADER_STREAM_TTL: &str = "stream-ttl";
pub const HEADER_STREAM_EXPIRES_AT: &str = "stream-expires-at";
pub const HEADER_PRODUCER_ID: &str = "producer-id";
pub const HEADER_PRODUCER_EPOCH: &str = "producer-epoch";
pub const HEADER_PRODUCER_SEQ: &str = "producer-seq";
pub const HEADER_PRODUCER_EXPECTED_SEQ: &str = "producer-expected-seq";
pub const HEADER_PRODUCER_RECEIVED_SEQ: &str = "producer-received-seq";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StreamRegistry>,
    pub options: ServerOptions,
}

impl AppState {
    fn cursor_options(&self) -> CursorOptions {
        CursorOptions {
            interval_seconds: self.options.cursor_interval_seconds,
            epoch: self.options.cursor_epoch,
        }
    }
}

/// Query parameters for GET requests.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    pub cursor: Option<String>,
    pub encoding: Option<String>,
}

/// Create the router with all stream endpoints.
pub fn create_router(state: AppState) -> Router {
    let exposed: Vec<HeaderName> = [
        HEADER_STREAM_NEXT_OFFSET,
        HEADER_STREAM_UP_TO_DATE,
        HEADER_STREAM_CURSOR,
        HEADER_STREAM_CLOSED,
        HEADER_STREAM_TTL,
        HEADER_STREAM_EXPIRES_AT,
        HEADER_PRODUCER_EPOCH,
        HEADER_PRODUCER_EXPECTED_SEQ,
        HEADER_PRODUCER_RECEIVED_SEQ,
    ]
    .into_iter()
    .map(HeaderName::from_static)
    .chain([header::ETAG, header::LOCATION, header::CONTENT_TYPE])
    .collect();

    // Browser clients must be able to read every protocol header
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(exposed);

    let compression = state.options.compression;
    let router = Router::new()
        .route("/{*path}", put(handle_create))
        .route("/{*path}", head(handle_head))
        .route("/{*path}", get(handle_read))
        .route("/{*path}", post(handle_append))
        .route("/{*path}", delete(handle_delete))
        .route("/{*path}", options(handle_preflight))
        .layer(cors)
        .with_state(state);

    if compression {
        router.layer(CompressionLayer::new())
    } else {
        router
    }
}

/// PUT - create a stream (idempotent).
async fn handle_create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response<Body> {
    let path = format!("/{path}");
    debug!(path = %path, "creating stream");

    let Some(content_type) = header_str(&headers, header::CONTENT_TYPE.as_str()) else {
        return StreamError::MissingContentType.into_response();
    };

    let ttl_seconds = match parse_ttl_header(&headers) {
        Ok(value) => value,
        Err(e) => return e.into_response(),
    };
    let expires_at = match parse_expires_at_header(&headers) {
        Ok(value) => value,
        Err(e) => return e.into_response(),
    };

    let config = StreamConfig {
        content_type: Some(content_type.to_string()),
        ttl_seconds,
        expires_at,
    };

    match state.registry.create(&path, config) {
        Ok(outcome) => {
            let entry = outcome.entry();
            let tail = entry.tail();
            let status = if outcome.was_created() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let cursor = response_cursor(None, &state.cursor_options());

            let mut response = Response::builder()
                .status(status)
                .header(HEADER_STREAM_NEXT_OFFSET, &tail)
                .header(HEADER_STREAM_CURSOR, cursor.to_string())
                .header(header::ETAG, read_etag(&path, &tail, &tail))
                .header(header::LOCATION, &path);
            if let Some(ct) = entry.content_type() {
                response = response.header(header::CONTENT_TYPE, ct);
            }
            finish(response, Body::empty())
        }
        Err(e) => e.into_response(),
    }
}

/// HEAD - stream metadata.
async fn handle_head(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response<Body> {
    let path = format!("/{path}");

    let Some(entry) = state.registry.get(&path) else {
        return StreamError::NotFound(path).into_response();
    };

    let info = entry.head();
    let start = query.offset.as_deref().unwrap_or(OFFSET_BEGINNING);
    let client_cursor = query.cursor.as_deref().and_then(parse_cursor);
    let cursor = response_cursor(client_cursor, &state.cursor_options());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(HEADER_STREAM_NEXT_OFFSET, &info.tail)
        .header(HEADER_STREAM_CURSOR, cursor.to_string())
        .header(header::ETAG, read_etag(&path, start, &info.tail));
    if let Some(ct) = &info.content_type {
        response = response.header(header::CONTENT_TYPE, ct.as_str());
    }
    if info.closed {
        response = response.header(HEADER_STREAM_CLOSED, "true");
    }
    if let Some(ttl) = info.ttl_seconds {
        response = response.header(HEADER_STREAM_TTL, ttl.to_string());
    }
    if let Some(expires_at) = info.expires_at {
        response = response.header(HEADER_STREAM_EXPIRES_AT, expires_at.to_rfc3339());
    }
    finish(response, Body::empty())
}

/// GET - read from a stream (catch-up, long-poll, or SSE).
async fn handle_read(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response<Body> {
    let path = format!("/{path}");

    let Some(entry) = state.registry.get(&path) else {
        return StreamError::NotFound(path).into_response();
    };

    let raw_offset = query.offset.as_deref().unwrap_or(OFFSET_BEGINNING);
    let Some(start) = StartOffset::parse(raw_offset) else {
        return StreamError::InvalidOffset(raw_offset.to_string()).into_response();
    };

    let client_cursor = query.cursor.as_deref().and_then(parse_cursor);
    let cursor = response_cursor(client_cursor, &state.cursor_options());

    match query.live.as_deref() {
        None => handle_catch_up(&state, entry, &path, raw_offset, &start, cursor, &query).await,
        Some("long-poll") => {
            handle_long_poll(&state, entry, &path, raw_offset, &start, cursor).await
        }
        Some("sse") => {
            let position = match &start {
                StartOffset::Beginning => crate::offset::zero_offset(),
                StartOffset::Now => entry.tail(),
                StartOffset::At(offset) => offset.clone(),
            };
            let settings = SseSettings {
                cursor: state.cursor_options(),
                base64: query.encoding.as_deref() == Some("base64"),
            };
            let mut response = sse_response(entry, position, cursor, settings);
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-store"),
            );
            response
        }
        Some(other) => StreamError::InvalidLiveMode(other.to_string()).into_response(),
    }
}

/// Immediate read: whatever is available right now.
async fn handle_catch_up(
    state: &AppState,
    entry: Arc<StreamEntry>,
    path: &str,
    raw_offset: &str,
    start: &StartOffset,
    cursor: u64,
    query: &ReadQuery,
) -> Response<Body> {
    let result = entry.read(start);
    // Historical reads carrying a cursor collapse in CDNs for one interval
    let cache_control = if query.cursor.is_some() {
        format!("public, max-age={}", state.options.cursor_interval_seconds)
    } else {
        "no-store".to_string()
    };
    read_response(&entry, path, raw_offset, &result, cursor, &cache_control)
}

/// Blocking read: wait for data past the requested offset.
async fn handle_long_poll(
    state: &AppState,
    entry: Arc<StreamEntry>,
    path: &str,
    raw_offset: &str,
    start: &StartOffset,
    cursor: u64,
) -> Response<Body> {
    let result = entry.read(start);
    if !result.messages.is_empty() || result.closed {
        return read_response(&entry, path, raw_offset, &result, cursor, "no-store");
    }

    // Nothing new yet: park on the stream's tail signal
    let wait_from = result.next_offset.clone();
    let timeout = Duration::from_millis(state.options.long_poll_timeout_ms);
    match entry.wait_for_tail(&wait_from, timeout).await {
        TailWait::Ready => {
            let result = entry.read(&StartOffset::At(wait_from));
            read_response(&entry, path, raw_offset, &result, cursor, "no-store")
        }
        TailWait::TimedOut => {
            let response = Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header(HEADER_STREAM_NEXT_OFFSET, &wait_from)
                .header(HEADER_STREAM_CURSOR, cursor.to_string())
                .header(HEADER_STREAM_UP_TO_DATE, "true")
                .header(header::CACHE_CONTROL, "no-store");
            finish(response, Body::empty())
        }
        TailWait::Deleted => StreamError::NotFound(path.to_string()).into_response(),
    }
}

/// POST - append to a stream.
async fn handle_append(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response<Body> {
    let path = format!("/{path}");

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return StreamError::BodyRead.into_response(),
    };

    let Some(entry) = state.registry.get(&path) else {
        return StreamError::NotFound(path).into_response();
    };

    let producer = match parse_producer_headers(&headers) {
        Ok(producer) => producer,
        Err(e) => return e.into_response(),
    };

    let opts = AppendOptions {
        content_type: header_str(&headers, header::CONTENT_TYPE.as_str()).map(String::from),
        stream_seq: header_str(&headers, HEADER_STREAM_SEQ).map(String::from),
        producer,
        close: header_str(&headers, HEADER_STREAM_CLOSED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true")),
    };

    let now_ms = Utc::now().timestamp_millis();
    match entry.append(body_bytes, &opts, now_ms) {
        Ok(outcome) => {
            let cursor = response_cursor(None, &state.cursor_options());
            let status = match &outcome {
                AppendOutcome::Appended { .. } => StatusCode::OK,
                AppendOutcome::Duplicate { .. } => StatusCode::NO_CONTENT,
            };
            let next_offset = outcome.next_offset().to_string();
            let mut response = Response::builder()
                .status(status)
                .header(HEADER_STREAM_NEXT_OFFSET, &next_offset)
                .header(HEADER_STREAM_CURSOR, cursor.to_string())
                .header(header::ETAG, read_etag(&path, &next_offset, &next_offset));
            if outcome.closed() {
                response = response.header(HEADER_STREAM_CLOSED, "true");
            }
            finish(response, Body::empty())
        }
        Err(e) => e.into_response(),
    }
}

/// DELETE - remove a stream.
async fn handle_delete(State(state): State<AppState>, Path(path): Path<String>) -> Response<Body> {
    let path = format!("/{path}");

    if state.registry.delete(&path) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StreamError::NotFound(path).into_response()
    }
}

/// OPTIONS - CORS preflight; headers are decorated by the CORS layer.
async fn handle_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Build a 200 read response with the full protocol header set.
fn read_response(
    entry: &StreamEntry,
    path: &str,
    raw_offset: &str,
    result: &ReadResult,
    cursor: u64,
    cache_control: &str,
) -> Response<Body> {
    let body = if entry.is_json() {
        join_json_array(&result.messages)
    } else {
        let bytes: Vec<u8> = result
            .messages
            .iter()
            .flat_map(|m| m.data.iter().copied())
            .collect();
        bytes.into()
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(HEADER_STREAM_NEXT_OFFSET, &result.next_offset)
        .header(HEADER_STREAM_CURSOR, cursor.to_string())
        .header(HEADER_STREAM_UP_TO_DATE, result.up_to_date.to_string())
        .header(header::ETAG, read_etag(path, raw_offset, &result.next_offset))
        .header(header::CACHE_CONTROL, cache_control);
    if let Some(ct) = entry.content_type() {
        response = response.header(header::CONTENT_TYPE, ct);
    }
    if result.closed {
        response = response.header(HEADER_STREAM_CLOSED, "true");
    }
    finish(response, Body::from(body))
}

fn finish(builder: axum::http::response::Builder, body: Body) -> Response<Body> {
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// ETag for a read: identical request offsets against an unchanged stream
/// produce identical tags.
fn read_etag(path: &str, start_offset: &str, end_offset: &str) -> String {
    let path_b64 = URL_SAFE_NO_PAD.encode(path);
    format!("\"{path_b64}:{start_offset}:{end_offset}\"")
}

/// Parse the producer fence triple. All three headers travel together.
fn parse_producer_headers(headers: &HeaderMap) -> Result<Option<ProducerClaim>, StreamError> {
    let id = header_str(headers, HEADER_PRODUCER_ID);
    let epoch = header_str(headers, HEADER_PRODUCER_EPOCH);
    let seq = header_str(headers, HEADER_PRODUCER_SEQ);

    match (id, epoch, seq) {
        (None, None, None) => Ok(None),
        (Some(id), Some(epoch), Some(seq)) => {
            let epoch: u64 = epoch.parse().map_err(|_| {
                StreamError::InvalidProducer(format!("Producer-Epoch is not an integer: {epoch}"))
            })?;
            let seq: u64 = seq.parse().map_err(|_| {
                StreamError::InvalidProducer(format!("Producer-Seq is not an integer: {seq}"))
            })?;
            Ok(Some(ProducerClaim {
                producer_id: id.to_string(),
                epoch,
                seq,
            }))
        }
        _ => Err(StreamError::InvalidProducer(
            "Producer-Id, Producer-Epoch and Producer-Seq must be sent together".to_string(),
        )),
    }
}

/// Parse the Stream-TTL header. Present-but-malformed is an error.
fn parse_ttl_header(headers: &HeaderMap) -> Result<Option<u64>, StreamError> {
    match header_str(headers, HEADER_STREAM_TTL) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StreamError::InvalidTtl),
    }
}

/// Parse the Stream-Expires-At header as RFC 3339.
fn parse_expires_at_header(headers: &HeaderMap) -> Result<Option<DateTime<Utc>>, StreamError> {
    match header_str(headers, HEADER_STREAM_EXPIRES_AT) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| StreamError::InvalidExpiresAt),
    }
}

/// Start the server: registry, sweeper, router, listener.
pub async fn start_server(options: ServerOptions) -> std::io::Result<()> {
    let registry = StreamRegistry::new(options.producer_idle_seconds as i64 * 1000);
    let sweeper = registry.spawn_sweeper(Duration::from_millis(options.sweep_interval_ms.max(1)));

    let state = AppState {
        registry,
        options: options.clone(),
    };
    let router = create_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "durable streams server listening");

    let served = axum::serve(listener, router).await;
    sweeper.abort();
    served
}
