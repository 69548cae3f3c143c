//! Error taxonomy for stream operations and its HTTP mapping.

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;

use crate::server::{HEADER_PRODUCER_EPOCH, HEADER_PRODUCER_EXPECTED_SEQ, HEADER_PRODUCER_RECEIVED_SEQ};

/// Error types for stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream not found: {0}")]
    NotFound(String),

    #[error("stream already exists with different configuration")]
    ConfigMismatch,

    #[error("content-type mismatch: expected {expected}, got {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    #[error("sequence {received} does not advance past {last}")]
    SeqRegression { last: String, received: String },

    #[error("stale producer epoch; current epoch is {current_epoch}")]
    StaleEpoch { current_epoch: u64 },

    #[error("producer sequence gap: expected {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },

    #[error("producer sequence behind: last acknowledged {last_seq}, received {received}")]
    SequenceBehind { last_seq: u64, received: u64 },

    #[error("stream is closed")]
    Closed,

    #[error("empty body not allowed")]
    EmptyBody,

    #[error("empty arrays not allowed on append")]
    EmptyJsonArray,

    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("invalid offset: {0}")]
    InvalidOffset(String),

    #[error("invalid producer headers: {0}")]
    InvalidProducer(String),

    #[error("Content-Type header is required")]
    MissingContentType,

    #[error("unknown live mode: {0}")]
    InvalidLiveMode(String),

    #[error("failed to read request body")]
    BodyRead,

    #[error("offset no longer available: {0}")]
    OffsetGone(String),

    #[error("cannot specify both Stream-TTL and Stream-Expires-At")]
    TtlConflict,

    #[error("invalid Stream-TTL value")]
    InvalidTtl,

    #[error("invalid Stream-Expires-At timestamp")]
    InvalidExpiresAt,
}

impl StreamError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            StreamError::NotFound(_) => StatusCode::NOT_FOUND,
            StreamError::ConfigMismatch
            | StreamError::SeqRegression { .. }
            | StreamError::SequenceGap { .. }
            | StreamError::SequenceBehind { .. } => StatusCode::CONFLICT,
            StreamError::StaleEpoch { .. } => StatusCode::FORBIDDEN,
            StreamError::Closed | StreamError::OffsetGone(_) => StatusCode::GONE,
            StreamError::ContentTypeMismatch { .. }
            | StreamError::EmptyBody
            | StreamError::EmptyJsonArray
            | StreamError::InvalidJson(_)
            | StreamError::InvalidOffset(_)
            | StreamError::InvalidProducer(_)
            | StreamError::MissingContentType
            | StreamError::InvalidLiveMode(_)
            | StreamError::BodyRead
            | StreamError::TtlConflict
            | StreamError::InvalidTtl
            | StreamError::InvalidExpiresAt => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response<Body> {
        let mut response = Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8");

        // Fence errors carry enough context for the client to self-heal
        match &self {
            StreamError::StaleEpoch { current_epoch } => {
                response = response.header(HEADER_PRODUCER_EPOCH, current_epoch.to_string());
            }
            StreamError::SequenceGap { expected, received } => {
                response = response
                    .header(HEADER_PRODUCER_EXPECTED_SEQ, expected.to_string())
                    .header(HEADER_PRODUCER_RECEIVED_SEQ, received.to_string());
            }
            StreamError::SequenceBehind { last_seq, received } => {
                response = response
                    .header(HEADER_PRODUCER_EXPECTED_SEQ, (last_seq + 1).to_string())
                    .header(HEADER_PRODUCER_RECEIVED_SEQ, received.to_string());
            }
            _ => {}
        }

        response
            .body(Body::from(self.to_string()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StreamError::NotFound("/s".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(StreamError::ConfigMismatch.status(), StatusCode::CONFLICT);
        assert_eq!(
            StreamError::StaleEpoch { current_epoch: 1 }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            StreamError::SequenceGap {
                expected: 2,
                received: 3
            }
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(StreamError::Closed.status(), StatusCode::GONE);
        assert_eq!(StreamError::EmptyBody.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            StreamError::ContentTypeMismatch {
                expected: "a/b".into(),
                actual: "c/d".into()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_fence_errors_expose_headers() {
        let response = StreamError::SequenceGap {
            expected: 2,
            received: 3,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get(HEADER_PRODUCER_EXPECTED_SEQ).unwrap(),
            "2"
        );
        assert_eq!(
            response.headers().get(HEADER_PRODUCER_RECEIVED_SEQ).unwrap(),
            "3"
        );

        let response = StreamError::StaleEpoch { current_epoch: 4 }.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get(HEADER_PRODUCER_EPOCH).unwrap(), "4");
    }
}
