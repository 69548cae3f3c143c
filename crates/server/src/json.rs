//! JSON mode body handling.
//!
//! Streams with an `application/json` content type treat append bodies as
//! JSON: a top-level array is unwrapped into one message per element, any
//! other value is a single message. Reads are wrapped back into a single
//! array so every response body parses as one JSON document.

use bytes::Bytes;
use serde_json::value::RawValue;

use crate::error::StreamError;
use crate::types::Message;

/// Split an append body into per-message JSON payloads.
///
/// Element text is carried over verbatim via [`RawValue`], so values round
/// trip byte-for-byte. An empty array yields an empty vec; callers reject it.
pub fn split_json_body(body: &[u8]) -> Result<Vec<Bytes>, StreamError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| StreamError::InvalidJson("body is not valid UTF-8".to_string()))?;
    let value: &RawValue =
        serde_json::from_str(text).map_err(|e| StreamError::InvalidJson(e.to_string()))?;

    let raw = value.get();
    if raw.starts_with('[') {
        let elements: Vec<&RawValue> =
            serde_json::from_str(raw).map_err(|e| StreamError::InvalidJson(e.to_string()))?;
        Ok(elements
            .iter()
            .map(|e| Bytes::copy_from_slice(e.get().as_bytes()))
            .collect())
    } else {
        Ok(vec![Bytes::copy_from_slice(raw.as_bytes())])
    }
}

/// Join collected messages into a single JSON array body.
///
/// Partial reads still yield a well-formed array; an empty read is `[]`.
pub fn join_json_array(messages: &[Message]) -> Bytes {
    let payload_len: usize = messages.iter().map(|m| m.data.len()).sum();
    let mut out = Vec::with_capacity(payload_len + messages.len() + 2);
    out.push(b'[');
    for (i, message) in messages.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(&message.data);
    }
    out.push(b']');
    Bytes::from(out)
}
