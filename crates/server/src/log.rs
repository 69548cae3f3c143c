//! Per-stream append-only message log.

use bytes::Bytes;

use crate::offset::{format_offset, zero_offset};
use crate::types::Message;

/// In-memory ordered sequence of messages for one stream.
///
/// Appends are O(1) and mint the message's offset from two running counters.
/// Seeks are O(log n): the stored offset strings are strictly increasing, so
/// a binary search over them lands on the first message past any token.
#[derive(Debug)]
pub struct MessageLog {
    messages: Vec<Message>,
    /// Ordinal of the most recently appended message.
    ordinal: u64,
    /// Cumulative payload bytes across all messages.
    byte_total: u64,
    /// Offset of the last message, or the zero offset when empty.
    tail: String,
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            ordinal: 0,
            byte_total: 0,
            tail: zero_offset(),
        }
    }

    /// Append one message, minting its offset.
    pub fn append(&mut self, data: Bytes, timestamp_ms: i64) -> String {
        debug_assert!(!data.is_empty(), "empty payloads are rejected upstream");
        self.ordinal += 1;
        self.byte_total += data.len() as u64;
        let offset = format_offset(self.ordinal, self.byte_total);
        self.tail = offset.clone();
        self.messages.push(Message {
            data,
            offset: offset.clone(),
            timestamp_ms,
        });
        offset
    }

    /// The current tail offset.
    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All messages strictly after the given encoded offset.
    pub fn messages_after(&self, offset: &str) -> &[Message] {
        let start = self
            .messages
            .partition_point(|m| m.offset.as_str() <= offset);
        &self.messages[start..]
    }

    /// All messages, oldest first.
    pub fn all(&self) -> &[Message] {
        &self.messages
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}
