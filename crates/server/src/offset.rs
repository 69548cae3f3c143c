//! Offset codec.
//!
//! Offsets are opaque to clients but lexicographically sortable on the wire:
//! two 16-digit zero-padded decimal fields joined by `_`. The first field is
//! the message ordinal (count of appended messages), the second the
//! cumulative byte count through the end of that message. Only the server
//! mints offsets; clients echo them back verbatim.

use std::cmp::Ordering;

/// Sentinel accepted in requests for "beginning of stream".
pub const OFFSET_BEGINNING: &str = "-1";
/// Sentinel accepted in requests for "current tail, skip history".
pub const OFFSET_NOW: &str = "now";

const FIELD_DIGITS: usize = 16;

/// Format an offset from message ordinal and cumulative byte count.
/// Format: "readSeq_byteOffset" with 16-digit zero-padding each.
pub fn format_offset(read_seq: u64, byte_offset: u64) -> String {
    format!("{:016}_{:016}", read_seq, byte_offset)
}

/// The offset of an empty stream.
pub fn zero_offset() -> String {
    format_offset(0, 0)
}

/// Parse an offset string into (read_seq, byte_offset).
///
/// Strict: both fields must be exactly 16 decimal digits. Anything else is
/// rejected so that lexicographic comparison stays meaningful.
pub fn parse_offset(offset: &str) -> Option<(u64, u64)> {
    let (seq_part, byte_part) = offset.split_once('_')?;
    if seq_part.len() != FIELD_DIGITS || byte_part.len() != FIELD_DIGITS {
        return None;
    }
    if !seq_part.bytes().all(|b| b.is_ascii_digit()) || !byte_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let read_seq = seq_part.parse().ok()?;
    let byte_offset = byte_part.parse().ok()?;
    Some((read_seq, byte_offset))
}

/// Compare two encoded offsets. Raw byte comparison, which for the canonical
/// encoding coincides with position order.
pub fn compare_offsets(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// A read position as given in the `offset` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOffset {
    /// Everything from the beginning of the stream (sentinel `-1`).
    Beginning,
    /// Only data appended after the request arrives (sentinel `now`).
    Now,
    /// Strictly after a specific server-minted offset.
    At(String),
}

impl StartOffset {
    /// Parse a request offset. Sentinels are accepted; anything else must be
    /// a well-formed offset token.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            OFFSET_BEGINNING => Some(StartOffset::Beginning),
            OFFSET_NOW => Some(StartOffset::Now),
            other => parse_offset(other).map(|_| StartOffset::At(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(0, 0), "0000000000000000_0000000000000000");
        assert_eq!(format_offset(3, 1024), "0000000000000003_0000000000001024");
        assert_eq!(zero_offset(), format_offset(0, 0));
    }

    #[test]
    fn test_parse_offset_roundtrip() {
        assert_eq!(
            parse_offset("0000000000000003_0000000000001024"),
            Some((3, 1024))
        );
        let big = 9_999_999_999_999_999;
        assert_eq!(parse_offset(&format_offset(big, big)), Some((big, big)));
    }

    #[test]
    fn test_parse_offset_rejects_malformed() {
        assert_eq!(parse_offset("invalid"), None);
        assert_eq!(parse_offset("abc_def"), None);
        assert_eq!(parse_offset("0_0"), None); // not zero-padded
        assert_eq!(parse_offset("0000000000000000_00000000000000001"), None);
        assert_eq!(parse_offset(""), None);
        assert_eq!(parse_offset("-1"), None); // sentinel, not an offset
    }

    #[test]
    fn test_compare_offsets_matches_position_order() {
        let a = format_offset(1, 100);
        let b = format_offset(1, 200);
        let c = format_offset(2, 201);

        assert_eq!(compare_offsets(&a, &b), Ordering::Less);
        assert_eq!(compare_offsets(&b, &c), Ordering::Less);
        assert_eq!(compare_offsets(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_start_offset_parse() {
        assert_eq!(StartOffset::parse("-1"), Some(StartOffset::Beginning));
        assert_eq!(StartOffset::parse("now"), Some(StartOffset::Now));
        let token = format_offset(1, 5);
        assert_eq!(StartOffset::parse(&token), Some(StartOffset::At(token.clone())));
        assert_eq!(StartOffset::parse(""), None);
        assert_eq!(StartOffset::parse("garbage"), None);
    }
}
