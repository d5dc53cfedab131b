//! Unread-byte buffer with consume-past-match semantics.
//!
//! The buffer holds everything read from the transport that no expect
//! has consumed yet. A successful expect drains the buffer through the
//! end of its match; a timeout leaves it intact for the caller to
//! inspect or retry. This is what guarantees that a later expect never
//! sees bytes consumed by an earlier one.

use super::patterns::{Compiled, Found, find_earliest};

/// Buffer of bytes read from the transport but not yet consumed.
#[derive(Debug, Default)]
pub struct MatchBuffer {
    data: Vec<u8>,
}

/// The byte-level outcome of consuming a match.
#[derive(Debug)]
pub(crate) struct Consumed {
    /// Bytes between the previous match and this one.
    pub before: Vec<u8>,
    /// The matched bytes themselves.
    pub matched: Vec<u8>,
    /// Capture group contents, starting at group 1.
    pub groups: Vec<Option<Vec<u8>>>,
}

impl MatchBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(4096),
        }
    }

    /// Append newly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Search the unread bytes for the earliest pattern match.
    pub(crate) fn find(&self, patterns: &[Compiled]) -> Option<Found> {
        find_earliest(&self.data, patterns)
    }

    /// Drain the buffer through the end of `found`, splitting at the match.
    pub(crate) fn consume(&mut self, found: &Found) -> Consumed {
        let groups = found
            .groups
            .iter()
            .map(|span| span.map(|(s, e)| self.data[s..e].to_vec()))
            .collect();
        let mut drained: Vec<u8> = self.data.drain(..found.end).collect();
        let matched = drained.split_off(found.start);
        Consumed {
            before: drained,
            matched,
            groups,
        }
    }

    /// Drain everything (EOF sentinel path).
    pub fn take_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Unconsumed bytes, left in place (timeout sentinel path).
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discard all unread bytes. Used on reconnect: a new transport is a
    /// new byte stream and stale bytes must not leak across it.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::patterns::{ExpectPattern, compile};

    #[test]
    fn test_consume_splits_before_and_match() {
        let mut buffer = MatchBuffer::new();
        buffer.extend(b"some output\nprompt> trailing");

        let patterns = compile(&[ExpectPattern::regex(r"prompt> ")]).unwrap();
        let found = buffer.find(&patterns).unwrap();
        let consumed = buffer.consume(&found);

        assert_eq!(consumed.before, b"some output\n");
        assert_eq!(consumed.matched, b"prompt> ");
        // Unmatched tail stays buffered.
        assert_eq!(buffer.as_slice(), b"trailing");
    }

    #[test]
    fn test_sequential_expects_never_see_consumed_bytes() {
        let mut buffer = MatchBuffer::new();
        buffer.extend(b"AAA first BBB second");

        let first = compile(&[ExpectPattern::exact("first")]).unwrap();
        let found = buffer.find(&first).unwrap();
        buffer.consume(&found);

        // "AAA" was consumed with the first match; a search for it now fails.
        let again = compile(&[ExpectPattern::exact("AAA")]).unwrap();
        assert!(buffer.find(&again).is_none());

        let second = compile(&[ExpectPattern::exact("second")]).unwrap();
        let found = buffer.find(&second).unwrap();
        let consumed = buffer.consume(&found);
        assert_eq!(consumed.before, b" BBB ");
    }

    #[test]
    fn test_group_extraction() {
        let mut buffer = MatchBuffer::new();
        buffer.extend(b"Bytes transferred = 4096 (1000 hex)\nuboot> ");

        let patterns =
            compile(&[ExpectPattern::regex(r"Bytes transferred = (\d+) \((\w+) hex\)")]).unwrap();
        let found = buffer.find(&patterns).unwrap();
        let consumed = buffer.consume(&found);

        assert_eq!(consumed.groups[0].as_deref(), Some(b"4096".as_slice()));
        assert_eq!(consumed.groups[1].as_deref(), Some(b"1000".as_slice()));
    }
}
