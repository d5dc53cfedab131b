//! Expect pattern compilation and earliest-match search.

use regex::bytes::Regex;

use crate::error::Result;

/// A pattern supplied to `expect`.
///
/// Patterns are matched in stream order: the earliest match position in
/// the unread bytes wins, ties broken by list order. The `Timeout` and
/// `Eof` sentinels convert the corresponding failures into a returned
/// index instead of an error.
#[derive(Debug, Clone)]
pub enum ExpectPattern {
    /// Regular expression over the raw byte stream.
    Regex(String),
    /// Literal string match (no regex metacharacters).
    Exact(String),
    /// Matches when the expect timeout elapses.
    Timeout,
    /// Matches when the transport reaches EOF.
    Eof,
}

impl ExpectPattern {
    pub fn regex(pattern: impl Into<String>) -> Self {
        ExpectPattern::Regex(pattern.into())
    }

    pub fn exact(literal: impl Into<String>) -> Self {
        ExpectPattern::Exact(literal.into())
    }

    /// Short form for transcripts and debug output.
    pub fn describe(&self) -> String {
        match self {
            ExpectPattern::Regex(p) => format!("/{p}/"),
            ExpectPattern::Exact(l) => format!("{l:?}"),
            ExpectPattern::Timeout => "TIMEOUT".to_string(),
            ExpectPattern::Eof => "EOF".to_string(),
        }
    }
}

/// A compiled expect pattern.
#[derive(Debug)]
pub(crate) enum Compiled {
    Regex(Regex),
    Exact(Vec<u8>),
    Timeout,
    Eof,
}

/// Compile a pattern list, rejecting invalid regexes up front.
pub(crate) fn compile(patterns: &[ExpectPattern]) -> Result<Vec<Compiled>> {
    patterns
        .iter()
        .map(|p| {
            Ok(match p {
                ExpectPattern::Regex(src) => Compiled::Regex(Regex::new(src)?),
                ExpectPattern::Exact(lit) => Compiled::Exact(lit.as_bytes().to_vec()),
                ExpectPattern::Timeout => Compiled::Timeout,
                ExpectPattern::Eof => Compiled::Eof,
            })
        })
        .collect()
}

/// Compile a list of regex strings (a prompt set).
pub(crate) fn compile_regexes(patterns: &[String]) -> Result<Vec<Compiled>> {
    patterns
        .iter()
        .map(|src| Ok(Compiled::Regex(Regex::new(src)?)))
        .collect()
}

/// A match found in the unread buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Found {
    /// Index into the pattern list.
    pub index: usize,
    /// Byte offset where the match starts.
    pub start: usize,
    /// Byte offset one past the end of the match.
    pub end: usize,
    /// Capture group spans, starting at group 1.
    pub groups: Vec<Option<(usize, usize)>>,
}

/// Find the earliest match of any pattern in `data`.
///
/// Sentinels never match bytes. When several patterns match, the one
/// whose match starts earliest wins; ties go to the lower list index.
pub(crate) fn find_earliest(data: &[u8], patterns: &[Compiled]) -> Option<Found> {
    let mut best: Option<Found> = None;

    for (index, pattern) in patterns.iter().enumerate() {
        let candidate = match pattern {
            Compiled::Regex(re) => re.captures(data).map(|caps| {
                let whole = caps.get(0).unwrap();
                let groups = (1..caps.len())
                    .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
                    .collect();
                Found {
                    index,
                    start: whole.start(),
                    end: whole.end(),
                    groups,
                }
            }),
            Compiled::Exact(lit) => find_literal(data, lit).map(|start| Found {
                index,
                start,
                end: start + lit.len(),
                groups: vec![],
            }),
            Compiled::Timeout | Compiled::Eof => None,
        };

        if let Some(found) = candidate {
            // Strictly-less keeps the lower list index on position ties.
            if best.as_ref().is_none_or(|b| found.start < b.start) {
                best = Some(found);
            }
        }
    }

    best
}

fn find_literal(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    // An empty literal never matches; memmem would report position 0.
    if needle.is_empty() {
        return None;
    }
    memchr::memmem::find(haystack, needle)
}

/// Index of a sentinel in a compiled pattern list, if supplied.
pub(crate) fn sentinel_index(patterns: &[Compiled], want_eof: bool) -> Option<usize> {
    patterns.iter().position(|p| match p {
        Compiled::Timeout => !want_eof,
        Compiled::Eof => want_eof,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(patterns: &[ExpectPattern]) -> Vec<Compiled> {
        compile(patterns).unwrap()
    }

    #[test]
    fn test_earliest_position_wins() {
        let patterns = compiled(&[
            ExpectPattern::regex("world"),
            ExpectPattern::regex("hello"),
        ]);
        // "hello" appears first in the stream even though it is listed second.
        let found = find_earliest(b"hello world", &patterns).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.start, 0);
    }

    #[test]
    fn test_tie_broken_by_list_order() {
        let patterns = compiled(&[
            ExpectPattern::regex("ab"),
            ExpectPattern::regex("abc"),
        ]);
        let found = find_earliest(b"xxabc", &patterns).unwrap();
        assert_eq!(found.index, 0);
    }

    #[test]
    fn test_exact_does_not_interpret_metacharacters() {
        let patterns = compiled(&[ExpectPattern::exact("a.c")]);
        assert!(find_earliest(b"abc", &patterns).is_none());
        assert!(find_earliest(b"a.c", &patterns).is_some());
    }

    #[test]
    fn test_empty_literal_never_matches() {
        let patterns = compiled(&[ExpectPattern::exact("")]);
        assert!(find_earliest(b"anything", &patterns).is_none());
    }

    #[test]
    fn test_capture_groups() {
        let patterns = compiled(&[ExpectPattern::regex(r"Bytes transferred = (\d+)")]);
        let data = b"Bytes transferred = 4096 (1000 hex)\n";
        let found = find_earliest(data, &patterns).unwrap();
        let (start, end) = found.groups[0].unwrap();
        assert_eq!(&data[start..end], b"4096");
    }

    #[test]
    fn test_sentinels_never_match_bytes() {
        let patterns = compiled(&[ExpectPattern::Timeout, ExpectPattern::Eof]);
        assert!(find_earliest(b"TIMEOUT EOF", &patterns).is_none());
        assert_eq!(sentinel_index(&patterns, false), Some(0));
        assert_eq!(sentinel_index(&patterns, true), Some(1));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(compile(&[ExpectPattern::regex("(")]).is_err());
    }

    #[test]
    fn test_perl_classes_and_nongreedy() {
        let patterns = compiled(&[ExpectPattern::regex(r"<(\w+?)>\s*\d+")]);
        let found = find_earliest(b"junk <tag> 42", &patterns).unwrap();
        assert_eq!(found.index, 0);
    }
}
