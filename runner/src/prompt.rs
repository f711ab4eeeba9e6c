//! Prompt matching over raw output bytes

use std::fmt::Write as _;
use std::ops::Range;

use regex::bytes::{Regex, RegexBuilder};
use tracing::warn;

/// Longest match a pattern prompt is guaranteed to be found across reads
pub const PATTERN_WINDOW: usize = 1024;

/// What to look for in the output stream
#[derive(Debug, Clone)]
pub struct Prompt {
    matcher: Option<Regex>,
    window: usize,
}

impl Prompt {
    /// Exact byte substring. An empty literal never matches.
    pub fn literal(text: impl AsRef<[u8]>) -> Self {
        let needle = text.as_ref();
        if needle.is_empty() {
            return Self {
                matcher: None,
                window: 0,
            };
        }

        let mut escaped = String::with_capacity(needle.len() * 4 + 5);
        escaped.push_str("(?-u)");
        for byte in needle {
            let _ = write!(escaped, "\\x{:02x}", byte);
        }

        let matcher = match RegexBuilder::new(&escaped).size_limit(usize::MAX).build() {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!("Literal prompt of {} bytes cannot be compiled: {}", needle.len(), e);
                None
            }
        };

        Self {
            matcher,
            window: needle.len() - 1,
        }
    }

    /// Byte-oriented regular expression. A match straddling two reads is
    /// found as long as it is at most [`PATTERN_WINDOW`] bytes long.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: Some(Regex::new(pattern)?),
            window: PATTERN_WINDOW,
        })
    }

    /// Earliest match in `haystack`
    pub fn find(&self, haystack: &[u8]) -> Option<Range<usize>> {
        self.matcher
            .as_ref()
            .and_then(|regex| regex.find(haystack))
            .map(|m| m.range())
    }

    /// Trailing bytes of unmatched output that may still begin a match once
    /// more output arrives
    pub fn window(&self) -> usize {
        self.window
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::literal(text)
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::literal(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_finds_earliest() {
        let prompt = Prompt::literal("password:");
        let out = b"banner\r\nbob@example.com's password: password:";
        let range = prompt.find(out).unwrap();
        assert_eq!(&out[..range.start], b"banner\r\nbob@example.com's ");
        assert_eq!(&out[range.clone()], b"password:");
    }

    #[test]
    fn test_literal_partial_does_not_match() {
        let prompt = Prompt::literal("bob@example.com's password:");
        assert!(prompt.find(b"bob@example.com's pass").is_none());
    }

    #[test]
    fn test_literal_metacharacters_and_raw_bytes() {
        let prompt = Prompt::literal(b"[a.b]*\xff");
        assert!(prompt.find(b"xab\xff").is_none());
        assert_eq!(prompt.find(b"x[a.b]*\xff"), Some(1..8));
    }

    #[test]
    fn test_empty_literal_never_matches() {
        let prompt = Prompt::literal("");
        assert!(prompt.find(b"anything").is_none());
        assert_eq!(prompt.window(), 0);
    }

    #[test]
    fn test_windows() {
        assert_eq!(Prompt::literal("password:").window(), 8);
        assert_eq!(Prompt::pattern("x").unwrap().window(), PATTERN_WINDOW);
    }

    #[test]
    fn test_pattern_matches_bytes() {
        let prompt = Prompt::pattern(r"[a-z]+@[a-z.]+'s password:").unwrap();
        let out = b"\xff\x00bob@example.com's password:";
        assert_eq!(prompt.find(out), Some(2..out.len()));
    }
}
