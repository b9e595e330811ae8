// phiscrub-lexicon/src/context/mod.rs
use daachorse::DoubleArrayAhoCorasick;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::boundary::{ceil_char_boundary, floor_char_boundary};

/// Errors raised while building a scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexiconError {
    /// The automaton could not be constructed from the supplied keywords.
    Build(String),
}

impl fmt::Display for LexiconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexiconError::Build(msg) => write!(f, "failed to build keyword automaton: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LexiconError {}

/// A keyword occurrence in a haystack, in haystack byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordHit {
    pub start: usize,
    pub end: usize,
    /// Index into [`KeywordScanner::keywords`].
    pub keyword: usize,
}

/// Scans for keywords surrounding a candidate span with word-boundary awareness.
///
/// Keywords are stored lowercased and haystacks are lowercased byte-for-byte
/// (ASCII only) before matching, so offsets never shift.
pub struct KeywordScanner {
    automaton: Option<DoubleArrayAhoCorasick<usize>>,
    keywords: Vec<String>,
}

impl fmt::Debug for KeywordScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordScanner")
         .field("automaton", &"<DoubleArrayAhoCorasick>")
         .field("keywords", &self.keywords.len())
         .finish()
    }
}

impl KeywordScanner {
    /// Builds a scanner from a keyword list. Empty and duplicate entries are dropped.
    pub fn new<I, S>(keywords: I) -> Result<Self, LexiconError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_ascii_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let keywords: Vec<String> = unique.into_iter().collect();

        if keywords.is_empty() {
            return Ok(Self { automaton: None, keywords });
        }

        let automaton = DoubleArrayAhoCorasick::new(keywords.iter().map(String::as_str))
            .map_err(|e| LexiconError::Build(alloc::format!("{}", e)))?;

        Ok(Self { automaton: Some(automaton), keywords })
    }

    /// The deduplicated, lowercased keyword list in automaton order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Every whole-word keyword occurrence in `haystack`.
    pub fn find_words(&self, haystack: &str) -> Vec<KeywordHit> {
        let Some(automaton) = &self.automaton else {
            return Vec::new();
        };
        let lowered = haystack.as_bytes().to_ascii_lowercase();

        let mut hits = Vec::new();
        for matched in automaton.find_overlapping_iter(&lowered) {
            let m_start = matched.start();
            let m_end = matched.end();

            // Word boundary check: "cm" must not match inside "acme".
            let prefix_ok = m_start == 0 || !is_word_byte(lowered[m_start - 1]);
            let suffix_ok = m_end == lowered.len() || !is_word_byte(lowered[m_end]);

            if prefix_ok && suffix_ok {
                hits.push(KeywordHit { start: m_start, end: m_end, keyword: matched.value() });
            }
        }
        hits.sort_by_key(|h| (h.start, h.end));
        hits
    }

    /// True if `haystack` contains any keyword as a whole word.
    pub fn contains_word(&self, haystack: &str) -> bool {
        !self.find_words(haystack).is_empty()
    }

    /// True if the whole of `haystack` (trimmed) is one keyword.
    pub fn is_exact(&self, haystack: &str) -> bool {
        let trimmed = haystack.trim();
        !trimmed.is_empty()
            && self
                .find_words(trimmed)
                .iter()
                .any(|h| h.start == 0 && h.end == trimmed.len())
    }

    /// Scans `radius` bytes on either side of `[start, end)` for a keyword.
    /// The candidate range itself is excluded.
    pub fn scan_around(&self, text: &str, start: usize, end: usize, radius: usize) -> bool {
        self.scan_preceding(text, start, radius) || self.scan_following(text, end, radius)
    }

    /// Scans the `radius` bytes before `pos`.
    pub fn scan_preceding(&self, text: &str, pos: usize, radius: usize) -> bool {
        if pos == 0 || pos > text.len() {
            return false;
        }
        let from = floor_char_boundary(text, pos.saturating_sub(radius));
        let to = floor_char_boundary(text, pos);
        self.contains_word(&text[from..to])
    }

    /// Scans the `radius` bytes after `pos`.
    pub fn scan_following(&self, text: &str, pos: usize, radius: usize) -> bool {
        if pos >= text.len() {
            return false;
        }
        let from = ceil_char_boundary(text, pos);
        let to = ceil_char_boundary(text, pos.saturating_add(radius));
        self.contains_word(&text[from..to])
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_word_boundaries_are_respected() {
        let scanner = KeywordScanner::new(vec!["cm", "needle"]).unwrap();
        assert!(!scanner.contains_word("acme corp"));
        assert!(scanner.contains_word("a 22 gauge Needle was used"));
        assert!(scanner.contains_word("2 cm"));
    }

    #[test]
    fn test_duplicates_and_empty_keywords_are_dropped() {
        let scanner = KeywordScanner::new(vec!["Scope", "scope", "  ", ""]).unwrap();
        assert_eq!(scanner.keywords().len(), 1);
    }

    #[test]
    fn test_empty_scanner_never_matches() {
        let scanner = KeywordScanner::new(Vec::<&str>::new()).unwrap();
        assert!(scanner.is_empty());
        assert!(!scanner.contains_word("anything at all"));
    }

    #[test]
    fn test_scan_around_excludes_the_candidate() {
        let scanner = KeywordScanner::new(vec!["catheter"]).unwrap();
        let text = "Cook catheter advanced";
        assert!(scanner.scan_around(text, 0, 4, 20));
        let far = "Cook went home. ................................ catheter";
        assert!(!scanner.scan_around(far, 0, 4, 10));
    }

    #[test]
    fn test_is_exact() {
        let scanner = KeywordScanner::new(vec!["station 7", "ebus"]).unwrap();
        assert!(scanner.is_exact("Station 7"));
        assert!(!scanner.is_exact("Station 7 nodes"));
    }
}
