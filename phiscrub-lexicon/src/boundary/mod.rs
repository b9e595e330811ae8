// phiscrub-lexicon/src/boundary/mod.rs
//! Byte-window helpers that never split a UTF-8 sequence.

use alloc::vec::Vec;

/// Largest char boundary `<= pos`, clamped to the text length.
pub fn floor_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Smallest char boundary `>= pos`, clamped to the text length.
pub fn ceil_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// The slice `[pos - radius, pos)` snapped inward to char boundaries.
pub fn preceding_window(text: &str, pos: usize, radius: usize) -> &str {
    let end = floor_char_boundary(text, pos);
    let start = ceil_char_boundary(text, end.saturating_sub(radius));
    &text[start.min(end)..end]
}

/// The slice `[pos, pos + radius)` snapped inward to char boundaries.
pub fn following_window(text: &str, pos: usize, radius: usize) -> &str {
    let start = ceil_char_boundary(text, pos);
    let end = floor_char_boundary(text, start.saturating_add(radius));
    &text[start..end.max(start)]
}

/// True when the char ending at `pos` (if any) is not alphanumeric.
pub fn is_left_word_edge(text: &str, pos: usize) -> bool {
    text[..pos].chars().next_back().map_or(true, |c| !c.is_alphanumeric())
}

/// True when the char starting at `pos` (if any) is not alphanumeric.
pub fn is_right_word_edge(text: &str, pos: usize) -> bool {
    text[pos..].chars().next().map_or(true, |c| !c.is_alphanumeric())
}

/// Start offsets of every case-sensitive, whole-word occurrence of `needle`.
pub fn find_whole_words(text: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    text.match_indices(needle)
        .map(|(i, _)| i)
        .filter(|&i| is_left_word_edge(text, i) && is_right_word_edge(text, i + needle.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_on_multibyte_text() {
        let text = "café noir";
        // 'é' spans bytes 3..5
        assert_eq!(floor_char_boundary(text, 4), 3);
        assert_eq!(ceil_char_boundary(text, 4), 5);
        assert_eq!(preceding_window(text, 5, 2), "é");
        assert_eq!(following_window(text, 5, 100), " noir");
    }

    #[test]
    fn test_windows_clamp_at_edges() {
        let text = "abc";
        assert_eq!(preceding_window(text, 0, 10), "");
        assert_eq!(following_window(text, 3, 10), "");
        assert_eq!(following_window(text, 10, 10), "");
    }

    #[test]
    fn test_find_whole_words() {
        let text = "Cloyd D. met Cloyd Dean and McCloyd D";
        assert_eq!(find_whole_words(text, "Cloyd D"), alloc::vec![0]);
        assert!(find_whole_words(text, "").is_empty());
        assert_eq!(find_whole_words("Ann, Ann", "Ann"), alloc::vec![0, 5]);
    }
}
