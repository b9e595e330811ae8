// phiscrub-lexicon/src/normalize/mod.rs
use alloc::string::String;

/// Canonical form for vocabulary membership: lowercase, whitespace collapsed to
/// single spaces, surrounding punctuation stripped.
///
/// `"  Right Upper   Lobe."` becomes `"right upper lobe"`.
pub fn normalize_term(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || is_edge_punct(c));

    let mut out = String::with_capacity(trimmed.len());
    let mut pending_space = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        for lower in c.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

fn is_edge_punct(c: char) -> bool {
    matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' | '(' | ')' | '[' | ']')
}
