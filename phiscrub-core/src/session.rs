// phiscrub-core/src/session.rs
//! Session consistency pass.
//!
//! Confident patient names are propagated to their other literal occurrences in
//! the document. Runs once after consolidation; it never removes or reshapes a
//! decision, and only adds spans disjoint from everything already decided.

use std::collections::BTreeSet;

use log::debug;

use phiscrub_lexicon::boundary::find_whole_words;

use crate::span::{log_span_debug, sort_spans, EntityLabel, SourceTag, Span};

/// Minimum score for a PATIENT decision to seed the pass.
pub const SESSION_MIN_SCORE: f64 = 0.85;
/// Score given to propagated spans.
pub const SESSION_SCORE: f64 = 0.95;

const MIN_VARIANT_LETTERS: usize = 4;

/// Literal strings to look for, longest first.
///
/// `Carey, Cloyd D` also yields `Cloyd D Carey` and `Cloyd D`, since a header
/// name in "Last, First" order is usually repeated in the narrative without the
/// surname.
pub fn name_variants(surface: &str) -> Vec<String> {
    let full = surface.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut variants = BTreeSet::new();
    if full.is_empty() {
        return Vec::new();
    }

    if let Some((last, given)) = full.split_once(',') {
        let last = last.trim();
        let given = given.trim();
        if !last.is_empty() && !given.is_empty() && !given.contains(',') {
            variants.insert(format!("{} {}", given, last));
            if given.chars().filter(|c| c.is_alphabetic()).count() >= MIN_VARIANT_LETTERS {
                variants.insert(given.to_string());
            }
        }
    }
    variants.insert(full);

    let mut out: Vec<String> = variants.into_iter().collect();
    out.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    out
}

/// Adds a `session_name` span for every uncovered whole-word occurrence of a
/// confident PATIENT name. Returns the full decision list sorted by start.
pub fn session_pass(decisions: Vec<Span>, text: &str) -> Vec<Span> {
    let mut seeds = BTreeSet::new();
    for span in &decisions {
        if span.label == EntityLabel::Patient && span.score >= SESSION_MIN_SCORE {
            seeds.insert(span.surface(text).to_string());
        }
    }
    if seeds.is_empty() {
        return decisions;
    }

    let mut variants: Vec<String> = seeds.iter().flat_map(|s| name_variants(s)).collect();
    variants.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    variants.dedup();

    let mut out = decisions;
    let mut added = 0usize;
    for variant in &variants {
        for start in find_whole_words(text, variant) {
            let end = start + variant.len();
            if out.iter().any(|d| d.start < end && start < d.end) {
                continue;
            }
            let span = Span::new(start, end, EntityLabel::Patient, SESSION_SCORE, SourceTag::SessionName);
            log_span_debug(module_path!(), "session match", &span, text);
            out.push(span);
            added += 1;
        }
    }
    if added > 0 {
        debug!("Session pass added {} spans from {} names.", added, seeds.len());
    }

    sort_spans(&mut out);
    out
}
