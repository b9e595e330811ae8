// phiscrub-core/src/consolidate.rs
//! Span consolidation.
//!
//! Before veto only exact `(start, end, label)` duplicates are collapsed, except
//! in [`MergeMode::BestOf`] where overlaps are also resolved up front in favour
//! of detector spans. After veto every survivor is expanded to token boundaries,
//! given its targeted extension, re-merged per label and finally resolved into a
//! non-overlapping set.
//!
//! License: MIT OR APACHE 2.0

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use phiscrub_lexicon::boundary::preceding_window;

use crate::config::MergeMode;
use crate::span::{sort_spans, EntityLabel, Span};

/// Below this share of the smaller span, two differently-labelled spans are
/// both kept and the loser is trimmed to its own part.
pub const MIN_OVERLAP_RATIO: f64 = 0.5;

static TRAILING_INITIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]+([A-Z])(\.|\b)").expect("initial pattern is valid")
});

static GENERATIONAL_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^,?[ \t]+(?:Jr|Sr|II|III|IV)\b\.?").expect("suffix pattern is valid")
});

static PLACE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b(?:San|Santa|Los|Las|New|North|South|East|West|Fort|Saint|Port|Mount|Lake|Palm|El|La)|\b(?:Ft|St|Mt)\.)[ \t]+$")
        .expect("place prefix pattern is valid")
});

static FACILITY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]+(?:General[ \t]+)?(?:Hospital|Medical[ \t]+Cent(?:er|re)|Clinic|Health[ \t]+System|Healthcare|Health|Cent(?:er|re)|Infirmary|Memorial|County|University)\b")
        .expect("facility suffix pattern is valid")
});

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '\'' | '-' | '\u{2019}')
}

/// Candidate ranking. `prefer_detector` puts any detector span ahead of the tagger.
fn rank(a: &Span, b: &Span, prefer_detector: bool) -> Ordering {
    let detector = if prefer_detector {
        a.source.is_detector().cmp(&b.source.is_detector())
    } else {
        Ordering::Equal
    };
    detector
        .then(a.len().cmp(&b.len()))
        .then(a.label.risk_priority().cmp(&b.label.risk_priority()))
        .then(a.score.total_cmp(&b.score))
        .then(a.source.is_detector().cmp(&b.source.is_detector()))
        // earlier start, then lower source tag, wins the final tie
        .then(b.start.cmp(&a.start))
        .then(b.source.cmp(&a.source))
}

/// Collapses exact `(start, end, label)` duplicates, keeping the higher score and
/// preferring a detector over the tagger on ties.
pub fn dedupe_exact(candidates: Vec<Span>) -> Vec<Span> {
    let mut best: BTreeMap<(usize, usize, EntityLabel), Span> = BTreeMap::new();
    for span in candidates {
        let key = (span.start, span.end, span.label);
        match best.get(&key) {
            Some(existing) if !better_duplicate(&span, existing) => {}
            _ => {
                best.insert(key, span);
            }
        }
    }
    best.into_values().collect()
}

fn better_duplicate(a: &Span, b: &Span) -> bool {
    a.score
        .total_cmp(&b.score)
        .then(a.source.is_detector().cmp(&b.source.is_detector()))
        .then(b.source.cmp(&a.source))
        == Ordering::Greater
}

/// Result of settling two conflicting spans.
enum Settled {
    One(Span),
    Two(Span, Span),
}

/// Inserts spans one at a time; whenever a span conflicts with one already
/// placed, both are taken out and `settle` decides what goes back in.
fn settle_all<C, S>(spans: Vec<Span>, conflicts: C, settle: S) -> Vec<Span>
where
    C: Fn(&Span, &Span) -> bool,
    S: Fn(Span, Span) -> Settled,
{
    let mut sorted = spans;
    sort_spans(&mut sorted);

    let mut placed: Vec<Span> = Vec::with_capacity(sorted.len());
    for span in sorted {
        let mut queue = vec![span];
        while let Some(current) = queue.pop() {
            match placed.iter().position(|p| conflicts(p, &current)) {
                Some(pos) => {
                    let other = placed.remove(pos);
                    match settle(other, current) {
                        Settled::One(s) => queue.push(s),
                        Settled::Two(a, b) => {
                            queue.push(a);
                            queue.push(b);
                        }
                    }
                }
                None => placed.push(current),
            }
        }
    }
    sort_spans(&mut placed);
    placed
}

/// Legacy resolution: on any overlap the higher-ranked span wins outright and
/// detector spans outrank tagger spans.
pub fn resolve_best_of(candidates: Vec<Span>) -> Vec<Span> {
    settle_all(candidates, |a, b| a.overlaps(b), |a, b| {
        if rank(&a, &b, true) == Ordering::Less { Settled::One(b) } else { Settled::One(a) }
    })
}

/// The candidate set handed to the veto engine.
pub fn pre_veto(candidates: Vec<Span>, mode: MergeMode) -> Vec<Span> {
    let deduped = dedupe_exact(candidates);
    match mode {
        MergeMode::Union => deduped,
        MergeMode::BestOf => resolve_best_of(deduped),
    }
}

/// Grows a span outward so it neither starts nor ends inside a token.
/// Running it twice is a no-op.
pub fn expand_word_boundaries(span: &Span, text: &str) -> Span {
    let mut start = span.start;
    let mut end = span.end;

    if text[start..end].chars().next().is_some_and(is_token_char) {
        while let Some(c) = text[..start].chars().next_back() {
            if !is_token_char(c) {
                break;
            }
            start -= c.len_utf8();
        }
    }
    if text[start..end].chars().next_back().is_some_and(is_token_char) {
        while let Some(c) = text[end..].chars().next() {
            if !is_token_char(c) {
                break;
            }
            end += c.len_utf8();
        }
    }

    if (start, end) == (span.start, span.end) {
        span.clone()
    } else {
        span.with_range(start, end)
    }
}

/// PATIENT: absorb a trailing initial or generational suffix.
/// GEO: absorb a leading place-name prefix or a trailing facility word.
pub fn extend_targeted(span: &Span, text: &str) -> Span {
    let mut start = span.start;
    let mut end = span.end;
    match span.label {
        EntityLabel::Patient => {
            let after = &text[end..];
            if let Some(m) = GENERATIONAL_SUFFIX.find(after) {
                end += m.end();
            } else if let Some(caps) = TRAILING_INITIAL.captures(after) {
                let letter = caps.get(1).map_or("", |m| m.as_str());
                let dotted = caps.get(2).is_some_and(|m| m.as_str() == ".");
                // "I" and "A" are far more often words than initials
                if dotted || !matches!(letter, "I" | "A") {
                    end += caps.get(0).map_or(0, |m| m.end());
                }
            }
        }
        EntityLabel::Geo => {
            let before = preceding_window(text, start, 24);
            if let Some(m) = PLACE_PREFIX.find(before) {
                start -= before.len() - m.start();
            }
            if let Some(m) = FACILITY_SUFFIX.find(&text[end..]) {
                end += m.end();
            }
        }
        _ => {}
    }

    if (start, end) == (span.start, span.end) {
        span.clone()
    } else {
        span.with_range(start, end)
    }
}

/// Trims whitespace and punctuation off both ends of `[start, end)`.
fn trim_range(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let left = slice.len() - slice.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
    let right = slice.trim_end_matches(|c: char| !c.is_alphanumeric()).len();
    (left < right).then_some((start + left, start + right))
}

fn union_of(a: Span, b: Span) -> Span {
    let start = a.start.min(b.start);
    let end = a.end.max(b.end);
    let keeper = if better_duplicate(&b, &a) { b } else { a };
    keeper.with_range(start, end)
}

/// Unions overlapping spans that carry the same label.
pub fn merge_same_label(spans: Vec<Span>) -> Vec<Span> {
    settle_all(
        spans,
        |a, b| a.label == b.label && a.overlaps(b),
        |a, b| Settled::One(union_of(a, b)),
    )
}

/// Final resolution into a non-overlapping set.
///
/// In union mode same-label overlaps are unioned; differently-labelled ones go
/// to the longer span, then the riskier label, then the higher score. When the
/// overlap is under half of the smaller span both are kept and the loser is
/// trimmed to the part the winner does not cover. Best-of mode keeps its
/// detector-first, winner-takes-all rule.
pub fn resolve_overlaps(spans: Vec<Span>, text: &str, mode: MergeMode) -> Vec<Span> {
    if mode == MergeMode::BestOf {
        return resolve_best_of(spans);
    }
    settle_all(spans, |a, b| a.overlaps(b), |a, b| {
        if a.label == b.label {
            return Settled::One(union_of(a, b));
        }
        let (winner, loser) = if rank(&a, &b, false) == Ordering::Less { (b, a) } else { (a, b) };

        let smaller = winner.len().min(loser.len()).max(1);
        let ratio = winner.overlap_len(&loser) as f64 / smaller as f64;
        if ratio >= MIN_OVERLAP_RATIO {
            return Settled::One(winner);
        }

        let remainder = if loser.start < winner.start {
            (loser.start, winner.start)
        } else {
            (winner.end, loser.end)
        };
        match trim_range(text, remainder.0, remainder.1) {
            Some((s, e)) => {
                debug!("Trimmed {} span to [{}..{}) beside {} span", loser.label, s, e, winner.label);
                let trimmed = loser.with_range(s, e);
                Settled::Two(winner, trimmed)
            }
            None => Settled::One(winner),
        }
    })
}

/// Shapes and resolves the veto survivors.
pub fn consolidate(survivors: Vec<Span>, text: &str, mode: MergeMode) -> Vec<Span> {
    let shaped: Vec<Span> = survivors
        .iter()
        .filter(|s| s.is_well_formed(text))
        .map(|s| extend_targeted(&expand_word_boundaries(s, text), text))
        .collect();
    let merged = merge_same_label(shaped);
    resolve_overlaps(merged, text, mode)
}
