// phiscrub-core/src/manual.rs
//! User-selected redactions.
//!
//! Manual spans skip detection and veto. They override any automatic decision
//! they touch, and overlapping manual spans are merged.

use log::debug;

use crate::span::{sort_spans, Span};

/// Overlays `manual` onto `decisions`; the result is sorted and non-overlapping.
pub fn overlay_manual(decisions: Vec<Span>, manual: &[Span], text: &str) -> Vec<Span> {
    let mut pinned: Vec<Span> = manual
        .iter()
        .filter(|m| {
            let ok = m.start < m.end && m.end <= text.len()
                && text.is_char_boundary(m.start) && text.is_char_boundary(m.end);
            if !ok {
                debug!("Dropping malformed manual span [{}..{})", m.start, m.end);
            }
            ok
        })
        .map(|m| Span::manual(m.start, m.end, m.label))
        .collect();
    if pinned.is_empty() {
        return decisions;
    }
    sort_spans(&mut pinned);

    let mut merged: Vec<Span> = Vec::with_capacity(pinned.len());
    for span in pinned {
        match merged.last_mut() {
            Some(last) if last.overlaps(&span) => {
                *last = Span::manual(last.start, last.end.max(span.end), last.label);
            }
            _ => merged.push(span),
        }
    }

    let mut out: Vec<Span> = decisions
        .into_iter()
        .filter(|d| !merged.iter().any(|m| m.overlaps(d)))
        .collect();
    out.extend(merged);
    sort_spans(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{EntityLabel, SourceTag};

    #[test]
    fn test_manual_overrides_and_merges() {
        let text = "Jane Roe lives at 5 Elm Street";
        let auto = vec![
            Span::new(0, 8, EntityLabel::Patient, 0.9, SourceTag::Ner),
            Span::new(18, 30, EntityLabel::Geo, 0.85, SourceTag::StreetAddress),
        ];
        let manual = vec![
            Span::manual(5, 8, EntityLabel::Id),
            Span::manual(6, 14, EntityLabel::Contact),
            Span::manual(40, 50, EntityLabel::Geo),
        ];
        let out = overlay_manual(auto, &manual, text);
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].start, out[0].end, out[0].label), (5, 14, EntityLabel::Id));
        assert_eq!(out[0].source, SourceTag::Manual);
        assert_eq!(out[0].score, 1.0);
        assert_eq!(out[1].source, SourceTag::StreetAddress);
    }

    #[test]
    fn test_no_manual_spans_is_identity() {
        let auto = vec![Span::new(0, 4, EntityLabel::Id, 0.9, SourceTag::Mrn)];
        assert_eq!(overlay_manual(auto.clone(), &[], "1234"), auto);
    }
}
