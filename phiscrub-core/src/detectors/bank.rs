// phiscrub-core/src/detectors/bank.rs
//! Runs the compiled detector list over a window of text.
//! License: MIT OR APACHE 2.0

use std::sync::Arc;
use anyhow::{Context, Result};
use log::debug;

use crate::clinician;
use crate::span::{loggable, EntityLabel, Span};
use super::builtin::builtin_specs;
use super::compiler::{get_or_compile_detectors, CompiledDetector, CompiledDetectors, DetectorSpec};

/// Capitalized words that open a sentence or header rather than a name.
const LEADING_NOISE: &[&str] = &[
    "note", "patient", "pt", "procedure", "the", "today", "history", "indication",
    "mr", "mrs", "ms", "miss", "then", "here", "report", "summary", "brief",
];

/// Field labels that can follow a name on the same header line without a colon
/// (`John Smith MRN 4455667`). A name capture ends before the first of these.
const TRAILING_FIELDS: &[&str] = &[
    "mrn", "dob", "dos", "doa", "age", "sex", "gender", "id", "acct", "account", "fin",
    "csn", "ssn", "date", "dx", "room", "rm", "bed", "phone", "tel", "attending",
    "provider", "physician", "surgeon", "referring", "location", "facility",
    "procedure", "indication", "hospital", "unit",
];

/// The fixed, ordered detector bank. Cheap to clone; the compiled list is shared.
#[derive(Debug, Clone)]
pub struct PatternBank {
    detectors: Arc<CompiledDetectors>,
}

impl PatternBank {
    /// The built-in bank.
    pub fn new() -> Result<Self> {
        Self::with_specs(&builtin_specs())
    }

    pub fn with_specs(specs: &[DetectorSpec]) -> Result<Self> {
        let detectors = get_or_compile_detectors(specs)
            .context("Failed to compile detectors for PatternBank")?;
        Ok(Self { detectors })
    }

    pub fn len(&self) -> usize {
        self.detectors.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.detectors.is_empty()
    }

    /// All candidates in `window`, in window-local offsets, detector order first.
    pub fn detect(&self, window: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        for detector in &self.detectors.detectors {
            self.run_detector(detector, window, &mut spans);
        }
        spans
    }

    fn run_detector(&self, detector: &CompiledDetector, window: &str, out: &mut Vec<Span>) {
        for caps in detector.regex.captures_iter(window) {
            let Some(m) = caps.get(detector.group) else { continue };
            let Some((mut start, mut end)) = trim_capture(window, m.start(), m.end()) else { continue };

            if detector.require_digit && !window[start..end].bytes().any(|b| b.is_ascii_digit()) {
                continue;
            }

            let Some(label) = detector.label.resolve(&window[start..end]) else { continue };

            if label == EntityLabel::Patient {
                match strip_leading_noise(window, start, end)
                    .and_then(|(s, e)| strip_trailing_fields(window, s, e))
                {
                    Some((s, e)) => {
                        start = s;
                        end = e;
                    }
                    None => continue,
                }
            }

            if detector.provider_guard && clinician::is_provider_context(window, start, end) {
                debug!("Detector '{}' skipped provider-context match '{}'",
                    detector.source, loggable(&window[start..end]));
                continue;
            }

            out.push(Span::new(start, end, label, detector.score, detector.source));
        }
    }
}

/// Trims whitespace and trailing separators off a capture, and drops a final
/// token that is really the next field's header (`John Smith MRN:`).
fn trim_capture(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let start = start + lead;
    let mut end = end;

    let after = text[end..].trim_start_matches([' ', '\t']);
    if after.starts_with(':') {
        if let Some(space) = text[start..end].rfind([' ', '\t', ',']) {
            end = start + space;
        }
    }

    loop {
        let current = &text[start..end];
        let trimmed = current.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'));
        if trimmed.len() == current.len() {
            break;
        }
        end = start + trimmed.len();
    }

    (start < end).then_some((start, end))
}

/// Drops leading header/sentence words from a name capture.
fn strip_leading_noise(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let mut start = start;
    loop {
        let current = &text[start..end];
        let first = current.split([' ', '\t']).next().unwrap_or("");
        let bare = first.trim_end_matches(['.', ',', ':']).to_ascii_lowercase();
        if first.len() < current.len() && LEADING_NOISE.contains(&bare.as_str()) {
            let rest = &current[first.len()..];
            start += first.len() + (rest.len() - rest.trim_start().len());
        } else {
            break;
        }
    }
    (start < end).then_some((start, end))
}

/// Cuts a name capture before the first field label after its first word.
fn strip_trailing_fields(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let current = &text[start..end];
    let mut cut = None;
    let mut offset = 0;
    for (i, token) in current.split([' ', '\t']).enumerate() {
        let bare = token.trim_matches(|c: char| matches!(c, '.' | ',' | ':' | '#')).to_ascii_lowercase();
        if i > 0 && TRAILING_FIELDS.contains(&bare.as_str()) {
            cut = Some(offset);
            break;
        }
        offset += token.len() + 1;
    }
    let Some(cut) = cut else { return Some((start, end)) };

    let kept = text[start..start + cut].trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';'));
    (!kept.is_empty()).then(|| (start, start + kept.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceTag;

    fn bank() -> PatternBank {
        PatternBank::new().unwrap()
    }

    fn find<'a>(spans: &'a [Span], text: &str, surface: &str) -> Option<&'a Span> {
        spans.iter().find(|s| s.surface(text) == surface)
    }

    #[test]
    fn test_header_name() {
        let text = "Patient: Smith, John\nStation 7 was inspected.";
        let spans = bank().detect(text);
        let s = find(&spans, text, "Smith, John").expect("header name");
        assert_eq!(s.label, EntityLabel::Patient);
        assert_eq!(s.source, SourceTag::HeaderName);
    }

    #[test]
    fn test_header_name_drops_next_header() {
        let text = "Patient Name: John Smith MRN: 123456";
        let spans = bank().detect(text);
        assert!(find(&spans, text, "John Smith").is_some());
        let mrn = find(&spans, text, "123456").expect("mrn");
        assert_eq!(mrn.label, EntityLabel::Id);
    }

    #[test]
    fn test_header_name_stops_at_colonless_field() {
        let text = "Patient: John Smith MRN 4455667\nDOB recorded.";
        let spans = bank().detect(text);
        assert!(find(&spans, text, "John Smith").is_some(), "got {:?}", spans);
        assert!(spans.iter().all(|s| !s.surface(text).contains("MRN")));

        let text = "Patient: Roe, Jane DOB 01/02/1950";
        let spans = bank().detect(text);
        assert!(find(&spans, text, "Roe, Jane").is_some(), "got {:?}", spans);
    }

    #[test]
    fn test_mrn_with_internal_space() {
        let text = "MRN: A92 555";
        let spans = bank().detect(text);
        let s = find(&spans, text, "A92 555").expect("mrn");
        assert_eq!(s.label, EntityLabel::Id);
        assert_eq!(s.source, SourceTag::Mrn);
    }

    #[test]
    fn test_dates() {
        let text = "DOB: 04/12/1957. Procedure on March 3, 2024 and 2024-03-03.";
        let spans = bank().detect(text);
        assert_eq!(find(&spans, text, "04/12/1957").map(|s| s.label), Some(EntityLabel::Date));
        assert!(find(&spans, text, "March 3, 2024").is_some());
        assert!(find(&spans, text, "2024-03-03").is_some());
    }

    #[test]
    fn test_narrative_and_title_names() {
        let text = "Walter Ames is a 67-year-old man. Mrs. Dana Holt underwent EBUS.";
        let spans = bank().detect(text);
        assert!(find(&spans, text, "Walter Ames").is_some());
        assert!(find(&spans, text, "Dana Holt").is_some());
    }

    #[test]
    fn test_provider_guard_blocks_credentialed_names() {
        let text = "Ms. Laura Brennan, MD reviewed the films.";
        let spans = bank().detect(text);
        assert!(find(&spans, text, "Laura Brennan").is_none());
    }

    #[test]
    fn test_placeholders() {
        let text = "Seen by [PROVIDER] for [PATIENT NAME] on {{DOB}}.";
        let spans = bank().detect(text);
        assert_eq!(find(&spans, text, "[PATIENT NAME]").map(|s| s.label), Some(EntityLabel::Patient));
        assert_eq!(find(&spans, text, "{{DOB}}").map(|s| s.label), Some(EntityLabel::Date));
        assert!(find(&spans, text, "[PROVIDER]").is_none());
    }

    #[test]
    fn test_contact_forms() {
        let text = "Call (555) 123-4567 or mail jdoe@example.org";
        let spans = bank().detect(text);
        assert!(find(&spans, text, "(555) 123-4567").is_some());
        assert!(find(&spans, text, "jdoe@example.org").is_some());
    }

    #[test]
    fn test_leading_noise_is_stripped() {
        let text = "Note Walter Ames underwent bronchoscopy.";
        let spans = bank().detect(text);
        assert!(find(&spans, text, "Walter Ames").is_some());
    }
}
