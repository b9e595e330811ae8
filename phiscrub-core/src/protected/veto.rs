// phiscrub-core/src/protected/veto.rs
//! The veto engine.
//!
//! Each candidate is checked against an ordered list of rules; the first rule
//! that matches vetoes it. A decision depends only on the candidate, the text,
//! the index and the config, never on sibling candidates.
//!
//! License: MIT OR APACHE 2.0

use std::fmt;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use phiscrub_lexicon::boundary::{following_window, preceding_window};
use phiscrub_lexicon::normalize_term;

use crate::clinician;
use crate::config::ScrubConfig;
use crate::span::{loggable, EntityLabel, Span};
use super::index::ProtectedTermIndex;

/// Why a candidate was vetoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoReason {
    Stopword,
    PassiveVoice,
    PatientVerb,
    NumericContinuation,
    SafeFieldValue,
    Anatomy,
    Device,
    ClinicalTerm,
    CptCode,
    Measurement,
    Provider,
    Noise,
}

impl VetoReason {
    pub fn as_str(self) -> &'static str {
        match self {
            VetoReason::Stopword => "stopword",
            VetoReason::PassiveVoice => "passive_voice",
            VetoReason::PatientVerb => "patient_verb",
            VetoReason::NumericContinuation => "numeric_continuation",
            VetoReason::SafeFieldValue => "safe_field_value",
            VetoReason::Anatomy => "anatomy",
            VetoReason::Device => "device",
            VetoReason::ClinicalTerm => "clinical_term",
            VetoReason::CptCode => "cpt_code",
            VetoReason::Measurement => "measurement",
            VetoReason::Provider => "provider",
            VetoReason::Noise => "noise",
        }
    }
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a rule may look at for one candidate.
pub struct VetoContext<'a> {
    pub span: &'a Span,
    pub text: &'a str,
    pub surface: &'a str,
    /// Normalized surface.
    pub norm: String,
    /// Normalized tokens of the surface.
    pub tokens: Vec<String>,
    pub index: &'a ProtectedTermIndex,
}

impl<'a> VetoContext<'a> {
    pub fn new(span: &'a Span, text: &'a str, index: &'a ProtectedTermIndex) -> Self {
        let surface = span.surface(text);
        let tokens = surface
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '/'))
            .map(normalize_term)
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            span,
            text,
            surface,
            norm: normalize_term(surface),
            tokens,
            index,
        }
    }

    fn is_name_like(&self) -> bool {
        self.span.label.is_name_like()
    }

    /// Word immediately before the span, lowercased.
    fn previous_word(&self) -> String {
        let before = preceding_window(self.text, self.span.start, 24).trim_end();
        before
            .rsplit(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("")
            .to_lowercase()
    }

    /// Word immediately after the span, lowercased.
    fn next_word(&self) -> String {
        let after = following_window(self.text, self.span.end, 32).trim_start();
        after
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("")
            .to_lowercase()
    }
}

/// One entry in the ordered rule list.
pub struct VetoRule {
    pub reason: VetoReason,
    pub check: fn(&VetoContext) -> bool,
}

static STATION_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:station\s*\d{1,2}[rl]?[si]?|\d{1,2}[rl][si]?)$").expect("station pattern is valid")
});

static SEGMENT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[rl]?b\d{1,2}(?:\+\d{1,2})?[a-c]?$").expect("segment pattern is valid")
});

static MEASUREMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[<>]=?|~|≤|≥)?\s*\d+(?:[.,]\d+)?\s*(?:x\s*\d+(?:[.,]\d+)?\s*)*([a-z][a-z0-9]*)$")
        .expect("measurement pattern is valid")
});

static LONE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,4}(?:[.,]\d+)?$").expect("lone number pattern is valid")
});

fn is_numeric_surface(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') && s.chars().any(|c| c.is_ascii_digit())
}

fn is_verb_shaped(ctx: &VetoContext, raw: &str, norm: &str) -> bool {
    ctx.index.is_clinical_verb(norm)
        || (raw.starts_with(|c: char| c.is_lowercase()) && norm.len() > 4 && norm.ends_with("ed"))
}

// 1. lexical stopwords
fn all_stopwords(ctx: &VetoContext) -> bool {
    ctx.is_name_like()
        && !ctx.tokens.is_empty()
        && ctx.tokens.iter().all(|t| ctx.index.is_stopword(t) || ctx.index.is_clinical_verb(t))
}

fn passive_voice(ctx: &VetoContext) -> bool {
    let Some(first_raw) = ctx.surface.split_whitespace().next() else { return false };
    let Some(first) = ctx.tokens.first() else { return false };
    matches!(ctx.previous_word().as_str(), "was" | "were" | "is" | "are" | "been" | "being")
        && is_verb_shaped(ctx, first_raw, first)
}

// 2. "patient" + verb
fn patient_verb(ctx: &VetoContext) -> bool {
    let Some(first) = ctx.tokens.first() else { return false };
    if first != "patient" && first != "pt" {
        return false;
    }
    match ctx.tokens.get(1) {
        Some(second) => ctx.tokens.len() == 2 && ctx.index.is_clinical_verb(second),
        None => ctx.index.is_clinical_verb(&ctx.next_word()),
    }
}

// 3. fragment of a larger number
fn numeric_continuation(ctx: &VetoContext) -> bool {
    if !is_numeric_surface(ctx.surface) {
        return false;
    }
    let before = ctx.text[..ctx.span.start].chars().rev().take(2).collect::<Vec<_>>();
    let after = ctx.text[ctx.span.end..].chars().take(2).collect::<Vec<_>>();

    let glued_before = match before.as_slice() {
        [c, ..] if c.is_ascii_digit() => true,
        ['.' | ',', d, ..] => d.is_ascii_digit(),
        _ => false,
    };
    let glued_after = match after.as_slice() {
        [c, ..] if c.is_ascii_digit() || *c == '%' => true,
        ['.' | ',', d, ..] => d.is_ascii_digit(),
        _ => false,
    };
    glued_before || glued_after
}

// 4. value right after a non-identifying field header
fn safe_field_value(ctx: &VetoContext) -> bool {
    if !ctx.surface.starts_with(|c: char| c.is_lowercase()) || ctx.surface.len() > 40 {
        return false;
    }
    let line_start = ctx.text[..ctx.span.start].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &ctx.text[line_start..ctx.span.start];
    let Some(colon) = prefix.rfind(':') else { return false };
    if !prefix[colon + 1..].trim().is_empty() {
        return false;
    }
    let header_field = prefix[..colon]
        .rsplit(|c: char| matches!(c, ';' | '|' | '\t'))
        .next()
        .unwrap_or("");
    ctx.index.is_safe_header(&normalize_term(header_field))
}

// 5. anatomy, stations and segments
fn anatomy(ctx: &VetoContext) -> bool {
    if ctx.index.is_anatomy(&ctx.norm) || STATION_CODE.is_match(&ctx.norm) || SEGMENT_CODE.is_match(&ctx.norm) {
        return true;
    }
    let surface = ctx.surface.trim();
    let text = ctx.text;

    if !surface.is_empty() && surface.len() <= 2 && surface.chars().all(|c| c.is_ascii_digit()) {
        // 4 in "4R", 11 in "11Rs"
        let mut after = text[ctx.span.end..].chars();
        if let Some('R' | 'L' | 'r' | 'l') = after.next() {
            if after.next().map_or(true, |c| !c.is_alphabetic() || matches!(c, 's' | 'i' | 'S' | 'I')) {
                return true;
            }
        }
        // 3 in "RB3"
        let before = &text[..ctx.span.start];
        if before.ends_with('B') || before.ends_with('b') {
            let stem = before.trim_end_matches(['B', 'b']);
            if stem.is_empty() || stem.ends_with(['R', 'L', 'r', 'l']) || !stem.ends_with(char::is_alphabetic) {
                return true;
            }
        }
    }
    // R in "4R"
    let mut chars = surface.chars();
    if let (Some('R' | 'L'), rest) = (chars.next(), chars.as_str()) {
        if (rest.is_empty() || rest == "s" || rest == "i")
            && text[..ctx.span.start].ends_with(|c: char| c.is_ascii_digit())
        {
            return true;
        }
    }
    is_numeric_surface(surface) && ctx.index.follows_station_word(text, ctx.span.start)
}

// 6. devices and platforms
fn device(ctx: &VetoContext) -> bool {
    let idx = ctx.index;
    if idx.is_device(&ctx.norm) {
        return true;
    }
    let (text, s, e) = (ctx.text, ctx.span.start, ctx.span.end);
    (idx.is_ambiguous_manufacturer(&ctx.norm) && idx.has_device_context(text, s, e))
        || (idx.is_robotic_platform(&ctx.norm) && idx.has_robotic_context(text, s, e))
}

// 7. clinical vocabulary
fn clinical_term(ctx: &VetoContext) -> bool {
    ctx.index.is_clinical_term(&ctx.norm)
        || (!ctx.tokens.is_empty() && ctx.tokens.iter().all(|t| ctx.index.is_clinical_term(t)))
}

// 8. billing codes
fn cpt_code(ctx: &VetoContext) -> bool {
    let s = ctx.surface.trim();
    s.len() == 5
        && s.bytes().all(|b| b.is_ascii_digit())
        && ctx.index.has_cpt_context(ctx.text, ctx.span.start, ctx.span.end)
}

// 9. measurements
fn measurement(ctx: &VetoContext) -> bool {
    if let Some(caps) = MEASUREMENT.captures(&ctx.norm) {
        if caps.get(1).is_some_and(|unit| ctx.index.is_unit(unit.as_str())) {
            return true;
        }
    }
    LONE_NUMBER.is_match(ctx.surface.trim()) && ctx.index.unit_follows(ctx.text, ctx.span.end)
}

// 10. provider names
fn provider(ctx: &VetoContext) -> bool {
    let surface = ctx.surface.trim();
    let name_shaped = surface.starts_with(|c: char| c.is_uppercase())
        && !surface.chars().any(|c| c.is_ascii_digit());
    name_shaped
        && (clinician::starts_with_doctor_title(surface)
            || clinician::is_provider_context(ctx.text, ctx.span.start, ctx.span.end))
}

// 11. noise
fn noise(ctx: &VetoContext) -> bool {
    let s = ctx.surface.trim();
    let count = s.chars().count();
    if count == 0 || (count == 1 && s.chars().all(|c| !c.is_alphanumeric())) {
        return true;
    }
    // a short PATIENT span may be a real short surname
    count <= 2 && !is_numeric_surface(s) && ctx.span.label != EntityLabel::Patient
}

/// Rules in evaluation order.
pub static VETO_RULES: &[VetoRule] = &[
    VetoRule { reason: VetoReason::Stopword, check: all_stopwords },
    VetoRule { reason: VetoReason::PassiveVoice, check: passive_voice },
    VetoRule { reason: VetoReason::PatientVerb, check: patient_verb },
    VetoRule { reason: VetoReason::NumericContinuation, check: numeric_continuation },
    VetoRule { reason: VetoReason::SafeFieldValue, check: safe_field_value },
    VetoRule { reason: VetoReason::Anatomy, check: anatomy },
    VetoRule { reason: VetoReason::Device, check: device },
    VetoRule { reason: VetoReason::ClinicalTerm, check: clinical_term },
    VetoRule { reason: VetoReason::CptCode, check: cpt_code },
    VetoRule { reason: VetoReason::Measurement, check: measurement },
    VetoRule { reason: VetoReason::Provider, check: provider },
    VetoRule { reason: VetoReason::Noise, check: noise },
];

/// The first rule vetoing `span`, if any. Malformed spans are always vetoed as noise.
pub fn evaluate(span: &Span, text: &str, index: &ProtectedTermIndex) -> Option<VetoReason> {
    if !span.is_well_formed(text) {
        return Some(VetoReason::Noise);
    }
    let ctx = VetoContext::new(span, text, index);
    VETO_RULES.iter().find(|rule| (rule.check)(&ctx)).map(|rule| rule.reason)
}

/// The still-redactable subset of `candidates`, in input order.
pub fn veto(candidates: Vec<Span>, text: &str, index: &ProtectedTermIndex, config: &ScrubConfig) -> Vec<Span> {
    candidates
        .into_iter()
        .filter(|span| match evaluate(span, text, index) {
            Some(reason) => {
                if config.debug {
                    debug!("veto {} {} [{}..{}) '{}': {}",
                        span.source, span.label, span.start, span.end, loggable(span.surface(text)), reason);
                }
                false
            }
            None => {
                if config.debug {
                    debug!("keep {} {} [{}..{}) '{}'",
                        span.source, span.label, span.start, span.end, loggable(span.surface(text)));
                }
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtectedTermsConfig;
    use crate::span::SourceTag;

    fn index() -> ProtectedTermIndex {
        ProtectedTermIndex::build(&ProtectedTermsConfig::load_default().unwrap()).unwrap()
    }

    fn span_of(text: &str, needle: &str, label: EntityLabel) -> Span {
        let start = text.find(needle).unwrap();
        Span::new(start, start + needle.len(), label, 0.9, SourceTag::Ner)
    }

    fn reason(text: &str, needle: &str, label: EntityLabel) -> Option<VetoReason> {
        evaluate(&span_of(text, needle, label), text, &index())
    }

    #[test]
    fn test_clinical_vocabulary_vetoed_under_any_label() {
        let text = "EBUS of the subcarinal node at station 7 and RB3 was done.";
        for label in EntityLabel::ALL {
            for needle in ["EBUS", "subcarinal", "station 7", "RB3"] {
                assert!(reason(text, needle, label).is_some(), "{} as {} survived", needle, label);
            }
        }
    }

    #[test]
    fn test_rule_precedence_reports_first_match() {
        assert_eq!(reason("Specimens were obtained.", "obtained", EntityLabel::Patient), Some(VetoReason::Stopword));
        assert_eq!(reason("Specimens were obtained.", "obtained", EntityLabel::Date), Some(VetoReason::PassiveVoice));
        assert_eq!(reason("The patient tolerated it.", "patient", EntityLabel::Id), Some(VetoReason::PatientVerb));
    }

    #[test]
    fn test_numeric_fragments() {
        let text = "Lesion measured 2.5 cm";
        assert_eq!(reason(text, "5", EntityLabel::Id), Some(VetoReason::NumericContinuation));
        assert_eq!(reason(text, "2.5 cm", EntityLabel::Date), Some(VetoReason::Measurement));
    }

    #[test]
    fn test_split_station_and_segment_tokens() {
        let text = "Nodes 4R and 11Rs sampled; RB10 clear.";
        assert_eq!(reason(text, "4", EntityLabel::Id), Some(VetoReason::Anatomy));
        assert_eq!(reason(text, "11", EntityLabel::Id), Some(VetoReason::Anatomy));
        assert_eq!(reason(text, "10", EntityLabel::Id), Some(VetoReason::Anatomy));
    }

    #[test]
    fn test_safe_field_value() {
        let text = "Indication: lung nodule\nPatient: Jane Roe";
        assert_eq!(reason(text, "lung nodule", EntityLabel::Geo), Some(VetoReason::SafeFieldValue));
        assert_eq!(reason(text, "Jane Roe", EntityLabel::Patient), None);
    }

    #[test]
    fn test_ambiguous_manufacturer_needs_device_context() {
        let text = "A 22 gauge Cook needle was used.";
        assert_eq!(reason(text, "Cook", EntityLabel::Patient), Some(VetoReason::Device));
        let text = "Mrs. Cook arrived with her daughter.";
        assert_eq!(reason(text, "Cook", EntityLabel::Patient), None);
    }

    #[test]
    fn test_robotic_platform_needs_robotic_context() {
        let text = "Robotic navigation with the Ion catheter.";
        assert_eq!(reason(text, "Ion", EntityLabel::Patient), Some(VetoReason::Device));
        let text = "Seen with Ion Popescu today.";
        assert_eq!(reason(text, "Ion Popescu", EntityLabel::Patient), None);
    }

    #[test]
    fn test_cpt_codes_need_billing_context() {
        let text = "CPT 31653 billed.";
        assert_eq!(reason(text, "31653", EntityLabel::Id), Some(VetoReason::CptCode));
        let text = "Zip 31653 on file.";
        assert_eq!(reason(text, "31653", EntityLabel::Id), None);
    }

    #[test]
    fn test_provider_names() {
        let text = "Attending: Dr. Laura Brennan performed the procedure.";
        assert_eq!(reason(text, "Laura Brennan", EntityLabel::Patient), Some(VetoReason::Provider));
        assert_eq!(reason(text, "Dr. Laura Brennan", EntityLabel::Patient), Some(VetoReason::Provider));
        let text = "Fellow: Omar Diaz";
        assert_eq!(reason(text, "Omar Diaz", EntityLabel::Geo), Some(VetoReason::Provider));
        let text = "Reviewed with Amy Chu, RN.";
        assert_eq!(reason(text, "Amy Chu", EntityLabel::Patient), Some(VetoReason::Provider));
    }

    #[test]
    fn test_noise_keeps_short_patient_names() {
        let text = "Seen: Ng - Al";
        assert_eq!(reason(text, "-", EntityLabel::Patient), Some(VetoReason::Noise));
        assert_eq!(reason(text, "Al", EntityLabel::Geo), Some(VetoReason::Noise));
        assert_eq!(reason(text, "Ng", EntityLabel::Patient), None);
    }

    #[test]
    fn test_veto_keeps_input_order() {
        let text = "Jane Roe had EBUS on 03/04/2024.";
        let idx = index();
        let candidates = vec![
            span_of(text, "03/04/2024", EntityLabel::Date),
            span_of(text, "EBUS", EntityLabel::Patient),
            span_of(text, "Jane Roe", EntityLabel::Patient),
        ];
        let kept = veto(candidates, text, &idx, &ScrubConfig { debug: true, ..Default::default() });
        let surfaces: Vec<&str> = kept.iter().map(|s| s.surface(text)).collect();
        assert_eq!(surfaces, vec!["03/04/2024", "Jane Roe"]);
    }

    #[test]
    fn test_city_before_state_and_zip_is_kept() {
        let text = "Patient lives in Pittsburgh, PA 15213 with family.";
        assert_eq!(reason(text, "Pittsburgh", EntityLabel::Geo), None);

        let text = "Discussed with Kim Lee, PA at bedside.";
        assert_eq!(reason(text, "Kim Lee", EntityLabel::Patient), Some(VetoReason::Provider));
    }
}
