// phiscrub-core/src/clinician.rs
//! Provider-context detection.
//!
//! Names of clinicians appear in the same shapes as patient names. These checks
//! look at the text around a range and report whether it reads as a provider:
//! a trailing credential, a leading "Dr.", an attribution verb ("performed by"),
//! or a clinician-title header earlier on the same line. Both the detector bank
//! and the veto engine use them.

use once_cell::sync::Lazy;
use regex::Regex;

use phiscrub_lexicon::boundary::{following_window, preceding_window};

const CREDENTIAL_WINDOW: usize = 24;
const DOCTOR_WINDOW: usize = 16;
const ATTRIBUTION_WINDOW: usize = 64;

static CREDENTIAL_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[ \t]*,?[ \t]*(?:MD|M\.D\.|DO|D\.O\.|RN|NP|PA-C|PA|CRNA|PhD|Ph\.D\.|FCCP|MBBS|DNP|RRT|APRN|FNP|MPH|FACP|PharmD|MSN|BSN)(?:[^A-Za-z0-9]|$)",
    )
    .expect("credential pattern is valid")
});

// `Pittsburgh, PA 15213`: a state code before a ZIP, not a credential.
static STATE_ZIP_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*,?[ \t]*[A-Z]{2}[ \t]+\d{5}(?:-\d{4})?(?:[^0-9]|$)").expect("state/zip pattern is valid")
});

static DOCTOR_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bDr\.?|\bDoctor)\s*$").expect("doctor pattern is valid")
});

static ATTRIBUTION_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:performed|dictated|signed|reviewed|attested|authored|supervised|assisted|interpreted|read|seen|transcribed|verified|approved|referred|consulted|electronically\s+signed)\s+by\s*:?\s*(?:Dr\.?\s*)?$",
    )
    .expect("attribution pattern is valid")
});

static CLINICIAN_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:attending|fellow|resident|surgeon|assistant|proceduralist|operator|bronchoscopist|endoscopist|anesthesiologist|anesthesia|crna|physician|provider|referring|pcp|pathologist|cytopathologist|cytotechnologist|nurse|technician|staff|performed\s+by|dictated\s+by|signed\s+by)(?:\s+(?:physician|provider|surgeon|nurse|name))?(?:\(s\))?\s*:[^:\n]*$",
    )
    .expect("clinician header pattern is valid")
});

static DOCTOR_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:Dr\.?|Doctor)\s+\S").expect("doctor prefix pattern is valid")
});

/// `Smith, MD` / `Brennan RN`
pub fn followed_by_credential(text: &str, end: usize) -> bool {
    let after = following_window(text, end, CREDENTIAL_WINDOW);
    CREDENTIAL_AFTER.is_match(after) && !STATE_ZIP_AFTER.is_match(after)
}

/// `Dr. Brennan`
pub fn preceded_by_doctor(text: &str, start: usize) -> bool {
    DOCTOR_BEFORE.is_match(preceding_window(text, start, DOCTOR_WINDOW))
}

/// `performed by Brennan`
pub fn preceded_by_attribution(text: &str, start: usize) -> bool {
    ATTRIBUTION_BEFORE.is_match(preceding_window(text, start, ATTRIBUTION_WINDOW))
}

/// `Attending: ... Brennan` with no other header in between on the same line.
pub fn after_clinician_header(text: &str, start: usize) -> bool {
    let start = start.min(text.len());
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    CLINICIAN_HEADER.is_match(&text[line_start..start])
}

/// The span text itself opens with a doctor title.
pub fn starts_with_doctor_title(surface: &str) -> bool {
    DOCTOR_PREFIX.is_match(surface.trim_start())
}

/// Any of the provider signals around `[start, end)`.
pub fn is_provider_context(text: &str, start: usize, end: usize) -> bool {
    followed_by_credential(text, end)
        || preceded_by_doctor(text, start)
        || preceded_by_attribution(text, start)
        || after_clinician_header(text, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_of(text: &str, needle: &str) -> (usize, usize) {
        let s = text.find(needle).unwrap();
        (s, s + needle.len())
    }

    #[test]
    fn test_credential_suffix() {
        let text = "Seen with Laura Brennan, MD today";
        let (s, e) = range_of(text, "Laura Brennan");
        assert!(followed_by_credential(text, e));
        assert!(is_provider_context(text, s, e));

        let text = "John Smith, DOB 01/02/1950";
        let (_, e) = range_of(text, "John Smith");
        assert!(!followed_by_credential(text, e));

        let text = "Patient: Jane Roe\nDO NOT RESUSCITATE";
        let (_, e) = range_of(text, "Jane Roe");
        assert!(!followed_by_credential(text, e));
    }

    #[test]
    fn test_state_code_before_zip_is_not_a_credential() {
        let text = "Patient lives in Pittsburgh, PA 15213 with family.";
        let (s, e) = range_of(text, "Pittsburgh");
        assert!(!followed_by_credential(text, e));
        assert!(!is_provider_context(text, s, e));

        let text = "Moved to Dover, DO 19901-1234 last year.";
        let (_, e) = range_of(text, "Dover");
        assert!(!followed_by_credential(text, e));

        let text = "Reviewed with Kim Lee, PA today.";
        let (_, e) = range_of(text, "Kim Lee");
        assert!(followed_by_credential(text, e));
    }

    #[test]
    fn test_doctor_and_attribution() {
        let text = "Attending: Dr. Laura Brennan performed the procedure.";
        let (s, _) = range_of(text, "Laura Brennan");
        assert!(preceded_by_doctor(text, s));
        assert!(after_clinician_header(text, s));

        let text = "Procedure performed by Laura Brennan.";
        let (s, _) = range_of(text, "Laura Brennan");
        assert!(preceded_by_attribution(text, s));
    }

    #[test]
    fn test_clinician_header_is_same_line_only() {
        let text = "Fellow: Omar Diaz\nPatient: Jane Roe";
        let (s, _) = range_of(text, "Omar Diaz");
        assert!(after_clinician_header(text, s));
        let (s, _) = range_of(text, "Jane Roe");
        assert!(!after_clinician_header(text, s));
    }

    #[test]
    fn test_later_header_on_line_wins() {
        let text = "Attending: Dr. Lee   Patient: Jane Roe";
        let (s, _) = range_of(text, "Jane Roe");
        assert!(!after_clinician_header(text, s));
    }

    #[test]
    fn test_doctor_prefix_in_surface() {
        assert!(starts_with_doctor_title("Dr. Laura Brennan"));
        assert!(!starts_with_doctor_title("Drake Hollis"));
    }
}
