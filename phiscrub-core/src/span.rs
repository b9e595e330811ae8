// phiscrub-core/src/span.rs
//! Provides the span model shared by every stage of the engine, together with
//! PHI-safe helpers for logging span contents.
//!
//! A [`Span`] is a half-open byte range `[start, end)` into the document text,
//! labelled with an [`EntityLabel`], a confidence score and a [`SourceTag`]
//! describing which detector proposed it.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use log::debug;

use lazy_static::lazy_static;
use sha2::{Sha256, Digest};
use hex;

lazy_static! {
    /// A static boolean that is initialized once to determine if PHI is allowed in debug logs.
    static ref PHI_DEBUG_ALLOWED: bool = {
        std::env::var("PHISCRUB_ALLOW_DEBUG_PHI")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

/// The closed set of redaction-significant labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityLabel {
    Patient,
    Date,
    Geo,
    Id,
    Contact,
}

impl EntityLabel {
    pub const ALL: [EntityLabel; 5] = [
        EntityLabel::Patient,
        EntityLabel::Date,
        EntityLabel::Geo,
        EntityLabel::Id,
        EntityLabel::Contact,
    ];

    /// Tie-break order between overlapping survivors: `ID > PATIENT > CONTACT > GEO > DATE`.
    pub fn risk_priority(self) -> u8 {
        match self {
            EntityLabel::Id => 5,
            EntityLabel::Patient => 4,
            EntityLabel::Contact => 3,
            EntityLabel::Geo => 2,
            EntityLabel::Date => 1,
        }
    }

    /// Labels that go through the name-oriented stopword checks.
    pub fn is_name_like(self) -> bool {
        matches!(self, EntityLabel::Patient | EntityLabel::Geo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityLabel::Patient => "PATIENT",
            EntityLabel::Date => "DATE",
            EntityLabel::Geo => "GEO",
            EntityLabel::Id => "ID",
            EntityLabel::Contact => "CONTACT",
        }
    }

    /// Maps a raw tagger label to a significant label.
    ///
    /// BIO/BILOU prefixes (`B-`, `I-`, `E-`, `S-`, `L-`, `U-`) are stripped and a
    /// handful of common aliases are folded in. Anything else is noise and
    /// yields `None`.
    pub fn from_tagger_label(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let bare = match trimmed.as_bytes() {
            [p, b'-', ..] if matches!(p.to_ascii_uppercase(), b'B' | b'I' | b'E' | b'S' | b'L' | b'U') => &trimmed[2..],
            _ => trimmed,
        };
        match bare.to_ascii_uppercase().as_str() {
            "PATIENT" | "NAME" | "PER" | "PERSON" => Some(EntityLabel::Patient),
            "DATE" | "DOB" => Some(EntityLabel::Date),
            "GEO" | "LOC" | "LOCATION" | "ADDRESS" | "CITY" | "HOSPITAL" | "FACILITY" => Some(EntityLabel::Geo),
            "ID" | "MRN" | "IDNUM" | "ACCOUNT" => Some(EntityLabel::Id),
            "CONTACT" | "PHONE" | "EMAIL" | "FAX" | "URL" => Some(EntityLabel::Contact),
            _ => None,
        }
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityLabel::ALL
            .iter()
            .copied()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown entity label '{}'", s))
    }
}

/// Provenance of a candidate span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// The statistical entity tagger.
    Ner,
    HeaderName,
    NarrativeName,
    TitleName,
    Mrn,
    CaseId,
    ParenId,
    Dob,
    HeaderDate,
    DateNumeric,
    DateIso,
    DateText,
    Placeholder,
    Phone,
    Email,
    StreetAddress,
    HeaderGeo,
    /// Added by the session consistency pass.
    SessionName,
    /// User-selected redaction.
    Manual,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::Ner => "ner",
            SourceTag::HeaderName => "header_name",
            SourceTag::NarrativeName => "narrative_name",
            SourceTag::TitleName => "title_name",
            SourceTag::Mrn => "mrn",
            SourceTag::CaseId => "case_id",
            SourceTag::ParenId => "paren_id",
            SourceTag::Dob => "dob",
            SourceTag::HeaderDate => "header_date",
            SourceTag::DateNumeric => "date_numeric",
            SourceTag::DateIso => "date_iso",
            SourceTag::DateText => "date_text",
            SourceTag::Placeholder => "placeholder",
            SourceTag::Phone => "phone",
            SourceTag::Email => "email",
            SourceTag::StreetAddress => "street_address",
            SourceTag::HeaderGeo => "header_geo",
            SourceTag::SessionName => "session_name",
            SourceTag::Manual => "manual",
        }
    }

    /// True for the pattern detector bank (not the tagger, session pass or user).
    pub fn is_detector(self) -> bool {
        !matches!(self, SourceTag::Ner | SourceTag::SessionName | SourceTag::Manual)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single redaction candidate or decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub start: usize,
    pub end: usize,
    pub label: EntityLabel,
    pub score: f64,
    pub source: SourceTag,
}

impl Span {
    pub fn new(start: usize, end: usize, label: EntityLabel, score: f64, source: SourceTag) -> Self {
        Self {
            id: span_id(source, label, start, end),
            start,
            end,
            label,
            score,
            source,
        }
    }

    /// A user-selected redaction. Fixed score 1.0.
    pub fn manual(start: usize, end: usize, label: EntityLabel) -> Self {
        Self::new(start, end, label, 1.0, SourceTag::Manual)
    }

    /// Same span moved to a new range; the id follows the range.
    pub fn with_range(&self, start: usize, end: usize) -> Self {
        Self::new(start, end, self.label, self.score, self.source)
    }

    /// Same span moved by `offset` bytes (window-local to absolute).
    pub fn rebased(&self, offset: usize) -> Self {
        self.with_range(self.start + offset, self.end + offset)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn overlap_len(&self, other: &Span) -> usize {
        self.end.min(other.end).saturating_sub(self.start.max(other.start))
    }

    /// `0 <= start < end <= len(text)` on char boundaries, with a finite score.
    pub fn is_well_formed(&self, text: &str) -> bool {
        self.start < self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
            && self.score.is_finite()
    }

    /// The covered text. Callers must only use this on well-formed spans.
    pub fn surface<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

/// Deterministic identifier derived from `(source, label, start, end)`.
pub fn span_id(source: SourceTag, label: EntityLabel, start: usize, end: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(label.as_str().as_bytes());
    hasher.update(format!(":{}:{}", start, end).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Sorts spans by `(start, end, label, source)` so every stage sees a stable order.
pub fn sort_spans(spans: &mut [Span]) {
    spans.sort_by(|a, b| {
        (a.start, a.end, a.label, a.source).cmp(&(b.start, b.end, b.label, b.source))
    });
}

pub fn redact_sensitive(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", s.len())
    }
}

/// Span text as it may appear in logs.
pub fn loggable(sensitive_content: &str) -> String {
    if *PHI_DEBUG_ALLOWED {
        sensitive_content.to_string()
    } else {
        redact_sensitive(sensitive_content)
    }
}

pub fn log_span_debug(module_path: &str, what: &str, span: &Span, text: &str) {
    debug!("{} {}: {} [{}..{}) {} score={:.2} text='{}'",
        module_path,
        what,
        span.label,
        span.start,
        span.end,
        span.source,
        span.score,
        loggable(span.surface(text))
    );
}
