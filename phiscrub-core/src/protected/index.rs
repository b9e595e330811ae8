// phiscrub-core/src/protected/index.rs
//! The immutable lookup structure built once per session from
//! [`ProtectedTermsConfig`]. Exact-membership lists are normalized `HashSet`s;
//! "is there a context word nearby" lists are keyword scanners.

use std::collections::HashSet;
use std::path::Path;

use log::debug;

use phiscrub_lexicon::{normalize_term, KeywordScanner};

use crate::config::ProtectedTermsConfig;
use crate::errors::ScrubError;

/// Bytes scanned on each side of a candidate for device context.
pub const DEVICE_CONTEXT_RADIUS: usize = 48;
/// Bytes scanned on each side of a candidate for robotic context.
pub const ROBOTIC_CONTEXT_RADIUS: usize = 64;
/// Bytes scanned on each side of a 5-digit token for billing words.
pub const CPT_CONTEXT_RADIUS: usize = 40;
/// Bytes scanned after a lone number for a unit.
pub const MEASUREMENT_RADIUS: usize = 10;

#[derive(Debug)]
pub struct ProtectedTermIndex {
    anatomy: HashSet<String>,
    devices: HashSet<String>,
    ambiguous_manufacturers: HashSet<String>,
    robotic_platforms: HashSet<String>,
    clinical_terms: HashSet<String>,
    stopwords: HashSet<String>,
    clinical_verbs: HashSet<String>,
    safe_field_headers: HashSet<String>,
    device_context: KeywordScanner,
    robotic_context: KeywordScanner,
    cpt_context: KeywordScanner,
    station_context: KeywordScanner,
    measurement: KeywordScanner,
}

fn normalized_set(list: &[String]) -> HashSet<String> {
    list.iter()
        .map(|t| normalize_term(t))
        .filter(|t| !t.is_empty())
        .collect()
}

fn scanner(name: &str, list: &[String]) -> Result<KeywordScanner, ScrubError> {
    KeywordScanner::new(list.iter().map(|t| normalize_term(t)))
        .map_err(|e| ScrubError::ProtectedTermsLoad(format!("{} scanner: {}", name, e)))
}

impl ProtectedTermIndex {
    pub fn build(config: &ProtectedTermsConfig) -> Result<Self, ScrubError> {
        let index = Self {
            anatomy: normalized_set(&config.anatomy),
            devices: normalized_set(&config.devices),
            ambiguous_manufacturers: normalized_set(&config.ambiguous_manufacturers),
            robotic_platforms: normalized_set(&config.robotic_platforms),
            clinical_terms: normalized_set(&config.clinical_terms),
            stopwords: normalized_set(&config.stopwords),
            clinical_verbs: normalized_set(&config.clinical_verbs),
            safe_field_headers: normalized_set(&config.safe_field_headers),
            device_context: scanner("device_context", &config.device_context)?,
            robotic_context: scanner("robotic_context", &config.robotic_context)?,
            cpt_context: scanner("cpt_context", &config.cpt_context)?,
            station_context: scanner("station_context", &config.station_context)?,
            measurement: scanner("measurement_keywords", &config.measurement_keywords)?,
        };
        debug!("Built protected-term index from {} terms.", config.term_count());
        Ok(index)
    }

    /// Built-in vocabulary plus an optional user file.
    pub fn load(user_path: Option<&Path>) -> Result<Self, ScrubError> {
        Self::build(&ProtectedTermsConfig::load(user_path)?)
    }

    pub fn is_anatomy(&self, norm: &str) -> bool {
        self.anatomy.contains(norm)
    }

    pub fn is_device(&self, norm: &str) -> bool {
        self.devices.contains(norm)
    }

    pub fn is_ambiguous_manufacturer(&self, norm: &str) -> bool {
        self.ambiguous_manufacturers.contains(norm)
    }

    pub fn is_robotic_platform(&self, norm: &str) -> bool {
        self.robotic_platforms.contains(norm)
    }

    pub fn is_clinical_term(&self, norm: &str) -> bool {
        self.clinical_terms.contains(norm)
    }

    pub fn is_stopword(&self, norm: &str) -> bool {
        self.stopwords.contains(norm)
    }

    pub fn is_clinical_verb(&self, norm: &str) -> bool {
        self.clinical_verbs.contains(norm)
    }

    pub fn is_safe_header(&self, norm: &str) -> bool {
        self.safe_field_headers.contains(norm)
    }

    pub fn has_device_context(&self, text: &str, start: usize, end: usize) -> bool {
        self.device_context.scan_around(text, start, end, DEVICE_CONTEXT_RADIUS)
    }

    pub fn has_robotic_context(&self, text: &str, start: usize, end: usize) -> bool {
        self.robotic_context.scan_around(text, start, end, ROBOTIC_CONTEXT_RADIUS)
    }

    pub fn has_cpt_context(&self, text: &str, start: usize, end: usize) -> bool {
        self.cpt_context.scan_around(text, start, end, CPT_CONTEXT_RADIUS)
    }

    /// A station word ends right before `pos` (`station 7`, `level 4`).
    pub fn follows_station_word(&self, text: &str, pos: usize) -> bool {
        let before = phiscrub_lexicon::boundary::preceding_window(text, pos, 24);
        let trimmed = before.trim_end_matches(|c: char| c.is_whitespace() || c == '#');
        if trimmed.len() == before.len() && !before.is_empty() {
            // the number is glued to the previous token
            return false;
        }
        self.station_context
            .find_words(trimmed)
            .last()
            .is_some_and(|hit| hit.end == trimmed.len())
    }

    /// A unit word appears within a few bytes after `pos`.
    pub fn unit_follows(&self, text: &str, pos: usize) -> bool {
        self.measurement.scan_following(text, pos, MEASUREMENT_RADIUS)
    }

    pub fn is_unit(&self, word: &str) -> bool {
        self.measurement.is_exact(word)
    }
}
