//! compiler.rs - Manages the compilation and caching of detector patterns.
//!
//! This module converts a list of [`DetectorSpec`]s into [`CompiledDetectors`],
//! ready for matching. A global, shared cache avoids recompiling the same list
//! for every run in a session.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{anyhow, Result};
use log::debug;
use regex::{Regex, RegexBuilder};
use lazy_static::lazy_static;
use std::sync::{Arc, RwLock};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use crate::errors::ScrubError;
use crate::span::{EntityLabel, SourceTag};

/// Maximum allowed length for a detector pattern string.
pub const MAX_PATTERN_LENGTH: usize = 600;

/// How a detector decides the label of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelRule {
    Fixed(EntityLabel),
    /// Derived from the placeholder word, e.g. `[PATIENT NAME]` is `PATIENT`.
    Placeholder,
}

impl LabelRule {
    pub fn resolve(self, surface: &str) -> Option<EntityLabel> {
        match self {
            LabelRule::Fixed(label) => Some(label),
            LabelRule::Placeholder => placeholder_label(surface),
        }
    }
}

fn placeholder_label(surface: &str) -> Option<EntityLabel> {
    let upper = surface.to_ascii_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |keys: &[&str]| words.iter().any(|w| keys.contains(w));
    if has(&["DOB", "DATE", "BIRTHDATE", "BIRTH", "DOS"]) {
        Some(EntityLabel::Date)
    } else if has(&["NAME", "PATIENT", "PT", "FIRSTNAME", "LASTNAME", "FULLNAME", "SURNAME", "FIRST", "LAST"]) {
        Some(EntityLabel::Patient)
    } else if has(&["PHONE", "EMAIL", "FAX", "CONTACT", "TELEPHONE"]) {
        Some(EntityLabel::Contact)
    } else if has(&["ADDRESS", "CITY", "STATE", "ZIP", "LOCATION", "HOSPITAL", "FACILITY"]) {
        Some(EntityLabel::Geo)
    } else if has(&["MRN", "ID", "NUMBER", "ACCOUNT", "SSN", "REDACTED", "PHI", "ACCESSION"]) {
        Some(EntityLabel::Id)
    } else {
        None
    }
}

/// A detector definition prior to compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSpec {
    pub source: SourceTag,
    pub label: LabelRule,
    pub pattern: String,
    /// Capture group holding the identifier; 0 for the whole match.
    pub group: usize,
    /// Baseline confidence.
    pub score: f64,
    pub multiline: bool,
    /// Skip matches that read as a clinician (credential, "Dr.", title header).
    pub provider_guard: bool,
    /// Skip matches without a single ASCII digit.
    pub require_digit: bool,
}

impl Hash for DetectorSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.label.hash(state);
        self.pattern.hash(state);
        self.group.hash(state);
        self.score.to_bits().hash(state);
        self.multiline.hash(state);
        self.provider_guard.hash(state);
        self.require_digit.hash(state);
    }
}

/// Represents a single compiled detector.
#[derive(Debug)]
pub struct CompiledDetector {
    pub regex: Regex,
    pub source: SourceTag,
    pub label: LabelRule,
    pub group: usize,
    pub score: f64,
    pub provider_guard: bool,
    pub require_digit: bool,
}

/// The ordered collection of compiled detectors.
#[derive(Debug)]
pub struct CompiledDetectors {
    pub detectors: Vec<CompiledDetector>,
}

lazy_static! {
    /// A thread-safe, global cache for compiled detectors.
    /// The key is a hash of the ordered spec list.
    static ref COMPILED_DETECTORS_CACHE: RwLock<HashMap<u64, Arc<CompiledDetectors>>> = RwLock::new(HashMap::new());
}

fn hash_specs(specs: &[DetectorSpec]) -> u64 {
    let mut hasher = DefaultHasher::new();
    // Order matters: detectors are evaluated in list order.
    specs.hash(&mut hasher);
    hasher.finish()
}

/// Compiles a list of `DetectorSpec`s. All failures are collected and reported together.
pub fn compile_detectors(specs: &[DetectorSpec]) -> Result<CompiledDetectors, ScrubError> {
    debug!("Starting compilation of {} detectors.", specs.len());

    let mut compiled = Vec::with_capacity(specs.len());
    let mut compilation_errors = Vec::new();

    for spec in specs {
        if spec.pattern.len() > MAX_PATTERN_LENGTH {
            compilation_errors.push(ScrubError::PatternLengthExceeded(
                spec.source.to_string(),
                spec.pattern.len(),
                MAX_PATTERN_LENGTH,
            ));
            continue;
        }

        let regex_result = RegexBuilder::new(&spec.pattern)
            .multi_line(spec.multiline)
            .size_limit(10 * (1 << 20)) // 10 MB limit for compiled regex
            .build();

        match regex_result {
            Ok(regex) => {
                if spec.group >= regex.captures_len() {
                    compilation_errors.push(ScrubError::Fatal(format!(
                        "Detector '{}' references capture group {} but the pattern has {}.",
                        spec.source, spec.group, regex.captures_len() - 1
                    )));
                    continue;
                }
                log::debug!(
                    target: "phiscrub_core::detectors",
                    "Detector '{}' compiled successfully.",
                    spec.source
                );
                compiled.push(CompiledDetector {
                    regex,
                    source: spec.source,
                    label: spec.label,
                    group: spec.group,
                    score: spec.score,
                    provider_guard: spec.provider_guard,
                    require_digit: spec.require_digit,
                });
            }
            Err(e) => {
                compilation_errors.push(ScrubError::DetectorCompilationError(spec.source.to_string(), e));
            }
        }
    }

    if !compilation_errors.is_empty() {
        let error_message = compilation_errors.iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join("\n");
        Err(ScrubError::Fatal(format!("Failed to compile {} detector(s):\n{}", compilation_errors.len(), error_message)))
    } else {
        debug!("Finished compiling detectors. Total compiled: {}.", compiled.len());
        Ok(CompiledDetectors { detectors: compiled })
    }
}

/// Gets a `CompiledDetectors` instance from the cache or compiles it if not found.
pub fn get_or_compile_detectors(specs: &[DetectorSpec]) -> Result<Arc<CompiledDetectors>> {
    let cache_key = hash_specs(specs);

    {
        let cache = COMPILED_DETECTORS_CACHE
            .read()
            .map_err(|_| anyhow!("detector cache lock poisoned"))?;
        if let Some(detectors) = cache.get(&cache_key) {
            debug!("Serving compiled detectors from cache for key: {}", &cache_key);
            return Ok(Arc::clone(detectors));
        }
    }

    debug!("Compiled detectors not found in cache. Compiling now.");
    let compiled_arc = Arc::new(compile_detectors(specs)?);

    COMPILED_DETECTORS_CACHE
        .write()
        .map_err(|_| anyhow!("detector cache lock poisoned"))?
        .insert(cache_key, Arc::clone(&compiled_arc));

    debug!("Successfully compiled and cached detectors for key: {}", &cache_key);
    Ok(compiled_arc)
}
