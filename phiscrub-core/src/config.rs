//! Configuration management for `phiscrub-core`.
//!
//! This module defines the per-run [`ScrubConfig`] consumed by the engine and the
//! static [`ProtectedTermsConfig`] vocabulary from which the protected-term index
//! is built. It handles YAML deserialization of vocabulary files and provides
//! utilities for loading, merging, and validating them.
//!
//! License: MIT OR Apache-2.0

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use log::{debug, info};

use crate::errors::ScrubError;

/// Default minimum tagger confidence.
pub const DEFAULT_AI_THRESHOLD: f64 = 0.45;
/// Default window width in bytes.
pub const DEFAULT_WINDOW_WIDTH: usize = 2500;
/// Default overlap between consecutive windows.
pub const DEFAULT_WINDOW_OVERLAP: usize = 250;
/// Trailing windows shorter than this are skipped unless they are the only window.
pub const DEFAULT_MIN_TAIL: usize = 50;

/// When overlap resolution runs relative to the veto engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Veto every candidate independently, resolve overlaps afterwards.
    #[default]
    Union,
    /// Legacy: resolve overlaps first, preferring detector spans, then veto.
    BestOf,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeMode::Union => "union",
            MergeMode::BestOf => "best_of",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(MergeMode::Union),
            "best_of" | "best-of" | "bestof" => Ok(MergeMode::BestOf),
            other => Err(format!("unknown merge mode '{}' (expected 'union' or 'best_of')", other)),
        }
    }
}

/// Window geometry for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowConfig {
    pub width: usize,
    pub overlap: usize,
    pub min_tail: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WINDOW_WIDTH,
            overlap: DEFAULT_WINDOW_OVERLAP,
            min_tail: DEFAULT_MIN_TAIL,
        }
    }
}

impl WindowConfig {
    pub fn stride(&self) -> usize {
        self.width - self.overlap
    }

    /// A skipped tail must lie inside the previous window's overlap, so
    /// `min_tail <= overlap < width` is required for full coverage.
    pub fn validate(&self) -> Result<(), ScrubError> {
        if self.width == 0 {
            return Err(ScrubError::InvalidWindowConfig("width must be greater than 0".to_string()));
        }
        if self.overlap >= self.width {
            return Err(ScrubError::InvalidWindowConfig(format!(
                "overlap ({}) must be smaller than width ({})", self.overlap, self.width
            )));
        }
        if self.min_tail > self.overlap {
            return Err(ScrubError::InvalidWindowConfig(format!(
                "minTail ({}) must not exceed overlap ({})", self.min_tail, self.overlap
            )));
        }
        Ok(())
    }
}

/// Options recognized by a detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrubConfig {
    /// Minimum confidence to accept a tagger candidate.
    pub ai_threshold: f64,
    /// Enables per-candidate veto tracing in the logs.
    pub debug: bool,
    /// Bypass the quantized tagger variant.
    pub force_unquantized: bool,
    pub merge_mode: MergeMode,
    pub windows: WindowConfig,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            ai_threshold: DEFAULT_AI_THRESHOLD,
            debug: false,
            force_unquantized: false,
            merge_mode: MergeMode::Union,
            windows: WindowConfig::default(),
        }
    }
}

impl ScrubConfig {
    pub fn validate(&self) -> Result<(), ScrubError> {
        if !self.ai_threshold.is_finite() || !(0.0..=1.0).contains(&self.ai_threshold) {
            return Err(ScrubError::Fatal(format!(
                "aiThreshold must be within [0, 1], got {}", self.ai_threshold
            )));
        }
        self.windows.validate()
    }
}

/// Static vocabulary from which the protected-term index is built.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectedTermsConfig {
    /// Lobes, airway segments and lymph-node stations.
    pub anatomy: Vec<String>,
    /// Device and manufacturer names that are never patient identifiers.
    pub devices: Vec<String>,
    /// Manufacturer names that double as surnames or places; vetoed only in device context.
    pub ambiguous_manufacturers: Vec<String>,
    /// Robotic bronchoscopy platforms; vetoed only in robotic context.
    pub robotic_platforms: Vec<String>,
    pub device_context: Vec<String>,
    pub robotic_context: Vec<String>,
    /// Procedures, medications, abbreviations, technique and outcome words.
    pub clinical_terms: Vec<String>,
    /// Function words that are never names.
    pub stopwords: Vec<String>,
    /// Clinical verbs (past participles and common present forms).
    pub clinical_verbs: Vec<String>,
    /// Field headers whose values never identify a patient.
    pub safe_field_headers: Vec<String>,
    /// Billing and coding marker words.
    pub cpt_context: Vec<String>,
    /// Words introducing a lymph-node station or airway segment.
    pub station_context: Vec<String>,
    /// Units, volumes and durations.
    pub measurement_keywords: Vec<String>,
}

impl ProtectedTermsConfig {
    /// Loads a vocabulary from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading protected terms from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read protected-term file {}", path.display()))?;
        let config: ProtectedTermsConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse protected-term file {}", path.display()))?;

        config.validate()?;
        info!("Loaded {} protected terms from file {}.", config.term_count(), path.display());

        Ok(config)
    }

    /// Loads the built-in vocabulary from the embedded configuration.
    pub fn load_default() -> Result<Self> {
        debug!("Loading default protected terms from embedded string...");
        let default_yaml = include_str!("../config/protected_terms.yaml");
        let config: ProtectedTermsConfig = serde_yml::from_str(default_yaml)
            .context("Failed to parse default protected terms")?;

        debug!("Loaded {} default protected terms.", config.term_count());
        Ok(config)
    }

    /// Loads the defaults and, if given, unions a user vocabulary file into them.
    pub fn load(user_path: Option<&Path>) -> Result<Self, ScrubError> {
        let defaults = Self::load_default()
            .map_err(|e| ScrubError::ProtectedTermsLoad(format!("{:#}", e)))?;
        let user = match user_path {
            Some(p) => Some(
                Self::load_from_file(p).map_err(|e| ScrubError::ProtectedTermsLoad(format!("{:#}", e)))?,
            ),
            None => None,
        };
        Ok(merge_terms(defaults, user))
    }

    pub fn term_count(&self) -> usize {
        self.lists().iter().map(|(_, l)| l.len()).sum()
    }

    fn lists(&self) -> [(&'static str, &Vec<String>); 13] {
        [
            ("anatomy", &self.anatomy),
            ("devices", &self.devices),
            ("ambiguous_manufacturers", &self.ambiguous_manufacturers),
            ("robotic_platforms", &self.robotic_platforms),
            ("device_context", &self.device_context),
            ("robotic_context", &self.robotic_context),
            ("clinical_terms", &self.clinical_terms),
            ("stopwords", &self.stopwords),
            ("clinical_verbs", &self.clinical_verbs),
            ("safe_field_headers", &self.safe_field_headers),
            ("cpt_context", &self.cpt_context),
            ("station_context", &self.station_context),
            ("measurement_keywords", &self.measurement_keywords),
        ]
    }

    /// Rejects blank entries so a stray `- ""` cannot veto everything.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        for (name, list) in self.lists() {
            for (i, term) in list.iter().enumerate() {
                if term.trim().is_empty() {
                    errors.push(format!("List '{}' has an empty term at position {}.", name, i));
                }
            }
        }

        if !errors.is_empty() {
            let full_error_message = format!("Protected-term validation failed:\n{}", errors.join("\n"));
            Err(anyhow!(full_error_message))
        } else {
            Ok(())
        }
    }
}

/// Unions user-supplied vocabulary into the defaults. Order is normalized so the
/// merged config is independent of input ordering.
pub fn merge_terms(
    default_config: ProtectedTermsConfig,
    user_config: Option<ProtectedTermsConfig>,
) -> ProtectedTermsConfig {
    debug!("merge_terms called. Initial default term count: {}", default_config.term_count());

    let Some(user) = user_config else {
        return default_config;
    };

    fn union(a: Vec<String>, b: Vec<String>) -> Vec<String> {
        a.into_iter().chain(b).collect::<BTreeSet<_>>().into_iter().collect()
    }

    let merged = ProtectedTermsConfig {
        anatomy: union(default_config.anatomy, user.anatomy),
        devices: union(default_config.devices, user.devices),
        ambiguous_manufacturers: union(default_config.ambiguous_manufacturers, user.ambiguous_manufacturers),
        robotic_platforms: union(default_config.robotic_platforms, user.robotic_platforms),
        device_context: union(default_config.device_context, user.device_context),
        robotic_context: union(default_config.robotic_context, user.robotic_context),
        clinical_terms: union(default_config.clinical_terms, user.clinical_terms),
        stopwords: union(default_config.stopwords, user.stopwords),
        clinical_verbs: union(default_config.clinical_verbs, user.clinical_verbs),
        safe_field_headers: union(default_config.safe_field_headers, user.safe_field_headers),
        cpt_context: union(default_config.cpt_context, user.cpt_context),
        station_context: union(default_config.station_context, user.station_context),
        measurement_keywords: union(default_config.measurement_keywords, user.measurement_keywords),
    };
    debug!("Final total terms after merge: {}", merged.term_count());
    merged
}

/// Per-user locations searched for an extra vocabulary file, most specific first.
pub fn protected_terms_candidate_paths() -> Vec<PathBuf> {
    let base_dirs = vec![
        dirs::home_dir().map(|p| p.join(".phiscrub")),
        dirs::config_dir().map(|p| p.join("phiscrub")),
        Some(PathBuf::from("./config")),
    ];

    base_dirs
        .into_iter()
        .flatten()
        .map(|dir| dir.join("protected_terms.yaml"))
        .collect()
}

/// The first existing vocabulary file from [`protected_terms_candidate_paths`].
pub fn find_user_protected_terms() -> Option<PathBuf> {
    protected_terms_candidate_paths().into_iter().find(|p| p.is_file())
}
