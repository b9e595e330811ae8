// phiscrub-core/src/tagger.rs
//! The statistical entity tagger seam.
//!
//! The engine never knows what model sits behind [`EntityTagger`]; it only sees
//! window-local entities with raw labels. This module normalizes those into
//! [`Span`]s, and owns the quantized/full model fallback performed at `init`.
//!
//! [`PhraseTagger`] is a deterministic gazetteer implementation used by the CLI
//! and by tests.
//!
//! License: MIT OR APACHE 2.0

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use phiscrub_lexicon::boundary::find_whole_words;

use crate::errors::ScrubError;
use crate::span::{EntityLabel, SourceTag, Span};

/// One raw prediction, in window-local byte offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEntity {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f64,
}

/// A token-classification capability. Must be a pure function of the window.
#[async_trait]
pub trait EntityTagger: Send + Sync {
    fn name(&self) -> &str;

    async fn predict(&self, window: &str) -> Result<Vec<TaggedEntity>>;
}

/// Converts raw predictions into window-local `ner` spans.
///
/// Non-significant labels and scores under `threshold` are dropped. Malformed
/// entities (inverted, empty, out of range, off a char boundary, non-finite
/// score) are dropped with a debug record.
pub fn to_spans(entities: &[TaggedEntity], window: &str, threshold: f64) -> Vec<Span> {
    let mut spans = Vec::with_capacity(entities.len());
    for entity in entities {
        let Some(label) = EntityLabel::from_tagger_label(&entity.label) else {
            continue;
        };
        if !entity.score.is_finite() {
            debug!("Dropping tagger entity with non-finite score at [{}..{})", entity.start, entity.end);
            continue;
        }
        if entity.score < threshold {
            continue;
        }
        let span = Span::new(entity.start, entity.end, label, entity.score.clamp(0.0, 1.0), SourceTag::Ner);
        if !span.is_well_formed(window) {
            debug!("Dropping malformed tagger entity [{}..{}) in window of {} bytes",
                entity.start, entity.end, window.len());
            continue;
        }
        spans.push(span);
    }
    spans
}

/// Model builds a loader can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Smaller and faster, lower fidelity.
    Quantized,
    Full,
}

impl ModelVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelVariant::Quantized => "quantized",
            ModelVariant::Full => "full",
        }
    }

    pub fn other(self) -> Self {
        match self {
            ModelVariant::Quantized => ModelVariant::Full,
            ModelVariant::Full => ModelVariant::Quantized,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loads a tagger for a given variant.
#[async_trait]
pub trait TaggerLoader: Send + Sync {
    async fn load(&self, variant: ModelVariant) -> Result<Arc<dyn EntityTagger>>;
}

/// Tries the preferred variant, then the other one. `None` means both failed and
/// the engine should run detector-only.
pub async fn load_with_fallback(
    loader: &dyn TaggerLoader,
    force_unquantized: bool,
) -> Option<Arc<dyn EntityTagger>> {
    let preferred = if force_unquantized { ModelVariant::Full } else { ModelVariant::Quantized };

    for variant in [preferred, preferred.other()] {
        match loader.load(variant).await {
            Ok(tagger) => {
                info!("Loaded entity tagger '{}' ({} variant).", tagger.name(), variant);
                return Some(tagger);
            }
            Err(e) => {
                let err = ScrubError::ModelLoad { variant: variant.to_string(), message: format!("{:#}", e) };
                warn!("{}", err);
            }
        }
    }

    warn!("No tagger variant could be loaded; continuing with pattern detectors only.");
    None
}

/// A loader with no model behind it. Every variant fails, so the engine runs
/// detector-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModelLoader;

#[async_trait]
impl TaggerLoader for NoModelLoader {
    async fn load(&self, variant: ModelVariant) -> Result<Arc<dyn EntityTagger>> {
        anyhow::bail!("no {} model is bundled", variant)
    }
}

/// Hands out an already-constructed tagger for any variant.
pub struct StaticLoader(pub Arc<dyn EntityTagger>);

#[async_trait]
impl TaggerLoader for StaticLoader {
    async fn load(&self, _variant: ModelVariant) -> Result<Arc<dyn EntityTagger>> {
        Ok(Arc::clone(&self.0))
    }
}

/// A gazetteer entry: a literal phrase and the label it is tagged with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    pub text: String,
    pub label: String,
    #[serde(default = "default_phrase_score")]
    pub score: f64,
}

fn default_phrase_score() -> f64 {
    0.9
}

/// Tags every case-sensitive, whole-word occurrence of its phrases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhraseTagger {
    phrases: Vec<Phrase>,
}

impl PhraseTagger {
    pub fn new(phrases: Vec<Phrase>) -> Self {
        Self { phrases }
    }

    /// Reads a JSON array of `{"text", "label", "score"}` objects.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read entity list {}", path.display()))?;
        let tagger: PhraseTagger = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse entity list {}", path.display()))?;
        debug!("Loaded {} tagger phrases from {}", tagger.phrases.len(), path.display());
        Ok(tagger)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

#[async_trait]
impl EntityTagger for PhraseTagger {
    fn name(&self) -> &str {
        "phrase"
    }

    async fn predict(&self, window: &str) -> Result<Vec<TaggedEntity>> {
        let mut out = Vec::new();
        for phrase in &self.phrases {
            for start in find_whole_words(window, &phrase.text) {
                out.push(TaggedEntity {
                    start,
                    end: start + phrase.text.len(),
                    label: phrase.label.clone(),
                    score: phrase.score,
                });
            }
        }
        out.sort_by_key(|e| (e.start, e.end));
        Ok(out)
    }
}
