// phiscrub-core/src/lib.rs
//! # phiscrub Core Library
//!
//! `phiscrub-core` turns the raw text of a clinical procedure note into a final,
//! non-overlapping list of "redact this range" decisions, entirely on the local
//! machine. It reconciles three signal sources that routinely disagree: an
//! optional statistical entity tagger, a bank of deterministic pattern detectors,
//! and a rule-based clinical vocabulary that vetoes candidates which are not PHI.
//!
//! ## Modules
//!
//! * `span`: The `Span` decision unit, its labels and provenance tags.
//! * `config`: Per-run `ScrubConfig` and the `ProtectedTermsConfig` vocabulary.
//! * `detectors`: The compiled pattern detector bank.
//! * `clinician`: Provider-context checks shared by detectors and veto rules.
//! * `tagger`: The entity-tagger seam, model fallback loading and a phrase tagger.
//! * `window`: Window planning, per-window collection and cancellation.
//! * `protected`: The protected-term index and the ordered veto rules.
//! * `consolidate`: Expansion, extension and overlap resolution for both merge modes.
//! * `session`: Propagation of confident patient names across the document.
//! * `manual`: Overlay of user-selected redactions.
//! * `pipeline`: `ScrubEngine`, one full detection run.
//! * `protocol`: The `init`/`start`/`cancel` request and event worker.
//!
//! ## Usage Example
//!
//! ```rust
//! use phiscrub_core::{CancellationToken, EntityLabel, ScrubConfig, ScrubEngine};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = ScrubEngine::detector_only()?;
//! let text = "Patient: Smith, John\nStation 7 was inspected.";
//! let output = engine
//!     .run(text, &ScrubConfig::default(), &[], &CancellationToken::new(), |_, _, _| {})
//!     .await?;
//!
//! assert!(output.detections.iter().any(|s| s.label == EntityLabel::Patient));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`ScrubError`] where callers may want to match on
//! the failure, and `anyhow::Result` for file loading helpers. Malformed
//! candidates are dropped with a debug record and never surface as errors.
//!
//! ---
//! License: MIT OR APACHE 2.0

pub mod clinician;
pub mod config;
pub mod consolidate;
pub mod detectors;
pub mod errors;
pub mod manual;
pub mod pipeline;
pub mod protected;
pub mod protocol;
pub mod session;
pub mod span;
pub mod tagger;
pub mod window;

/// Run options and the protected-term vocabulary.
pub use config::{
    find_user_protected_terms,
    merge_terms,
    protected_terms_candidate_paths,
    MergeMode,
    ProtectedTermsConfig,
    ScrubConfig,
    WindowConfig,
};

pub use errors::ScrubError;

pub use span::{span_id, EntityLabel, SourceTag, Span};

pub use detectors::PatternBank;

pub use protected::{ProtectedTermIndex, VetoReason};

pub use tagger::{
    load_with_fallback,
    EntityTagger,
    ModelVariant,
    NoModelLoader,
    Phrase,
    PhraseTagger,
    StaticLoader,
    TaggedEntity,
    TaggerLoader,
};

pub use window::{plan_windows, CancellationToken, WindowPlan};

pub use consolidate::{consolidate, expand_word_boundaries, pre_veto, resolve_overlaps};

pub use session::session_pass;

pub use manual::overlay_manual;

pub use pipeline::{decide, Decided, RunOutput, RunReport, ScrubEngine};

pub use protocol::{spawn_worker, Event, Request, Worker};
