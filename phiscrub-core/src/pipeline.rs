// phiscrub-core/src/pipeline.rs
//! One detection run, end to end.
//!
//! windows → pooled candidates → pre-veto merge → veto → consolidation →
//! session pass → manual overlay.
//!
//! [`ScrubEngine`] holds the state that is initialized once per session (the
//! protected-term index, the compiled pattern bank, the optional tagger) and is
//! reused by every run. Each run owns its own candidate pool.
//!
//! License: MIT OR APACHE 2.0

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{MergeMode, ScrubConfig};
use crate::consolidate::{consolidate, pre_veto};
use crate::detectors::PatternBank;
use crate::errors::ScrubError;
use crate::manual::overlay_manual;
use crate::protected::{veto, ProtectedTermIndex};
use crate::session::session_pass;
use crate::span::Span;
use crate::tagger::EntityTagger;
use crate::window::{collect_candidates, CancellationToken};

/// Bookkeeping for one run. Not part of the determinism-relevant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub merge_mode: MergeMode,
    pub tagger_available: bool,
    pub windows_completed: usize,
    pub windows_total: usize,
    pub cancelled: bool,
    /// Candidates pooled from all completed windows.
    pub candidates: usize,
    /// Candidates removed by the veto engine.
    pub vetoed: usize,
}

/// Final decisions plus the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub detections: Vec<Span>,
    pub report: RunReport,
}

/// Result of the decision stages over a pooled candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct Decided {
    pub spans: Vec<Span>,
    pub candidates: usize,
    pub vetoed: usize,
}

/// Everything after candidate collection: merge, veto, consolidation and the
/// session pass. Pure in `(pooled, text, index, config)`.
pub fn decide(pooled: Vec<Span>, text: &str, index: &ProtectedTermIndex, config: &ScrubConfig) -> Decided {
    let candidates = pooled.len();
    let considered = pre_veto(pooled, config.merge_mode);
    let considered_len = considered.len();

    let survivors = veto(considered, text, index, config);
    let vetoed = considered_len - survivors.len();

    let consolidated = consolidate(survivors, text, config.merge_mode);
    let spans = session_pass(consolidated, text);

    debug!("decide: {} candidates, {} considered, {} vetoed, {} decisions ({})",
        candidates, considered_len, vetoed, spans.len(), config.merge_mode);
    Decided { spans, candidates, vetoed }
}

/// Session-scoped engine state.
pub struct ScrubEngine {
    index: Arc<ProtectedTermIndex>,
    bank: PatternBank,
    tagger: Option<Arc<dyn EntityTagger>>,
}

impl ScrubEngine {
    pub fn new(index: Arc<ProtectedTermIndex>, bank: PatternBank, tagger: Option<Arc<dyn EntityTagger>>) -> Self {
        Self { index, bank, tagger }
    }

    /// Built-in vocabulary and detectors, no tagger.
    pub fn detector_only() -> Result<Self, ScrubError> {
        let index = ProtectedTermIndex::load(None)?;
        let bank = PatternBank::new()?;
        Ok(Self::new(Arc::new(index), bank, None))
    }

    pub fn has_tagger(&self) -> bool {
        self.tagger.is_some()
    }

    pub fn index(&self) -> &ProtectedTermIndex {
        &self.index
    }

    /// Runs detection over `text`.
    ///
    /// `on_window` sees each completed window's index, the window count and that
    /// window's candidates that already pass the veto engine. A cancelled run
    /// returns normally with `report.cancelled` set.
    pub async fn run<F>(
        &self,
        text: &str,
        config: &ScrubConfig,
        manual: &[Span],
        cancel: &CancellationToken,
        mut on_window: F,
    ) -> Result<RunOutput, ScrubError>
    where
        F: FnMut(usize, usize, Vec<Span>),
    {
        config.validate()?;
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Run {} started: {} bytes, merge mode {}.", run_id, text.len(), config.merge_mode);

        let index = Arc::clone(&self.index);
        let collected = collect_candidates(
            text,
            config,
            self.tagger.as_deref(),
            &self.bank,
            cancel,
            |i, n, spans| {
                let delta = veto(pre_veto(spans.to_vec(), MergeMode::Union), text, &index, config);
                on_window(i, n, delta);
            },
        )
        .await?;

        let decided = decide(collected.spans, text, &self.index, config);
        let detections = overlay_manual(decided.spans, manual, text);

        let report = RunReport {
            run_id,
            started_at,
            merge_mode: config.merge_mode,
            tagger_available: self.tagger.is_some(),
            windows_completed: collected.windows_completed,
            windows_total: collected.windows_total,
            cancelled: collected.cancelled,
            candidates: decided.candidates,
            vetoed: decided.vetoed,
        };
        info!("Run {} finished: {} detections ({} of {} windows{}).",
            report.run_id, detections.len(), report.windows_completed, report.windows_total,
            if report.cancelled { ", cancelled" } else { "" });

        Ok(RunOutput { detections, report })
    }
}
