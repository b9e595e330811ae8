// phiscrub-core/src/window.rs
//! Window orchestration.
//!
//! The document is cut into overlapping windows of `width` bytes advancing by
//! `width - overlap`. Each window goes through the tagger (if one is loaded) and
//! the pattern bank; spans come back window-local and are rebased here. A
//! trailing window shorter than `min_tail` is skipped unless it is the only one;
//! it always lies inside the previous window's overlap.
//!
//! Cancellation is polled once per window boundary. Whatever was collected
//! before the flag was seen is returned as a normal, partial result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};

use phiscrub_lexicon::boundary::floor_char_boundary;

use crate::config::{ScrubConfig, WindowConfig};
use crate::detectors::PatternBank;
use crate::errors::ScrubError;
use crate::span::Span;
use crate::tagger::{to_spans, EntityTagger};

/// A one-way cancellation flag shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One window of the document, `[start, end)` in absolute byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

/// Plans the windows for `text`. Boundaries are snapped down to char boundaries.
pub fn plan_windows(text: &str, geometry: &WindowConfig) -> Vec<WindowPlan> {
    let len = text.len();
    if len == 0 {
        return Vec::new();
    }
    let stride = geometry.stride().max(1);

    let mut plans = Vec::new();
    for nominal in (0..len).step_by(stride) {
        let start = floor_char_boundary(text, nominal);
        let end = floor_char_boundary(text, nominal.saturating_add(geometry.width)).max(start);
        if !plans.is_empty() && end - start < geometry.min_tail {
            debug!("Skipping {}-byte tail window at {}", end - start, start);
            continue;
        }
        if end > start {
            plans.push(WindowPlan { index: plans.len(), start, end });
        }
        if end == len {
            break;
        }
    }
    plans
}

/// Candidates pooled from every completed window.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub spans: Vec<Span>,
    pub windows_completed: usize,
    pub windows_total: usize,
    pub cancelled: bool,
}

/// Runs the tagger and the pattern bank over each window and pools the rebased
/// spans. `on_window` is called after each completed window with its index, the
/// total, and the absolute spans that window produced.
///
/// A tagger failure aborts the run with [`ScrubError::Tagger`].
pub async fn collect_candidates<F>(
    text: &str,
    config: &ScrubConfig,
    tagger: Option<&dyn EntityTagger>,
    bank: &PatternBank,
    cancel: &CancellationToken,
    mut on_window: F,
) -> Result<Collected, ScrubError>
where
    F: FnMut(usize, usize, &[Span]),
{
    let plans = plan_windows(text, &config.windows);
    let mut collected = Collected {
        windows_total: plans.len(),
        ..Default::default()
    };

    for plan in &plans {
        if cancel.is_cancelled() {
            info!("Cancelled after {} of {} windows.", collected.windows_completed, plans.len());
            collected.cancelled = true;
            break;
        }

        let window = &text[plan.start..plan.end];
        let mut local = Vec::new();

        if let Some(tagger) = tagger {
            let entities = tagger.predict(window).await.map_err(|e| ScrubError::Tagger {
                window: plan.index,
                message: format!("{:#}", e),
            })?;
            local.extend(to_spans(&entities, window, config.ai_threshold));
        }
        local.extend(bank.detect(window));

        let absolute: Vec<Span> = local.iter().map(|s| s.rebased(plan.start)).collect();
        debug!("Window {}/{} [{}..{}) produced {} candidates",
            plan.index + 1, plans.len(), plan.start, plan.end, absolute.len());

        collected.windows_completed += 1;
        on_window(plan.index, plans.len(), &absolute);
        collected.spans.extend(absolute);

        tokio::task::yield_now().await;
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::{Phrase, PhraseTagger};

    fn geometry(width: usize, overlap: usize, min_tail: usize) -> WindowConfig {
        WindowConfig { width, overlap, min_tail }
    }

    #[test]
    fn test_single_short_window() {
        let plans = plan_windows("short note", &WindowConfig::default());
        assert_eq!(plans, vec![WindowPlan { index: 0, start: 0, end: 10 }]);
        assert!(plan_windows("", &WindowConfig::default()).is_empty());
    }

    #[test]
    fn test_windows_cover_every_byte() {
        let text = "x".repeat(6000);
        let g = geometry(2500, 250, 50);
        let plans = plan_windows(&text, &g);
        assert_eq!(plans.len(), 3);
        assert_eq!((plans[1].start, plans[1].end), (2250, 4750));
        assert_eq!(plans.last().unwrap().end, 6000);
        for pair in plans.windows(2) {
            assert!(pair[1].start < pair[0].end, "consecutive windows must overlap");
        }
    }

    #[test]
    fn test_short_tail_is_skipped_but_covered() {
        // 100-wide windows striding 80; the third would be [160, 165).
        let text = "y".repeat(165);
        let plans = plan_windows(&text, &geometry(100, 20, 10));
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].end, 165);

        let text = "y".repeat(185);
        let plans = plan_windows(&text, &geometry(100, 20, 10));
        assert_eq!(plans.len(), 3);
        assert_eq!((plans[2].start, plans[2].end), (160, 185));
    }

    #[test]
    fn test_no_window_after_one_that_reaches_the_end() {
        let text = "x".repeat(2500);
        assert_eq!(
            plan_windows(&text, &WindowConfig::default()),
            vec![WindowPlan { index: 0, start: 0, end: 2500 }]
        );

        let text = "x".repeat(4750);
        let plans = plan_windows(&text, &WindowConfig::default());
        assert_eq!(plans.len(), 2);
        assert_eq!((plans[1].start, plans[1].end), (2250, 4750));
    }

    #[test]
    fn test_windows_respect_char_boundaries() {
        let text = "é".repeat(40);
        for plan in plan_windows(&text, &geometry(15, 5, 2)) {
            assert!(text.is_char_boundary(plan.start));
            assert!(text.is_char_boundary(plan.end));
        }
    }

    #[tokio::test]
    async fn test_collect_rebases_window_spans() {
        let mut text = "filler ".repeat(30);
        text.push_str("Jane Roe arrived.");
        let config = ScrubConfig {
            windows: geometry(100, 40, 10),
            ..Default::default()
        };
        let tagger = PhraseTagger::new(vec![Phrase {
            text: "Jane Roe".to_string(),
            label: "B-PER".to_string(),
            score: 0.9,
        }]);
        let bank = PatternBank::new().unwrap();
        let mut seen = Vec::new();
        let collected = collect_candidates(
            &text, &config, Some(&tagger), &bank, &CancellationToken::new(),
            |i, n, _| seen.push((i, n)),
        ).await.unwrap();

        assert!(!collected.cancelled);
        assert_eq!(collected.windows_completed, collected.windows_total);
        assert_eq!(seen.len(), collected.windows_total);
        let expected = text.find("Jane Roe").unwrap();
        assert!(collected.spans.iter().any(|s| s.start == expected && s.surface(&text) == "Jane Roe"));
    }

    #[tokio::test]
    async fn test_cancel_before_start_yields_empty_partial() {
        let text = "MRN: 555123 ".repeat(50);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let bank = PatternBank::new().unwrap();
        let collected = collect_candidates(&text, &ScrubConfig::default(), None, &bank, &cancel, |_, _, _| {})
            .await
            .unwrap();
        assert!(collected.cancelled);
        assert_eq!(collected.windows_completed, 0);
        assert!(collected.spans.is_empty());
    }
}
