// phiscrub-core/tests/protocol_tests.rs
//! Request/event worker behaviour: initialization, incremental events,
//! cancellation with partial results, and run-level failures.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use phiscrub_core::{
    spawn_worker, EntityLabel, EntityTagger, Event, ModelVariant, NoModelLoader, Phrase, PhraseTagger,
    Request, ScrubConfig, StaticLoader, TaggedEntity, TaggerLoader,
};

struct FailingTagger;

#[async_trait]
impl EntityTagger for FailingTagger {
    fn name(&self) -> &str {
        "failing"
    }

    async fn predict(&self, _window: &str) -> Result<Vec<TaggedEntity>> {
        Err(anyhow!("inference session closed"))
    }
}

/// Only the full-precision build is available.
struct FullOnlyLoader;

#[async_trait]
impl TaggerLoader for FullOnlyLoader {
    async fn load(&self, variant: ModelVariant) -> Result<Arc<dyn EntityTagger>> {
        match variant {
            ModelVariant::Full => Ok(Arc::new(PhraseTagger::new(vec![Phrase {
                text: "Jane Roe".to_string(),
                label: "PER".to_string(),
                score: 0.9,
            }]))),
            ModelVariant::Quantized => Err(anyhow!("quantized weights missing")),
        }
    }
}

fn start(text: &str) -> Request {
    Request::Start { text: text.to_string(), config: None, manual: vec![] }
}

fn init() -> Request {
    Request::Init { debug: false, config: ScrubConfig::default() }
}

/// Collects events up to and including the first terminal one.
async fn until_terminal(events: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let terminal = matches!(event, Event::Done { .. } | Event::Error { .. });
        seen.push(event);
        if terminal {
            break;
        }
    }
    seen
}

async fn assert_quiet(events: &mut UnboundedReceiver<Event>) {
    let next = tokio::time::timeout(Duration::from_millis(150), events.recv()).await;
    assert!(next.is_err(), "unexpected extra event: {:?}", next);
}

#[test_log::test(tokio::test)]
async fn test_run_emits_progress_delta_and_done() {
    let (tx, mut events, _handle) = spawn_worker(Arc::new(NoModelLoader), None);
    tx.send(init()).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), Event::Ready { tagger_available: false });

    let text = "Procedure note.\nMRN: A92 555\n";
    tx.send(start(text)).await.unwrap();
    let seen = until_terminal(&mut events).await;

    assert_eq!(seen.len(), 3, "got {:?}", seen);
    assert_eq!(
        seen[0],
        Event::Progress { stage: Some("detect".to_string()), window_index: 0, window_count: 1 }
    );
    match &seen[1] {
        Event::DetectionsDelta { window_index: 0, detections } => {
            assert_eq!(detections.len(), 1);
            assert_eq!(detections[0].label, EntityLabel::Id);
        }
        other => panic!("expected a delta, got {:?}", other),
    }
    match &seen[2] {
        Event::Done { detections, report } => {
            assert_eq!(detections.len(), 1);
            assert_eq!(&text[detections[0].start..detections[0].end], "A92 555");
            assert!(!report.cancelled);
            assert_eq!((report.windows_completed, report.windows_total), (1, 1));
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[test_log::test(tokio::test)]
async fn test_cancel_returns_partial_result() {
    let (tx, mut events, _handle) = spawn_worker(Arc::new(NoModelLoader), None);
    tx.send(init()).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), Event::Ready { .. }));

    let text = "Jane Roe underwent EBUS. MRN: A92 555 noted.\n".repeat(300);
    tx.send(start(&text)).await.unwrap();
    tx.send(Request::Cancel).await.unwrap();
    let seen = until_terminal(&mut events).await;

    let progress = seen.iter().filter(|e| matches!(e, Event::Progress { .. })).count();
    match seen.last().unwrap() {
        Event::Done { detections, report } => {
            assert!(report.cancelled);
            assert!(report.windows_completed < report.windows_total);
            assert_eq!(progress, report.windows_completed);
            for pair in detections.windows(2) {
                assert!(pair[0].end <= pair[1].start);
            }
        }
        other => panic!("expected done, got {:?}", other),
    }
    assert_quiet(&mut events).await;
}

#[test_log::test(tokio::test)]
async fn test_start_during_active_run_is_ignored() {
    let (tx, mut events, _handle) = spawn_worker(Arc::new(NoModelLoader), None);
    tx.send(init()).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), Event::Ready { .. }));

    tx.send(start("MRN: A92 555")).await.unwrap();
    tx.send(start("MRN: B17 004")).await.unwrap();
    let seen = until_terminal(&mut events).await;
    assert!(matches!(seen.last(), Some(Event::Done { .. })));
    assert_quiet(&mut events).await;

    // the worker accepts a new run once the first one is done
    tx.send(start("MRN: B17 004")).await.unwrap();
    let seen = until_terminal(&mut events).await;
    assert!(matches!(seen.last(), Some(Event::Done { .. })));
}

#[test_log::test(tokio::test)]
async fn test_tagger_failure_ends_run_with_error() {
    let loader = StaticLoader(Arc::new(FailingTagger));
    let (tx, mut events, _handle) = spawn_worker(Arc::new(loader), None);
    tx.send(init()).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), Event::Ready { tagger_available: true });

    for _ in 0..2 {
        tx.send(start("Jane Roe underwent EBUS.")).await.unwrap();
        let seen = until_terminal(&mut events).await;
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            Event::Error { message } => {
                assert!(message.contains("window 0"), "{}", message);
                assert!(message.contains("inference session closed"), "{}", message);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }
}

#[test_log::test(tokio::test)]
async fn test_model_falls_back_to_full_variant() {
    let (tx, mut events, _handle) = spawn_worker(Arc::new(FullOnlyLoader), None);
    tx.send(init()).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), Event::Ready { tagger_available: true });

    let text = "Jane Roe underwent EBUS.";
    tx.send(start(text)).await.unwrap();
    match until_terminal(&mut events).await.last().unwrap() {
        Event::Done { detections, report } => {
            assert!(report.tagger_available);
            assert!(detections.iter().any(|s| &text[s.start..s.end] == "Jane Roe"));
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[test_log::test(tokio::test)]
async fn test_missing_protected_terms_fails_init() {
    let missing = PathBuf::from("/definitely/not/here/protected_terms.yaml");
    let (tx, mut events, _handle) = spawn_worker(Arc::new(NoModelLoader), Some(missing));
    tx.send(init()).await.unwrap();
    match events.recv().await.unwrap() {
        Event::Error { message } => assert!(message.contains("Protected-term"), "{}", message),
        other => panic!("expected error, got {:?}", other),
    }

    tx.send(start("MRN: A92 555")).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), Event::Error { .. }));
}

#[test_log::test(tokio::test)]
async fn test_closing_requests_stops_worker() {
    let (tx, mut events, handle) = spawn_worker(Arc::new(NoModelLoader), None);
    tx.send(init()).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), Event::Ready { .. }));
    drop(tx);
    handle.await.unwrap();
    assert!(events.recv().await.is_none());
}
