// phiscrub-core/src/protocol.rs
//! The request/event control protocol.
//!
//! A caller talks to the engine through two channels: [`Request`]s in,
//! [`Event`]s out. The worker owns the session state, runs at most one
//! detection at a time, and keeps listening for `cancel` while a run is in
//! flight. Every `start` that is accepted ends with exactly one `done` or
//! `error`; a cancelled run still ends with `done` carrying the partial result.
//!
//! License: MIT OR APACHE 2.0

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ScrubConfig;
use crate::detectors::PatternBank;
use crate::errors::ScrubError;
use crate::pipeline::{RunOutput, RunReport, ScrubEngine};
use crate::protected::ProtectedTermIndex;
use crate::span::Span;
use crate::tagger::{load_with_fallback, TaggerLoader};
use crate::window::CancellationToken;

/// Caller → engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Request {
    Init {
        #[serde(default)]
        debug: bool,
        #[serde(default)]
        config: ScrubConfig,
    },
    Start {
        text: String,
        /// Falls back to the config given at `init`.
        #[serde(default)]
        config: Option<ScrubConfig>,
        #[serde(default)]
        manual: Vec<Span>,
    },
    Cancel,
}

/// Engine → caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Event {
    Ready {
        tagger_available: bool,
    },
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        window_index: usize,
        window_count: usize,
    },
    DetectionsDelta {
        window_index: usize,
        detections: Vec<Span>,
    },
    Done {
        detections: Vec<Span>,
        report: RunReport,
    },
    Error {
        message: String,
    },
}

type RunFuture = Pin<Box<dyn Future<Output = Result<RunOutput, ScrubError>> + Send>>;

struct ActiveRun {
    future: RunFuture,
    cancel: CancellationToken,
}

/// Session state owned by the worker task.
pub struct Worker {
    loader: Arc<dyn TaggerLoader>,
    protected_terms: Option<PathBuf>,
    engine: Option<Arc<ScrubEngine>>,
    session_config: ScrubConfig,
    events: mpsc::UnboundedSender<Event>,
}

/// Spawns a worker on the current tokio runtime.
pub fn spawn_worker(
    loader: Arc<dyn TaggerLoader>,
    protected_terms: Option<PathBuf>,
) -> (mpsc::Sender<Request>, mpsc::UnboundedReceiver<Event>, JoinHandle<()>) {
    let (req_tx, req_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let worker = Worker::new(loader, protected_terms, event_tx);
    let handle = tokio::spawn(worker.listen(req_rx));
    (req_tx, event_rx, handle)
}

async fn poll_active(active: &mut Option<ActiveRun>) -> Result<RunOutput, ScrubError> {
    match active {
        Some(run) => run.future.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Worker {
    pub fn new(
        loader: Arc<dyn TaggerLoader>,
        protected_terms: Option<PathBuf>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            loader,
            protected_terms,
            engine: None,
            session_config: ScrubConfig::default(),
            events,
        }
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped; discarding event.");
        }
    }

    fn finish(&self, result: Result<RunOutput, ScrubError>) {
        match result {
            Ok(output) => self.emit(Event::Done { detections: output.detections, report: output.report }),
            Err(e) => {
                error!("Run failed: {}", e);
                self.emit(Event::Error { message: e.to_string() });
            }
        }
    }

    /// Processes requests until the request channel closes.
    pub async fn listen(mut self, mut rx: mpsc::Receiver<Request>) {
        let mut active: Option<ActiveRun> = None;
        loop {
            tokio::select! {
                result = poll_active(&mut active) => {
                    active = None;
                    self.finish(result);
                }
                request = rx.recv() => match request {
                    Some(Request::Init { debug, config }) => {
                        if active.is_some() {
                            warn!("Ignoring init while a run is active.");
                            continue;
                        }
                        self.init(debug, config).await;
                    }
                    Some(Request::Start { text, config, manual }) => {
                        if active.is_some() {
                            warn!("Ignoring start while a run is active.");
                            continue;
                        }
                        match self.start(text, config, manual) {
                            Ok(run) => active = Some(run),
                            Err(e) => self.emit(Event::Error { message: e.to_string() }),
                        }
                    }
                    Some(Request::Cancel) => match &active {
                        Some(run) => {
                            info!("Cancel requested.");
                            run.cancel.cancel();
                        }
                        None => debug!("Cancel with no active run."),
                    },
                    None => {
                        if let Some(run) = active.take() {
                            run.cancel.cancel();
                            let result = run.future.await;
                            self.finish(result);
                        }
                        break;
                    }
                },
            }
        }
        debug!("Worker stopped.");
    }

    async fn init(&mut self, debug: bool, config: ScrubConfig) {
        let mut config = config;
        config.debug |= debug;
        if let Err(e) = config.validate() {
            self.emit(Event::Error { message: e.to_string() });
            return;
        }

        let index = match ProtectedTermIndex::load(self.protected_terms.as_deref()) {
            Ok(index) => index,
            Err(e) => {
                error!("Init failed: {}", e);
                self.emit(Event::Error { message: e.to_string() });
                return;
            }
        };
        let bank = match PatternBank::new() {
            Ok(bank) => bank,
            Err(e) => {
                self.emit(Event::Error { message: format!("{:#}", e) });
                return;
            }
        };
        let tagger = load_with_fallback(self.loader.as_ref(), config.force_unquantized).await;
        let engine = ScrubEngine::new(Arc::new(index), bank, tagger);
        let tagger_available = engine.has_tagger();

        self.engine = Some(Arc::new(engine));
        self.session_config = config;
        self.emit(Event::Ready { tagger_available });
    }

    fn start(&self, text: String, config: Option<ScrubConfig>, manual: Vec<Span>) -> Result<ActiveRun, ScrubError> {
        let engine = self.engine.clone().ok_or(ScrubError::NotInitialized)?;
        let mut config = config.unwrap_or_else(|| self.session_config.clone());
        config.debug |= self.session_config.debug;

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let events = self.events.clone();

        let future = Box::pin(async move {
            engine
                .run(&text, &config, &manual, &run_cancel, |window_index, window_count, detections| {
                    let _ = events.send(Event::Progress {
                        stage: Some("detect".to_string()),
                        window_index,
                        window_count,
                    });
                    if !detections.is_empty() {
                        let _ = events.send(Event::DetectionsDelta { window_index, detections });
                    }
                })
                .await
        });
        Ok(ActiveRun { future, cancel })
    }
}
