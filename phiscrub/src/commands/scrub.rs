//! The `phiscrub` run: read a note, drive the engine over the control
//! protocol, and print the decisions.

use anyhow::{anyhow, bail, Context, Result};
use is_terminal::IsTerminal;
use log::{debug, info, warn};
use owo_colors::OwoColorize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use phiscrub_core::{
    find_user_protected_terms, spawn_worker, Event, NoModelLoader, PhraseTagger, Request, RunOutput,
    ScrubConfig, Span, StaticLoader, TaggerLoader,
};

use crate::cli::Cli;

/// Everything one run needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct ScrubOptions {
    pub input: Option<PathBuf>,
    pub config: ScrubConfig,
    pub entities: Option<PathBuf>,
    pub protected_terms: Option<PathBuf>,
    pub manual: Vec<Span>,
}

impl ScrubOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut config = ScrubConfig {
            debug: cli.debug,
            force_unquantized: cli.force_unquantized,
            merge_mode: cli.merge_mode,
            ..ScrubConfig::default()
        };
        if let Some(threshold) = cli.ai_threshold {
            config.ai_threshold = threshold;
        }
        if let Some(width) = cli.window_width {
            config.windows.width = width;
        }
        if let Some(overlap) = cli.window_overlap {
            config.windows.overlap = overlap;
            config.windows.min_tail = config.windows.min_tail.min(overlap);
        }

        Self {
            input: cli.input.clone(),
            config,
            entities: cli.entities.clone(),
            protected_terms: cli.protected_terms.clone().or_else(find_user_protected_terms),
            manual: cli.manual.clone(),
        }
    }
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => {
            info!("Reading input from file: {}", path.display());
            fs::read_to_string(path).with_context(|| format!("Failed to read input file: {}", path.display()))
        }
        None => {
            info!("Reading input from stdin.");
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).context("Failed to read from stdin")?;
            Ok(buffer)
        }
    }
}

fn tagger_loader(entities: Option<&PathBuf>) -> Result<Arc<dyn TaggerLoader>> {
    match entities {
        Some(path) => {
            let tagger = PhraseTagger::load_from_file(path)?;
            info!("Using {} tagger phrases from {}", tagger.len(), path.display());
            Ok(Arc::new(StaticLoader(Arc::new(tagger))))
        }
        None => Ok(Arc::new(NoModelLoader)),
    }
}

/// Runs one detection over the input. Ctrl-C cancels the run after the current
/// window; the partial result is still returned.
pub async fn run_scrub(opts: ScrubOptions) -> Result<RunOutput> {
    let text = read_input(opts.input.as_ref())?;
    let loader = tagger_loader(opts.entities.as_ref())?;

    let (tx, mut events, handle) = spawn_worker(loader, opts.protected_terms.clone());
    tx.send(Request::Init { debug: opts.config.debug, config: opts.config.clone() })
        .await
        .context("Engine stopped before init")?;

    loop {
        match events.recv().await {
            Some(Event::Ready { tagger_available }) => {
                debug!("Engine ready (tagger available: {})", tagger_available);
                break;
            }
            Some(Event::Error { message }) => bail!("Initialization failed: {}", message),
            Some(_) => {}
            None => bail!("Engine stopped during initialization"),
        }
    }

    tx.send(Request::Start { text, config: Some(opts.config), manual: opts.manual })
        .await
        .context("Engine stopped before start")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let output = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::Progress { window_index, window_count, .. }) => {
                    debug!("Window {}/{} done", window_index + 1, window_count);
                }
                Some(Event::DetectionsDelta { window_index, detections }) => {
                    debug!("Window {} proposed {} spans", window_index, detections.len());
                }
                Some(Event::Done { detections, report }) => break RunOutput { detections, report },
                Some(Event::Error { message }) => bail!("Detection failed: {}", message),
                Some(Event::Ready { .. }) => {}
                None => return Err(anyhow!("Engine stopped before finishing the run")),
            },
            _ = &mut ctrl_c, if !interrupted => {
                warn!("Interrupted; stopping after the current window.");
                interrupted = true;
                tx.send(Request::Cancel).await.ok();
            }
        }
    };

    drop(tx);
    handle.await.context("Engine task failed")?;
    Ok(output)
}

/// Writes the result as JSON to `writer`.
pub fn write_output<W: Write>(writer: &mut W, output: &RunOutput, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    };
    writeln!(writer, "{}", json).context("Failed to write output")?;
    Ok(())
}

/// One-line summary on stderr, coloured when stderr is a terminal.
pub fn print_summary(output: &RunOutput) {
    let report = &output.report;
    let mut line = format!(
        "phiscrub: {} detections, {} of {} candidates vetoed, {} of {} windows",
        output.detections.len(),
        report.vetoed,
        report.candidates,
        report.windows_completed,
        report.windows_total,
    );
    if report.cancelled {
        line.push_str(" (cancelled)");
    }

    let mut stderr = io::stderr();
    let _ = if stderr.is_terminal() {
        if report.cancelled {
            writeln!(stderr, "{}", line.yellow())
        } else {
            writeln!(stderr, "{}", line.green())
        }
    } else {
        writeln!(stderr, "{}", line)
    };
}
