// phiscrub/src/cli.rs
//! This file defines the command-line interface (CLI) for the phiscrub application.
//! License: MIT OR APACHE 2.0

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use phiscrub_core::{EntityLabel, MergeMode, Span};

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "phiscrub",
    author = "Relay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Find the PHI in a clinical procedure note",
    long_about = "phiscrub reads a procedure note from a file or stdin and prints, as JSON, the byte ranges that should be redacted before the note leaves this machine. Patient names, dates, identifiers, contact details and places are proposed by pattern detectors and an optional phrase list, then filtered against a clinical vocabulary so anatomy, devices, stations and provider names are left alone.",
)]
pub struct Cli {
    /// Read the note from this file instead of stdin.
    #[arg(long, short = 'i', value_name = "FILE", help = "Read input from a specified file instead of stdin.")]
    pub input: Option<PathBuf>,

    /// When overlapping candidates are resolved relative to the veto rules.
    #[arg(long = "merge-mode", value_name = "MODE", default_value = "union", help = "Overlap policy: 'union' (default) or legacy 'best_of'.")]
    pub merge_mode: MergeMode,

    /// Minimum confidence for a tagged entity.
    #[arg(long = "ai-threshold", value_name = "SCORE", help = "Minimum tagger confidence in [0, 1] (default 0.45).")]
    pub ai_threshold: Option<f64>,

    /// JSON phrase list used as the entity tagger.
    #[arg(long = "entities", value_name = "FILE", help = "JSON list of {text, label, score} phrases to tag as entities.")]
    pub entities: Option<PathBuf>,

    /// Extra protected-term vocabulary (YAML), merged into the built-in lists.
    #[arg(long = "protected-terms", value_name = "FILE", env = "PHISCRUB_PROTECTED_TERMS", help = "YAML vocabulary merged into the built-in protected terms.")]
    pub protected_terms: Option<PathBuf>,

    /// User-selected redactions.
    #[arg(long = "manual", value_name = "START:END:LABEL", value_parser = parse_manual_span, help = "Add a manual redaction (byte offsets), e.g. 0:8:PATIENT. Repeatable.")]
    pub manual: Vec<Span>,

    #[arg(long = "force-unquantized", help = "Load the full-precision tagger model first.")]
    pub force_unquantized: bool,

    #[arg(long = "window-width", value_name = "BYTES", help = "Window width in bytes (default 2500).")]
    pub window_width: Option<usize>,

    #[arg(long = "window-overlap", value_name = "BYTES", help = "Overlap between consecutive windows in bytes (default 250).")]
    pub window_overlap: Option<usize>,

    #[arg(long, help = "Pretty-print the JSON output.")]
    pub pretty: bool,

    /// Enable debug logging, including per-candidate veto tracing.
    #[arg(long, short = 'd', help = "Enable debug logging.")]
    pub debug: bool,

    /// Disable informational messages
    #[arg(long, short = 'q', conflicts_with = "debug", help = "Suppress all log output and the stderr summary.")]
    pub quiet: bool,
}

#[derive(Error, Debug, PartialEq)]
pub enum ManualSpanError {
    #[error("expected START:END:LABEL, got '{0}'")]
    Shape(String),
    #[error("invalid offset '{0}'")]
    Offset(String),
    #[error("empty range {0}..{1}")]
    EmptyRange(usize, usize),
    #[error("{0}")]
    Label(String),
}

/// Parses `START:END:LABEL` into a manual span.
pub fn parse_manual_span(raw: &str) -> Result<Span, ManualSpanError> {
    let mut parts = raw.splitn(3, ':');
    let (Some(start), Some(end), Some(label)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ManualSpanError::Shape(raw.to_string()));
    };
    let start: usize = start.trim().parse().map_err(|_| ManualSpanError::Offset(start.to_string()))?;
    let end: usize = end.trim().parse().map_err(|_| ManualSpanError::Offset(end.to_string()))?;
    if start >= end {
        return Err(ManualSpanError::EmptyRange(start, end));
    }
    let label: EntityLabel = label.parse().map_err(ManualSpanError::Label)?;
    Ok(Span::manual(start, end, label))
}
