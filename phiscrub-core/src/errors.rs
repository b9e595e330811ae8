//! errors.rs - Custom error types for the phiscrub-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that can be handled programmatically.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// This enum represents all possible error types in the `phiscrub-core` library.
///
/// By using `#[non_exhaustive]`, we signal to consumers of this library that
/// new variants may be added in future versions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScrubError {
    #[error("Failed to compile detector '{0}': {1}")]
    DetectorCompilationError(String, regex::Error),

    #[error("Detector '{0}': pattern length ({1}) exceeds maximum allowed ({2})")]
    PatternLengthExceeded(String, usize, usize),

    #[error("Protected-term configuration could not be loaded: {0}")]
    ProtectedTermsLoad(String),

    #[error("Invalid window configuration: {0}")]
    InvalidWindowConfig(String),

    #[error("Tagger model '{variant}' failed to load: {message}")]
    ModelLoad { variant: String, message: String },

    #[error("Entity tagger failed on window {window}: {message}")]
    Tagger { window: usize, message: String },

    #[error("Engine is not initialized; send `init` before `start`")]
    NotInitialized,

    #[error("An unexpected I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("A critical system error occurred: {0}")]
    AnyhowWrapper(#[from] anyhow::Error),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}
