// phiscrub-core/src/detectors/mod.rs
//! The pattern detector bank.
//!
//! A fixed, ordered list of deterministic detectors, each a regular expression
//! with a fixed `(label, source, score)`. Detectors run independently against
//! every window; duplicate candidates across detectors are left for
//! consolidation to collapse.
//!
//! * `compiler`: compiles and caches [`DetectorSpec`] lists.
//! * `builtin`: the built-in detector list.
//! * `bank`: runs compiled detectors over a window and applies the guards.
//!
//! # License
//! MIT OR Apache-2.0

pub mod bank;
pub mod builtin;
pub mod compiler;

pub use bank::PatternBank;
pub use compiler::{compile_detectors, get_or_compile_detectors, CompiledDetector, CompiledDetectors, DetectorSpec, LabelRule};
