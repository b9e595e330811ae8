// phiscrub-lexicon/src/lib.rs
//! Keyword-context lookups for the phiscrub veto engine.
//!
//! The crate is `no_std` (with `alloc`) so the same automaton code can be
//! embedded in constrained hosts. It provides three pieces:
//!
//! * [`context::KeywordScanner`]: a case-insensitive, word-boundary-aware
//!   Aho-Corasick scanner answering "is any of these words near this range?".
//! * [`normalize`]: the canonical form used for exact vocabulary membership.
//! * [`boundary`]: char-boundary-safe byte window arithmetic.
#![no_std]

extern crate alloc; 

#[cfg(feature = "std")]
extern crate std;

pub mod boundary;
pub mod context;
pub mod normalize;

pub use context::{KeywordHit, KeywordScanner, LexiconError};
pub use normalize::normalize_term;
