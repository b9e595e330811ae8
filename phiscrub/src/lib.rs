// phiscrub/src/lib.rs
//! # phiscrub CLI Application
//!
//! This crate provides the command-line front end for the phiscrub engine. It
//! feeds a note through the `init`/`start` control protocol and prints the
//! final redaction decisions as JSON.

pub mod cli;
pub mod commands;
pub mod logger;

pub use commands::scrub::{run_scrub, ScrubOptions};
