// phiscrub/src/main.rs
//! phiscrub entry point.
//!
//! Parses the command line, runs detection over the note and prints the
//! decisions to stdout.

use anyhow::Result;
use clap::Parser;
use std::io;

use phiscrub::cli::Cli;
use phiscrub::commands::scrub::{print_summary, run_scrub, write_output, ScrubOptions};
use phiscrub::logger;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logger::init_logger(logger::level_for(cli.debug, cli.quiet));

    let options = ScrubOptions::from_cli(&cli);
    let output = run_scrub(options).await?;

    write_output(&mut io::stdout().lock(), &output, cli.pretty)?;
    if !cli.quiet {
        print_summary(&output);
    }
    Ok(())
}
