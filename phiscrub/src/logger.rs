// phiscrub/src/logger.rs
//! `env_logger` setup for the CLI. Logs always go to stderr so stdout stays
//! valid JSON.

use log::LevelFilter;

/// The level forced by `--debug` / `--quiet`; `None` leaves it to `RUST_LOG`.
pub fn level_for(debug: bool, quiet: bool) -> Option<LevelFilter> {
    if quiet {
        Some(LevelFilter::Off)
    } else if debug {
        Some(LevelFilter::Debug)
    } else {
        None
    }
}

/// Initializes the global logger once. Later calls are ignored.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .try_init()
        .ok();
}
