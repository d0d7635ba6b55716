//! # memvec CLI
//!
//! Command-line interface for the memvec semantic memory store.
//!
//! This binary provides human-friendly access to `memvec-core` functionality.
//! Run `memvec --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
