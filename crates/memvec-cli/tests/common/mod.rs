//! Shared test utilities for memvec-cli integration tests.

#![allow(dead_code)]

use std::path::Path;

use assert_cmd::Command;

/// Get a Command for the memvec binary.
///
/// # Panics
///
/// Panics if the memvec binary cannot be found. This should not happen
/// in a properly configured test environment.
#[allow(deprecated)]
pub fn memvec_cmd() -> Command {
    Command::cargo_bin("memvec").expect("memvec binary should exist")
}

/// A memvec command isolated in `dir`: hash embeddings, no colors, and a
/// config path that does not exist so defaults apply.
pub fn isolated_cmd(dir: &Path) -> Command {
    let mut cmd = memvec_cmd();
    cmd.env_remove("MEMVEC_CONFIG")
        .env_remove("MEMVEC_DATA_DIR")
        .env_remove("MEMVEC_PROVIDER")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .arg("--color")
        .arg("never")
        .arg("--provider")
        .arg("hash")
        .arg("--config")
        .arg(dir.join("config.yaml"))
        .arg("--data-dir")
        .arg(dir.join("store"));
    cmd
}
