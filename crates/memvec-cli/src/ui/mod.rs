//! # CLI UI Module
//!
//! Styling and formatting layer for memvec CLI output.
//!
//! - `color`: color mode detection (`--color`, `NO_COLOR`, TTY)
//! - `style`: message prefixes and styled fragments
//! - `format`: text truncation, relative times, number formatting
//! - `table`: tables rendered with comfy-table
//!
//! Every command also supports `--json` for scripting; JSON output bypasses
//! this module entirely.

pub mod color;
pub mod format;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use style::{MessageType, Style};
