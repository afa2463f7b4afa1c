//! Configuration file parsing and structures.
//!
//! webhookd reads one or more TOML files. Files may import each other, scalar
//! fields may only be set once across all files, and `[[switches]]` lists are
//! concatenated.

#[allow(clippy::module_inception)]
mod config;
mod diagnostics;
mod partial;

pub use config::*;
pub use diagnostics::{format_diagnostics, Diagnostic};
