//! Sieve CLI - argument parsing and command dispatch.
//!
//! One flat flag surface: the default mode starts the sidecar, and
//! `--generate-schema` runs the one-shot schema inference tool.

mod args;
pub mod commands;

pub use args::Cli;
