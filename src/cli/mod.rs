//! CLI module for squared - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the loop and
//! managing the default model.

pub mod commands;

pub use commands::Cli;
