//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - start: run the self-critiquing loop on a prompt
//! - model: pull a model and make it the default

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// squared - an agent with one feedback loop over the top of itself
#[derive(Parser, Debug)]
#[command(name = "squared")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the agent loop on a prompt
    Start {
        /// Override the default model
        #[arg(short, long)]
        model: Option<String>,

        /// Give up after this many work/feedback cycles
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Task prompt
        prompt: String,
    },

    /// Pull a model with ollama and set it as the default
    Model {
        /// Model name, e.g. gpt-oss:20b
        model: String,
    },
}
