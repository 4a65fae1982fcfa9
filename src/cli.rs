//! Command-line interface definitions using clap.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::pool::DEFAULT_WORKERS;

/// Encrypt and decrypt files in place across a pool of worker processes.
#[derive(Parser, Debug)]
#[command(name = "shroud")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt files in place.
    Encrypt(TransformArgs),

    /// Decrypt files in place.
    Decrypt(TransformArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Arguments shared by the encrypt and decrypt commands.
#[derive(Parser, Debug)]
pub struct TransformArgs {
    /// Files or directories to process (directories are walked recursively).
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Secret key; omit to use the numeric key from `.env`.
    #[arg(short, long)]
    pub key: Option<String>,

    /// Use the legacy key derivation (requires --key).
    #[arg(long, requires = "key")]
    pub legacy: bool,

    /// Number of worker processes.
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Namespace tag for the shared queue resources (for concurrent runs).
    #[arg(long, default_value = "shroud", hide = true)]
    pub queue_tag: String,
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "shroud",
            &mut std::io::stdout(),
        );
    }
}
