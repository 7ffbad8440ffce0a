//! qsoftmax CLI library
//!
//! The binary is a thin shell over these modules so they can be tested
//! without spawning a process.

pub mod commands;
pub mod driver;
pub mod exit;
pub mod generator;
pub mod logging;
pub mod output;

use clap::{CommandFactory, Parser, Subcommand};
use commands::RunCommand;
use output::OutputFormat;
use std::path::PathBuf;

/// qsoftmax - quantized softmax inference pipeline
#[derive(Parser, Debug)]
#[command(name = "qsoftmax")]
#[command(about = "Quantize a sample batch, run softmax on an execution context, read it back")]
#[command(long_about = r#"
qsoftmax generates a sample batch, quantizes it symmetrically to the chosen
element type, stages it on an execution context, runs a numerically stable
softmax along one axis with an output rescale, and prints every stage.

Examples:
  # Reference run: 3x10 cosine batch, u8, axis 1, rescale 127, in place
  qsoftmax

  # Signed codes, column-wise softmax, separate output buffer
  qsoftmax run --dtype s8 --axis 0 --out-of-place

  # Float pipeline with probabilities as JSON
  qsoftmax run --dtype f32 --output-scale 1 --format json

  # Effective configuration after file and environment overrides
  qsoftmax config show
"#)]
#[command(version)]
pub struct Cli {
    /// Configuration file path (TOML with a [softmax] table)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Pipeline flags used when no subcommand is given
    #[command(flatten)]
    pub run: RunCommand,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline (the default)
    Run(RunCommand),

    /// Show devices and kernel providers
    Info {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text", value_name = "FORMAT")]
        format: OutputFormat,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path in use, if any
    Path,
}

/// The clap command tree, for completion generation and tests.
pub fn build_cli() -> clap::Command {
    Cli::command()
}
