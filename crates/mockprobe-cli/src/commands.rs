//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Mockprobe: run browser verification scenarios against mocked backends
#[derive(Parser, Debug)]
#[command(name = "mockprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios in a browser
    Run(RunArgs),

    /// Parse and validate scenario files without launching a browser
    Validate(ValidateArgs),

    /// Print a scenario's route table in registration order
    Routes(RoutesArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Scenario files to run
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Base URL that relative navigation resolves against
    #[arg(long, env = "MOCKPROBE_BASE_URL")]
    pub base_url: Option<String>,

    /// Abort data requests no route claims
    #[arg(long)]
    pub strict: bool,

    /// Chromium executable
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chromium_path: Option<PathBuf>,

    /// Disable the Chromium sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Directory for failure screenshots
    #[arg(long, default_value = "target/mockprobe/artifacts")]
    pub artifacts: PathBuf,

    /// Write a JSON run summary to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Stop after the first failing scenario
    #[arg(long)]
    pub fail_fast: bool,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario files to validate
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,
}

/// Arguments for the routes command
#[derive(Parser, Debug)]
pub struct RoutesArgs {
    /// Scenario file
    pub scenario: PathBuf,

    /// Show which route would answer this URL
    #[arg(long)]
    pub url: Option<String>,

    /// Request method used with --url (default GET)
    #[arg(long, requires = "url")]
    pub method: Option<String>,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Log format argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}
