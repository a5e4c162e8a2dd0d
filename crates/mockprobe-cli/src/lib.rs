//! Mockprobe CLI Library
//!
//! Command-line front end that runs declarative scenario files through the
//! Mockprobe harness and turns their outcome into exit codes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod logging;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, LogFormatArg, RoutesArgs, RunArgs, ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, LogFormat, SessionOverrides, Verbosity};
pub use error::{CliError, CliResult, EXIT_USAGE, EXIT_VERIFICATION_FAILED};
pub use logging::{env_filter, init_logging};
pub use output::{render_route_table, summary_line, ProgressReporter};
pub use runner::{
    check_summary, describe_action, prepare, probe, route_rows, validate_files, write_report,
    PreparedScenario, ScenarioRunner,
};
