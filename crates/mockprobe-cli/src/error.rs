//! Error types for the CLI

use mockprobe::{ErrorKind, HarnessError};
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Exit code for failed verification runs
pub const EXIT_VERIFICATION_FAILED: u8 = 1;

/// Exit code for bad arguments and malformed scenario files
pub const EXIT_USAGE: u8 = 2;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// One or more scenarios failed
    #[error("{failed} of {total} scenario(s) failed")]
    VerificationFailed {
        /// Failed runs
        failed: usize,
        /// All runs
        total: usize,
    },

    /// Report could not be written
    #[error("Report generation failed: {message}")]
    ReportGeneration {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Mockprobe library error
    #[error("{0}")]
    Harness(#[from] HarnessError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a report generation error
    #[must_use]
    pub fn report_generation(message: impl Into<String>) -> Self {
        Self::ReportGeneration {
            message: message.into(),
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } | Self::InvalidArgument { .. } | Self::Io(_) => EXIT_USAGE,
            Self::Harness(e) if e.kind() == ErrorKind::InvalidInput => EXIT_USAGE,
            Self::VerificationFailed { .. } | Self::ReportGeneration { .. } | Self::Harness(_) => {
                EXIT_VERIFICATION_FAILED
            }
        }
    }
}
