//! CLI configuration

use crate::commands::{ColorArg, LogFormatArg, RunArgs};
use mockprobe::{SessionConfig, UnmatchedPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - failures only
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - harness info logs
    Verbose,
    /// Debug - route hits, console lines, state transitions
    Debug,
    /// Trace - everything
    Trace,
}

impl Verbosity {
    /// Level from `-q` and the `-v` count
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug | Self::Trace)
    }

    /// Filter directive used when `RUST_LOG` is unset
    #[must_use]
    pub const fn log_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "warn,mockprobe=info,mockprobe_cli=info",
            Self::Debug => "info,mockprobe=debug,mockprobe_cli=debug",
            Self::Trace => "debug,mockprobe=trace,mockprobe_cli=trace",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => console::Term::stderr().features().colors_supported(),
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Log line format
    pub log_format: LogFormat,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set log format
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

/// Command-line settings layered over a scenario's `session:` block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOverrides {
    /// Show the browser window
    pub headed: bool,
    /// Replacement base URL
    pub base_url: Option<String>,
    /// Abort unmatched data requests
    pub strict: bool,
    /// Chromium executable
    pub chromium_path: Option<PathBuf>,
    /// Disable the sandbox
    pub no_sandbox: bool,
}

impl SessionOverrides {
    /// Apply onto a scenario-derived configuration; flags win
    #[must_use]
    pub fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if self.headed {
            config.headless = false;
        }
        if let Some(url) = &self.base_url {
            config.base_url = Some(url.clone());
        }
        if self.strict {
            config.unmatched = UnmatchedPolicy::Abort;
        }
        if let Some(path) = &self.chromium_path {
            config.chromium_path = Some(path.clone());
        }
        if self.no_sandbox {
            config.sandbox = false;
        }
        config
    }
}

impl From<&RunArgs> for SessionOverrides {
    fn from(args: &RunArgs) -> Self {
        Self {
            headed: args.headed,
            base_url: args.base_url.clone(),
            strict: args.strict,
            chromium_path: args.chromium_path.clone(),
            no_sandbox: args.no_sandbox,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_default_verbosity() {
            assert_eq!(Verbosity::default(), Verbosity::Normal);
        }

        #[test]
        fn test_from_flags() {
            assert_eq!(Verbosity::from_flags(true, 3), Verbosity::Quiet);
            assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
            assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
            assert_eq!(Verbosity::from_flags(false, 2), Verbosity::Debug);
            assert_eq!(Verbosity::from_flags(false, 9), Verbosity::Trace);
        }

        #[test]
        fn test_is_verbose() {
            assert!(!Verbosity::Quiet.is_verbose());
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Verbose.is_verbose());
            assert!(Verbosity::Trace.is_verbose());
        }

        #[test]
        fn test_log_directive_parses() {
            for v in [
                Verbosity::Quiet,
                Verbosity::Normal,
                Verbosity::Verbose,
                Verbosity::Debug,
                Verbosity::Trace,
            ] {
                assert!(
                    tracing_subscriber::EnvFilter::try_new(v.log_directive()).is_ok(),
                    "{v:?}"
                );
            }
        }
    }

    mod color_tests {
        use super::*;

        #[test]
        fn test_explicit_choices() {
            assert!(ColorChoice::Always.should_color());
            assert!(!ColorChoice::Never.should_color());
        }

        #[test]
        fn test_from_arg() {
            assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
            assert_eq!(LogFormat::from(LogFormatArg::Json), LogFormat::Json);
        }
    }

    mod overrides_tests {
        use super::*;

        #[test]
        fn test_no_flags_keeps_scenario_values() {
            let base = SessionConfig::new()
                .with_base_url("http://localhost:3000")
                .with_unmatched(UnmatchedPolicy::PassThrough);
            let applied = SessionOverrides::default().apply(base);
            assert!(applied.headless);
            assert!(applied.sandbox);
            assert_eq!(applied.base_url.as_deref(), Some("http://localhost:3000"));
            assert_eq!(applied.unmatched, UnmatchedPolicy::PassThrough);
        }

        #[test]
        fn test_flags_win() {
            let overrides = SessionOverrides {
                headed: true,
                base_url: Some("http://staging:8080".into()),
                strict: true,
                chromium_path: Some(PathBuf::from("/opt/chromium")),
                no_sandbox: true,
            };
            let applied = overrides.apply(SessionConfig::new().with_base_url("http://localhost:3000"));
            assert!(!applied.headless);
            assert!(!applied.sandbox);
            assert_eq!(applied.base_url.as_deref(), Some("http://staging:8080"));
            assert_eq!(applied.unmatched, UnmatchedPolicy::Abort);
            assert_eq!(applied.chromium_path, Some(PathBuf::from("/opt/chromium")));
        }
    }
}
