//! Result and error types for Mockprobe.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Mockprobe operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur during a verification run
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Browser engine could not start
    #[error("Failed to launch browser: {message}")]
    LaunchFailure {
        /// Error message
        message: String,
    },

    /// Target URL did not reach DOM content loaded in time
    #[error("Navigation to {url} timed out after {ms}ms")]
    NavigationTimeout {
        /// URL being loaded
        url: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Interaction target missing
    #[error("No element matches selector {selector} (waited {ms}ms)")]
    SelectorNotFound {
        /// Selector source
        selector: String,
        /// Time spent resolving, in milliseconds
        ms: u64,
    },

    /// Interaction target not unique under the strict policy
    #[error("Selector {selector} matched {count} elements, expected exactly one")]
    SelectorAmbiguous {
        /// Selector source
        selector: String,
        /// Number of matching elements
        count: usize,
    },

    /// An expected mock route never received a request
    #[error("Route {route} received no request within {ms}ms")]
    RouteTimeout {
        /// Route label
        route: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// A non-route wait condition timed out and the caller treated it as fatal
    #[error("Timed out after {ms}ms waiting for {condition}")]
    WaitTimeout {
        /// Condition description
        condition: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Observed page state did not match the expected value
    #[error("Assertion failed: {message}")]
    AssertionFailure {
        /// Error message
        message: String,
    },

    /// Any other fault from the browser automation protocol
    #[error("Browser fault: {message}")]
    UnhandledFault {
        /// Error message
        message: String,
    },

    /// Operation attempted on a session that was already torn down
    #[error("Session is closed")]
    SessionClosed,

    /// Route pattern could not be compiled
    #[error("Invalid route pattern {pattern}: {message}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Error message
        message: String,
    },

    /// Selector string could not be parsed
    #[error("Invalid selector {selector}: {message}")]
    InvalidSelector {
        /// Selector source
        selector: String,
        /// Error message
        message: String,
    },

    /// Scenario file is malformed
    #[error("Scenario error: {message}")]
    Scenario {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Stable classification of a [`HarnessError`], used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Browser could not start
    LaunchFailure,
    /// Navigation milestone not reached
    NavigationTimeout,
    /// Selector resolved to nothing
    SelectorNotFound,
    /// Selector resolved to several elements
    SelectorAmbiguous,
    /// Route never hit
    RouteTimeout,
    /// Generic wait timed out
    WaitTimeout,
    /// Page state mismatch
    AssertionFailure,
    /// Anything else surfaced by the browser or the harness
    UnhandledFault,
    /// Use after teardown
    SessionClosed,
    /// Bad input (pattern, selector, scenario)
    InvalidInput,
}

impl HarnessError {
    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailure {
            message: message.into(),
        }
    }

    /// Create an unhandled browser fault
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::UnhandledFault {
            message: message.into(),
        }
    }

    /// Create a launch failure
    #[must_use]
    pub fn launch(message: impl Into<String>) -> Self {
        Self::LaunchFailure {
            message: message.into(),
        }
    }

    /// Create a scenario error
    #[must_use]
    pub fn scenario(message: impl Into<String>) -> Self {
        Self::Scenario {
            message: message.into(),
        }
    }

    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LaunchFailure { .. } => ErrorKind::LaunchFailure,
            Self::NavigationTimeout { .. } => ErrorKind::NavigationTimeout,
            Self::SelectorNotFound { .. } => ErrorKind::SelectorNotFound,
            Self::SelectorAmbiguous { .. } => ErrorKind::SelectorAmbiguous,
            Self::RouteTimeout { .. } => ErrorKind::RouteTimeout,
            Self::WaitTimeout { .. } => ErrorKind::WaitTimeout,
            Self::AssertionFailure { .. } => ErrorKind::AssertionFailure,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::InvalidPattern { .. }
            | Self::InvalidSelector { .. }
            | Self::Scenario { .. }
            | Self::Yaml(_) => ErrorKind::InvalidInput,
            Self::UnhandledFault { .. } | Self::Io(_) | Self::Json(_) => {
                ErrorKind::UnhandledFault
            }
        }
    }

    /// Whether the run must stop immediately
    ///
    /// Every error is fatal to the run except the ones a caller may choose to
    /// downgrade (timeouts and assertion mismatches).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::WaitTimeout { .. } | Self::RouteTimeout { .. } | Self::AssertionFailure { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_detail() {
        let err = HarnessError::RouteTimeout {
            route: "injuries".to_string(),
            ms: 3000,
        };
        let msg = err.to_string();
        assert!(msg.contains("injuries"));
        assert!(msg.contains("3000"));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            HarnessError::launch("no chromium").kind(),
            ErrorKind::LaunchFailure
        );
        assert_eq!(
            HarnessError::assertion("mismatch").kind(),
            ErrorKind::AssertionFailure
        );
        assert_eq!(HarnessError::SessionClosed.kind(), ErrorKind::SessionClosed);
        assert_eq!(
            HarnessError::scenario("bad").kind(),
            ErrorKind::InvalidInput
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(HarnessError::from(io).kind(), ErrorKind::UnhandledFault);
    }

    #[test]
    fn test_recoverable() {
        assert!(HarnessError::assertion("x").is_recoverable());
        assert!(HarnessError::WaitTimeout {
            condition: "c".to_string(),
            ms: 1
        }
        .is_recoverable());
        assert!(!HarnessError::launch("x").is_recoverable());
        assert!(!HarnessError::SessionClosed.is_recoverable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RouteTimeout).unwrap();
        assert_eq!(json, "\"route_timeout\"");
    }
}
