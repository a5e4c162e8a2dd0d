//! Browser driver seam.
//!
//! A [`Launcher`] starts a browser with one isolated context and one page and
//! wires the page's request interception to a [`RouteRegistry`]. The returned
//! [`PageDriver`] is what a [`Session`](crate::session::Session) talks to.
//!
//! ```text
//! ┌──────────────┐   launch    ┌──────────────────┐  paused request  ┌───────────────┐
//! │   Session    │ ──────────▶ │    PageDriver    │ ───────────────▶ │ RouteRegistry │
//! │ (main flow)  │ ◀────────── │ Chromium / Script│ ◀─────────────── │  (handlers)   │
//! └──────────────┘   results   └──────────────────┘    decision      └───────────────┘
//! ```
//!
//! Drivers act on the first element matching a selector; element resolution
//! timeouts and the ambiguity policy live in the session.

use crate::network::{NetworkTracker, RouteRegistry};
use crate::result::HarnessResult;
use crate::selector::Selector;
use crate::session::SessionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state the page's network layer reports into
#[derive(Debug, Clone, Default)]
pub struct Interception {
    /// Routes consulted for every request
    pub registry: Arc<RouteRegistry>,
    /// In-flight request tracking
    pub network: Arc<NetworkTracker>,
}

/// A console line emitted by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// Console method (`log`, `warn`, `error`, ...)
    pub level: String,
    /// Rendered text
    pub text: String,
}

impl ConsoleMessage {
    /// Create a console message
    #[must_use]
    pub fn new(level: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            text: text.into(),
        }
    }
}

/// Operations on a single page
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Register a script run before any page script on every later navigation
    async fn add_init_script(&self, source: &str) -> HarnessResult<()>;

    /// Load a URL and return once DOM content has loaded
    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Current page URL
    async fn current_url(&self) -> HarnessResult<String>;

    /// Number of elements matching a selector
    async fn count(&self, selector: &Selector) -> HarnessResult<usize>;

    /// Whether any matching element is rendered and not hidden
    async fn is_visible(&self, selector: &Selector) -> HarnessResult<bool>;

    /// Text content of the first match
    async fn text_content(&self, selector: &Selector) -> HarnessResult<Option<String>>;

    /// Attribute of the first match
    async fn attribute(&self, selector: &Selector, name: &str) -> HarnessResult<Option<String>>;

    /// Replace the value of the first matching input
    async fn fill(&self, selector: &Selector, value: &str) -> HarnessResult<()>;

    /// Click the first match
    async fn click(&self, selector: &Selector) -> HarnessResult<()>;

    /// Select an option (by value or label) in the first matching `<select>`
    async fn select_option(&self, selector: &Selector, value: &str) -> HarnessResult<()>;

    /// Evaluate an expression in the page
    async fn evaluate(&self, expression: &str) -> HarnessResult<serde_json::Value>;

    /// Full-page PNG screenshot
    async fn screenshot(&self) -> HarnessResult<Vec<u8>>;

    /// Drain console messages collected since the last call
    async fn console_messages(&self) -> Vec<ConsoleMessage>;

    /// Tear down the page, its context, and the browser process
    async fn close(&mut self) -> HarnessResult<()>;
}

/// Starts a browser for one session
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch a browser, create an isolated context and page, and route the
    /// page's requests through `interception`
    async fn launch(
        &self,
        config: &SessionConfig,
        interception: Interception,
    ) -> HarnessResult<Box<dyn PageDriver>>;
}

/// Whether an evaluated value counts as true in page scripts
#[must_use]
pub fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([])));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
    }

    #[test]
    fn test_console_message() {
        let m = ConsoleMessage::new("warn", "deprecated");
        assert_eq!(m.level, "warn");
        assert_eq!(m.text, "deprecated");
    }
}
