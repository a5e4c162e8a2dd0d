//! Session manager.
//!
//! A [`Session`] owns one browser process, one isolated context and one page
//! for the duration of a run, together with the route registry and network
//! tracker the page reports into. Every operation goes through the session;
//! after [`Session::close`] all of them return [`HarnessError::SessionClosed`].

use crate::driver::{ConsoleMessage, Interception, Launcher, PageDriver};
use crate::inject::InitScript;
use crate::network::{
    MockHandler, NetworkTracker, RequestRecord, RouteId, RoutePattern, RouteRegistry,
    UnmatchedPolicy, DEFAULT_REQUEST_LOG_CAPACITY,
};
use crate::result::{HarnessError, HarnessResult};
use crate::selector::{IntoSelector, Selector};
use crate::soft::{SoftFailure, SoftFailures};
use crate::wait::{wait_for, Condition, WaitContext, WaitOptions, WaitOutcome, DEFAULT_POLL_INTERVAL_MS};
use futures::future::BoxFuture;
use futures::FutureExt as _;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default navigation timeout (30 seconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Default element resolution timeout (10 seconds)
pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 10_000;

/// Browser viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// What an interaction does when a selector matches several elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Act on the first element in document order
    #[default]
    FirstMatch,
    /// Fail with [`HarnessError::SelectorAmbiguous`]
    Strict,
}

/// Session options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Viewport size
    pub viewport: Viewport,
    /// Chromium executable; discovered when unset
    pub chromium_path: Option<PathBuf>,
    /// Keep the Chromium sandbox (disable inside containers)
    pub sandbox: bool,
    /// User agent override
    pub user_agent: Option<String>,
    /// Base for relative navigation targets
    pub base_url: Option<String>,
    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,
    /// Element resolution timeout in milliseconds
    pub element_timeout_ms: u64,
    /// Default wait timeout in milliseconds
    pub wait_timeout_ms: u64,
    /// Wait polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Fallback for requests no route claims
    pub unmatched: UnmatchedPolicy,
    /// Behavior for selectors matching several elements
    pub ambiguity: AmbiguityPolicy,
    /// Scripts installed before the first navigation
    pub init_scripts: Vec<InitScript>,
    /// Request log entries kept per session
    pub request_log_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            chromium_path: None,
            sandbox: true,
            user_agent: None,
            base_url: None,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            element_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            wait_timeout_ms: crate::wait::DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            unmatched: UnmatchedPolicy::default(),
            ambiguity: AmbiguityPolicy::default(),
            init_scripts: Vec::new(),
            request_log_capacity: DEFAULT_REQUEST_LOG_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport size
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    /// Set the Chromium executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Toggle the Chromium sandbox
    #[must_use]
    pub const fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Override the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, ms: u64) -> Self {
        self.navigation_timeout_ms = ms;
        self
    }

    /// Set element resolution timeout
    #[must_use]
    pub const fn with_element_timeout(mut self, ms: u64) -> Self {
        self.element_timeout_ms = ms;
        self
    }

    /// Set default wait timeout
    #[must_use]
    pub const fn with_wait_timeout(mut self, ms: u64) -> Self {
        self.wait_timeout_ms = ms;
        self
    }

    /// Set wait polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the unmatched-request policy
    #[must_use]
    pub const fn with_unmatched(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    /// Set the selector ambiguity policy
    #[must_use]
    pub const fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// Set how many request log entries the session keeps
    #[must_use]
    pub const fn with_request_log_capacity(mut self, capacity: usize) -> Self {
        self.request_log_capacity = capacity;
        self
    }

    /// Add a pre-navigation script
    #[must_use]
    pub fn with_init_script(mut self, script: impl Into<InitScript>) -> Self {
        self.init_scripts.push(script.into());
        self
    }
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing started
    Idle,
    /// Browser up, nothing loaded
    SessionOpen,
    /// Loading a URL
    Navigating,
    /// Filling, clicking, reading
    Interacting,
    /// Blocked on a condition
    Waiting,
    /// Every check passed
    Verified,
    /// A fault propagated
    Failed,
    /// Resources released
    TornDown,
}

/// One verification run's browser, routes and page state
pub struct Session {
    driver: Option<Box<dyn PageDriver>>,
    config: SessionConfig,
    registry: Arc<RouteRegistry>,
    network: Arc<NetworkTracker>,
    state: RunState,
    history: Vec<RunState>,
    soft: SoftFailures,
    console: Vec<ConsoleMessage>,
    opened_at: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("closed", &self.driver.is_none())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Launch a browser and prepare a page
    ///
    /// Init scripts from `config` are installed before this returns. Launch
    /// failures are returned as-is; nothing is retried.
    pub async fn open(launcher: &dyn Launcher, config: SessionConfig) -> HarnessResult<Self> {
        let registry = Arc::new(
            RouteRegistry::new(config.unmatched).with_log_capacity(config.request_log_capacity),
        );
        let network = Arc::new(NetworkTracker::new());
        let interception = Interception {
            registry: Arc::clone(&registry),
            network: Arc::clone(&network),
        };

        tracing::info!(headless = config.headless, viewport = ?config.viewport, "opening session");
        let driver = launcher.launch(&config, interception).await?;

        let mut session = Self {
            driver: Some(driver),
            config,
            registry,
            network,
            state: RunState::Idle,
            history: vec![RunState::Idle],
            soft: SoftFailures::new(),
            console: Vec::new(),
            opened_at: Instant::now(),
        };
        session.transition(RunState::SessionOpen);

        let scripts = session.config.init_scripts.clone();
        for script in scripts {
            if let Err(e) = session.inject(script).await {
                if let Err(close_err) = session.close().await {
                    tracing::warn!(error = %close_err, "teardown after failed init script");
                }
                return Err(e);
            }
        }
        Ok(session)
    }

    /// Session options
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Route registry of this session
    #[must_use]
    pub fn routes(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Network activity of this session
    #[must_use]
    pub fn network(&self) -> &NetworkTracker {
        &self.network
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited, in order
    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Whether the session was torn down
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.driver.is_none()
    }

    /// Soft failures recorded so far
    #[must_use]
    pub fn soft_failures(&self) -> &[SoftFailure] {
        self.soft.failures()
    }

    /// Console output collected so far
    #[must_use]
    pub fn console_log(&self) -> &[ConsoleMessage] {
        &self.console
    }

    /// Requests intercepted so far
    #[must_use]
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.registry.requests()
    }

    /// Time since the session opened
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub(crate) fn transition(&mut self, next: RunState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "run state");
            self.state = next;
            self.history.push(next);
        }
    }

    fn driver(&self) -> HarnessResult<&dyn PageDriver> {
        self.driver.as_deref().ok_or(HarnessError::SessionClosed)
    }

    fn ensure_open(&self) -> HarnessResult<()> {
        self.driver().map(|_| ())
    }

    async fn collect_console(&mut self) {
        let Some(driver) = self.driver.as_deref() else {
            return;
        };
        let messages = driver.console_messages().await;
        for m in &messages {
            tracing::debug!(target: "mockprobe::console", level = %m.level, "{}", m.text);
        }
        self.console.extend(messages);
    }

    /// Register a script that runs before page scripts on every later
    /// navigation
    pub async fn inject(&mut self, script: impl Into<InitScript>) -> HarnessResult<()> {
        let script = script.into();
        self.driver()?.add_init_script(script.source()).await?;
        tracing::debug!(bytes = script.source().len(), "init script registered");
        Ok(())
    }

    /// Register a route with an explicit label
    pub fn register(
        &self,
        label: impl Into<String>,
        pattern: RoutePattern,
        handler: impl MockHandler + 'static,
    ) -> HarnessResult<RouteId> {
        self.ensure_open()?;
        Ok(self.registry.register(label, pattern, handler))
    }

    /// Register a handler for a glob pattern
    pub fn route(&self, glob: &str, handler: impl MockHandler + 'static) -> HarnessResult<RouteId> {
        self.ensure_open()?;
        self.registry.route(glob, handler)
    }

    /// Answer a glob pattern with a fixed JSON body
    pub fn fulfill_json<T: Serialize + ?Sized>(&self, glob: &str, data: &T) -> HarnessResult<RouteId> {
        self.ensure_open()?;
        self.registry.fulfill_json(glob, data)
    }

    /// Fail requests matching a glob pattern
    pub fn abort(&self, glob: &str) -> HarnessResult<RouteId> {
        self.ensure_open()?;
        self.registry.abort(glob)
    }

    /// Count requests matching a glob pattern and let them through
    pub fn observe(&self, glob: &str) -> HarnessResult<RouteId> {
        self.ensure_open()?;
        self.registry.observe(glob)
    }

    /// Absolute form of a navigation target
    pub fn resolve_url(&self, target: &str) -> HarnessResult<String> {
        if let Ok(absolute) = url::Url::parse(target) {
            return Ok(absolute.to_string());
        }
        let base = self.config.base_url.as_deref().ok_or_else(|| {
            HarnessError::fault(format!("relative URL {target} needs a base URL"))
        })?;
        url::Url::parse(base)
            .and_then(|b| b.join(target))
            .map(|u| u.to_string())
            .map_err(|e| HarnessError::fault(format!("cannot resolve {target} against {base}: {e}")))
    }

    /// Load a URL and block until DOM content has loaded
    pub async fn navigate(&mut self, target: &str) -> HarnessResult<()> {
        let ms = self.config.navigation_timeout_ms;
        self.navigate_with_timeout(target, ms).await
    }

    /// Load a URL with an explicit timeout
    pub async fn navigate_with_timeout(&mut self, target: &str, ms: u64) -> HarnessResult<()> {
        self.ensure_open()?;
        let url = self.resolve_url(target)?;
        self.transition(RunState::Navigating);
        tracing::info!(%url, "navigating");
        let driver = self.driver()?;
        let result = tokio::time::timeout(Duration::from_millis(ms), driver.navigate(&url)).await;
        self.collect_console().await;
        match result {
            Ok(r) => r,
            Err(_) => Err(HarnessError::NavigationTimeout { url, ms }),
        }
    }

    /// Wait for a selector to attach, then apply the ambiguity policy
    async fn resolve(&mut self, selector: &Selector) -> HarnessResult<()> {
        let timeout_ms = self.config.element_timeout_ms;
        self.resolve_within(selector, timeout_ms).await
    }

    async fn resolve_within(&mut self, selector: &Selector, timeout_ms: u64) -> HarnessResult<()> {
        let outcome = self
            .wait_with(&Condition::Attached(selector.clone()), timeout_ms)
            .await?;
        let not_found = || HarnessError::SelectorNotFound {
            selector: selector.to_string(),
            ms: timeout_ms,
        };
        if !outcome.is_satisfied() {
            return Err(not_found());
        }
        let count = self.driver()?.count(selector).await?;
        match (count, self.config.ambiguity) {
            (0, _) => Err(not_found()),
            (1, _) => Ok(()),
            (n, AmbiguityPolicy::Strict) => Err(HarnessError::SelectorAmbiguous {
                selector: selector.to_string(),
                count: n,
            }),
            (n, AmbiguityPolicy::FirstMatch) => {
                tracing::debug!(%selector, count = n, "selector ambiguous, using first match");
                Ok(())
            }
        }
    }

    /// Replace the value of an input
    pub async fn fill(&mut self, selector: impl IntoSelector, value: &str) -> HarnessResult<()> {
        let selector = selector.into_selector()?;
        self.resolve(&selector).await?;
        self.transition(RunState::Interacting);
        tracing::debug!(%selector, "fill");
        self.driver()?.fill(&selector, value).await?;
        self.collect_console().await;
        Ok(())
    }

    /// Click an element
    pub async fn click(&mut self, selector: impl IntoSelector) -> HarnessResult<()> {
        let selector = selector.into_selector()?;
        self.resolve(&selector).await?;
        self.transition(RunState::Interacting);
        tracing::debug!(%selector, "click");
        self.driver()?.click(&selector).await?;
        self.collect_console().await;
        Ok(())
    }

    /// Choose an option of a `<select>`
    pub async fn select_option(&mut self, selector: impl IntoSelector, value: &str) -> HarnessResult<()> {
        let selector = selector.into_selector()?;
        self.resolve(&selector).await?;
        self.transition(RunState::Interacting);
        tracing::debug!(%selector, value, "select option");
        self.driver()?.select_option(&selector, value).await?;
        self.collect_console().await;
        Ok(())
    }

    /// Text content of an element
    pub async fn text_content(&mut self, selector: impl IntoSelector) -> HarnessResult<String> {
        let selector = selector.into_selector()?;
        self.resolve(&selector).await?;
        self.transition(RunState::Interacting);
        Ok(self.driver()?.text_content(&selector).await?.unwrap_or_default())
    }

    /// Attribute of an element
    pub async fn attribute(&mut self, selector: impl IntoSelector, name: &str) -> HarnessResult<Option<String>> {
        let selector = selector.into_selector()?;
        self.resolve(&selector).await?;
        self.transition(RunState::Interacting);
        self.driver()?.attribute(&selector, name).await
    }

    /// Number of elements matching a selector, without waiting
    pub async fn count(&mut self, selector: impl IntoSelector) -> HarnessResult<usize> {
        let selector = selector.into_selector()?;
        self.driver()?.count(&selector).await
    }

    /// Evaluate an expression in the page
    pub async fn evaluate(&mut self, expression: &str) -> HarnessResult<serde_json::Value> {
        let value = self.driver()?.evaluate(expression).await?;
        self.collect_console().await;
        Ok(value)
    }

    /// Current page URL
    pub async fn current_url(&self) -> HarnessResult<String> {
        self.driver()?.current_url().await
    }

    /// Full-page screenshot written to `path`
    pub async fn screenshot(&mut self, path: impl AsRef<Path>) -> HarnessResult<PathBuf> {
        let path = path.as_ref().to_path_buf();
        let png = self.driver()?.screenshot().await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, png).await?;
        tracing::info!(path = %path.display(), "screenshot saved");
        Ok(path)
    }

    async fn wait_with(&mut self, condition: &Condition, timeout_ms: u64) -> HarnessResult<WaitOutcome> {
        let options = WaitOptions::new()
            .with_timeout(timeout_ms)
            .with_poll_interval(self.config.poll_interval_ms);
        let ctx = WaitContext {
            page: self.driver()?,
            registry: &self.registry,
            network: &self.network,
        };
        wait_for(&ctx, condition, &options).await
    }

    /// Block until `condition` holds; `None` uses the session's wait timeout
    pub async fn wait_for(&mut self, condition: &Condition, timeout_ms: Option<u64>) -> HarnessResult<WaitOutcome> {
        self.ensure_open()?;
        self.transition(RunState::Waiting);
        let ms = timeout_ms.unwrap_or(self.config.wait_timeout_ms);
        let outcome = self.wait_with(condition, ms).await;
        self.collect_console().await;
        outcome
    }

    /// Wait and treat a timeout as fatal
    pub async fn wait_until(&mut self, condition: &Condition, timeout_ms: Option<u64>) -> HarnessResult<Duration> {
        self.wait_for(condition, timeout_ms).await?.into_result()
    }

    /// Wait and record a timeout as a soft failure; returns whether it held
    pub async fn wait_soft(&mut self, condition: &Condition, timeout_ms: Option<u64>) -> HarnessResult<bool> {
        match self.wait_for(condition, timeout_ms).await?.into_result() {
            Ok(_) => Ok(true),
            Err(e) => {
                self.soft.record(&e);
                Ok(false)
            }
        }
    }

    /// Assert that an element is visible within the element timeout
    pub async fn expect_visible(&mut self, selector: impl IntoSelector) -> HarnessResult<()> {
        let selector = selector.into_selector()?;
        let ms = self.config.element_timeout_ms;
        if self.wait_for(&Condition::Visible(selector.clone()), Some(ms)).await?.is_satisfied() {
            Ok(())
        } else {
            Err(HarnessError::assertion(format!("{selector} is not visible after {ms}ms")))
        }
    }

    /// Assert the trimmed text of an element
    ///
    /// Resolving the element and waiting for the text share one element
    /// timeout.
    pub async fn expect_text(&mut self, selector: impl IntoSelector, expected: &str) -> HarnessResult<()> {
        let selector = selector.into_selector()?;
        let ms = self.config.element_timeout_ms;
        let start = Instant::now();
        self.resolve_within(&selector, ms).await?;
        let left = ms.saturating_sub(start.elapsed().as_millis() as u64);
        let condition = Condition::TextIs(selector.clone(), expected.to_string());
        if self.wait_for(&condition, Some(left)).await?.is_satisfied() {
            return Ok(());
        }
        let actual = self.driver()?.text_content(&selector).await?.unwrap_or_default();
        Err(HarnessError::assertion(format!(
            "{selector}: expected text {expected:?}, found {:?}",
            actual.trim()
        )))
    }

    /// Assert that at least `n` elements match
    pub async fn expect_count_at_least(&mut self, selector: impl IntoSelector, n: usize) -> HarnessResult<()> {
        let selector = selector.into_selector()?;
        let ms = self.config.element_timeout_ms;
        let condition = Condition::CountAtLeast(selector.clone(), n);
        if self.wait_for(&condition, Some(ms)).await?.is_satisfied() {
            return Ok(());
        }
        let actual = self.driver()?.count(&selector).await?;
        Err(HarnessError::assertion(format!(
            "{selector}: expected at least {n} elements, found {actual}"
        )))
    }

    /// Assert an attribute of the first matching element
    pub async fn expect_attribute(
        &mut self,
        selector: impl IntoSelector,
        name: &str,
        expected: &str,
    ) -> HarnessResult<()> {
        let selector = selector.into_selector()?;
        let actual = self.attribute(&selector, name).await?;
        if actual.as_deref() == Some(expected) {
            Ok(())
        } else {
            Err(HarnessError::assertion(format!(
                "{selector}: expected {name}={expected:?}, found {actual:?}"
            )))
        }
    }

    /// Assert the status of the latest response to a route's requests
    ///
    /// Waits up to the session's wait timeout for a response; a route that
    /// lets requests through reports the backend's status once it arrives.
    pub async fn expect_response_status(&mut self, route: RouteId, expected: u16) -> HarnessResult<()> {
        self.wait_until(&Condition::RouteResponded(route), None).await?;
        let label = self.registry.label(route).unwrap_or_else(|| route.to_string());
        match self.registry.last_status(route) {
            Some(status) if status == expected => Ok(()),
            Some(status) => Err(HarnessError::assertion(format!(
                "{label}: expected status {expected}, got {status}"
            ))),
            None => Err(HarnessError::assertion(format!("{label}: no response recorded"))),
        }
    }

    /// Tear down the browser; later calls are no-ops
    pub async fn close(&mut self) -> HarnessResult<()> {
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };
        for m in driver.console_messages().await {
            tracing::debug!(target: "mockprobe::console", level = %m.level, "{}", m.text);
            self.console.push(m);
        }
        let result = driver.close().await;
        self.transition(RunState::TornDown);
        tracing::info!(
            elapsed_ms = self.elapsed().as_millis() as u64,
            requests = self.registry.requests().len(),
            evicted = self.registry.evicted_requests(),
            "session closed"
        );
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.driver.is_some() {
            tracing::warn!("session dropped without close; browser teardown left to the driver");
        }
    }
}

/// Open a session, run `body`, and close the session on every exit path
///
/// A panic inside `body` is resumed after teardown.
///
/// ```no_run
/// # async fn demo(launcher: &dyn mockprobe::Launcher) -> mockprobe::HarnessResult<()> {
/// use mockprobe::{with_session, SessionConfig};
///
/// let title = with_session(launcher, SessionConfig::default(), |s| {
///     Box::pin(async move {
///         s.navigate("http://localhost:3000/users").await?;
///         s.text_content("h1").await
///     })
/// })
/// .await?;
/// # let _ = title;
/// # Ok(())
/// # }
/// ```
pub async fn with_session<T, F>(launcher: &dyn Launcher, config: SessionConfig, body: F) -> HarnessResult<T>
where
    F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, HarnessResult<T>>,
{
    let mut session = Session::open(launcher, config).await?;
    let outcome = AssertUnwindSafe(body(&mut session)).catch_unwind().await;
    let closed = session.close().await;
    match outcome {
        Ok(Ok(value)) => closed.map(|()| value),
        Ok(Err(e)) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "teardown failed after run error");
            }
            Err(e)
        }
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedApp, ScriptedElement, ScriptedLauncher, ScriptedPageDef};
    use serde_json::json;

    fn app() -> ScriptedApp {
        ScriptedApp::new().page(
            ScriptedPageDef::at("**/users")
                .unwrap()
                .element(ScriptedElement::new("h1").with_text("User Management"))
                .element(ScriptedElement::new("[role='tab']").with_text("Overview"))
                .element(ScriptedElement::new("[role='tab']").with_text("Roles"))
                .element(ScriptedElement::new("input[name='username']").with_attribute("name", "username"))
                .console("log", "app booted"),
        )
    }

    fn config() -> SessionConfig {
        SessionConfig::new()
            .with_base_url("http://localhost:3000")
            .with_element_timeout(1000)
            .with_wait_timeout(2000)
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let c = SessionConfig::default();
            assert!(c.headless);
            assert!(c.sandbox);
            assert_eq!(c.viewport, Viewport { width: 1280, height: 720 });
            assert_eq!(c.unmatched, UnmatchedPolicy::PassThrough);
            assert_eq!(c.ambiguity, AmbiguityPolicy::FirstMatch);
        }

        #[test]
        fn test_builders() {
            let c = SessionConfig::new()
                .with_headless(false)
                .with_viewport(800, 600)
                .with_sandbox(false)
                .with_unmatched(UnmatchedPolicy::Abort)
                .with_ambiguity(AmbiguityPolicy::Strict)
                .with_init_script("window.x = 1;");
            assert!(!c.headless);
            assert_eq!(c.viewport.width, 800);
            assert_eq!(c.init_scripts.len(), 1);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[tokio::test]
        async fn test_launch_failure_is_returned() {
            let launcher = ScriptedLauncher::failing("chromium not found");
            let err = Session::open(&launcher, config()).await.unwrap_err();
            assert!(matches!(err, HarnessError::LaunchFailure { .. }));
        }

        #[tokio::test]
        async fn test_close_is_idempotent() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.close().await.unwrap();
            session.close().await.unwrap();
            assert_eq!(launcher.closes(), 1);
            assert_eq!(session.state(), RunState::TornDown);
        }

        #[tokio::test]
        async fn test_operations_after_close() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.close().await.unwrap();
            assert!(matches!(session.navigate("/users").await, Err(HarnessError::SessionClosed)));
            assert!(matches!(session.click("h1").await, Err(HarnessError::SessionClosed)));
            assert!(matches!(session.abort("**/x"), Err(HarnessError::SessionClosed)));
            assert!(matches!(
                session.wait_for(&Condition::network_idle(), Some(10)).await,
                Err(HarnessError::SessionClosed)
            ));
        }

        #[tokio::test]
        async fn test_with_session_closes_on_error() {
            let launcher = ScriptedLauncher::new(app());
            let result: HarnessResult<()> = with_session(&launcher, config(), |s| {
                Box::pin(async move {
                    s.navigate("/users").await?;
                    Err(HarnessError::assertion("forced"))
                })
            })
            .await;
            assert!(matches!(result, Err(HarnessError::AssertionFailure { .. })));
            assert_eq!(launcher.closes(), 1);
        }

        fn explode() -> HarnessResult<()> {
            panic!("body exploded")
        }

        #[tokio::test]
        async fn test_with_session_closes_on_panic() {
            let launcher = ScriptedLauncher::new(app());
            let l2 = launcher.clone();
            let joined = tokio::spawn(async move {
                let _: HarnessResult<()> = with_session(&l2, config(), |_s| {
                    Box::pin(async move { explode() })
                })
                .await;
            })
            .await;
            assert!(joined.unwrap_err().is_panic());
            assert_eq!(launcher.closes(), 1);
        }

        #[tokio::test]
        async fn test_state_history() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.navigate("/users").await.unwrap();
            session.fill("input[name='username']", "lollito").await.unwrap();
            session.wait_until(&Condition::visible("h1").unwrap(), None).await.unwrap();
            session.close().await.unwrap();
            assert_eq!(
                session.history(),
                &[
                    RunState::Idle,
                    RunState::SessionOpen,
                    RunState::Navigating,
                    RunState::Interacting,
                    RunState::Waiting,
                    RunState::TornDown
                ]
            );
        }

        #[tokio::test]
        async fn test_console_collected() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.navigate("/users").await.unwrap();
            assert!(session.console_log().iter().any(|m| m.text == "app booted"));
            session.close().await.unwrap();
        }
    }

    mod interaction_tests {
        use super::*;

        #[tokio::test]
        async fn test_relative_url_needs_base() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, SessionConfig::default()).await.unwrap();
            assert!(session.navigate("/users").await.is_err());
            assert_eq!(
                session.resolve_url("http://localhost:3000/users").unwrap(),
                "http://localhost:3000/users"
            );
            session.close().await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_selector_not_found() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.navigate("/users").await.unwrap();
            let err = session.click("button.missing").await.unwrap_err();
            assert!(matches!(err, HarnessError::SelectorNotFound { ms: 1000, .. }));
            session.close().await.unwrap();
        }

        #[tokio::test]
        async fn test_first_match_vs_strict() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.navigate("/users").await.unwrap();
            assert_eq!(session.text_content("[role='tab']").await.unwrap(), "Overview");
            session.close().await.unwrap();

            let mut strict = Session::open(&launcher, config().with_ambiguity(AmbiguityPolicy::Strict))
                .await
                .unwrap();
            strict.navigate("/users").await.unwrap();
            let err = strict.click("[role='tab']").await.unwrap_err();
            assert!(matches!(err, HarnessError::SelectorAmbiguous { count: 2, .. }));
            strict.close().await.unwrap();
        }

        #[tokio::test]
        async fn test_invalid_selector() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            assert!(matches!(
                session.click("input[name='x'").await,
                Err(HarnessError::InvalidSelector { .. })
            ));
            session.close().await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_expectations() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.navigate("/users").await.unwrap();
            session.expect_text("h1", "User Management").await.unwrap();
            session.expect_visible("text=Roles").await.unwrap();
            session.expect_count_at_least("[role='tab']", 2).await.unwrap();

            let err = session.expect_text("h1", "Dashboard").await.unwrap_err();
            assert!(matches!(err, HarnessError::AssertionFailure { .. }));
            assert!(err.to_string().contains("User Management"));
            let err = session.expect_count_at_least("[role='tab']", 3).await.unwrap_err();
            assert!(err.to_string().contains("found 2"));
            session.close().await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_wait_soft_records() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.navigate("/users").await.unwrap();
            let held = session
                .wait_soft(&Condition::visible(".never").unwrap(), Some(300))
                .await
                .unwrap();
            assert!(!held);
            assert_eq!(session.soft_failures().len(), 1);
            session.close().await.unwrap();
        }

        #[tokio::test]
        async fn test_screenshot_writes_file() {
            let dir = tempfile::tempdir().unwrap();
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            session.navigate("/users").await.unwrap();
            let path = session
                .screenshot(dir.path().join("shots/users.png"))
                .await
                .unwrap();
            let bytes = std::fs::read(path).unwrap();
            assert_eq!(&bytes[1..4], b"PNG");
            session.close().await.unwrap();
        }

        #[tokio::test]
        async fn test_session_routes() {
            let launcher = ScriptedLauncher::new(app());
            let mut session = Session::open(&launcher, config()).await.unwrap();
            let id = session.fulfill_json("**/api/club/1", &json!({"id": 1})).unwrap();
            assert_eq!(session.routes().hits(id), 0);
            assert_eq!(session.routes().routes().len(), 1);
            session.close().await.unwrap();
        }
    }
}
