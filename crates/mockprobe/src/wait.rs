//! Condition waiter.
//!
//! Blocks until a predicate over page state holds or the timeout expires.
//! Predicates are polled at a fixed interval; route-hit notifications from the
//! registry wake the waiter early. A check is only started strictly before the
//! deadline and is itself bounded by the time left, so a wait never reports
//! [`WaitOutcome::Satisfied`] for a state first observed after its window and
//! never overruns it by more than scheduling latency.

use crate::driver::{is_truthy, PageDriver};
use crate::network::{NetworkTracker, RouteId, RouteRegistry, UrlPattern, NETWORK_IDLE_THRESHOLD_MS};
use crate::result::{HarnessError, HarnessResult};
use crate::selector::Selector;
use std::time::Duration;
use tokio::time::Instant;

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Predicate over page state
#[derive(Debug, Clone)]
pub enum Condition {
    /// At least one matching element exists
    Attached(Selector),
    /// At least one matching element is visible
    Visible(Selector),
    /// No matching element is visible
    Hidden(Selector),
    /// First matching element has this trimmed text
    TextIs(Selector, String),
    /// At least this many elements match
    CountAtLeast(Selector, usize),
    /// Current URL matches a pattern
    UrlMatches(UrlPattern),
    /// A mock route has received at least one request
    RouteHit(RouteId),
    /// A request claimed by a mock route has been answered with a status
    RouteResponded(RouteId),
    /// No request in flight for the quiet window
    NetworkIdle(Duration),
    /// Page expression evaluates truthy
    Script(String),
}

impl Condition {
    /// Visible condition from a selector string
    pub fn visible(selector: &str) -> HarnessResult<Self> {
        Ok(Self::Visible(Selector::parse(selector)?))
    }

    /// Hidden condition from a selector string
    pub fn hidden(selector: &str) -> HarnessResult<Self> {
        Ok(Self::Hidden(Selector::parse(selector)?))
    }

    /// URL condition from a glob
    pub fn url(glob: &str) -> HarnessResult<Self> {
        Ok(Self::UrlMatches(UrlPattern::glob(glob)?))
    }

    /// Network idle with the default quiet window
    #[must_use]
    pub const fn network_idle() -> Self {
        Self::NetworkIdle(Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS))
    }

    /// Whether this waits on a mock route
    #[must_use]
    pub const fn is_route(&self) -> bool {
        matches!(self, Self::RouteHit(_) | Self::RouteResponded(_))
    }

    fn describe(&self, registry: &RouteRegistry) -> String {
        match self {
            Self::Attached(s) => format!("{s} to be attached"),
            Self::Visible(s) => format!("{s} to be visible"),
            Self::Hidden(s) => format!("{s} to be hidden"),
            Self::TextIs(s, t) => format!("{s} to have text {t:?}"),
            Self::CountAtLeast(s, n) => format!("at least {n} elements matching {s}"),
            Self::UrlMatches(p) => format!("URL matching {p}"),
            Self::RouteHit(id) => registry.label(*id).unwrap_or_else(|| id.to_string()),
            Self::RouteResponded(id) => format!(
                "response to {}",
                registry.label(*id).unwrap_or_else(|| id.to_string())
            ),
            Self::NetworkIdle(q) => format!("network idle for {}ms", q.as_millis()),
            Self::Script(js) => format!("script `{js}` to be truthy"),
        }
    }
}

/// Wait configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration; never zero
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Terminal state of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Predicate held inside the window
    Satisfied {
        /// Time until the predicate held
        elapsed: Duration,
    },
    /// Window elapsed without the predicate holding
    TimedOut {
        /// What was waited for
        condition: String,
        /// Whether the condition was a route hit
        route: bool,
        /// Configured timeout
        timeout_ms: u64,
        /// Time actually spent
        elapsed: Duration,
    },
}

impl WaitOutcome {
    /// Whether the predicate held
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Treat a timeout as fatal
    pub fn into_result(self) -> HarnessResult<Duration> {
        match self {
            Self::Satisfied { elapsed } => Ok(elapsed),
            Self::TimedOut {
                condition,
                route: true,
                timeout_ms,
                ..
            } => Err(HarnessError::RouteTimeout {
                route: condition,
                ms: timeout_ms,
            }),
            Self::TimedOut {
                condition,
                timeout_ms,
                ..
            } => Err(HarnessError::WaitTimeout {
                condition,
                ms: timeout_ms,
            }),
        }
    }
}

/// Everything a condition can observe
#[derive(Clone, Copy)]
pub struct WaitContext<'a> {
    /// The page
    pub page: &'a dyn PageDriver,
    /// Route hit counters
    pub registry: &'a RouteRegistry,
    /// In-flight requests
    pub network: &'a NetworkTracker,
}

impl std::fmt::Debug for WaitContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitContext").finish_non_exhaustive()
    }
}

/// Evaluate a condition once
pub async fn check(ctx: &WaitContext<'_>, condition: &Condition) -> HarnessResult<bool> {
    match condition {
        Condition::Attached(s) => Ok(ctx.page.count(s).await? > 0),
        Condition::Visible(s) => ctx.page.is_visible(s).await,
        Condition::Hidden(s) => Ok(!ctx.page.is_visible(s).await?),
        Condition::TextIs(s, text) => Ok(ctx
            .page
            .text_content(s)
            .await?
            .is_some_and(|t| t.trim() == text.trim())),
        Condition::CountAtLeast(s, n) => Ok(ctx.page.count(s).await? >= *n),
        Condition::UrlMatches(p) => Ok(p.matches(&ctx.page.current_url().await?)),
        Condition::RouteHit(id) => Ok(ctx.registry.hits(*id) > 0),
        Condition::RouteResponded(id) => Ok(ctx.registry.last_status(*id).is_some()),
        Condition::NetworkIdle(quiet) => Ok(ctx.network.is_idle(*quiet)),
        Condition::Script(js) => Ok(is_truthy(&ctx.page.evaluate(js).await?)),
    }
}

/// Block until `condition` holds or `options.timeout_ms` elapses
///
/// Returns `Err` only when the page itself is gone; a timeout is reported as
/// [`WaitOutcome::TimedOut`] and the caller decides whether it is fatal.
pub async fn wait_for(
    ctx: &WaitContext<'_>,
    condition: &Condition,
    options: &WaitOptions,
) -> HarnessResult<WaitOutcome> {
    let start = Instant::now();
    let deadline = start + options.timeout();
    let poll = options.poll_interval();
    let description = condition.describe(ctx.registry);
    tracing::debug!(condition = %description, timeout_ms = options.timeout_ms, "waiting");

    loop {
        let notified = ctx.registry.hit_notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match tokio::time::timeout(deadline - now, check(ctx, condition)).await {
            Ok(Ok(true)) => {
                let elapsed = start.elapsed();
                tracing::debug!(condition = %description, elapsed_ms = elapsed.as_millis() as u64, "condition satisfied");
                return Ok(WaitOutcome::Satisfied { elapsed });
            }
            Ok(Ok(false)) | Err(_) => {}
            Ok(Err(e @ (HarnessError::SessionClosed | HarnessError::LaunchFailure { .. }))) => {
                return Err(e);
            }
            Ok(Err(e)) => tracing::trace!(condition = %description, error = %e, "check failed, retrying"),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let nap = poll.min(deadline - now);
        tokio::select! {
            () = tokio::time::sleep(nap) => {}
            () = &mut notified => {}
        }
    }

    let elapsed = start.elapsed();
    tracing::debug!(condition = %description, elapsed_ms = elapsed.as_millis() as u64, "wait timed out");
    Ok(WaitOutcome::TimedOut {
        condition: description,
        route: condition.is_route(),
        timeout_ms: options.timeout_ms,
        elapsed,
    })
}
