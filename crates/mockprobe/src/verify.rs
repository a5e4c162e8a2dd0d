//! Failure capture and verification runs.
//!
//! [`capture_on_failure`] decorates a sequence of session operations: when the
//! sequence fails, a full-page screenshot named after the run is written and
//! the original error is handed back together with the artifact path.
//! [`Verification`] composes open, body, capture and close into a
//! serializable [`VerificationResult`].

use crate::driver::Launcher;
use crate::network::panic_message;
use crate::result::{ErrorKind, HarnessError, HarnessResult};
use crate::session::{RunState, Session, SessionConfig};
use crate::soft::SoftFailure;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt as _;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

/// A fault that propagated out of a captured sequence
#[derive(Debug)]
pub struct CapturedFailure {
    /// The original error, untouched
    pub error: HarnessError,
    /// Screenshot taken at the time of failure, when capture worked
    pub artifact: Option<PathBuf>,
}

impl CapturedFailure {
    /// Drop the artifact and keep the error
    #[must_use]
    pub fn into_error(self) -> HarnessError {
        self.error
    }
}

impl std::fmt::Display for CapturedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.artifact {
            Some(path) => write!(f, "{} (screenshot: {})", self.error, path.display()),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for CapturedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// File name used for a run's failure screenshot
#[must_use]
pub fn artifact_path(dir: &Path, label: &str) -> PathBuf {
    let mut name: String = label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    name = name.trim_matches('-').to_string();
    if name.is_empty() {
        name.push_str("run");
    }
    dir.join(format!("{name}.png"))
}

/// Run `body` and screenshot the page if it fails
///
/// The screenshot is taken at most once. A failure to capture is logged and
/// never replaces the original error. A panic in `body` is captured the same
/// way and then resumed.
pub async fn capture_on_failure<T>(
    session: &mut Session,
    label: &str,
    dir: &Path,
    body: impl FnOnce(&mut Session) -> BoxFuture<'_, HarnessResult<T>>,
) -> Result<T, CapturedFailure> {
    match AssertUnwindSafe(body(session)).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => {
            session.transition(RunState::Failed);
            let artifact = capture(session, label, dir).await;
            Err(CapturedFailure { error, artifact })
        }
        Err(panic) => {
            session.transition(RunState::Failed);
            let _ = capture(session, label, dir).await;
            std::panic::resume_unwind(panic)
        }
    }
}

async fn capture(session: &mut Session, label: &str, dir: &Path) -> Option<PathBuf> {
    let path = artifact_path(dir, label);
    match session.screenshot(&path).await {
        Ok(path) => {
            tracing::info!(label, path = %path.display(), "failure screenshot captured");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(label, error = %e, "failure screenshot not captured");
            None
        }
    }
}

/// Outcome of one verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    /// Run label
    pub label: String,
    /// Whether every fatal check passed
    pub passed: bool,
    /// Failure screenshot
    pub artifact: Option<PathBuf>,
    /// Failure message
    pub detail: Option<String>,
    /// Failure classification
    pub kind: Option<ErrorKind>,
    /// Non-fatal failures recorded during the run
    pub soft_failures: Vec<SoftFailure>,
    /// States visited
    pub states: Vec<RunState>,
    /// Wall time of the run
    pub duration_ms: u64,
    /// Start time
    pub started_at: DateTime<Utc>,
}

impl VerificationResult {
    fn launch_failed(label: &str, error: &HarnessError, started_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            label: label.to_string(),
            passed: false,
            artifact: None,
            detail: Some(error.to_string()),
            kind: Some(error.kind()),
            soft_failures: Vec::new(),
            states: vec![RunState::Idle, RunState::Failed],
            duration_ms,
            started_at,
        }
    }
}

/// One labelled verification run
#[derive(Debug, Clone)]
pub struct Verification {
    label: String,
    artifacts_dir: PathBuf,
}

impl Verification {
    /// Create a run writing artifacts to `verification/`
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            artifacts_dir: PathBuf::from("verification"),
        }
    }

    /// Set the artifact directory
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Run label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Open a session, run `body`, capture on failure, close
    ///
    /// The session is closed exactly once whatever the body does. A panic in
    /// the body fails the run as an unhandled fault, and so does a route
    /// handler fault in a run that would otherwise have passed.
    pub async fn run<F>(&self, launcher: &dyn Launcher, config: SessionConfig, body: F) -> VerificationResult
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, HarnessResult<()>>,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        tracing::info!(label = %self.label, "verification started");

        let mut session = match Session::open(launcher, config).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(label = %self.label, error = %e, "session did not open");
                return VerificationResult::launch_failed(
                    &self.label,
                    &e,
                    started_at,
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let outcome = match AssertUnwindSafe(body(&mut session)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HarnessError::fault(format!(
                "verification body panicked: {}",
                panic_message(&*panic)
            ))),
        };
        let outcome = outcome.and_then(|()| match session.routes().faults().into_iter().next() {
            Some(fault) => Err(HarnessError::fault(format!(
                "mock handler for {} failed on {}: {}",
                fault.route, fault.url, fault.message
            ))),
            None => Ok(()),
        });
        let outcome = match outcome {
            Ok(()) => {
                session.transition(RunState::Verified);
                Ok(())
            }
            Err(error) => {
                session.transition(RunState::Failed);
                let artifact = capture(&mut session, &self.label, &self.artifacts_dir).await;
                Err(CapturedFailure { error, artifact })
            }
        };

        if let Err(e) = session.close().await {
            tracing::warn!(label = %self.label, error = %e, "teardown failed");
        }

        let (passed, artifact, detail, kind) = match outcome {
            Ok(()) => (true, None, None, None),
            Err(f) => (false, f.artifact, Some(f.error.to_string()), Some(f.error.kind())),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        if passed {
            tracing::info!(label = %self.label, duration_ms, "verification passed");
        } else {
            tracing::info!(label = %self.label, duration_ms, detail = detail.as_deref().unwrap_or(""), "verification failed");
        }

        VerificationResult {
            label: self.label.clone(),
            passed,
            artifact,
            detail,
            kind,
            soft_failures: session.soft_failures().to_vec(),
            states: session.history().to_vec(),
            duration_ms,
            started_at,
        }
    }
}

/// Results of several runs
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Runs that passed
    pub passed: usize,
    /// Runs that failed
    pub failed: usize,
    /// Sum of run durations
    pub duration_ms: u64,
    /// When the summary was produced
    pub generated_at: DateTime<Utc>,
    /// Per-run results in execution order
    pub results: Vec<VerificationResult>,
}

impl RunSummary {
    /// Summarize results
    #[must_use]
    pub fn new(results: Vec<VerificationResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            passed,
            failed: results.len() - passed,
            duration_ms: results.iter().map(|r| r.duration_ms).sum(),
            generated_at: Utc::now(),
            results,
        }
    }

    /// Whether every run passed
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Pretty JSON form
    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
