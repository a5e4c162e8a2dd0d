//! Mockprobe: browser verification harness with deterministic network mocks
//!
//! Drives a real page the way a user would while answering the page's
//! backend traffic from registered mock routes, then blocks on observable
//! conditions instead of fixed sleeps.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    MOCKPROBE Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Scenario / │    │  Session   │    │ Chromium   │            │
//! │   │ Rust test  │───►│  + Waiter  │───►│ (CDP)      │            │
//! │   └────────────┘    └─────┬──────┘    └─────┬──────┘            │
//! │                           │ routes          │ paused requests   │
//! │                     ┌─────▼─────────────────▼──────┐            │
//! │                     │      Route Registry          │            │
//! │                     │ first match wins → handler   │            │
//! │                     └──────────────────────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use mockprobe::scripted::{ScriptedApp, ScriptedElement, ScriptedFetch, ScriptedLauncher, ScriptedPageDef};
//! use mockprobe::{Condition, SessionConfig, Verification};
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let app = ScriptedApp::new().page(
//!     ScriptedPageDef::at("**/club")?.fetch(ScriptedFetch::get("/api/club/1").render_json(|v| {
//!         vec![ScriptedElement::new(".club-name").with_text(v["name"].as_str().unwrap_or_default())]
//!     })),
//! );
//! let launcher = ScriptedLauncher::new(app);
//! let config = SessionConfig::new().with_base_url("http://localhost:3000");
//!
//! let result = Verification::new("club")
//!     .run(&launcher, config, |s| {
//!         Box::pin(async move {
//!             let club = s.fulfill_json("**/api/club/1", &json!({"id": 1, "name": "My Club"}))?;
//!             s.navigate("/club").await?;
//!             s.wait_until(&Condition::RouteHit(club), None).await?;
//!             s.expect_text(".club-name", "My Club").await
//!         })
//!     })
//!     .await;
//! assert!(result.passed);
//! # Ok::<(), mockprobe::HarnessError>(())
//! # }).unwrap();
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
mod browser;
mod driver;
mod inject;
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod network;
mod result;
#[allow(clippy::missing_errors_doc)]
pub mod scenario;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod scripted;
mod selector;
#[allow(clippy::missing_errors_doc)]
mod session;
mod soft;
#[allow(clippy::missing_errors_doc)]
mod verify;
#[allow(clippy::missing_errors_doc)]
pub mod wait;

pub use browser::ChromiumLauncher;
pub use driver::{is_truthy, ConsoleMessage, Interception, Launcher, PageDriver};
pub use inject::InitScript;
pub use network::{
    handler_fn, AbortReason, HttpMethod, InterceptedRequest, MockHandler, MockResponse,
    PassThrough, RequestOutcome, RequestRecord, RouteAction, RouteId, RouteInfo, RoutePattern,
    RouteRegistry, UnmatchedPolicy, UrlPattern, DEFAULT_REQUEST_LOG_CAPACITY,
};
pub use result::{ErrorKind, HarnessError, HarnessResult};
pub use scenario::Scenario;
pub use selector::{IntoSelector, Selector};
pub use session::{
    with_session, AmbiguityPolicy, RunState, Session, SessionConfig, Viewport,
    DEFAULT_ELEMENT_TIMEOUT_MS, DEFAULT_NAVIGATION_TIMEOUT_MS,
};
pub use soft::{SoftFailure, SoftFailures};
pub use verify::{
    artifact_path, capture_on_failure, CapturedFailure, RunSummary, Verification,
    VerificationResult,
};
pub use wait::{Condition, WaitOptions, WaitOutcome};
