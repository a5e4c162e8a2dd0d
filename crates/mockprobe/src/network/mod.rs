//! Network interception: route patterns, mock handlers, and the registry the
//! browser consults for every request the page issues.
//!
//! ```
//! use mockprobe::network::{HttpMethod, InterceptedRequest, RouteDecision, RouteRegistry};
//! use serde_json::json;
//!
//! let registry = RouteRegistry::default();
//! let club = registry.fulfill_json("**/api/club/1", &json!({"id": 1})).unwrap();
//! registry.abort("**/ws/**").unwrap();
//!
//! let req = InterceptedRequest::new(HttpMethod::Get, "http://localhost:3000/api/club/1");
//! assert!(matches!(registry.dispatch(&req), RouteDecision::Fulfill(_)));
//! assert_eq!(registry.hits(club), 1);
//! ```

mod activity;
mod pattern;
mod registry;
mod response;

pub use activity::{NetworkTracker, NETWORK_IDLE_THRESHOLD_MS};
pub use pattern::{HttpMethod, RoutePattern, UrlPattern};
pub use registry::{
    HandlerFault, DEFAULT_REQUEST_LOG_CAPACITY, RequestOutcome, RequestRecord, RouteDecision, RouteId, RouteInfo,
    RouteRegistry, UnmatchedPolicy,
};
pub(crate) use response::panic_message;
pub use response::{
    handler_fn, resolve, AbortReason, FnHandler, InterceptedRequest, MockHandler, MockResponse,
    PassThrough, Resolution, ResourceKind, RouteAction,
};
