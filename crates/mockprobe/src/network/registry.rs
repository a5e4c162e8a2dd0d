//! Route registry: ordered mock routes, hit counters, and the request log.

use super::pattern::{HttpMethod, RoutePattern};
use super::response::{
    resolve, AbortReason, InterceptedRequest, MockHandler, MockResponse, PassThrough,
    RouteAction,
};
use crate::result::HarnessResult;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Request log entries kept before the oldest are dropped
pub const DEFAULT_REQUEST_LOG_CAPACITY: usize = 10_000;

/// Identifier handed out at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(u64);

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

/// What happens to a request no route claims
///
/// `Abort` applies to data requests only; documents and static assets still
/// load from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Let it reach the real network
    #[default]
    PassThrough,
    /// Fail it with a network error
    Abort,
}

/// Final verdict for one intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Answer with a synthetic response
    Fulfill(MockResponse),
    /// Let the request proceed to the network
    Continue,
    /// Fail the request
    Abort(AbortReason),
}

impl RouteDecision {
    fn outcome(&self) -> RequestOutcome {
        match self {
            Self::Fulfill(r) => RequestOutcome::Fulfilled { status: r.status },
            Self::Continue => RequestOutcome::Continued,
            Self::Abort(reason) => RequestOutcome::Aborted { reason: *reason },
        }
    }
}

/// How a logged request was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Fulfilled by a mock
    Fulfilled {
        /// Status code sent
        status: u16,
    },
    /// Sent to the network
    Continued,
    /// Failed with a network error
    Aborted {
        /// Error reported to the page
        reason: AbortReason,
    },
}

/// One entry of the request log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// The request as seen by handlers
    pub request: InterceptedRequest,
    /// Route that claimed it
    pub route: Option<RouteId>,
    /// How it was settled
    pub outcome: RequestOutcome,
    /// Status the page received: the mocked status for fulfilled requests,
    /// the backend's once its response arrives for continued ones
    pub status: Option<u16>,
    /// When it was intercepted
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A handler that panicked or produced an unusable response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFault {
    /// Route label
    pub route: String,
    /// Request URL
    pub url: String,
    /// Fault description
    pub message: String,
}

/// Snapshot of a registered route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Route identifier
    pub id: RouteId,
    /// Human-readable label
    pub label: String,
    /// Pattern source
    pub pattern: String,
    /// Method filter
    pub method: HttpMethod,
    /// Requests routed here so far
    pub hits: usize,
}

struct RouteEntry {
    id: RouteId,
    label: String,
    pattern: RoutePattern,
    handler: Arc<dyn MockHandler>,
    hits: AtomicUsize,
}

impl RouteEntry {
    fn info(&self) -> RouteInfo {
        RouteInfo {
            id: self.id,
            label: self.label.clone(),
            pattern: self.pattern.url.to_string(),
            method: self.pattern.method,
            hits: self.hits.load(Ordering::SeqCst),
        }
    }
}

/// Ordered set of mock routes shared between the session and the browser's
/// interception path
///
/// The first route, in registration order, whose pattern matches a request
/// claims it. An observe route (one that continues) therefore shadows later
/// routes with overlapping patterns.
///
/// The request log keeps the most recent [`DEFAULT_REQUEST_LOG_CAPACITY`]
/// entries unless configured otherwise; hit counters are never trimmed.
pub struct RouteRegistry {
    routes: RwLock<Vec<Arc<RouteEntry>>>,
    next_id: AtomicU64,
    unmatched: RwLock<UnmatchedPolicy>,
    log: Mutex<VecDeque<RequestRecord>>,
    log_capacity: usize,
    evicted: AtomicUsize,
    faults: Mutex<Vec<HandlerFault>>,
    hit_signal: Notify,
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.routes())
            .field("unmatched", &self.unmatched_policy())
            .finish_non_exhaustive()
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new(UnmatchedPolicy::default())
    }
}

impl RouteRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(unmatched: UnmatchedPolicy) -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            unmatched: RwLock::new(unmatched),
            log: Mutex::new(VecDeque::new()),
            log_capacity: DEFAULT_REQUEST_LOG_CAPACITY,
            evicted: AtomicUsize::new(0),
            faults: Mutex::new(Vec::new()),
            hit_signal: Notify::new(),
        }
    }

    /// Keep at most `capacity` request log entries, dropping the oldest
    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// Policy for requests no route claims
    #[must_use]
    pub fn unmatched_policy(&self) -> UnmatchedPolicy {
        *self.unmatched.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the policy for requests no route claims
    pub fn set_unmatched_policy(&self, policy: UnmatchedPolicy) {
        *self.unmatched.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Register a route; it applies to every request intercepted afterwards
    pub fn register(
        &self,
        label: impl Into<String>,
        pattern: RoutePattern,
        handler: impl MockHandler + 'static,
    ) -> RouteId {
        let id = RouteId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let label = label.into();
        tracing::debug!(%id, %label, %pattern, "route registered");
        let entry = Arc::new(RouteEntry {
            id,
            label,
            pattern,
            handler: Arc::new(handler),
            hits: AtomicUsize::new(0),
        });
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        id
    }

    /// Register a handler for a glob pattern, any method
    pub fn route(&self, glob: &str, handler: impl MockHandler + 'static) -> HarnessResult<RouteId> {
        Ok(self.register(glob, RoutePattern::glob(glob)?, handler))
    }

    /// Answer a glob pattern with a fixed JSON body
    pub fn fulfill_json<T: Serialize + ?Sized>(
        &self,
        glob: &str,
        data: &T,
    ) -> HarnessResult<RouteId> {
        self.route(glob, MockResponse::json(data)?)
    }

    /// Fail every request matching a glob pattern
    pub fn abort(&self, glob: &str) -> HarnessResult<RouteId> {
        self.route(glob, AbortReason::Aborted)
    }

    /// Count requests matching a glob pattern and let them through
    pub fn observe(&self, glob: &str) -> HarnessResult<RouteId> {
        self.route(glob, PassThrough)
    }

    /// Decide the outcome of an intercepted request
    ///
    /// Runs the handler of the first matching route, counts the hit, logs the
    /// request, and wakes any waiter watching route hits.
    pub fn dispatch(&self, request: &InterceptedRequest) -> RouteDecision {
        let entry = self.find(&request.url, &request.method);

        let (route, decision) = match entry {
            Some(entry) => {
                let resolution = resolve(entry.handler.as_ref(), request);
                if let Some(message) = resolution.fault {
                    tracing::warn!(route = %entry.label, url = %request.url, %message, "mock handler fault");
                    self.faults
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(HandlerFault {
                            route: entry.label.clone(),
                            url: request.url.clone(),
                            message,
                        });
                }
                let decision = match resolution.action {
                    RouteAction::Respond(response) => RouteDecision::Fulfill(response),
                    RouteAction::Abort(reason) => RouteDecision::Abort(reason),
                    RouteAction::Continue => RouteDecision::Continue,
                };
                entry.hits.fetch_add(1, Ordering::SeqCst);
                (Some(entry.id), decision)
            }
            None => match self.unmatched_policy() {
                UnmatchedPolicy::Abort if request.kind.is_data() => {
                    (None, RouteDecision::Abort(AbortReason::BlockedByClient))
                }
                _ => (None, RouteDecision::Continue),
            },
        };

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            route = ?route,
            outcome = ?decision.outcome(),
            "request intercepted"
        );

        let status = match &decision {
            RouteDecision::Fulfill(response) => Some(response.status),
            RouteDecision::Continue | RouteDecision::Abort(_) => None,
        };
        {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            if log.len() >= self.log_capacity {
                log.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            log.push_back(RequestRecord {
                request: request.clone(),
                route,
                outcome: decision.outcome(),
                status,
                at: chrono::Utc::now(),
            });
        }

        if route.is_some() {
            self.hit_signal.notify_waiters();
        }
        decision
    }

    fn find(&self, url: &str, method: &HttpMethod) -> Option<Arc<RouteEntry>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.pattern.matches(url, method))
            .cloned()
    }

    /// Route that would claim a request, without dispatching it
    #[must_use]
    pub fn matching_route(&self, url: &str, method: &HttpMethod) -> Option<RouteInfo> {
        self.find(url, method).map(|e| e.info())
    }

    /// Hit count of a route; zero for unknown ids
    #[must_use]
    pub fn hits(&self, id: RouteId) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.id == id)
            .map_or(0, |e| e.hits.load(Ordering::SeqCst))
    }

    /// Label of a route
    #[must_use]
    pub fn label(&self, id: RouteId) -> Option<String> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.label.clone())
    }

    /// Id of the first route with a label
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<RouteId> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.id)
    }

    /// Snapshot of all routes in registration order
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.info())
            .collect()
    }

    /// Requests intercepted so far, oldest first, within the log capacity
    #[must_use]
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Log entries dropped to stay within the capacity
    #[must_use]
    pub fn evicted_requests(&self) -> usize {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Attach the backend's status to the latest continued request for `url`
    ///
    /// Returns false when no continued request is waiting for one.
    pub fn record_response(&self, url: &str, status: u16) -> bool {
        let recorded = {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            log.iter_mut()
                .rev()
                .find(|r| {
                    r.outcome == RequestOutcome::Continued
                        && r.status.is_none()
                        && r.request.url == url
                })
                .map(|r| {
                    r.status = Some(status);
                    r.route.is_some()
                })
        };
        match recorded {
            Some(routed) => {
                tracing::debug!(url, status, "response recorded");
                if routed {
                    self.hit_signal.notify_waiters();
                }
                true
            }
            None => false,
        }
    }

    /// Status of the latest answered request claimed by a route
    #[must_use]
    pub fn last_status(&self, id: RouteId) -> Option<u16> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .filter(|r| r.route == Some(id))
            .find_map(|r| r.status)
    }

    /// Handler faults recorded so far
    #[must_use]
    pub fn faults(&self) -> Vec<HandlerFault> {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Future resolved on the next route hit
    ///
    /// Create it (and enable it) before checking hit counts so that a hit
    /// landing in between is not lost.
    pub fn hit_notified(&self) -> Notified<'_> {
        self.hit_signal.notified()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::network::response::{handler_fn, ResourceKind};
    use serde_json::json;

    fn get(url: &str) -> InterceptedRequest {
        InterceptedRequest::new(HttpMethod::Get, url)
    }

    mod dispatch_tests {
        use super::*;

        #[test]
        fn test_fulfill_json() {
            let reg = RouteRegistry::default();
            let id = reg
                .fulfill_json("**/api/club/1", &json!({"id": 1, "name": "Test Club"}))
                .unwrap();
            let decision = reg.dispatch(&get("http://localhost:3000/api/club/1"));
            match decision {
                RouteDecision::Fulfill(r) => assert!(r.body_string().contains("Test Club")),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(reg.hits(id), 1);
        }

        #[test]
        fn test_first_registered_wins() {
            let reg = RouteRegistry::default();
            let first = reg
                .fulfill_json("**/api/admin/users/dashboard", &json!({"totalUsers": 10}))
                .unwrap();
            let broad = reg.fulfill_json("**/api/admin/**", &json!({})).unwrap();
            reg.dispatch(&get("http://h/api/admin/users/dashboard"));
            assert_eq!(reg.hits(first), 1);
            assert_eq!(reg.hits(broad), 0);
        }

        #[test]
        fn test_unmatched_pass_through() {
            let reg = RouteRegistry::default();
            assert_eq!(reg.dispatch(&get("http://h/app.js")), RouteDecision::Continue);
            assert_eq!(reg.requests().len(), 1);
            assert_eq!(reg.requests()[0].route, None);
        }

        #[test]
        fn test_unmatched_abort() {
            let reg = RouteRegistry::new(UnmatchedPolicy::Abort);
            assert!(matches!(
                reg.dispatch(&get("http://h/api/unknown")),
                RouteDecision::Abort(_)
            ));
        }

        #[test]
        fn test_unmatched_abort_spares_documents() {
            let reg = RouteRegistry::new(UnmatchedPolicy::Abort);
            let doc = get("http://h/users").with_kind(ResourceKind::Document);
            assert_eq!(reg.dispatch(&doc), RouteDecision::Continue);
            let asset = get("http://h/main.js").with_kind(ResourceKind::Asset);
            assert_eq!(reg.dispatch(&asset), RouteDecision::Continue);
        }

        #[test]
        fn test_abort_route() {
            let reg = RouteRegistry::default();
            let id = reg.abort("**/ws/**").unwrap();
            assert_eq!(
                reg.dispatch(&get("ws://localhost:3000/ws/websocket")),
                RouteDecision::Abort(AbortReason::Aborted)
            );
            assert_eq!(reg.hits(id), 1);
        }

        #[test]
        fn test_observe_counts_and_continues() {
            let reg = RouteRegistry::default();
            let id = reg.observe("**/api/user/register").unwrap();
            let req = InterceptedRequest::new(HttpMethod::Post, "http://h/api/user/register");
            assert_eq!(reg.dispatch(&req), RouteDecision::Continue);
            assert_eq!(reg.hits(id), 1);
        }

        #[test]
        fn test_method_filter() {
            let reg = RouteRegistry::default();
            let id = reg.register(
                "register",
                RoutePattern::glob("**/api/user/register")
                    .unwrap()
                    .with_method(HttpMethod::Post),
                MockResponse::json(&json!({"ok": true})).unwrap(),
            );
            reg.dispatch(&get("http://h/api/user/register"));
            assert_eq!(reg.hits(id), 0);
        }

        #[test]
        fn test_handler_fault_recorded() {
            let reg = RouteRegistry::default();
            let id = reg
                .route(
                    "**/api/broken",
                    handler_fn(|_: &InterceptedRequest| -> RouteAction { panic!("handler bug") }),
                )
                .unwrap();
            let decision = reg.dispatch(&get("http://h/api/broken"));
            assert!(matches!(decision, RouteDecision::Fulfill(ref r) if r.status == 500));
            assert_eq!(reg.hits(id), 1);
            let faults = reg.faults();
            assert_eq!(faults.len(), 1);
            assert!(faults[0].message.contains("handler bug"));
        }

        #[test]
        fn test_dynamic_handler_sees_query() {
            let reg = RouteRegistry::default();
            reg.route(
                "**/api/admin/users?*",
                handler_fn(|req: &InterceptedRequest| {
                    let page = req.query_param("page").unwrap_or_default();
                    MockResponse::json(&json!({ "page": page }))
                        .map_or(RouteAction::Continue, RouteAction::Respond)
                }),
            )
            .unwrap();
            match reg.dispatch(&get("http://h/api/admin/users?page=3&size=20")) {
                RouteDecision::Fulfill(r) => assert_eq!(r.body_string(), r#"{"page":"3"}"#),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    mod introspection_tests {
        use super::*;

        #[test]
        fn test_labels_and_lookup() {
            let reg = RouteRegistry::default();
            let id = reg
                .register(
                    "injuries",
                    RoutePattern::glob("**/api/injuries/team/1").unwrap(),
                    MockResponse::json(&json!([])).unwrap(),
                );
            assert_eq!(reg.label(id).as_deref(), Some("injuries"));
            assert_eq!(reg.find_by_label("injuries"), Some(id));
            assert_eq!(reg.routes().len(), 1);
        }

        #[test]
        fn test_matching_route_does_not_count() {
            let reg = RouteRegistry::default();
            let id = reg.abort("**/ws/**").unwrap();
            let info = reg
                .matching_route("http://h/ws/x", &HttpMethod::Get)
                .unwrap();
            assert_eq!(info.id, id);
            assert_eq!(reg.hits(id), 0);
        }

        #[test]
        fn test_route_id_display() {
            let reg = RouteRegistry::default();
            let id = reg.abort("**/x").unwrap();
            assert!(id.to_string().starts_with("route#"));
        }

        #[test]
        fn test_invalid_pattern_rejected() {
            let reg = RouteRegistry::default();
            assert!(reg.abort("").is_err());
            assert!(reg.routes().is_empty());
        }
    }

    mod log_tests {
        use super::*;

        #[test]
        fn test_log_keeps_most_recent() {
            let reg = RouteRegistry::default().with_log_capacity(3);
            let id = reg.observe("**/api/poll*").unwrap();
            for i in 0..5 {
                reg.dispatch(&get(&format!("http://h/api/poll?n={i}")));
            }
            let urls: Vec<String> = reg.requests().into_iter().map(|r| r.request.url).collect();
            assert_eq!(urls, ["http://h/api/poll?n=2", "http://h/api/poll?n=3", "http://h/api/poll?n=4"]);
            assert_eq!(reg.evicted_requests(), 2);
            assert_eq!(reg.hits(id), 5);
        }

        #[test]
        fn test_fulfilled_status_logged() {
            let reg = RouteRegistry::default();
            let id = reg
                .route("**/api/user/register", MockResponse::json(&json!({})).unwrap().with_status(201))
                .unwrap();
            reg.dispatch(&InterceptedRequest::new(HttpMethod::Post, "http://h/api/user/register"));
            assert_eq!(reg.requests()[0].status, Some(201));
            assert_eq!(reg.last_status(id), Some(201));
        }

        #[test]
        fn test_continued_status_recorded_later() {
            let reg = RouteRegistry::default();
            let id = reg.observe("**/api/user/register").unwrap();
            reg.dispatch(&InterceptedRequest::new(HttpMethod::Post, "http://h/api/user/register"));
            assert_eq!(reg.last_status(id), None);

            assert!(reg.record_response("http://h/api/user/register", 409));
            assert_eq!(reg.last_status(id), Some(409));
            // already answered
            assert!(!reg.record_response("http://h/api/user/register", 200));
            assert!(!reg.record_response("http://h/unknown", 200));
        }

        #[test]
        fn test_aborted_request_has_no_status() {
            let reg = RouteRegistry::default();
            let id = reg.abort("**/ws/**").unwrap();
            reg.dispatch(&get("http://h/ws/info"));
            assert_eq!(reg.requests()[0].status, None);
            assert!(!reg.record_response("http://h/ws/info", 200));
            assert_eq!(reg.last_status(id), None);
        }
    }

    mod notify_tests {
        use super::*;

        #[tokio::test]
        async fn test_hit_wakes_waiter() {
            let reg = Arc::new(RouteRegistry::default());
            let id = reg.observe("**/api/ping").unwrap();
            let notified = reg.hit_notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let r2 = Arc::clone(&reg);
            tokio::spawn(async move {
                r2.dispatch(&get("http://h/api/ping"));
            });
            notified.await;
            assert_eq!(reg.hits(id), 1);
        }
    }
}
