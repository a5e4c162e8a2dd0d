//! Intercepted requests, mock responses, and handler resolution.

use super::pattern::HttpMethod;
use crate::result::HarnessResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Network failure reported to the page for an aborted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Request failed
    Failed,
    /// Request was aborted
    #[default]
    Aborted,
    /// Request timed out
    TimedOut,
    /// Access was denied
    AccessDenied,
    /// Connection was refused
    ConnectionRefused,
    /// Connection was reset
    ConnectionReset,
    /// Internet is disconnected
    InternetDisconnected,
    /// Request was blocked by client
    BlockedByClient,
}

impl AbortReason {
    /// Network error string the page observes
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Failed => "net::ERR_FAILED",
            Self::Aborted => "net::ERR_ABORTED",
            Self::TimedOut => "net::ERR_TIMED_OUT",
            Self::AccessDenied => "net::ERR_ACCESS_DENIED",
            Self::ConnectionRefused => "net::ERR_CONNECTION_REFUSED",
            Self::ConnectionReset => "net::ERR_CONNECTION_RESET",
            Self::InternetDisconnected => "net::ERR_INTERNET_DISCONNECTED",
            Self::BlockedByClient => "net::ERR_BLOCKED_BY_CLIENT",
        }
    }
}

/// Synthetic response delivered to the page in place of the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: BTreeMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
    /// Content type
    pub content_type: String,
    /// Artificial delay before fulfilment, in milliseconds
    pub delay_ms: u64,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Vec::new(),
            content_type: "application/json".to_string(),
            delay_ms: 0,
        }
    }
}

impl MockResponse {
    /// Create an empty 200 response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON response from any serializable value
    pub fn json<T: Serialize + ?Sized>(data: &T) -> HarnessResult<Self> {
        Ok(Self {
            body: serde_json::to_vec(data)?,
            ..Self::default()
        })
    }

    /// Create a JSON response from pre-encoded text, unchecked
    #[must_use]
    pub fn raw_json(body: &str) -> Self {
        Self {
            body: body.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self {
            body: content.as_bytes().to_vec(),
            content_type: "text/plain".to_string(),
            ..Self::default()
        }
    }

    /// Create a JSON error response
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }).to_string().into_bytes(),
            ..Self::default()
        }
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Set content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// Set delay
    #[must_use]
    pub const fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Get body as string
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Whether the content type declares a JSON payload
    #[must_use]
    pub fn is_json(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.starts_with("application/json") || ct.contains("+json")
    }

    /// All headers to send, content type included
    #[must_use]
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("Content-Type".to_string(), self.content_type.clone())];
        pairs.extend(
            self.headers
                .iter()
                .filter(|(k, _)| !k.eq_ignore_ascii_case("content-type"))
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        pairs
    }
}

/// What kind of resource a request loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Top-level or frame document
    Document,
    /// Script, stylesheet, image, font, media
    Asset,
    /// XMLHttpRequest
    Xhr,
    /// `fetch()` call
    #[default]
    Fetch,
    /// WebSocket handshake
    WebSocket,
    /// Event stream
    EventSource,
    /// Anything else
    Other,
}

impl ResourceKind {
    /// Map a CDP resource type name
    #[must_use]
    pub fn from_cdp(name: &str) -> Self {
        match name {
            "Document" => Self::Document,
            "Stylesheet" | "Image" | "Media" | "Font" | "Script" | "TextTrack" | "Manifest" => {
                Self::Asset
            }
            "XHR" => Self::Xhr,
            "Fetch" => Self::Fetch,
            "WebSocket" => Self::WebSocket,
            "EventSource" => Self::EventSource,
            _ => Self::Other,
        }
    }

    /// Data traffic the abort-unmatched policy applies to
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(
            self,
            Self::Xhr | Self::Fetch | Self::WebSocket | Self::EventSource | Self::Other
        )
    }
}

/// Read-only view of a request the page issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    /// Full request URL
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Resource kind
    #[serde(default)]
    pub kind: ResourceKind,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// Request body, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

impl InterceptedRequest {
    /// Create a request view
    #[must_use]
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            url: url.to_string(),
            method,
            kind: ResourceKind::default(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Set the resource kind
    #[must_use]
    pub const fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of a query parameter
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Non-empty path segments
    #[must_use]
    pub fn path_segments(&self) -> Vec<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .map(|s| s.filter(|p| !p.is_empty()).map(String::from).collect())
            })
            .unwrap_or_default()
    }

    /// Last non-empty path segment
    #[must_use]
    pub fn last_segment(&self) -> Option<String> {
        self.path_segments().pop()
    }

    /// Get body as string
    #[must_use]
    pub fn body_string(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).to_string())
    }

    /// Parse body as JSON
    pub fn body_json<T: for<'de> Deserialize<'de>>(&self) -> HarnessResult<T> {
        let body = self.body.as_deref().unwrap_or(b"null");
        Ok(serde_json::from_slice(body)?)
    }
}

/// What a handler wants done with a request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteAction {
    /// Fulfill with a synthetic response
    Respond(MockResponse),
    /// Fail the request with a network error
    Abort(AbortReason),
    /// Let the request reach the real network
    #[default]
    Continue,
}

impl From<MockResponse> for RouteAction {
    fn from(response: MockResponse) -> Self {
        Self::Respond(response)
    }
}

/// Computes the outcome for a matched request
///
/// Handlers run on the interception path and must not block. They receive a
/// read-only view of the request and cannot touch the registry.
pub trait MockHandler: Send + Sync {
    /// Decide what to do with the request
    fn handle(&self, request: &InterceptedRequest) -> RouteAction;
}

impl MockHandler for MockResponse {
    fn handle(&self, _request: &InterceptedRequest) -> RouteAction {
        RouteAction::Respond(self.clone())
    }
}

impl MockHandler for AbortReason {
    fn handle(&self, _request: &InterceptedRequest) -> RouteAction {
        RouteAction::Abort(*self)
    }
}

/// Handler that lets every request through; used to count traffic
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl MockHandler for PassThrough {
    fn handle(&self, _request: &InterceptedRequest) -> RouteAction {
        RouteAction::Continue
    }
}

/// Handler backed by a closure
pub struct FnHandler<F>(F);

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}

impl<F> MockHandler for FnHandler<F>
where
    F: Fn(&InterceptedRequest) -> RouteAction + Send + Sync,
{
    fn handle(&self, request: &InterceptedRequest) -> RouteAction {
        (self.0)(request)
    }
}

/// Wrap a closure as a handler
#[must_use]
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&InterceptedRequest) -> RouteAction + Send + Sync,
{
    FnHandler(f)
}

/// Outcome of running a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Action to apply
    pub action: RouteAction,
    /// Handler fault, when the handler misbehaved
    pub fault: Option<String>,
}

/// Run a handler, turning panics and malformed JSON bodies into a 500 reply
#[must_use]
pub fn resolve(handler: &dyn MockHandler, request: &InterceptedRequest) -> Resolution {
    let action = match catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
        Ok(action) => action,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            return faulted(format!("handler panicked: {message}"));
        }
    };

    if let RouteAction::Respond(response) = &action {
        if response.is_json() && !response.body.is_empty() {
            if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&response.body) {
                return faulted(format!("handler returned invalid JSON: {e}"));
            }
        }
    }

    Resolution {
        action,
        fault: None,
    }
}

fn faulted(message: String) -> Resolution {
    Resolution {
        action: RouteAction::Respond(MockResponse::error(500, "mock handler fault")),
        fault: Some(message),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    mod mock_response_tests {
        use super::*;

        #[test]
        fn test_json() {
            let r = MockResponse::json(&json!({"id": 1})).unwrap();
            assert_eq!(r.status, 200);
            assert_eq!(r.content_type, "application/json");
            assert_eq!(r.body_string(), r#"{"id":1}"#);
        }

        #[test]
        fn test_error() {
            let r = MockResponse::error(404, "missing");
            assert_eq!(r.status, 404);
            assert!(r.body_string().contains("missing"));
        }

        #[test]
        fn test_builders() {
            let r = MockResponse::text("ok")
                .with_status(201)
                .with_header("X-Trace", "1")
                .with_delay(50);
            assert_eq!(r.status, 201);
            assert_eq!(r.content_type, "text/plain");
            assert_eq!(r.delay_ms, 50);
            assert_eq!(r.headers.get("X-Trace"), Some(&"1".to_string()));
        }

        #[test]
        fn test_is_json() {
            assert!(MockResponse::new().is_json());
            assert!(MockResponse::new()
                .with_content_type("application/problem+json")
                .is_json());
            assert!(!MockResponse::text("x").is_json());
        }

        #[test]
        fn test_header_pairs_content_type_once() {
            let r = MockResponse::new().with_header("content-type", "text/html");
            let pairs = r.header_pairs();
            assert_eq!(pairs.len(), 1);
            assert_eq!(pairs[0].1, "application/json");
        }
    }

    mod intercepted_request_tests {
        use super::*;

        #[test]
        fn test_query_param() {
            let r = InterceptedRequest::new(
                HttpMethod::Get,
                "http://localhost:3000/api/admin/users?page=2&size=20",
            );
            assert_eq!(r.query_param("page"), Some("2".to_string()));
            assert_eq!(r.query_param("missing"), None);
        }

        #[test]
        fn test_path_segments() {
            let r = InterceptedRequest::new(
                HttpMethod::Get,
                "http://localhost:3000/api/player-history/player/7/",
            );
            assert_eq!(
                r.path_segments(),
                vec!["api", "player-history", "player", "7"]
            );
            assert_eq!(r.last_segment(), Some("7".to_string()));
        }

        #[test]
        fn test_resource_kind() {
            assert_eq!(ResourceKind::from_cdp("XHR"), ResourceKind::Xhr);
            assert_eq!(ResourceKind::from_cdp("Script"), ResourceKind::Asset);
            assert!(ResourceKind::WebSocket.is_data());
            assert!(!ResourceKind::Document.is_data());
            assert!(!ResourceKind::Asset.is_data());
        }

        #[test]
        fn test_body_json() {
            let r = InterceptedRequest::new(HttpMethod::Post, "http://h/api/user/register")
                .with_body(r#"{"username":"newuser"}"#);
            let v: serde_json::Value = r.body_json().unwrap();
            assert_eq!(v["username"], "newuser");
        }
    }

    mod resolve_tests {
        use super::*;

        fn request() -> InterceptedRequest {
            InterceptedRequest::new(HttpMethod::Get, "http://h/api/club/1")
        }

        #[test]
        fn test_static_response() {
            let handler = MockResponse::json(&json!({"name": "Test Club"})).unwrap();
            let res = resolve(&handler, &request());
            assert!(res.fault.is_none());
            assert!(matches!(res.action, RouteAction::Respond(ref r) if r.status == 200));
        }

        #[test]
        fn test_abort_handler() {
            let res = resolve(&AbortReason::Aborted, &request());
            assert_eq!(res.action, RouteAction::Abort(AbortReason::Aborted));
        }

        #[test]
        fn test_closure_reads_request() {
            let handler = handler_fn(|req: &InterceptedRequest| {
                MockResponse::text(&req.last_segment().unwrap_or_default()).into()
            });
            let res = resolve(&handler, &request());
            match res.action {
                RouteAction::Respond(r) => assert_eq!(r.body_string(), "1"),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_panic_becomes_500() {
            let handler = handler_fn(|_: &InterceptedRequest| -> RouteAction {
                panic!("boom");
            });
            let res = resolve(&handler, &request());
            assert!(res.fault.as_deref().unwrap().contains("boom"));
            match res.action {
                RouteAction::Respond(r) => assert_eq!(r.status, 500),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_invalid_json_becomes_500() {
            let handler = MockResponse::raw_json("{not json");
            let res = resolve(&handler, &request());
            assert!(res.fault.is_some());
            assert!(matches!(res.action, RouteAction::Respond(ref r) if r.status == 500));
        }

        #[test]
        fn test_text_body_not_validated() {
            let res = resolve(&MockResponse::text("{not json"), &request());
            assert!(res.fault.is_none());
        }
    }
}
