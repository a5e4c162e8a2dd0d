//! Scenario YAML schema types.

use crate::network::{AbortReason, HttpMethod, RoutePattern, UnmatchedPolicy};
use crate::result::{HarnessError, HarnessResult};
use crate::selector::Selector;
use crate::session::{AmbiguityPolicy, Viewport};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Supported scenario schema version
pub const SCENARIO_VERSION: &str = "1.0";

/// Root scenario document
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Schema version (must be "1.0")
    pub version: String,
    /// Scenario name, used as the run label
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Base for relative navigation targets
    #[serde(default)]
    pub base_url: Option<String>,
    /// Session options
    #[serde(default)]
    pub session: SessionSection,
    /// Pre-navigation scripts
    #[serde(default, deserialize_with = "serde_yaml_ng::with::singleton_map_recursive::deserialize")]
    pub init_scripts: Vec<InitScriptSpec>,
    /// Mock routes in registration order
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    /// Steps executed in order
    #[serde(default, deserialize_with = "serde_yaml_ng::with::singleton_map_recursive::deserialize")]
    pub steps: Vec<Step>,
}

/// `session:` block; unset fields keep the session defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    /// Run without a window
    #[serde(default)]
    pub headless: Option<bool>,
    /// Viewport size
    #[serde(default)]
    pub viewport: Option<Viewport>,
    /// Unmatched-request policy
    #[serde(default)]
    pub unmatched: Option<UnmatchedPolicy>,
    /// Selector ambiguity policy
    #[serde(default)]
    pub ambiguity: Option<AmbiguityPolicy>,
    /// Navigation timeout in milliseconds
    #[serde(default)]
    pub navigation_timeout_ms: Option<u64>,
    /// Element resolution timeout in milliseconds
    #[serde(default)]
    pub element_timeout_ms: Option<u64>,
    /// Default wait timeout in milliseconds
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

/// One pre-navigation script
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitScriptSpec {
    /// Seed a `localStorage` entry
    LocalStorage {
        /// Storage key
        key: String,
        /// Value, stored JSON-encoded
        value: serde_json::Value,
    },
    /// Seed a `sessionStorage` entry
    SessionStorage {
        /// Storage key
        key: String,
        /// Value, stored JSON-encoded
        value: serde_json::Value,
    },
    /// Hide elements matching a CSS selector
    HideSelectors(String),
    /// Raw script source
    Script(String),
}

/// One mock route
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    /// Name referenced by `wait: { route: ... }`
    #[serde(default)]
    pub id: Option<String>,
    /// URL glob
    pub pattern: String,
    /// Method filter
    #[serde(default)]
    pub method: HttpMethod,
    /// Status code for `json`/`body` replies
    #[serde(default)]
    pub status: Option<u16>,
    /// JSON reply body
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    /// Text reply body
    #[serde(default)]
    pub body: Option<String>,
    /// Content type override
    #[serde(default)]
    pub content_type: Option<String>,
    /// Extra reply headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Artificial delay in milliseconds
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Fail matching requests
    #[serde(default)]
    pub abort: bool,
    /// Network error used by `abort`
    #[serde(default)]
    pub reason: Option<AbortReason>,
    /// Count matching requests and let them through
    #[serde(default)]
    pub observe: bool,
}

impl RouteSpec {
    /// Label shown in logs and reports
    #[must_use]
    pub fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.pattern.clone())
    }

    /// Compiled route pattern
    pub fn route_pattern(&self) -> HarnessResult<RoutePattern> {
        Ok(RoutePattern::glob(&self.pattern)?.with_method(self.method))
    }

    fn response_kinds(&self) -> usize {
        [self.json.is_some(), self.body.is_some(), self.abort, self.observe]
            .iter()
            .filter(|k| **k)
            .count()
    }
}

/// One scenario step
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Load a URL
    Navigate {
        /// Absolute URL or path relative to the base URL
        url: String,
        /// Override of the navigation timeout
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// Block on a condition
    Wait(WaitStep),
    /// Replace an input value
    Fill {
        /// Target
        selector: String,
        /// New value
        value: String,
    },
    /// Click an element
    Click {
        /// Target
        selector: String,
    },
    /// Choose a `<select>` option
    Select {
        /// Target
        selector: String,
        /// Option value
        value: String,
    },
    /// Assert trimmed text
    ExpectText {
        /// Target
        selector: String,
        /// Expected text
        equals: String,
    },
    /// Assert visibility
    ExpectVisible {
        /// Target
        selector: String,
    },
    /// Assert a minimum match count
    ExpectCount {
        /// Target
        selector: String,
        /// Minimum number of matches
        at_least: usize,
    },
    /// Assert an attribute value
    ExpectAttribute {
        /// Target
        selector: String,
        /// Attribute name
        name: String,
        /// Expected value
        equals: String,
    },
    /// Assert the status of the latest response to a route's requests
    ExpectStatus {
        /// Route id
        route: String,
        /// Expected HTTP status
        status: u16,
    },
    /// Save a full-page screenshot
    Screenshot {
        /// Output file
        path: String,
    },
}

impl Step {
    /// Short step name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Wait(_) => "wait",
            Self::Fill { .. } => "fill",
            Self::Click { .. } => "click",
            Self::Select { .. } => "select",
            Self::ExpectText { .. } => "expect_text",
            Self::ExpectVisible { .. } => "expect_visible",
            Self::ExpectCount { .. } => "expect_count",
            Self::ExpectAttribute { .. } => "expect_attribute",
            Self::ExpectStatus { .. } => "expect_status",
            Self::Screenshot { .. } => "screenshot",
        }
    }

    fn selector(&self) -> Option<&str> {
        match self {
            Self::Fill { selector, .. }
            | Self::Click { selector }
            | Self::Select { selector, .. }
            | Self::ExpectText { selector, .. }
            | Self::ExpectVisible { selector }
            | Self::ExpectCount { selector, .. }
            | Self::ExpectAttribute { selector, .. } => Some(selector),
            Self::Wait(w) => w.visible.as_deref().or(w.hidden.as_deref()),
            Self::Navigate { .. } | Self::ExpectStatus { .. } | Self::Screenshot { .. } => None,
        }
    }
}

/// `wait:` step; exactly one condition field is set
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitStep {
    /// Selector that must become visible
    #[serde(default)]
    pub visible: Option<String>,
    /// Selector that must become hidden or absent
    #[serde(default)]
    pub hidden: Option<String>,
    /// URL glob the page must reach
    #[serde(default)]
    pub url: Option<String>,
    /// Route id that must receive a request
    #[serde(default)]
    pub route: Option<String>,
    /// Quiet window in milliseconds with no request in flight
    #[serde(default)]
    pub network_idle: Option<u64>,
    /// Page expression that must become truthy
    #[serde(default)]
    pub script: Option<String>,
    /// Timeout override
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Record a timeout instead of failing the run
    #[serde(default)]
    pub soft: bool,
}

impl WaitStep {
    fn conditions(&self) -> usize {
        [
            self.visible.is_some(),
            self.hidden.is_some(),
            self.url.is_some(),
            self.route.is_some(),
            self.network_idle.is_some(),
            self.script.is_some(),
        ]
        .iter()
        .filter(|c| **c)
        .count()
    }
}

impl Scenario {
    /// Parse and validate a scenario from YAML
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Self = serde_yaml_ng::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Read, parse and validate a scenario file
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::scenario(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&yaml).map_err(|e| match e {
            HarnessError::Scenario { message } => {
                HarnessError::scenario(format!("{}: {message}", path.display()))
            }
            HarnessError::Yaml(e) => HarnessError::scenario(format!("{}: {e}", path.display())),
            other => other,
        })
    }

    /// Every problem in the document, in document order
    #[must_use]
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.version != SCENARIO_VERSION {
            issues.push(format!(
                "unsupported version '{}', expected '{SCENARIO_VERSION}'",
                self.version
            ));
        }
        if self.name.trim().is_empty() {
            issues.push("name must not be empty".to_string());
        }

        let mut ids = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            let at = format!("routes[{i}]");
            if let Some(id) = &route.id {
                if !ids.insert(id.as_str()) {
                    issues.push(format!("{at}: duplicate route id '{id}'"));
                }
            }
            if let Err(e) = route.route_pattern() {
                issues.push(format!("{at}: {e}"));
            }
            match route.response_kinds() {
                1 => {}
                0 => issues.push(format!(
                    "{at}: needs one of json, body, abort or observe"
                )),
                _ => issues.push(format!(
                    "{at}: json, body, abort and observe are mutually exclusive"
                )),
            }
            if (route.abort || route.observe) && route.status.is_some() {
                issues.push(format!("{at}: status only applies to json or body replies"));
            }
            if route.reason.is_some() && !route.abort {
                issues.push(format!("{at}: reason requires abort: true"));
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            let at = format!("steps[{i}] ({})", step.name());
            if let Some(selector) = step.selector() {
                if let Err(e) = Selector::parse(selector) {
                    issues.push(format!("{at}: {e}"));
                }
            }
            match step {
                Step::Navigate { url, .. } if url.trim().is_empty() => {
                    issues.push(format!("{at}: url must not be empty"));
                }
                Step::Wait(wait) => {
                    if wait.conditions() != 1 {
                        issues.push(format!(
                            "{at}: needs exactly one of visible, hidden, url, route, network_idle or script"
                        ));
                    }
                    if let Some(route) = &wait.route {
                        if !ids.contains(route.as_str()) {
                            issues.push(format!("{at}: unknown route '{route}'"));
                        }
                    }
                    if let Some(url) = &wait.url {
                        if let Err(e) = crate::network::UrlPattern::glob(url) {
                            issues.push(format!("{at}: {e}"));
                        }
                    }
                }
                Step::ExpectStatus { route, status } => {
                    if !ids.contains(route.as_str()) {
                        issues.push(format!("{at}: unknown route '{route}'"));
                    }
                    if !(100..=599).contains(status) {
                        issues.push(format!("{at}: {status} is not an HTTP status"));
                    }
                }
                Step::Screenshot { path } if path.trim().is_empty() => {
                    issues.push(format!("{at}: path must not be empty"));
                }
                _ => {}
            }
        }

        issues
    }

    /// Fail with every problem found
    pub fn validate(&self) -> HarnessResult<()> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::scenario(issues.join("; ")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const USERS: &str = r#"
version: "1.0"
name: user-management
base_url: http://localhost:3000
session:
  headless: true
  viewport: { width: 1280, height: 720 }
  unmatched: pass_through
init_scripts:
  - local_storage: { key: user, value: { username: admin, roles: [ROLE_ADMIN] } }
  - hide_selectors: 'iframe[style*="z-index: 2147483647"]'
  - script: "window.__E2E__ = true;"
routes:
  - id: dashboard
    pattern: "**/api/admin/users/dashboard"
    method: GET
    status: 200
    json: { totalUsers: 150 }
  - pattern: "**/ws/**"
    abort: true
  - id: register
    pattern: "**/api/user/register"
    observe: true
steps:
  - navigate: { url: /users }
  - wait: { visible: "h1:has-text('User Management')", timeout_ms: 10000 }
  - wait: { route: dashboard }
  - wait: { network_idle: 500, soft: true }
  - fill: { selector: "input[name='username']", value: lollito }
  - click: { selector: "button[type='submit']" }
  - select: { selector: "select[name='countryId']", value: "1" }
  - expect_text: { selector: ".club-name", equals: "My Club" }
  - expect_visible: { selector: "text=Career Goals" }
  - expect_count: { selector: "[role='tab']", at_least: 2 }
  - expect_attribute: { selector: "[role='tab'] >> nth=1", name: aria-selected, equals: "false" }
  - expect_status: { route: register, status: 201 }
  - screenshot: { path: verification/users.png }
"#;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_full_document() {
            let s = Scenario::from_yaml(USERS).unwrap();
            assert_eq!(s.name, "user-management");
            assert_eq!(s.session.unmatched, Some(UnmatchedPolicy::PassThrough));
            assert_eq!(s.init_scripts.len(), 3);
            assert_eq!(s.routes.len(), 3);
            assert_eq!(s.routes[0].method, HttpMethod::Get);
            assert_eq!(s.routes[1].method, HttpMethod::Any);
            assert_eq!(s.routes[1].label(), "**/ws/**");
            assert_eq!(s.steps.len(), 13);
            assert!(matches!(&s.steps[3], Step::Wait(w) if w.soft && w.network_idle == Some(500)));
            assert!(matches!(&s.steps[9], Step::ExpectCount { at_least: 2, .. }));
            assert!(matches!(&s.steps[10], Step::ExpectAttribute { name, .. } if name == "aria-selected"));
            assert!(matches!(&s.steps[11], Step::ExpectStatus { status: 201, .. }));
        }

        #[test]
        fn test_unknown_field_rejected() {
            let yaml = "version: \"1.0\"\nname: x\nroutez: []\n";
            assert!(matches!(Scenario::from_yaml(yaml), Err(HarnessError::Yaml(_))));
        }

        #[test]
        fn test_minimal() {
            let s = Scenario::from_yaml("version: \"1.0\"\nname: smoke\n").unwrap();
            assert!(s.routes.is_empty());
            assert!(s.steps.is_empty());
        }
    }

    mod validation_tests {
        use super::*;

        fn issues(yaml: &str) -> Vec<String> {
            serde_yaml_ng::from_str::<Scenario>(yaml).unwrap().issues()
        }

        #[test]
        fn test_version() {
            let found = issues("version: \"2.0\"\nname: x\n");
            assert!(found[0].contains("unsupported version"));
        }

        #[test]
        fn test_duplicate_ids_and_unknown_route() {
            let found = issues(
                r#"
version: "1.0"
name: x
routes:
  - { id: a, pattern: "**/a", observe: true }
  - { id: a, pattern: "**/b", observe: true }
steps:
  - wait: { route: missing }
"#,
            );
            assert!(found.iter().any(|i| i.contains("duplicate route id 'a'")));
            assert!(found.iter().any(|i| i.contains("unknown route 'missing'")));
        }

        #[test]
        fn test_response_kinds() {
            let found = issues(
                r#"
version: "1.0"
name: x
routes:
  - { pattern: "**/none" }
  - { pattern: "**/both", json: {}, abort: true }
  - { pattern: "**/obs", observe: true, status: 404 }
"#,
            );
            assert!(found[0].contains("routes[0]"));
            assert!(found[1].contains("mutually exclusive"));
            assert!(found[2].contains("status only applies"));
        }

        #[test]
        fn test_bad_pattern_and_selector() {
            let found = issues(
                r#"
version: "1.0"
name: x
routes:
  - { pattern: "", observe: true }
steps:
  - click: { selector: "input[name='x'" }
  - wait: { visible: "h1", hidden: "h2" }
"#,
            );
            assert_eq!(found.len(), 3);
            assert!(found[1].contains("steps[0] (click)"));
            assert!(found[2].contains("exactly one"));
        }

        #[test]
        fn test_expect_status_checks() {
            let found = issues(
                r#"
version: "1.0"
name: x
routes:
  - { id: register, pattern: "**/api/user/register", observe: true }
steps:
  - expect_status: { route: register, status: 201 }
  - expect_status: { route: login, status: 200 }
  - expect_status: { route: register, status: 42 }
"#,
            );
            assert_eq!(found.len(), 2);
            assert!(found[0].contains("steps[1] (expect_status): unknown route 'login'"));
            assert!(found[1].contains("42 is not an HTTP status"));
        }

        #[test]
        fn test_validate_joins_issues() {
            let err = Scenario::from_yaml("version: \"0.1\"\nname: \"\"\n").unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("unsupported version"));
            assert!(msg.contains("name must not be empty"));
        }

        #[test]
        fn test_load_prefixes_path() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("bad.yaml");
            std::fs::write(&path, "version: \"9\"\nname: x\n").unwrap();
            let err = Scenario::load(&path).unwrap_err();
            assert!(err.to_string().contains("bad.yaml"));
        }
    }
}
