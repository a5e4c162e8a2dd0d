//! Scripted in-process browser.
//!
//! [`ScriptedLauncher`] stands in for Chromium in tests: a [`ScriptedApp`]
//! describes which elements each URL renders, which requests the page issues
//! (through the same [`RouteRegistry`] a real browser would consult), and what
//! it renders from the responses. Timing uses `tokio::time`, so scenarios run
//! on paused virtual time.

use crate::driver::{ConsoleMessage, Interception, Launcher, PageDriver};
use crate::network::{
    HttpMethod, InterceptedRequest, MockResponse, NetworkTracker, RouteDecision, RouteRegistry,
    UrlPattern,
};
use crate::result::{HarnessError, HarnessResult};
use crate::selector::{role_css, Selector};
use crate::session::SessionConfig;
use async_trait::async_trait;
use base64::Engine as _;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// 1x1 transparent PNG
const BLANK_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

type RenderFn = Arc<dyn Fn(&MockResponse) -> Vec<ScriptedElement> + Send + Sync>;

/// Element rendered by a scripted page
#[derive(Clone, Default)]
pub struct ScriptedElement {
    selectors: Vec<String>,
    text: String,
    test_id: Option<String>,
    attributes: BTreeMap<String, String>,
    options: Vec<String>,
    value: String,
    hidden: bool,
    appear_after: Duration,
    remove_after: Option<Duration>,
    on_click: Vec<ClickEffect>,
    parent: Option<Arc<ScriptedElement>>,
}

impl std::fmt::Debug for ScriptedElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedElement")
            .field("selectors", &self.selectors)
            .field("text", &self.text)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl ScriptedElement {
    /// Element answering to a CSS selector
    #[must_use]
    pub fn new(css: &str) -> Self {
        Self {
            selectors: vec![css.to_string()],
            ..Self::default()
        }
    }

    /// Also answer to another CSS selector
    #[must_use]
    pub fn also_matches(mut self, css: &str) -> Self {
        self.selectors.push(css.to_string());
        self
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set `data-testid`
    #[must_use]
    pub fn with_test_id(mut self, id: &str) -> Self {
        self.test_id = Some(id.to_string());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Options of a `<select>`
    #[must_use]
    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| (*o).to_string()).collect();
        self
    }

    /// Rendered but not visible
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Attach only after a delay
    #[must_use]
    pub const fn appears_after(mut self, delay: Duration) -> Self {
        self.appear_after = delay;
        self
    }

    /// Detach after a delay
    #[must_use]
    pub const fn removed_after(mut self, delay: Duration) -> Self {
        self.remove_after = Some(delay);
        self
    }

    /// Run an effect when clicked
    #[must_use]
    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    /// Nest inside another element, for scoped selectors
    #[must_use]
    pub fn inside(mut self, parent: Self) -> Self {
        self.parent = Some(Arc::new(parent));
        self
    }

    fn has_selector(&self, css: &str) -> bool {
        self.selectors.iter().any(|s| s == css)
    }

    fn accessible_name(&self) -> &str {
        self.attributes
            .get("aria-label")
            .map(String::as_str)
            .filter(|n| !n.is_empty())
            .or_else(|| Some(self.text.as_str()).filter(|t| !t.is_empty()))
            .unwrap_or(&self.value)
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Css(css) | Selector::XPath(css) => self.has_selector(css),
            Selector::Text(t) => self.text.contains(t.as_str()),
            Selector::TestId(id) => self.test_id.as_deref() == Some(id.as_str()),
            Selector::CssWithText { css, text } => {
                self.has_selector(css) && self.text.contains(text.as_str())
            }
            Selector::Scoped { outer, inner } => {
                let inner = inner.trim_start_matches(['>', '+', '~']).trim();
                self.has_selector(inner) && self.parent.as_ref().is_some_and(|p| p.matches(outer))
            }
            Selector::Role { role, name } => {
                let css = role_css(role);
                let has_role = self.attributes.get("role") == Some(role)
                    || self.selectors.iter().any(|s| css.contains(s));
                has_role
                    && name.as_ref().map_or(true, |n| {
                        self.accessible_name()
                            .trim()
                            .to_lowercase()
                            .contains(&n.to_lowercase())
                    })
            }
            Selector::Placeholder(text) => self
                .attributes
                .get("placeholder")
                .is_some_and(|p| p.to_lowercase().contains(&text.to_lowercase())),
            // indexing is applied over the whole match list
            Selector::Nth { inner, .. } => self.matches(inner),
        }
    }
}

/// What a click does
#[derive(Clone)]
pub enum ClickEffect {
    /// Load another URL
    Navigate(String),
    /// Issue a request
    Fetch(ScriptedFetch),
    /// Attach an element
    Reveal(ScriptedElement),
}

impl std::fmt::Debug for ClickEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigate(url) => write!(f, "Navigate({url})"),
            Self::Fetch(fetch) => write!(f, "Fetch({fetch:?})"),
            Self::Reveal(el) => write!(f, "Reveal({el:?})"),
        }
    }
}

/// Request a scripted page issues
#[derive(Clone)]
pub struct ScriptedFetch {
    method: HttpMethod,
    url: String,
    delay: Duration,
    body_from_inputs: bool,
    backend: Option<MockResponse>,
    render: Option<RenderFn>,
    on_error: Vec<ScriptedElement>,
    then: Vec<ScriptedFetch>,
}

impl std::fmt::Debug for ScriptedFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

impl ScriptedFetch {
    /// Request with a method; relative URLs resolve against the page URL
    #[must_use]
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            delay: Duration::ZERO,
            body_from_inputs: false,
            backend: None,
            render: None,
            on_error: Vec::new(),
            then: Vec::new(),
        }
    }

    /// GET request
    #[must_use]
    pub fn get(url: &str) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// POST request
    #[must_use]
    pub fn post(url: &str) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Issue the request after a delay
    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Send filled inputs as a JSON body keyed by their `name` attribute
    #[must_use]
    pub const fn with_form_body(mut self) -> Self {
        self.body_from_inputs = true;
        self
    }

    /// Response from the real backend when the request passes through
    #[must_use]
    pub fn with_backend(mut self, response: MockResponse) -> Self {
        self.backend = Some(response);
        self
    }

    /// Elements to attach from a successful response
    #[must_use]
    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&MockResponse) -> Vec<ScriptedElement> + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    /// Elements to attach from a successful JSON response
    #[must_use]
    pub fn render_json<F>(self, render: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Vec<ScriptedElement> + Send + Sync + 'static,
    {
        self.render(move |response| {
            serde_json::from_slice::<serde_json::Value>(&response.body)
                .map(|v| render(&v))
                .unwrap_or_default()
        })
    }

    /// Elements to attach when the request fails
    #[must_use]
    pub fn on_error(mut self, element: ScriptedElement) -> Self {
        self.on_error.push(element);
        self
    }

    /// Request issued once this one succeeds
    #[must_use]
    pub fn then(mut self, next: Self) -> Self {
        self.then.push(next);
        self
    }
}

/// A page definition bound to a URL pattern
#[derive(Debug, Clone)]
pub struct ScriptedPageDef {
    pattern: UrlPattern,
    elements: Vec<ScriptedElement>,
    fetches: Vec<ScriptedFetch>,
    console: Vec<ConsoleMessage>,
    dom_ready_after: Duration,
    unreachable: Option<String>,
}

impl ScriptedPageDef {
    /// Page served for URLs matching a glob
    pub fn at(glob: &str) -> HarnessResult<Self> {
        Ok(Self {
            pattern: UrlPattern::glob(glob)?,
            elements: Vec::new(),
            fetches: Vec::new(),
            console: Vec::new(),
            dom_ready_after: Duration::ZERO,
            unreachable: None,
        })
    }

    /// Static element
    #[must_use]
    pub fn element(mut self, element: ScriptedElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Request issued on load
    #[must_use]
    pub fn fetch(mut self, fetch: ScriptedFetch) -> Self {
        self.fetches.push(fetch);
        self
    }

    /// Console line printed on load
    #[must_use]
    pub fn console(mut self, level: &str, text: &str) -> Self {
        self.console.push(ConsoleMessage::new(level, text));
        self
    }

    /// Delay before DOM content loaded
    #[must_use]
    pub const fn dom_ready_after(mut self, delay: Duration) -> Self {
        self.dom_ready_after = delay;
        self
    }

    /// Navigation fails with a network error
    #[must_use]
    pub fn unreachable(mut self, error: &str) -> Self {
        self.unreachable = Some(error.to_string());
        self
    }
}

/// A scripted web application
#[derive(Debug, Clone, Default)]
pub struct ScriptedApp {
    pages: Vec<ScriptedPageDef>,
    eval: HashMap<String, serde_json::Value>,
}

impl ScriptedApp {
    /// Empty application; every URL renders a blank page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page; the first page whose pattern matches a URL serves it
    #[must_use]
    pub fn page(mut self, page: ScriptedPageDef) -> Self {
        self.pages.push(page);
        self
    }

    /// Fixed result for an evaluated expression
    #[must_use]
    pub fn with_eval(mut self, expression: &str, value: serde_json::Value) -> Self {
        self.eval.insert(expression.to_string(), value);
        self
    }

    fn page_for(&self, url: &str) -> Option<&ScriptedPageDef> {
        self.pages.iter().find(|p| p.pattern.matches(url))
    }
}

#[derive(Debug, Clone)]
struct Placed {
    element: ScriptedElement,
    at: Instant,
}

impl Placed {
    fn attached(&self, now: Instant) -> bool {
        let shown = self.at + self.element.appear_after;
        let gone = self.element.remove_after.map(|d| self.at + d);
        now >= shown && gone.map_or(true, |g| now < g)
    }
}

/// Positions of the attached elements matching `selector`, in document order
fn matching(elements: &[Placed], now: Instant, selector: &Selector) -> Vec<usize> {
    if let Selector::Nth { inner, index } = selector {
        return matching(elements, now, inner).into_iter().nth(*index).into_iter().collect();
    }
    elements
        .iter()
        .enumerate()
        .filter(|(_, p)| p.attached(now) && p.element.matches(selector))
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    document: u64,
    elements: Vec<Placed>,
    init_scripts: Vec<String>,
    document_scripts: Vec<String>,
    console: Vec<ConsoleMessage>,
    closed: bool,
}

struct PageInner {
    app: ScriptedApp,
    state: Mutex<PageState>,
    registry: Arc<RouteRegistry>,
    network: Arc<NetworkTracker>,
    request_seq: AtomicU64,
    fail_screenshots: bool,
    closes: Arc<AtomicUsize>,
}

impl PageInner {
    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Page driven by a [`ScriptedApp`]
#[derive(Clone)]
pub struct ScriptedPage {
    inner: Arc<PageInner>,
}

impl std::fmt::Debug for ScriptedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPage")
            .field("url", &self.inner.state().url)
            .finish_non_exhaustive()
    }
}

impl ScriptedPage {
    fn new(
        app: ScriptedApp,
        interception: Interception,
        fail_screenshots: bool,
        closes: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            inner: Arc::new(PageInner {
                app,
                state: Mutex::new(PageState {
                    url: "about:blank".to_string(),
                    ..PageState::default()
                }),
                registry: interception.registry,
                network: interception.network,
                request_seq: AtomicU64::new(1),
                fail_screenshots,
                closes,
            }),
        }
    }

    /// Blank page outside any launcher
    #[must_use]
    pub fn detached(registry: Arc<RouteRegistry>, network: Arc<NetworkTracker>) -> Self {
        Self::new(
            ScriptedApp::new(),
            Interception { registry, network },
            false,
            Arc::new(AtomicUsize::new(0)),
        )
    }

    /// Attach an element to the current document now
    pub fn add_element(&self, element: ScriptedElement) {
        self.inner.state().elements.push(Placed {
            element,
            at: Instant::now(),
        });
    }

    /// Init scripts that ran on the current document
    #[must_use]
    pub fn document_scripts(&self) -> Vec<String> {
        self.inner.state().document_scripts.clone()
    }

    /// Current value of the first element matching a selector
    #[must_use]
    pub fn value_of(&self, selector: &Selector) -> Option<String> {
        let state = self.inner.state();
        matching(&state.elements, Instant::now(), selector)
            .first()
            .map(|&i| state.elements[i].element.value.clone())
    }

    fn ensure_open(&self) -> HarnessResult<()> {
        if self.inner.state().closed {
            Err(HarnessError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn with_first<T>(
        &self,
        selector: &Selector,
        f: impl FnOnce(&mut ScriptedElement) -> HarnessResult<T>,
    ) -> HarnessResult<T> {
        let mut state = self.inner.state();
        let first = matching(&state.elements, Instant::now(), selector)
            .first()
            .copied()
            .ok_or_else(|| HarnessError::fault(format!("no element for {selector}")))?;
        f(&mut state.elements[first].element)
    }

    fn load(&self, url: &str) -> HarnessResult<Option<Duration>> {
        let def = self.inner.app.page_for(url).cloned();
        if let Some(error) = def.as_ref().and_then(|d| d.unreachable.clone()) {
            return Err(HarnessError::fault(format!("{error} at {url}")));
        }
        let now = Instant::now();
        let document = {
            let mut state = self.inner.state();
            state.document += 1;
            state.url = url.to_string();
            state.document_scripts = state.init_scripts.clone();
            state.elements.clear();
            if let Some(def) = &def {
                state.elements.extend(def.elements.iter().cloned().map(|element| Placed {
                    element,
                    at: now,
                }));
                state.console.extend(def.console.iter().cloned());
            }
            state.document
        };
        let Some(def) = def else {
            return Ok(None);
        };
        for fetch in def.fetches {
            self.spawn_fetch(document, fetch);
        }
        Ok(Some(def.dom_ready_after))
    }

    fn spawn_fetch(&self, document: u64, fetch: ScriptedFetch) {
        let page = self.clone();
        tokio::spawn(async move {
            page.run_fetch(document, fetch).await;
        });
    }

    async fn run_fetch(&self, document: u64, fetch: ScriptedFetch) {
        if !fetch.delay.is_zero() {
            tokio::time::sleep(fetch.delay).await;
        }
        let request = {
            let state = self.inner.state();
            if state.closed || state.document != document {
                return;
            }
            let url = url::Url::parse(&state.url)
                .and_then(|base| base.join(&fetch.url))
                .map_or_else(|_| fetch.url.clone(), |u| u.to_string());
            let mut request = InterceptedRequest::new(fetch.method, &url);
            if fetch.body_from_inputs {
                let body: serde_json::Map<String, serde_json::Value> = state
                    .elements
                    .iter()
                    .filter_map(|p| {
                        p.element
                            .attributes
                            .get("name")
                            .map(|n| (n.clone(), serde_json::Value::String(p.element.value.clone())))
                    })
                    .collect();
                request = request
                    .with_header("Content-Type", "application/json")
                    .with_body(serde_json::Value::Object(body).to_string());
            }
            request
        };

        let id = format!("scripted-{}", self.inner.request_seq.fetch_add(1, Ordering::SeqCst));
        self.inner.network.request_started(&id);
        let decision = self.inner.registry.dispatch(&request);
        let passed_through = matches!(decision, RouteDecision::Continue);
        let response = match decision {
            RouteDecision::Fulfill(response) => Ok(response),
            RouteDecision::Abort(reason) => Err(reason.message().to_string()),
            RouteDecision::Continue => fetch
                .backend
                .clone()
                .ok_or_else(|| "net::ERR_CONNECTION_REFUSED".to_string()),
        };
        if let Ok(r) = &response {
            if r.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(r.delay_ms)).await;
            }
            if passed_through {
                self.inner.registry.record_response(&request.url, r.status);
            }
        }
        self.inner.network.request_finished(&id);

        let now = Instant::now();
        let mut follow_ups = Vec::new();
        {
            let mut state = self.inner.state();
            if state.closed || state.document != document {
                return;
            }
            match response {
                Ok(r) if (200..300).contains(&r.status) => {
                    if let Some(render) = &fetch.render {
                        let rendered = render(&r);
                        state
                            .elements
                            .extend(rendered.into_iter().map(|element| Placed { element, at: now }));
                    }
                    follow_ups.extend(fetch.then.iter().cloned());
                }
                Ok(r) => {
                    state.console.push(ConsoleMessage::new(
                        "error",
                        format!("Failed to load resource: the server responded with a status of {}", r.status),
                    ));
                    let errors = fetch.on_error.iter().cloned();
                    state.elements.extend(errors.map(|element| Placed { element, at: now }));
                }
                Err(message) => {
                    state
                        .console
                        .push(ConsoleMessage::new("error", format!("Failed to load resource: {message}")));
                    let errors = fetch.on_error.iter().cloned();
                    state.elements.extend(errors.map(|element| Placed { element, at: now }));
                }
            }
        }
        for next in follow_ups {
            self.spawn_fetch(document, next);
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn add_init_script(&self, source: &str) -> HarnessResult<()> {
        self.ensure_open()?;
        self.inner.state().init_scripts.push(source.to_string());
        Ok(())
    }

    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        self.ensure_open()?;
        if let Some(delay) = self.load(url)? {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> HarnessResult<String> {
        self.ensure_open()?;
        Ok(self.inner.state().url.clone())
    }

    async fn count(&self, selector: &Selector) -> HarnessResult<usize> {
        self.ensure_open()?;
        Ok(matching(&self.inner.state().elements, Instant::now(), selector).len())
    }

    async fn is_visible(&self, selector: &Selector) -> HarnessResult<bool> {
        self.ensure_open()?;
        let state = self.inner.state();
        Ok(matching(&state.elements, Instant::now(), selector)
            .into_iter()
            .any(|i| !state.elements[i].element.hidden))
    }

    async fn text_content(&self, selector: &Selector) -> HarnessResult<Option<String>> {
        self.ensure_open()?;
        let state = self.inner.state();
        Ok(matching(&state.elements, Instant::now(), selector)
            .first()
            .map(|&i| state.elements[i].element.text.clone()))
    }

    async fn attribute(&self, selector: &Selector, name: &str) -> HarnessResult<Option<String>> {
        self.ensure_open()?;
        self.with_first(selector, |el| {
            if name == "value" {
                return Ok(Some(el.value.clone()));
            }
            Ok(el.attributes.get(name).cloned())
        })
    }

    async fn fill(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
        self.ensure_open()?;
        self.with_first(selector, |el| {
            el.value = value.to_string();
            Ok(())
        })
    }

    async fn click(&self, selector: &Selector) -> HarnessResult<()> {
        self.ensure_open()?;
        let effects = self.with_first(selector, |el| Ok(el.on_click.clone()))?;
        for effect in effects {
            match effect {
                ClickEffect::Navigate(url) => {
                    let target = url::Url::parse(&self.inner.state().url)
                        .and_then(|base| base.join(&url))
                        .map_or(url, |u| u.to_string());
                    self.navigate(&target).await?;
                }
                ClickEffect::Fetch(fetch) => {
                    let document = self.inner.state().document;
                    self.spawn_fetch(document, fetch);
                }
                ClickEffect::Reveal(element) => self.add_element(element),
            }
        }
        Ok(())
    }

    async fn select_option(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
        self.ensure_open()?;
        self.with_first(selector, |el| {
            if el.options.iter().any(|o| o == value) {
                el.value = value.to_string();
                Ok(())
            } else {
                Err(HarnessError::fault(format!("no option {value} in {selector}")))
            }
        })
    }

    async fn evaluate(&self, expression: &str) -> HarnessResult<serde_json::Value> {
        self.ensure_open()?;
        if let Some(v) = self.inner.app.eval.get(expression) {
            return Ok(v.clone());
        }
        match expression {
            "document.readyState" => Ok(serde_json::json!("complete")),
            "window.location.href" => Ok(serde_json::Value::String(self.inner.state().url.clone())),
            _ => Ok(serde_json::Value::Null),
        }
    }

    async fn screenshot(&self) -> HarnessResult<Vec<u8>> {
        self.ensure_open()?;
        if self.inner.fail_screenshots {
            return Err(HarnessError::fault("screenshot capture failed"));
        }
        base64::engine::general_purpose::STANDARD
            .decode(BLANK_PNG_BASE64)
            .map_err(|e| HarnessError::fault(e.to_string()))
    }

    async fn console_messages(&self) -> Vec<ConsoleMessage> {
        std::mem::take(&mut self.inner.state().console)
    }

    async fn close(&mut self) -> HarnessResult<()> {
        let mut state = self.inner.state();
        if !state.closed {
            state.closed = true;
            state.elements.clear();
            self.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Launches [`ScriptedPage`]s and counts launches and teardowns
#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    app: ScriptedApp,
    launch_error: Option<String>,
    fail_screenshots: bool,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    /// Launcher serving an application
    #[must_use]
    pub fn new(app: ScriptedApp) -> Self {
        Self {
            app,
            ..Self::default()
        }
    }

    /// Every launch fails
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            launch_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Screenshots fail
    #[must_use]
    pub const fn without_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Successful launches so far
    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Pages closed so far
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(
        &self,
        _config: &SessionConfig,
        interception: Interception,
    ) -> HarnessResult<Box<dyn PageDriver>> {
        if let Some(message) = &self.launch_error {
            return Err(HarnessError::launch(message.clone()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage::new(
            self.app.clone(),
            interception,
            self.fail_screenshots,
            Arc::clone(&self.closes),
        )))
    }
}
