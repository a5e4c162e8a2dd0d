//! Chromium launcher.
//!
//! With the `browser` feature this drives Chromium over the DevTools protocol
//! through chromiumoxide: one browser process, one isolated browser context
//! and one page per session. Every request the page issues is paused in the
//! Fetch domain and answered from the session's [`RouteRegistry`].
//!
//! Without the feature, [`ChromiumLauncher::launch`] fails with
//! [`HarnessError::LaunchFailure`].

use crate::driver::{Interception, Launcher, PageDriver};
use crate::result::{HarnessError, HarnessResult};
use crate::session::SessionConfig;
use async_trait::async_trait;
use std::future::Future;

/// Launches Chromium
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    /// Create a launcher
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(
        &self,
        _config: &SessionConfig,
        _interception: Interception,
    ) -> HarnessResult<Box<dyn PageDriver>> {
        Err(HarnessError::launch(
            "Chromium support is not compiled in; rebuild with the `browser` feature",
        ))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(
        &self,
        config: &SessionConfig,
        interception: Interception,
    ) -> HarnessResult<Box<dyn PageDriver>> {
        let page = cdp::ChromiumPage::launch(config, interception).await?;
        Ok(Box::new(page))
    }
}

/// Await `cleanup` if `result` is an error, then hand the result back
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
async fn cleanup_on_error<T, C>(result: HarnessResult<T>, cleanup: C) -> HarnessResult<T>
where
    C: Future<Output = ()>,
{
    if result.is_err() {
        cleanup.await;
    }
    result
}

#[cfg(feature = "browser")]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
mod cdp {
    use super::{
        cleanup_on_error, HarnessError, HarnessResult, Interception, PageDriver, SessionConfig,
    };
    use crate::driver::ConsoleMessage;
    use crate::network::{
        AbortReason, HttpMethod, InterceptedRequest, MockResponse, NetworkTracker, ResourceKind,
        RouteDecision, RouteRegistry,
    };
    use crate::selector::{js, Selector};
    use async_trait::async_trait;
    use base64::Engine as _;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
    use chromiumoxide::cdp::browser_protocol::fetch::{
        ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
        FailRequestParams, FulfillRequestParams, HeaderEntry, RequestPattern, RequestStage,
    };
    use chromiumoxide::cdp::browser_protocol::network::{
        EnableParams as NetworkEnableParams, ErrorReason, EventLoadingFailed,
        EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
        SetUserAgentOverrideParams,
    };
    use chromiumoxide::cdp::browser_protocol::page::{
        AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, NavigateParams,
    };
    use chromiumoxide::cdp::browser_protocol::target::{
        CreateBrowserContextParams, CreateTargetParams,
    };
    use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, EventConsoleApiCalled};
    use chromiumoxide::page::{Page, ScreenshotParams};
    use futures::StreamExt;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    const READY_POLL: Duration = Duration::from_millis(25);

    fn fault(e: impl std::fmt::Display) -> HarnessError {
        HarnessError::fault(e.to_string())
    }

    /// Page in an isolated Chromium context
    #[derive(Debug)]
    pub(super) struct ChromiumPage {
        browser: Option<Browser>,
        page: Option<Page>,
        tasks: Vec<JoinHandle<()>>,
        console: Arc<Mutex<Vec<ConsoleMessage>>>,
    }

    impl ChromiumPage {
        pub(super) async fn launch(
            config: &SessionConfig,
            interception: Interception,
        ) -> HarnessResult<Self> {
            let mut builder = BrowserConfig::builder()
                .window_size(config.viewport.width, config.viewport.height);
            if !config.headless {
                builder = builder.with_head();
            }
            if !config.sandbox {
                builder = builder.no_sandbox();
            }
            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }
            let cdp_config = builder.build().map_err(HarnessError::launch)?;

            let (mut browser, mut handler) = Browser::launch(cdp_config)
                .await
                .map_err(|e| HarnessError::launch(e.to_string()))?;
            let mut tasks = vec![tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            })];

            let console = Arc::new(Mutex::new(Vec::new()));
            let setup = open_page(&mut browser, config, &interception, &console, &mut tasks).await;
            let page = cleanup_on_error(setup, shut_down(&mut browser, &mut tasks)).await?;

            tracing::info!(
                headless = config.headless,
                width = config.viewport.width,
                height = config.viewport.height,
                "chromium page ready"
            );
            Ok(Self {
                browser: Some(browser),
                page: Some(page),
                tasks,
                console,
            })
        }

        fn page(&self) -> HarnessResult<&Page> {
            self.page.as_ref().ok_or(HarnessError::SessionClosed)
        }

        async fn eval(&self, expression: String) -> HarnessResult<serde_json::Value> {
            let params = EvaluateParams::builder()
                .expression(expression)
                .return_by_value(true)
                .await_promise(true)
                .build()
                .map_err(fault)?;
            let result = self.page()?.evaluate_expression(params).await.map_err(fault)?;
            Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
        }

        /// Run `body` against the first match; `body` sees `el`
        async fn on_first(&self, selector: &Selector, body: &str) -> HarnessResult<serde_json::Value> {
            let expr = format!(
                "(() => {{ const el = ({})[0]; if (!el) return {{ missing: true }}; {body} }})()",
                selector.elements_expr()
            );
            let value = self.eval(expr).await?;
            if value.get("missing").and_then(serde_json::Value::as_bool) == Some(true) {
                return Err(HarnessError::SelectorNotFound {
                    selector: selector.to_string(),
                    ms: 0,
                });
            }
            if let Some(error) = value.get("error").and_then(serde_json::Value::as_str) {
                return Err(fault(format!("{selector}: {error}")));
            }
            Ok(value.get("value").cloned().unwrap_or(serde_json::Value::Null))
        }
    }

    /// Context, page, emulation and listeners on a freshly launched browser
    async fn open_page(
        browser: &mut Browser,
        config: &SessionConfig,
        interception: &Interception,
        console: &Arc<Mutex<Vec<ConsoleMessage>>>,
        tasks: &mut Vec<JoinHandle<()>>,
    ) -> HarnessResult<Page> {
        let context = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| HarnessError::launch(e.to_string()))?;
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context)
            .build()
            .map_err(HarnessError::launch)?;
        let page = browser
            .new_page(target)
            .await
            .map_err(|e| HarnessError::launch(e.to_string()))?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(config.viewport.width))
            .height(i64::from(config.viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(HarnessError::launch)?;
        page.execute(metrics).await.map_err(fault)?;
        if let Some(ref ua) = config.user_agent {
            page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                .await
                .map_err(fault)?;
        }

        tasks.push(watch_console(&page, Arc::clone(console)).await?);
        tasks.extend(
            watch_network(
                &page,
                Arc::clone(&interception.network),
                Arc::clone(&interception.registry),
            )
            .await?,
        );
        tasks.push(intercept(&page, Arc::clone(&interception.registry)).await?);
        Ok(page)
    }

    /// Kill a browser whose page never came up
    async fn shut_down(browser: &mut Browser, tasks: &mut Vec<JoinHandle<()>>) {
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "closing chromium after failed launch");
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "chromium did not exit cleanly");
        }
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn watch_console(
        page: &Page,
        sink: Arc<Mutex<Vec<ConsoleMessage>>>,
    ) -> HarnessResult<JoinHandle<()>> {
        let mut events = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(fault)?;
        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let text = event
                    .args
                    .iter()
                    .map(|arg| match &arg.value {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(v) => v.to_string(),
                        None => arg.description.clone().unwrap_or_default(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                let level = format!("{:?}", event.r#type).to_lowercase();
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(ConsoleMessage::new(level, text));
            }
        }))
    }

    async fn watch_network(
        page: &Page,
        tracker: Arc<NetworkTracker>,
        registry: Arc<RouteRegistry>,
    ) -> HarnessResult<Vec<JoinHandle<()>>> {
        page.execute(NetworkEnableParams::default())
            .await
            .map_err(fault)?;
        let mut sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(fault)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(fault)?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(fault)?;
        let mut responded = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(fault)?;

        let t1 = Arc::clone(&tracker);
        let t2 = Arc::clone(&tracker);
        Ok(vec![
            tokio::spawn(async move {
                while let Some(event) = sent.next().await {
                    t1.request_started(event.request_id.inner());
                }
            }),
            tokio::spawn(async move {
                while let Some(event) = finished.next().await {
                    t2.request_finished(event.request_id.inner());
                }
            }),
            tokio::spawn(async move {
                while let Some(event) = failed.next().await {
                    tracker.request_finished(event.request_id.inner());
                }
            }),
            tokio::spawn(async move {
                while let Some(event) = responded.next().await {
                    let status = u16::try_from(event.response.status).unwrap_or_default();
                    registry.record_response(&event.response.url, status);
                }
            }),
        ])
    }

    async fn intercept(page: &Page, registry: Arc<RouteRegistry>) -> HarnessResult<JoinHandle<()>> {
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(fault)?;
        let enable = FetchEnableParams::builder()
            .pattern(
                RequestPattern::builder()
                    .url_pattern("*")
                    .request_stage(RequestStage::Request)
                    .build(),
            )
            .build();
        page.execute(enable).await.map_err(fault)?;

        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let page = page.clone();
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    if let Err(e) = answer(&page, &registry, &event).await {
                        tracing::debug!(url = %event.request.url, error = %e, "paused request not answered");
                    }
                });
            }
        }))
    }

    fn intercepted(event: &EventRequestPaused) -> InterceptedRequest {
        let mut request = InterceptedRequest::new(
            HttpMethod::parse(&event.request.method),
            &event.request.url,
        )
        .with_kind(ResourceKind::from_cdp(event.resource_type.as_ref()));
        if let Some(headers) = event.request.headers.inner().as_object() {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.with_header(name, value);
                }
            }
        }
        if let Some(ref entries) = event.request.post_data_entries {
            let mut body = Vec::new();
            for bytes in entries.iter().filter_map(|entry| entry.bytes.as_ref()) {
                let encoded: &str = bytes.as_ref();
                if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) {
                    body.extend_from_slice(&decoded);
                }
            }
            request = request.with_body(body);
        }
        request
    }

    async fn answer(page: &Page, registry: &RouteRegistry, event: &EventRequestPaused) -> HarnessResult<()> {
        let request = intercepted(event);
        let id = event.request_id.clone();
        match registry.dispatch(&request) {
            RouteDecision::Fulfill(response) => {
                if response.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(response.delay_ms)).await;
                }
                page.execute(fulfill_params(id, &response)?)
                    .await
                    .map_err(fault)?;
            }
            RouteDecision::Continue => {
                page.execute(ContinueRequestParams::new(id))
                    .await
                    .map_err(fault)?;
            }
            RouteDecision::Abort(reason) => {
                page.execute(FailRequestParams::new(id, error_reason(reason)))
                    .await
                    .map_err(fault)?;
            }
        }
        Ok(())
    }

    fn fulfill_params(
        id: chromiumoxide::cdp::browser_protocol::fetch::RequestId,
        response: &MockResponse,
    ) -> HarnessResult<FulfillRequestParams> {
        let headers = response
            .header_pairs()
            .into_iter()
            .map(|(name, value)| HeaderEntry::new(name, value))
            .collect::<Vec<_>>();
        FulfillRequestParams::builder()
            .request_id(id)
            .response_code(i64::from(response.status))
            .response_headers(headers)
            .body(base64::engine::general_purpose::STANDARD.encode(&response.body))
            .build()
            .map_err(fault)
    }

    const fn error_reason(reason: AbortReason) -> ErrorReason {
        match reason {
            AbortReason::Failed => ErrorReason::Failed,
            AbortReason::Aborted => ErrorReason::Aborted,
            AbortReason::TimedOut => ErrorReason::TimedOut,
            AbortReason::AccessDenied => ErrorReason::AccessDenied,
            AbortReason::ConnectionRefused => ErrorReason::ConnectionRefused,
            AbortReason::ConnectionReset => ErrorReason::ConnectionReset,
            AbortReason::InternetDisconnected => ErrorReason::InternetDisconnected,
            AbortReason::BlockedByClient => ErrorReason::BlockedByClient,
        }
    }

    #[async_trait]
    impl PageDriver for ChromiumPage {
        async fn add_init_script(&self, source: &str) -> HarnessResult<()> {
            self.page()?
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(source.to_string()))
                .await
                .map_err(fault)?;
            Ok(())
        }

        async fn navigate(&self, url: &str) -> HarnessResult<()> {
            let response = self
                .page()?
                .execute(NavigateParams::new(url.to_string()))
                .await
                .map_err(fault)?;
            if let Some(ref error) = response.result.error_text {
                return Err(fault(format!("navigation to {url} failed: {error}")));
            }
            loop {
                let state = self.eval("document.readyState".to_string()).await?;
                if matches!(state.as_str(), Some("interactive" | "complete")) {
                    return Ok(());
                }
                tokio::time::sleep(READY_POLL).await;
            }
        }

        async fn current_url(&self) -> HarnessResult<String> {
            Ok(self
                .page()?
                .url()
                .await
                .map_err(fault)?
                .unwrap_or_default())
        }

        async fn count(&self, selector: &Selector) -> HarnessResult<usize> {
            let value = self.eval(selector.count_expr()).await?;
            Ok(value.as_u64().unwrap_or(0) as usize)
        }

        async fn is_visible(&self, selector: &Selector) -> HarnessResult<bool> {
            let expr = format!(
                "({}).some(el => {{ const s = window.getComputedStyle(el); \
                 const r = el.getBoundingClientRect(); \
                 return s.display !== 'none' && s.visibility !== 'hidden' && \
                 (r.width > 0 || r.height > 0); }})",
                selector.elements_expr()
            );
            Ok(self.eval(expr).await?.as_bool().unwrap_or(false))
        }

        async fn text_content(&self, selector: &Selector) -> HarnessResult<Option<String>> {
            let expr = format!(
                "(() => {{ const el = ({})[0]; return el ? el.textContent : null; }})()",
                selector.elements_expr()
            );
            Ok(self.eval(expr).await?.as_str().map(String::from))
        }

        async fn attribute(&self, selector: &Selector, name: &str) -> HarnessResult<Option<String>> {
            let body = format!(
                "return {{ value: {n} === 'value' && 'value' in el ? el.value : el.getAttribute({n}) }};",
                n = js(name)
            );
            Ok(self.on_first(selector, &body).await?.as_str().map(String::from))
        }

        async fn fill(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
            let body = format!(
                "el.focus(); \
                 const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype \
                   : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype \
                   : HTMLInputElement.prototype; \
                 const setter = Object.getOwnPropertyDescriptor(proto, 'value'); \
                 if (!setter || !setter.set) return {{ error: 'not an input' }}; \
                 setter.set.call(el, {}); \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return {{ value: true }};",
                js(value)
            );
            self.on_first(selector, &body).await.map(|_| ())
        }

        async fn click(&self, selector: &Selector) -> HarnessResult<()> {
            let body = "el.scrollIntoView({ block: 'center' }); el.click(); return { value: true };";
            self.on_first(selector, body).await.map(|_| ())
        }

        async fn select_option(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
            let body = format!(
                "if (!(el instanceof HTMLSelectElement)) return {{ error: 'not a select' }}; \
                 const want = {}; \
                 const opt = Array.from(el.options).find(o => o.value === want || o.label === want); \
                 if (!opt) return {{ error: 'no option ' + want }}; \
                 el.value = opt.value; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return {{ value: true }};",
                js(value)
            );
            self.on_first(selector, &body).await.map(|_| ())
        }

        async fn evaluate(&self, expression: &str) -> HarnessResult<serde_json::Value> {
            self.eval(expression.to_string()).await
        }

        async fn screenshot(&self) -> HarnessResult<Vec<u8>> {
            self.page()?
                .screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(true)
                        .build(),
                )
                .await
                .map_err(fault)
        }

        async fn console_messages(&self) -> Vec<ConsoleMessage> {
            std::mem::take(&mut *self.console.lock().unwrap_or_else(PoisonError::into_inner))
        }

        async fn close(&mut self) -> HarnessResult<()> {
            let mut first_error = None;
            if let Some(page) = self.page.take() {
                if let Err(e) = page.close().await {
                    first_error.get_or_insert(fault(e));
                }
            }
            if let Some(mut browser) = self.browser.take() {
                if let Err(e) = browser.close().await {
                    first_error.get_or_insert(fault(e));
                }
                if let Err(e) = browser.wait().await {
                    tracing::debug!(error = %e, "chromium did not exit cleanly");
                }
            }
            for task in self.tasks.drain(..) {
                task.abort();
            }
            first_error.map_or(Ok(()), Err)
        }
    }
}
