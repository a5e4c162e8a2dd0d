//! Scenario execution.

use super::schema::{InitScriptSpec, RouteSpec, Scenario, Step, WaitStep};
use crate::driver::Launcher;
use crate::inject::InitScript;
use crate::network::{MockResponse, PassThrough, RouteId, RouteRegistry, UrlPattern};
use crate::result::{HarnessError, HarnessResult};
use crate::session::{Session, SessionConfig};
use crate::verify::{Verification, VerificationResult};
use crate::wait::Condition;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

impl InitScriptSpec {
    /// Script this entry installs
    pub fn to_init_script(&self) -> HarnessResult<InitScript> {
        match self {
            Self::LocalStorage { key, value } => InitScript::local_storage(key, value),
            Self::SessionStorage { key, value } => InitScript::session_storage(key, value),
            Self::HideSelectors(css) => Ok(InitScript::hide_selectors(css)),
            Self::Script(source) => Ok(InitScript::raw(source.clone())),
        }
    }
}

impl RouteSpec {
    /// Register this route
    pub fn install(&self, registry: &RouteRegistry) -> HarnessResult<RouteId> {
        let pattern = self.route_pattern()?;
        let label = self.label();
        if self.abort {
            return Ok(registry.register(label, pattern, self.reason.unwrap_or_default()));
        }
        if self.observe {
            return Ok(registry.register(label, pattern, PassThrough));
        }
        let mut response = match (&self.json, &self.body) {
            (Some(json), _) => MockResponse::json(json)?,
            (None, Some(body)) => MockResponse::text(body),
            (None, None) => {
                return Err(HarnessError::scenario(format!(
                    "route {label} has no response"
                )))
            }
        };
        if let Some(status) = self.status {
            response = response.with_status(status);
        }
        if let Some(content_type) = &self.content_type {
            response = response.with_content_type(content_type);
        }
        for (name, value) in &self.headers {
            response = response.with_header(name, value);
        }
        if let Some(delay) = self.delay_ms {
            response = response.with_delay(delay);
        }
        Ok(registry.register(label, pattern, response))
    }
}

impl WaitStep {
    /// Condition this step waits on
    pub fn condition(&self, registry: &RouteRegistry) -> HarnessResult<Condition> {
        if let Some(s) = &self.visible {
            return Condition::visible(s);
        }
        if let Some(s) = &self.hidden {
            return Condition::hidden(s);
        }
        if let Some(glob) = &self.url {
            return Ok(Condition::UrlMatches(UrlPattern::glob(glob)?));
        }
        if let Some(route) = &self.route {
            let id = registry
                .find_by_label(route)
                .ok_or_else(|| HarnessError::scenario(format!("unknown route '{route}'")))?;
            return Ok(Condition::RouteHit(id));
        }
        if let Some(ms) = self.network_idle {
            return Ok(Condition::NetworkIdle(Duration::from_millis(ms)));
        }
        if let Some(js) = &self.script {
            return Ok(Condition::Script(js.clone()));
        }
        Err(HarnessError::scenario("wait step has no condition"))
    }
}

impl Scenario {
    /// Session options from the `session:` block, base URL and init scripts
    pub fn session_config(&self) -> HarnessResult<SessionConfig> {
        let mut config = SessionConfig::default();
        let s = &self.session;
        if let Some(headless) = s.headless {
            config.headless = headless;
        }
        if let Some(viewport) = s.viewport {
            config.viewport = viewport;
        }
        if let Some(policy) = s.unmatched {
            config.unmatched = policy;
        }
        if let Some(policy) = s.ambiguity {
            config.ambiguity = policy;
        }
        if let Some(ms) = s.navigation_timeout_ms {
            config.navigation_timeout_ms = ms;
        }
        if let Some(ms) = s.element_timeout_ms {
            config.element_timeout_ms = ms;
        }
        if let Some(ms) = s.wait_timeout_ms {
            config.wait_timeout_ms = ms;
        }
        config.base_url.clone_from(&self.base_url);
        for spec in &self.init_scripts {
            config.init_scripts.push(spec.to_init_script()?);
        }
        Ok(config)
    }

    /// Register every route, returning ids by route label
    pub fn install_routes(&self, registry: &RouteRegistry) -> HarnessResult<BTreeMap<String, RouteId>> {
        let mut ids = BTreeMap::new();
        for route in &self.routes {
            let id = route.install(registry)?;
            ids.insert(route.label(), id);
        }
        Ok(ids)
    }

    /// Stand-alone registry holding this scenario's routes
    pub fn route_table(&self) -> HarnessResult<RouteRegistry> {
        let registry = RouteRegistry::new(self.session.unmatched.unwrap_or_default());
        self.install_routes(&registry)?;
        Ok(registry)
    }

    /// Install routes and run every step on an open session
    pub async fn execute(&self, session: &mut Session) -> HarnessResult<()> {
        self.install_routes(session.routes())?;
        let total = self.steps.len();
        for (i, step) in self.steps.iter().enumerate() {
            tracing::info!(scenario = %self.name, step = i + 1, total, action = step.name(), "step");
            run_step(session, step).await?;
        }
        Ok(())
    }

    /// Full verification run of this scenario
    pub async fn run(
        &self,
        launcher: &dyn Launcher,
        config: SessionConfig,
        artifacts_dir: impl Into<PathBuf>,
    ) -> VerificationResult {
        let scenario = self.clone();
        Verification::new(self.name.clone())
            .with_artifacts_dir(artifacts_dir)
            .run(launcher, config, move |session| {
                Box::pin(async move { scenario.execute(session).await })
            })
            .await
    }
}

async fn run_step(session: &mut Session, step: &Step) -> HarnessResult<()> {
    match step {
        Step::Navigate { url, timeout_ms } => match timeout_ms {
            Some(ms) => session.navigate_with_timeout(url, *ms).await,
            None => session.navigate(url).await,
        },
        Step::Wait(wait) => {
            let condition = wait.condition(session.routes())?;
            if wait.soft {
                session.wait_soft(&condition, wait.timeout_ms).await.map(|_| ())
            } else {
                session.wait_until(&condition, wait.timeout_ms).await.map(|_| ())
            }
        }
        Step::Fill { selector, value } => session.fill(selector, value).await,
        Step::Click { selector } => session.click(selector).await,
        Step::Select { selector, value } => session.select_option(selector, value).await,
        Step::ExpectText { selector, equals } => session.expect_text(selector, equals).await,
        Step::ExpectVisible { selector } => session.expect_visible(selector).await,
        Step::ExpectCount { selector, at_least } => {
            session.expect_count_at_least(selector, *at_least).await
        }
        Step::ExpectAttribute {
            selector,
            name,
            equals,
        } => session.expect_attribute(selector, name, equals).await,
        Step::ExpectStatus { route, status } => {
            let id = session
                .routes()
                .find_by_label(route)
                .ok_or_else(|| HarnessError::scenario(format!("unknown route '{route}'")))?;
            session.expect_response_status(id, *status).await
        }
        Step::Screenshot { path } => session.screenshot(path).await.map(|_| ()),
    }
}
