//! Scenario loading and execution

use crate::config::{CliConfig, SessionOverrides};
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use mockprobe::scenario::RouteSpec;
use mockprobe::{
    HarnessError, HttpMethod, Launcher, RouteInfo, RunSummary, Scenario, SessionConfig,
    VerificationResult,
};
use std::path::{Path, PathBuf};

/// A validated scenario with its effective session configuration
#[derive(Debug, Clone)]
pub struct PreparedScenario {
    /// File it came from
    pub path: PathBuf,
    /// Parsed document
    pub scenario: Scenario,
    /// Scenario `session:` block with command-line overrides applied
    pub config: SessionConfig,
}

/// Load, validate and configure every file before anything launches
pub fn prepare(paths: &[PathBuf], overrides: &SessionOverrides) -> CliResult<Vec<PreparedScenario>> {
    paths
        .iter()
        .map(|path| {
            let scenario = Scenario::load(path)?;
            let config = overrides.apply(scenario.session_config()?);
            Ok(PreparedScenario {
                path: path.clone(),
                scenario,
                config,
            })
        })
        .collect()
}

/// Runs prepared scenarios one after another
#[derive(Debug)]
pub struct ScenarioRunner {
    reporter: ProgressReporter,
    artifacts: PathBuf,
    fail_fast: bool,
}

impl ScenarioRunner {
    /// Create a runner writing failure screenshots under `artifacts`
    #[must_use]
    pub fn new(config: &CliConfig, artifacts: impl Into<PathBuf>) -> Self {
        Self {
            reporter: ProgressReporter::new(
                config.color.should_color(),
                config.verbosity.is_quiet(),
            ),
            artifacts: artifacts.into(),
            fail_fast: false,
        }
    }

    /// Stop after the first failing scenario
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Reporter used for progress lines
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Execute every scenario with its own browser session
    pub async fn run(&mut self, launcher: &dyn Launcher, scenarios: &[PreparedScenario]) -> RunSummary {
        let total = scenarios.len();
        let mut results: Vec<VerificationResult> = Vec::with_capacity(total);
        for (i, prepared) in scenarios.iter().enumerate() {
            let name = &prepared.scenario.name;
            tracing::info!(scenario = %name, path = %prepared.path.display(), "running scenario");
            self.reporter.start_scenario(i, total, name);
            let result = prepared
                .scenario
                .run(launcher, prepared.config.clone(), self.artifacts.clone())
                .await;
            self.reporter.finish_scenario();
            self.reporter.result(&result);

            let failed = !result.passed;
            results.push(result);
            if failed && self.fail_fast && i + 1 < total {
                self.reporter
                    .warning(&format!("stopping early, {} scenario(s) not run", total - i - 1));
                break;
            }
        }
        let summary = RunSummary::new(results);
        self.reporter.summary(&summary);
        summary
    }
}

/// Write the summary as pretty JSON
pub fn write_report(path: &Path, summary: &RunSummary) -> CliResult<()> {
    let json = summary
        .to_json()
        .map_err(|e| CliError::report_generation(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| CliError::report_generation(format!("{}: {e}", parent.display())))?;
    }
    std::fs::write(path, json)
        .map_err(|e| CliError::report_generation(format!("{}: {e}", path.display())))
}

/// Exit status for a finished run
pub fn check_summary(summary: &RunSummary) -> CliResult<()> {
    if summary.all_passed() {
        Ok(())
    } else {
        Err(CliError::VerificationFailed {
            failed: summary.failed,
            total: summary.passed + summary.failed,
        })
    }
}

/// Validate files, reporting each; fails if any is invalid
pub fn validate_files(paths: &[PathBuf], reporter: &ProgressReporter) -> CliResult<()> {
    let mut invalid = Vec::new();
    for path in paths {
        match Scenario::load(path).and_then(|s| s.session_config().map(|_| s)) {
            Ok(s) => reporter.success(&format!(
                "{}: {} ({} route(s), {} step(s))",
                path.display(),
                s.name,
                s.routes.len(),
                s.steps.len()
            )),
            Err(e) => {
                reporter.failure(&e.to_string());
                invalid.push(path.display().to_string());
            }
        }
    }
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::scenario(format!("invalid scenario file(s): {}", invalid.join(", "))).into())
    }
}

/// What a route does with the requests it claims
#[must_use]
pub fn describe_action(spec: &RouteSpec) -> String {
    if spec.abort {
        return format!("abort {}", spec.reason.unwrap_or_default().message());
    }
    if spec.observe {
        return "observe".to_string();
    }
    let status = spec.status.unwrap_or(200);
    let mut action = if spec.json.is_some() {
        format!("json {status}")
    } else {
        format!("text {status}")
    };
    if let Some(ms) = spec.delay_ms {
        action.push_str(&format!(" after {ms}ms"));
    }
    action
}

/// Route table rows in registration order
pub fn route_rows(scenario: &Scenario) -> CliResult<Vec<(RouteInfo, String)>> {
    let table = scenario.route_table()?;
    Ok(table
        .routes()
        .into_iter()
        .zip(&scenario.routes)
        .map(|(info, spec)| (info, describe_action(spec)))
        .collect())
}

/// Route that would answer `method url`, if any
pub fn probe(scenario: &Scenario, url: &str, method: &str) -> CliResult<Option<RouteInfo>> {
    let table = scenario.route_table()?;
    Ok(table.matching_route(url, &HttpMethod::parse(method)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use mockprobe::scripted::{
        ScriptedApp, ScriptedElement, ScriptedFetch, ScriptedLauncher, ScriptedPageDef,
    };
    use mockprobe::UnmatchedPolicy;
    use std::fs;

    const CLUB: &str = r#"
version: "1.0"
name: club-overview
base_url: http://localhost:3000
session:
  element_timeout_ms: 1000
  wait_timeout_ms: 1000
routes:
  - id: club
    pattern: "**/api/club/1"
    method: GET
    json: { id: 1, name: "My Club" }
  - pattern: "**/ws/**"
    abort: true
steps:
  - navigate: { url: /club }
  - wait: { route: club }
  - expect_text: { selector: ".club-name", equals: "My Club" }
"#;

    fn club_app() -> ScriptedApp {
        ScriptedApp::new().page(
            ScriptedPageDef::at("**/club").unwrap().fetch(
                ScriptedFetch::get("/api/club/1").render_json(|v| {
                    vec![ScriptedElement::new(".club-name")
                        .with_text(v["name"].as_str().unwrap_or_default())]
                }),
            ),
        )
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    mod prepare_tests {
        use super::*;

        #[test]
        fn test_overrides_applied() {
            let dir = tempfile::tempdir().unwrap();
            let path = write(dir.path(), "club.yaml", CLUB);
            let overrides = SessionOverrides {
                strict: true,
                ..SessionOverrides::default()
            };
            let prepared = prepare(&[path], &overrides).unwrap();
            assert_eq!(prepared[0].scenario.name, "club-overview");
            assert_eq!(prepared[0].config.unmatched, UnmatchedPolicy::Abort);
            assert_eq!(prepared[0].config.element_timeout_ms, 1000);
        }

        #[test]
        fn test_invalid_file_is_usage_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = write(dir.path(), "bad.yaml", "version: \"2.0\"\nname: x\n");
            let err = prepare(&[path], &SessionOverrides::default()).unwrap_err();
            assert_eq!(err.exit_code(), crate::error::EXIT_USAGE);
        }

        #[test]
        fn test_missing_file_is_usage_error() {
            let err = prepare(
                &[PathBuf::from("/nonexistent/mockprobe.yaml")],
                &SessionOverrides::default(),
            )
            .unwrap_err();
            assert_eq!(err.exit_code(), crate::error::EXIT_USAGE);
        }
    }

    mod run_tests {
        use super::*;

        #[tokio::test]
        async fn test_run_and_report() {
            let dir = tempfile::tempdir().unwrap();
            let path = write(dir.path(), "club.yaml", CLUB);
            let prepared = prepare(&[path], &SessionOverrides::default()).unwrap();
            let launcher = ScriptedLauncher::new(club_app());
            let config = CliConfig::new().with_verbosity(crate::config::Verbosity::Quiet);

            let mut runner = ScenarioRunner::new(&config, dir.path().join("artifacts"));
            let summary = runner.run(&launcher, &prepared).await;
            assert!(summary.all_passed());
            assert!(check_summary(&summary).is_ok());

            let report = dir.path().join("out/summary.json");
            write_report(&report, &summary).unwrap();
            let json: serde_json::Value =
                serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
            assert_eq!(json["passed"], 1);
            assert_eq!(json["results"][0]["label"], "club-overview");
        }

        #[tokio::test]
        async fn test_fail_fast_stops_early() {
            let dir = tempfile::tempdir().unwrap();
            let failing = CLUB.replace("equals: \"My Club\"", "equals: \"Other\"");
            let a = write(dir.path(), "a.yaml", &failing);
            let b = write(dir.path(), "b.yaml", CLUB);
            let prepared = prepare(&[a, b], &SessionOverrides::default()).unwrap();
            let launcher = ScriptedLauncher::new(club_app());
            let config = CliConfig::new().with_verbosity(crate::config::Verbosity::Quiet);

            let mut runner =
                ScenarioRunner::new(&config, dir.path().join("artifacts")).with_fail_fast(true);
            let summary = runner.run(&launcher, &prepared).await;
            assert_eq!(summary.results.len(), 1);
            assert_eq!(launcher.launches(), 1);
            let err = check_summary(&summary).unwrap_err();
            assert_eq!(err.exit_code(), crate::error::EXIT_VERIFICATION_FAILED);
        }
    }

    mod routes_tests {
        use super::*;

        #[test]
        fn test_rows_and_probe() {
            let scenario = Scenario::from_yaml(CLUB).unwrap();
            let rows = route_rows(&scenario).unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].0.label, "club");
            assert_eq!(rows[0].1, "json 200");
            assert!(rows[1].1.starts_with("abort net::ERR_"));

            let hit = probe(&scenario, "http://localhost:3000/api/club/1", "GET").unwrap();
            assert_eq!(hit.unwrap().label, "club");
            let miss = probe(&scenario, "http://localhost:3000/api/club/1", "DELETE").unwrap();
            assert!(miss.is_none());
        }

        #[test]
        fn test_validate_files_reports_invalid() {
            let dir = tempfile::tempdir().unwrap();
            let good = write(dir.path(), "good.yaml", CLUB);
            let bad = write(
                dir.path(),
                "bad.yaml",
                "version: \"1.0\"\nname: bad\nsteps:\n  - wait: { route: missing }\n",
            );
            let reporter = ProgressReporter::new(false, true);
            assert!(validate_files(&[good.clone()], &reporter).is_ok());
            let err = validate_files(&[good, bad], &reporter).unwrap_err();
            assert!(err.to_string().contains("bad.yaml"));
            assert_eq!(err.exit_code(), crate::error::EXIT_USAGE);
        }
    }
}
