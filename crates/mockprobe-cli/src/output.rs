//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use mockprobe::{RouteInfo, RunSummary, VerificationResult};
use std::time::Duration;

/// User-facing progress and result lines on stderr
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    spinner: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            spinner: None,
            use_color,
            quiet,
        }
    }

    /// Show a spinner while a scenario runs
    pub fn start_scenario(&mut self, index: usize, total: usize, name: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{pos}/{len}] {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_length(total as u64);
        pb.set_position(index as u64 + 1);
        pb.set_message(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
    }

    /// Clear the spinner
    pub fn finish_scenario(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // failures print even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Report one finished run
    pub fn result(&self, result: &VerificationResult) {
        for soft in &result.soft_failures {
            self.warning(&format!("{}: {}", result.label, soft.message));
        }
        if result.passed {
            self.success(&format!("{} ({}ms)", result.label, result.duration_ms));
            return;
        }
        self.failure(&format!(
            "{}: {}",
            result.label,
            result.detail.as_deref().unwrap_or("failed")
        ));
        if let Some(path) = &result.artifact {
            let _ = self
                .term
                .write_line(&format!("    screenshot: {}", path.display()));
        }
    }

    /// Print the run summary line
    pub fn summary(&self, summary: &RunSummary) {
        if self.quiet && summary.all_passed() {
            return;
        }
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&summary_line(summary, self.use_color));
    }
}

/// One-line run summary
#[must_use]
pub fn summary_line(summary: &RunSummary, use_color: bool) -> String {
    let total = summary.passed + summary.failed;
    let secs = Duration::from_millis(summary.duration_ms).as_secs_f64();
    let status = if summary.all_passed() { "PASSED" } else { "FAILED" };
    if !use_color {
        return format!(
            "{status} {total} scenario(s) in {secs:.2}s ({} passed, {} failed)",
            summary.passed, summary.failed
        );
    }
    let passed_style = Style::new().green().bold();
    let failed_style = Style::new().red().bold();
    let status = if summary.all_passed() {
        passed_style.apply_to(status)
    } else {
        failed_style.apply_to(status)
    };
    format!(
        "{status} {total} scenario(s) in {secs:.2}s ({} passed, {} failed)",
        passed_style.apply_to(summary.passed),
        if summary.failed > 0 {
            failed_style.apply_to(summary.failed).to_string()
        } else {
            summary.failed.to_string()
        }
    )
}

/// Route table, one line per route in registration order
#[must_use]
pub fn render_route_table(routes: &[(RouteInfo, String)]) -> String {
    let label_width = routes
        .iter()
        .map(|(r, _)| r.label.len())
        .max()
        .unwrap_or(0)
        .max("ROUTE".len());
    let pattern_width = routes
        .iter()
        .map(|(r, _)| r.pattern.len())
        .max()
        .unwrap_or(0)
        .max("PATTERN".len());

    let mut out = format!(
        "{:>3}  {:<label_width$}  {:<7}  {:<pattern_width$}  ACTION\n",
        "#", "ROUTE", "METHOD", "PATTERN"
    );
    for (i, (route, action)) in routes.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<label_width$}  {:<7}  {:<pattern_width$}  {action}\n",
            i + 1,
            route.label,
            route.method.as_str(),
            route.pattern
        ));
    }
    out
}
