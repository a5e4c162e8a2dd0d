//! Mockprobe CLI: run browser verification scenarios
//!
//! ## Usage
//!
//! ```bash
//! mockprobe run scenarios/*.yaml             # Run scenarios headless
//! mockprobe run club.yaml --headed --strict  # Watch it, abort unmocked calls
//! mockprobe validate scenarios/*.yaml        # Check files without a browser
//! mockprobe routes club.yaml --url http://localhost:3000/api/club/1
//! ```

use clap::Parser;
use mockprobe::{ChromiumLauncher, Scenario, UnmatchedPolicy};
use mockprobe_cli::{
    check_summary, init_logging, prepare, probe, render_route_table, route_rows, validate_files,
    write_report, Cli, CliConfig, CliResult, ColorChoice, Commands, LogFormat, ProgressReporter,
    RoutesArgs, RunArgs, ScenarioRunner, SessionOverrides, ValidateArgs, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);

    if let Err(e) = init_logging(
        config.verbosity,
        config.log_format,
        config.color.should_color(),
    ) {
        eprintln!("Warning: {e}");
    }

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(ColorChoice::from(cli.color))
        .with_log_format(LogFormat::from(cli.log_format))
}

fn run(command: Commands, config: &CliConfig) -> CliResult<()> {
    match command {
        Commands::Run(args) => run_scenarios(config, &args),
        Commands::Validate(args) => run_validate(config, &args),
        Commands::Routes(args) => run_routes(&args),
    }
}

fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
}

fn run_scenarios(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let prepared = prepare(&args.scenarios, &SessionOverrides::from(args))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let launcher = ChromiumLauncher::new();
    let mut runner =
        ScenarioRunner::new(config, args.artifacts.clone()).with_fail_fast(args.fail_fast);
    let summary = runtime.block_on(runner.run(&launcher, &prepared));

    if let Some(path) = &args.report {
        write_report(path, &summary)?;
        runner
            .reporter()
            .info(&format!("report written to {}", path.display()));
    }
    check_summary(&summary)
}

fn run_validate(config: &CliConfig, args: &ValidateArgs) -> CliResult<()> {
    validate_files(&args.scenarios, &reporter(config))
}

fn run_routes(args: &RoutesArgs) -> CliResult<()> {
    let scenario = Scenario::load(&args.scenario)?;
    print!("{}", render_route_table(&route_rows(&scenario)?));

    if let Some(url) = &args.url {
        let method = args.method.as_deref().unwrap_or("GET").to_uppercase();
        match probe(&scenario, url, &method)? {
            Some(route) => println!("\n{method} {url} -> {}", route.label),
            None => {
                let fallback = match scenario.session.unmatched.unwrap_or_default() {
                    UnmatchedPolicy::PassThrough => "passes through to the network",
                    UnmatchedPolicy::Abort => "is aborted",
                };
                println!("\n{method} {url} -> no route; request {fallback}");
            }
        }
    }
    Ok(())
}
