//! Hostspec - evaluate compliance profiles against a host.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{FileConfig, Overrides, RunConfig};
use hostspec_common::{OsType, Timestamp};
use hostspec_engine::{
    render, summarize, Engine, ProfileInfo, ReportFormat, RunReport, RunResults,
};
use hostspec_profile::{ControlFilter, Impact, Profile};
use hostspec_providers::{ProviderRegistry, Target};
use hostspec_redaction::{Redactor, RedactorConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hostspec")]
#[command(
    author,
    version,
    about = "Evaluate compliance profiles against a local or remote host"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a profile against a target
    Exec {
        /// Profile file (YAML or JSON)
        profile: PathBuf,

        /// Target: "local" or ssh://user@host[:port]
        #[arg(long, short)]
        target: Option<Target>,

        /// SSH private key path
        #[arg(long)]
        ssh_key: Option<PathBuf>,

        /// SSH password
        #[arg(long)]
        ssh_password: Option<String>,

        /// Target operating system (linux, windows)
        #[arg(long)]
        os: Option<OsType>,

        #[command(flatten)]
        filter: FilterArgs,

        /// Lowest impact whose failures fail the run
        #[arg(long)]
        fail_threshold: Option<Impact>,

        /// Controls evaluated concurrently
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Per-operation timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Report format (text, json)
        #[arg(long, short)]
        format: Option<ReportFormat>,

        /// Write the report here instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Run configuration file (YAML)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Load and validate a profile without evaluating it
    Check {
        /// Profile file (YAML or JSON)
        profile: PathBuf,
    },

    /// List the controls of a profile
    List {
        /// Profile file (YAML or JSON)
        profile: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Only these control ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    controls: Vec<String>,

    /// Only controls carrying one of these tags (comma separated)
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Only controls at or above this impact
    #[arg(long)]
    min_impact: Option<Impact>,
}

impl From<FilterArgs> for ControlFilter {
    fn from(args: FilterArgs) -> Self {
        ControlFilter {
            ids: args.controls,
            tags: args.tags,
            min_impact: args.min_impact,
        }
    }
}

/// Exit code for usage, configuration and load errors.
const ERROR_EXIT_CODE: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { ERROR_EXIT_CODE } else { 0 });
        }
    };

    init_tracing(cli.verbose, &cli.log_format);

    let code = match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ERROR_EXIT_CODE
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool, log_format: &str) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    // Reports go to stdout; logs stay on stderr.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::Exec {
            profile,
            target,
            ssh_key,
            ssh_password,
            os,
            filter,
            fail_threshold,
            jobs,
            timeout,
            format,
            out,
            config,
        } => {
            let file = match &config {
                Some(path) => FileConfig::load(path)?,
                None => FileConfig::default(),
            };
            let overrides = Overrides {
                target,
                os,
                ssh_key,
                ssh_password,
                timeout_secs: timeout,
                jobs,
                fail_threshold,
                format,
            };
            let run_config = RunConfig::resolve(file, overrides)?;
            exec(&profile, filter.into(), run_config, out.as_deref()).await
        }

        Commands::Check { profile } => check(&profile),

        Commands::List { profile, filter } => {
            let profile = load_profile(&profile)?;
            let filter: ControlFilter = filter.into();
            println!("{:<30} {:<10} {:<24} Title", "Control", "Impact", "Tags");
            println!("{:-<80}", "");
            for control in profile.registry.filter(|c| filter.matches(c)) {
                println!(
                    "{:<30} {:<10} {:<24} {}",
                    control.id,
                    control.impact.to_string(),
                    control.tags.join(","),
                    control.title.as_deref().unwrap_or_default()
                );
            }
            Ok(0)
        }
    }
}

fn load_profile(path: &Path) -> Result<Profile> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    Profile::load(path, &vars).with_context(|| format!("Cannot load {}", path.display()))
}

fn check(path: &Path) -> Result<i32> {
    let profile = load_profile(path)?;
    let providers = ProviderRegistry::with_defaults();
    let issues = providers.preflight(profile.registry.all().map(|c| &**c));

    for warning in &profile.warnings {
        println!("warning: {}", warning);
    }
    for issue in &issues {
        println!("error: {}", issue);
    }
    if !issues.is_empty() {
        return Ok(ERROR_EXIT_CODE);
    }

    println!(
        "{}: {} controls OK (sha256 {})",
        profile.name,
        profile.registry.len(),
        profile.digest
    );
    Ok(0)
}

async fn exec(
    path: &Path,
    filter: ControlFilter,
    config: RunConfig,
    out: Option<&Path>,
) -> Result<i32> {
    let profile = load_profile(path)?;
    let controls = profile.registry.select(&filter);
    if controls.is_empty() {
        warn!("No controls selected from profile {}", profile.name);
    }

    let providers = ProviderRegistry::with_defaults();
    for issue in providers.preflight(controls.iter().map(|c| &**c)) {
        warn!("{}", issue);
    }

    let executor = config
        .target
        .connect(&config.connect)
        .await
        .with_context(|| format!("Failed to connect to {}", config.target))?;

    let redactor = Redactor::with_config(RedactorConfig {
        additional_patterns: config.redaction_patterns.clone(),
        ..Default::default()
    });
    for (key, value) in config.entries() {
        let (value, _) = redactor.redact_key_value(key, &value);
        debug!("{} = {}", key, value);
    }
    let engine = Engine::new(providers, executor, config.engine.clone()).with_redactor(redactor);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, reporting partial results");
            let _ = cancel_tx.send(true);
        }
    });

    let started_at = Timestamp::now();
    let RunResults { results, cancelled } = engine.run_until(&controls, cancel_rx).await;
    let finished_at = Timestamp::now();

    let summary = summarize(&results, config.fail_threshold);
    let report = RunReport::new(
        ProfileInfo {
            name: profile.name.clone(),
            digest: profile.digest.clone(),
        },
        config.target.to_string(),
        started_at,
        finished_at,
        cancelled,
        results,
        summary,
    );

    let rendered = render(&report, config.format).context("Failed to render report")?;
    match out {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => print!("{}", rendered),
    }

    info!(
        "Run {} {}: {} passed, {} failed, {} errors, {} skipped",
        report.run_id,
        report.summary.status,
        report.summary.controls.passed,
        report.summary.controls.failed,
        report.summary.controls.errors,
        report.summary.controls.skipped
    );
    Ok(report.summary.exit_code())
}
