//! tracesweep - command line front end.
//!
//! Thin wiring over the library:
//! - `list`  → profile discovery
//! - `clean` → orchestrated backup + removal (or a dry run)
//! - `scan`  → pattern analysis of arbitrary files
//!
//! Configuration comes from `<config-dir>/tracesweep.yaml` with
//! `TRACESWEEP_<SECTION>__<KEY>` environment overrides; command line flags win
//! over both. The confirmation prompt lives here, not in the engine.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracesweep::models::{AppConfig, BrowserKind, PatternMatch, RiskSummary, RunReport};
use tracesweep::services::{
    ArtifactCleanService, Orchestrator, PatternEngine, ProfileDiscovery, RunControl,
    SystemProcessController,
};
use tracesweep::{APP_NAME, ConfigManager, VERSION};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Find and remove tracked-service artifacts from local browser profiles",
    long_about = None
)]
struct Cli {
    /// Directory holding tracesweep.yaml
    #[arg(long, global = true, default_value = ".", env = "TRACESWEEP_CONFIG_DIR")]
    config_dir: Utf8PathBuf,

    /// Debug level logging
    #[arg(long, short, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered browser profiles
    List {
        #[arg(long)]
        json: bool,
    },

    /// Remove tracked-service cookies, storage and cache entries
    Clean {
        /// Count what would be removed without touching anything
        #[arg(long)]
        dry_run: bool,

        /// Skip the critical-file backup
        #[arg(long)]
        no_backup: bool,

        /// Only clean this browser (chrome, edge, firefox, ...)
        #[arg(long)]
        browser: Option<BrowserKind>,

        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,

        /// Abort the whole run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long)]
        json: bool,
    },

    /// Analyze files for telemetry patterns
    Scan {
        #[arg(required = true)]
        files: Vec<Utf8PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut config = config_manager.load()?;
    if cli.debug {
        config.logging.debug = true;
    }

    let _guard = tracesweep::logging::setup_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tracesweep-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let code = match cli.command {
        Command::List { json } => list(json)?,
        Command::Clean {
            dry_run,
            no_backup,
            browser,
            yes,
            timeout,
            json,
        } => {
            config.cleaner.dry_run |= dry_run;
            if no_backup {
                config.cleaner.create_backup = false;
            }
            if browser.is_some() {
                config.cleaner.target_browser = browser;
            }
            runtime.block_on(clean(&config, yes, timeout, json))?
        }
        Command::Scan { files, json } => scan(&config, &files, json)?,
    };

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");
    Ok(code)
}

fn list(json: bool) -> Result<ExitCode> {
    let profiles = ProfileDiscovery::new().discover();

    if json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
    } else if profiles.is_empty() {
        println!("No browser profiles found");
    } else {
        for profile in &profiles {
            let marker = if profile.is_default { " (default)" } else { "" };
            println!("{:<40} {}{}", profile.display_name, profile.profile_dir, marker);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn clean(config: &AppConfig, yes: bool, timeout: Option<u64>, json: bool) -> Result<ExitCode> {
    let settings = config.cleaner.clone();
    let cleaner = ArtifactCleanService::new(settings.clone(), &config.tracked_service);
    let processes = SystemProcessController::new(settings.graceful_wait());
    let orchestrator = Orchestrator::new(ProfileDiscovery::new(), processes, cleaner);

    if !settings.dry_run && settings.confirm_required && !yes {
        let profiles = orchestrator.profiles();
        if profiles.is_empty() {
            println!("No browser profiles found");
            return Ok(ExitCode::SUCCESS);
        }

        println!(
            "About to remove {} artifacts from {} profile(s). Running browsers will be closed:",
            config.tracked_service.name,
            profiles.len()
        );
        for profile in &profiles {
            println!("  {}", profile.display_name);
        }
        if !confirm("Continue? [y/N] ")? {
            println!("Aborted");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let (handle, mut control) = RunControl::new();
    if let Some(secs) = timeout {
        control = control.with_timeout(Duration::from_secs(secs));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            handle.cancel();
        }
    });

    let report = orchestrator.run(&control).await;
    orchestrator.metrics().log_summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if report.totals.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_report(report: &RunReport) {
    for result in &report.results {
        println!("{}: {}", result.display_name, result.summary());
        if let Some(backup) = &result.backup_path {
            println!("    backup: {}", backup);
        }
        for error in &result.errors {
            println!("    error: {}", error);
        }
        for action in &result.manual_actions {
            println!("    manual: {}", action);
        }
    }

    let totals = &report.totals;
    println!(
        "\n{} profile(s): {} cookies, {} storage items, {} cache items, {} error(s)",
        totals.profiles,
        totals.cookies_deleted,
        totals.storage_items_deleted,
        totals.cache_items_deleted,
        totals.errors
    );
}

fn scan(config: &AppConfig, files: &[Utf8PathBuf], json: bool) -> Result<ExitCode> {
    let engine = PatternEngine::with_service_variants(&config.tracked_service.naming_variants());
    let mut found: IndexMap<String, Vec<PatternMatch>> = IndexMap::new();
    let mut failed = false;

    for file in files {
        match engine.analyze_file(file) {
            Ok(matches) => {
                found.insert(file.to_string(), matches);
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                eprintln!("{}: {:#}", file, e);
                failed = true;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        for (file, matches) in &found {
            for m in matches {
                println!(
                    "{}:{}:{} [{}] {} ({:.2}) {}",
                    file,
                    m.line,
                    m.column,
                    m.risk,
                    m.pattern,
                    m.confidence,
                    m.context.trim()
                );
            }
        }

        let all: Vec<PatternMatch> = found.into_values().flatten().collect();
        let summary = RiskSummary::from_matches(&all);
        println!(
            "\n{} match(es), highest risk {}: {} critical, {} high, {} medium, {} low",
            summary.total(),
            summary.highest,
            summary.critical,
            summary.high,
            summary.medium,
            summary.low
        );
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
