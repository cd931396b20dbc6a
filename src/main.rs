/*============================================================
  Project: apkd
  Module: apkd::main
  ------------------------------------------------------------
  Purpose:
    Entry point for apkd. Parses operator intent, builds the
    source table, catalog, downloader and task runner, and
    renders the batch report.

  Security / Safety Notes:
    Operates within user privileges. Performs HTTPS GET
    requests and writes artifacts to the chosen output only.

  Dependencies:
    clap for CLI parsing, chrono for session stamps.

  Operational Scope:
    Invoked directly by operators or from scripts; the exit
    code reports whether every requested package resolved.

  Revision History:
    2026-09-10  Authored apkd runtime.
  ------------------------------------------------------------
  Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging with an explicit session log
    - Configurable execution via CLI and config file
============================================================*/

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{ArgAction, ArgGroup, Parser};

use apkd::catalog::Catalog;
use apkd::config::ApkdConfig;
use apkd::download::Downloader;
use apkd::error::{ApkdError, Result};
use apkd::logger::Logger;
use apkd::render::{render_report, TerminalProgress};
use apkd::runner::{Operation, OutputTarget, TaskRunner};
use apkd::sources;
use apkd::task::{read_package_list, Task};

/// Command-line arguments for apkd.
#[derive(Debug, Parser)]
#[command(
    name = "apkd",
    version,
    about = "Find and download Android packages across distribution channels"
)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["list_versions", "download", "list_developers"])
))]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["package", "packages_list", "developer_id"])
))]
struct Cli {
    /// Package name.
    #[arg(short, long, value_name = "PKG")]
    package: Option<String>,
    /// File with one `package` or `package==versionCode` per line.
    #[arg(short = 'l', long, value_name = "PATH")]
    packages_list: Option<PathBuf>,
    /// Process every package published by this developer.
    #[arg(long, value_name = "ID")]
    developer_id: Option<String>,
    /// Version code to download instead of the newest.
    #[arg(long, value_name = "CODE")]
    version_code: Option<i64>,
    /// List available versions.
    #[arg(long, action = ArgAction::SetTrue)]
    list_versions: bool,
    /// Download the selected version.
    #[arg(short, long, action = ArgAction::SetTrue)]
    download: bool,
    /// List developer identities per source.
    #[arg(long, action = ArgAction::SetTrue)]
    list_developers: bool,
    /// Restrict lookups to these sources.
    #[arg(short, long = "source", value_name = "NAME", action = ArgAction::Append)]
    sources: Vec<String>,
    /// Output file, or directory for multi-package downloads.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Cap the number of versions listed per source.
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
    /// Number of packages processed in parallel.
    #[arg(short = 'j', long, value_name = "N")]
    concurrency: Option<usize>,
    /// Override configuration file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Enable verbose logging to stderr.
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[apkd] {err}");
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.version_code.is_some() && !cli.download {
        return Err(ApkdError::Config(
            "--version-code can only be used with --download".into(),
        ));
    }

    let config = ApkdConfig::load_from_optional_path(cli.config.as_deref())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .unwrap_or_else(|| config.log_dir().join(format!("apkd_{session_stamp}.log")));
    let logger = Arc::new(Logger::new(Some(log_path), cli.verbose)?);
    logger.info("INIT", "apkd starting.");

    let client = sources::http_client(&config.http)?;
    let selected = sources::select(sources::registry(&config, &client), &cli.sources)?;
    logger.info(
        "SOURCES",
        format!(
            "Using {}",
            selected
                .iter()
                .map(|source| source.name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    );

    let catalog = Arc::new(Catalog::new(selected, Arc::clone(&logger)));
    let downloader = Arc::new(Downloader::new(client, Arc::clone(&logger)));
    let concurrency = cli.concurrency.unwrap_or(config.general.concurrency);
    let progress = Arc::new(TerminalProgress::new());
    logger.attach_progress(progress.bars());
    let runner = TaskRunner::new(
        Arc::clone(&catalog),
        downloader,
        Arc::clone(&logger),
        concurrency,
    )
    .with_progress(progress);

    let cancel = runner.cancellation_token();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut versions_limit = cli.limit;
    let tasks = if let Some(package) = &cli.package {
        vec![Task {
            package: package.clone(),
            version_code: cli.version_code,
        }]
    } else if let Some(list) = &cli.packages_list {
        read_package_list(list, &logger)?
    } else if let Some(developer) = &cli.developer_id {
        let packages = catalog.get_packages_from_developer(developer, &cancel).await?;
        if packages.is_empty() {
            logger.finalize()?;
            return Err(ApkdError::DeveloperNotFound {
                developer: developer.clone(),
            });
        }
        versions_limit = versions_limit.or(Some(1));
        packages.into_iter().map(|package| Task::newest(package)).collect()
    } else {
        Vec::new()
    };

    if tasks.is_empty() {
        logger.warn("EMPTY", "No packages selected; exiting");
        logger.finalize()?;
        return Ok(ExitCode::SUCCESS);
    }

    let operation = if cli.download {
        Operation::Download {
            output: output_target(cli.output.clone(), tasks.len(), &config),
        }
    } else if cli.list_developers {
        Operation::ListDevelopers
    } else {
        Operation::ListVersions { versions_limit }
    };

    let report = runner.run(tasks, operation.clone()).await?;
    println!("{}", render_report(&report, &operation));

    logger.info(
        "SUMMARY",
        format!(
            "tasks={} failed={} peak_in_flight={}",
            report.outcomes.len(),
            report.failed(),
            report.peak_in_flight
        ),
    );
    logger.finalize()?;

    if cancel.is_cancelled() {
        return Ok(ApkdError::Cancelled.exit_code());
    }
    if !report.all_succeeded() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// An explicit output names a file for single downloads, a directory otherwise.
fn output_target(output: Option<PathBuf>, task_count: usize, config: &ApkdConfig) -> OutputTarget {
    match output {
        Some(path) if task_count == 1 && !path.is_dir() => OutputTarget::File(path),
        Some(path) => OutputTarget::Directory(path),
        None => OutputTarget::Directory(config.output_dir()),
    }
}
