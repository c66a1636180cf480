//! ClipForge — command-line entry point (§6).
//!
//! Parses the flag surface, runs the health check, builds the job
//! `Config`, drives the orchestrator, writes the CSV log, and maps the
//! outcome to a process exit code. `anyhow` is used only here, at the
//! binary boundary; every library crate below propagates its own
//! `thiserror` enum.

use anyhow::{Context, Result};
use clap::Parser;
use clipforge_core::Config;
use clipforge_pipeline::{csv_log_path, write_csv_log, JobOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for invalid arguments or configuration (§6).
const EXIT_MISUSE: u8 = 3;
/// Exit code for an unhealthy model endpoint (§6).
const EXIT_UNHEALTHY: u8 = 4;
/// Exit code for an unrecoverable job failure (§6).
const EXIT_JOB_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "clipforge", version, about = "Extract ranked, captioned vertical clips from a long-form video")]
struct Cli {
    /// Source video URL or local file path.
    #[arg(long)]
    url: Option<String>,

    /// Number of top clips to produce.
    #[arg(long, default_value_t = 5)]
    k: usize,

    /// Directory rendered clips and the CSV log are written to. Defaults to
    /// `./rendered_clips` unless overridden by the config file (§6:
    /// defaults → file → flags precedence).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional JSON config file merged on top of the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Check both model endpoints' `/health` and exit without running a job.
    #[arg(long)]
    health_check: bool,

    /// Raise the default log level from `info` to `debug`.
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(EXIT_JOB_FAILED);
        }
    };

    runtime.block_on(run(cli))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> ExitCode {
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(EXIT_MISUSE);
        }
    };

    let client = reqwest::Client::new();

    if cli.health_check {
        return match health_check(&client, &config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "health check failed");
                ExitCode::from(EXIT_UNHEALTHY)
            }
        };
    }

    let Some(url) = cli.url.clone() else {
        error!("--url is required unless --health-check is passed");
        return ExitCode::from(EXIT_MISUSE);
    };

    if let Err(e) = health_check(&client, &config).await {
        error!(error = %e, "model endpoints unhealthy");
        return ExitCode::from(EXIT_UNHEALTHY);
    }

    if let Err(e) = clipforge_media::init() {
        error!(error = %e, "failed to initialize ffmpeg");
        return ExitCode::from(EXIT_JOB_FAILED);
    }

    let cancel = clipforge_core::CancellationToken::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling job");
            cancel_signal.cancel();
        }
    });

    let job = match clipforge_pipeline::run_job(&config, &url, &client, &cancel).await {
        Ok(job) => job,
        Err(e) => {
            error!(error = %e, "job failed");
            return ExitCode::from(EXIT_JOB_FAILED);
        }
    };

    let log_path = csv_log_path(&config.output_dir, &job.media.id);
    if let Err(e) = write_csv_log(&log_path, &job.clips_log) {
        error!(error = %e, path = %log_path.display(), "failed to write CSV log");
        return ExitCode::from(EXIT_JOB_FAILED);
    }
    info!(path = %log_path.display(), clips = job.clips_log.len(), "job complete");

    match job.outcome {
        JobOutcome::Success => ExitCode::SUCCESS,
        JobOutcome::PartialSuccess => ExitCode::from(1),
        JobOutcome::AllClipsFailed => ExitCode::from(EXIT_JOB_FAILED),
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::default();
    if let Some(path) = &cli.config {
        config = config.load_and_merge(path).with_context(|| format!("loading {}", path.display()))?;
    }
    if let Some(output_dir) = &cli.output_dir {
        config.output_dir = output_dir.clone();
    }
    config.k = cli.k;
    config.validate()?;
    Ok(config)
}

async fn health_check(client: &reqwest::Client, config: &Config) -> Result<()> {
    for (name, base_url) in [
        ("whisper", &config.whisper_server_url),
        ("chat", &config.chat_server_url),
    ] {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{name} endpoint unreachable at {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("{name} endpoint returned {}", response.status());
        }
    }
    Ok(())
}
