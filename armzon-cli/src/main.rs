//! Armzon installer CLI
//!
//! Downloads and installs the game archive, verifies an existing
//! installation, or removes it.

mod progress;

use anyhow::{Context, Result};
use armzon_core::installer::{paths, EntryStatus};
use armzon_core::{event_channel, InstallationOrchestrator, InstallerConfig, Outcome};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use progress::{format_bytes, InstallProgress};

const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "armzon-install", version, about = "ArmzonRP game installer")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the install root from the config file
    #[arg(long, global = true)]
    install_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the game archive and install it
    Install {
        /// Archive URL
        url: String,

        /// Do not draw a progress bar
        #[arg(long)]
        quiet: bool,
    },
    /// Check installed files against the install manifest
    Verify,
    /// Remove the installation
    Uninstall,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {e:#}");
    }

    tracing::info!("Starting armzon-install v{}", armzon_core::VERSION);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("armzon=debug".parse()?)
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let orchestrator =
        InstallationOrchestrator::new(config).context("Failed to create installer")?;

    match cli.command {
        Command::Install { url, quiet } => install(&orchestrator, url, quiet).await,
        Command::Verify => verify(&orchestrator).await,
        Command::Uninstall => {
            orchestrator
                .uninstall()
                .await
                .context("Failed to uninstall")?;
            println!("Removed {}", orchestrator.install_root().display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> Result<InstallerConfig> {
    let path = cli.config.clone().unwrap_or_else(paths::default_config_path);
    let mut config = InstallerConfig::load_from(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(root) = &cli.install_root {
        config.install_root = root.clone();
    }

    tracing::debug!(config = %path.display(), root = %config.install_root.display(), "Config loaded");
    Ok(config)
}

async fn install(orchestrator: &InstallationOrchestrator, url: String, quiet: bool) -> Result<ExitCode> {
    let progress = InstallProgress::new(!quiet)?;
    let (tx, mut rx) = event_channel();
    let handle = orchestrator.start(url, tx)?;

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling installation");
            cancel.cancel();
        }
    });

    while let Some(event) = rx.recv().await {
        progress.handle(&event);
    }

    let outcome = handle.wait().await;
    Ok(exit_code(&outcome))
}

async fn verify(orchestrator: &InstallationOrchestrator) -> Result<ExitCode> {
    let report = orchestrator.verify_installation().await?;

    for result in &report.results {
        let status = match &result.status {
            EntryStatus::Passed => "ok".to_string(),
            EntryStatus::Missing => "missing".to_string(),
            EntryStatus::TooSmall { actual, minimum } => format!(
                "too small ({} < {})",
                format_bytes(*actual),
                format_bytes(*minimum)
            ),
            EntryStatus::HashMismatch { expected, actual } => {
                format!("hash mismatch (expected {}, got {})", expected, actual)
            }
            EntryStatus::Unreadable { reason } => format!("unreadable ({})", reason),
        };
        println!("{:<40} {}", result.path, status);
    }

    if report.all_passed {
        println!("Installation at {} is valid", orchestrator.install_root().display());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} file(s) failed verification", report.failed_paths().len());
        Ok(ExitCode::from(EXIT_FAILED))
    }
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    ExitCode::from(exit_status(outcome))
}

fn exit_status(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Complete => 0,
        Outcome::Failed(_) => EXIT_FAILED,
        Outcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}
