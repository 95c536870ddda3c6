use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use daytona_smoke::config::{API_URL_ENV, Config};
use daytona_smoke::credential::{API_KEY_ENV, parse_generated_key};
use daytona_smoke::orchestrator::Orchestrator;
use daytona_smoke::server::BackendServer;
use daytona_smoke::tool::DaytonaCli;

#[derive(Parser)]
#[command(name = "daytona-smoke")]
#[command(about = "Provision a Daytona sandbox, smoke-test it, and tear it down")]
#[command(version)]
struct Cli {
    /// Path to a daytona-smoke.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Daytona API base URL (overrides config and DAYTONA_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// API key (overrides DAYTONA_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server if needed, provision a sandbox, run the smoke tests, clean up
    Run,
    /// Probe the server health endpoint once
    Check,
    /// Parse `daytona api-key generate` output from stdin and print the key
    ParseKey,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn print_banner() {
    println!("{:=<60}", "");
    println!("daytona-smoke {}", env!("CARGO_PKG_VERSION"));
    println!("Provision a Daytona sandbox and verify it end to end");
    println!("{:=<60}", "");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Unexpected error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::ParseKey => {
            let mut captured = String::new();
            std::io::stdin().read_to_string(&mut captured)?;
            match parse_generated_key(&captured) {
                Some(key) => {
                    println!("{}", key);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    error!("No API key found in input");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Check => {
            let config = load_config(cli.config.as_deref(), cli.api_url)?;
            let server = BackendServer::new(
                &config.server.api_url,
                config.health_timeout(),
                config.server_poll(),
            )?;
            Ok(if server.check().await {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Run => {
            let config = load_config(cli.config.as_deref(), cli.api_url)?;
            let external_key = cli.api_key.or_else(|| std::env::var(API_KEY_ENV).ok());
            run(config, external_key).await
        }
    }
}

fn load_config(path: Option<&Path>, api_url: Option<String>) -> Result<Config> {
    Ok(Config::load(path)?
        .with_api_url_override(std::env::var(API_URL_ENV).ok(), api_url))
}

async fn run(config: Config, external_key: Option<String>) -> Result<ExitCode> {
    print_banner();

    let tool = Arc::new(DaytonaCli::new(&config.cli.binary, config.generate_timeout()));
    let mut orchestrator = Orchestrator::new(config, tool)?;

    let outcome = orchestrator
        .run_until(external_key.as_deref(), shutdown_signal())
        .await;

    // Cleanup runs on every path, including errors and Ctrl-C.
    info!("Cleaning up...");
    let cleanup = orchestrator.cleanup().await;
    if !cleanup.failed.is_empty() {
        warn!("Sandboxes left behind: {}", cleanup.failed.join(", "));
    }
    info!("Done, resources released");

    let outcome = outcome?;
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Completes on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
