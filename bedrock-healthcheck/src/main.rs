use anyhow::{Context, Result};
use bedrock_healthcheck::{HealthcheckEngine, settings::Settings};
use clap::Parser;
use log::{info, warn};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
struct Opt {
    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if opt.verbose { "debug" } else { "info" }
    ))
    .init();

    let settings = Settings::new().context("Failed to load settings")?;
    let engine = HealthcheckEngine::bind(settings).await?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    info!("Healthcheck active. Press Ctrl-C to exit.");
    engine.run(shutdown).await?;
    info!("Exiting...");

    Ok(())
}

/// First SIGINT/SIGTERM starts a graceful shutdown; a second one while
/// shutting down exits immediately with status 1.
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }

            if shutdown.is_cancelled() {
                warn!("Second signal received, exiting immediately");
                std::process::exit(1);
            }

            info!("Shutting down...");
            shutdown.cancel();
        }
    });

    Ok(())
}
