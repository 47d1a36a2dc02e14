mod app;
mod batcher;
mod ingest;
mod model;
mod pipeline;
mod probe;
mod resolver;
mod router;
mod shutdown;
mod sink;
mod worker;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use shutdown::ShutdownReason;
use statuser_core::{telemetry, Config};
use std::path::PathBuf;
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[clap(name = "statuser")]
#[clap(about = "Cloud source availability checker", version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume availability requests and publish source status
    Run {
        /// Read requests from this file instead of stdin
        #[clap(long, env = "STATUSER_INPUT")]
        input: Option<PathBuf>,

        /// Append status messages to this file instead of stdout
        #[clap(long, env = "STATUSER_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Fatal error");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Run { input, output } => {
            // Override config with CLI args
            if input.is_some() {
                config.transport.input = input;
            }
            if output.is_some() {
                config.transport.output = output;
            }

            // Initialize telemetry
            telemetry::init(&config.telemetry)?;

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                match wait_for_signal().await {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        signal_token.cancel();
                    }
                    Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                }
            });

            info!(
                batch_size = config.pipeline.batch_size,
                tick_interval_ms = config.pipeline.tick_interval_ms,
                "Starting statuser"
            );

            let app = app::App::new(config).await?;
            let report = app.run(shutdown).await?;

            if report.reason == ShutdownReason::ConsumerExited {
                warn!("Inbound consumer terminated unexpectedly");
            }
            for (provider, stats) in &report.workers {
                info!(
                    %provider,
                    processed = stats.processed,
                    unavailable = stats.unavailable,
                    lost = stats.lost,
                    "Provider worker summary"
                );
            }
            info!(
                full_flushes = report.batcher.full_flushes,
                tick_flushes = report.batcher.tick_flushes,
                shutdown_flushes = report.batcher.shutdown_flushes,
                "Batch flush summary"
            );
            info!(
                received = report.intake.received,
                routed = report.intake.routed,
                dropped = report.intake.dropped,
                sent = report.batcher.sent,
                lost = report.batcher.lost,
                "Statuser stopped"
            );

            telemetry::shutdown();
        }
    }

    Ok(())
}

async fn wait_for_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}
