// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # snaprun
//!
//! Capture a two-level ADC signal into a compressed run log, and expand a log
//! back to one line per sample.
//!
//! ## Usage
//!
//! ```bash
//! # Capture random values until Ctrl+C
//! snaprun compress --output data --debug-output debug
//!
//! # Capture from a peripheral byte stream
//! snaprun compress --source bytes --input /dev/spidev0.0 --max-repeats 1000
//!
//! # Expand a log
//! snaprun decompress data data.expanded
//! ```

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::{CompressArgs, DecompressArgs};
use error::CliError;
use snaprun::ShutdownFlag;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Rail-snapping run-length compressor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read samples and write the compressed run log
    Compress(CompressArgs),
    /// Expand a compressed run log
    Decompress(DecompressArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match cli.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("snaprun v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Compress(args) => {
            let shutdown = ShutdownFlag::new();
            let trigger = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                trigger.request();
                shutdown_signal().await;
                warn!("Second shutdown signal, exiting without draining");
                std::process::exit(130);
            });

            let stats = tokio::task::spawn_blocking(move || commands::compress(&args, &shutdown))
                .await??;
            info!("\n{}", stats.report());
        }
        Command::Decompress(args) => {
            tokio::task::spawn_blocking(move || commands::decompress(&args)).await??;
        }
    }
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
