//! Hybrid ML - Main Entry Point
//!
//! Starts the HTTP server or runs a local analysis from the command line.

use clap::Parser;
use hybrid_ml::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hybrid_ml=info".into()),
        )
        .init();

    Cli::parse().run().await
}
