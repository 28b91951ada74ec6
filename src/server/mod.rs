//! HTTP server for the analysis pipeline
//!
//! JSON endpoints under `/api` for uploading a dataset, reading back the
//! stored profile and results, and rebuilding a session's ensemble.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::{ErrorKind, ServerError};
pub use handlers::{SessionQuery, TrainEnsembleRequest, TrainEnsembleResponse};
pub use state::{AppState, Session, SessionStore};

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::pipeline::PipelineConfig;
use crate::reporting::PlotStyle;
use crate::training::TrainingConfig;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_size: usize,
    /// Sessions kept before the oldest is evicted
    pub max_sessions: usize,
    pub training_timeout_secs: u64,
    pub plot_style: PlotStyle,
    pub random_seed: u64,
    /// `None` or `*` allows any origin
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("API_PORT", 5000),
            max_upload_size: env_or("MAX_UPLOAD_SIZE", 100 * 1024 * 1024), // 100MB
            max_sessions: env_or("MAX_SESSIONS", 32),
            training_timeout_secs: env_or("TRAINING_TIMEOUT_SECS", 300),
            plot_style: env_or("PLOT_STYLE", PlotStyle::Full),
            random_seed: env_or("RANDOM_SEED", 42),
            cors_origin: std::env::var("CORS_ORIGIN").ok(),
        }
    }
}

impl ServerConfig {
    /// Pipeline settings derived from this configuration
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_plot_style(self.plot_style)
            .with_training(TrainingConfig::default().with_seed(self.random_seed))
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    info!(
        host = %config.host,
        port = config.port,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        max_sessions = config.max_sessions,
        training_timeout_secs = config.training_timeout_secs,
        plot_style = %config.plot_style,
        "Hybrid ML server starting"
    );

    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, url = %format!("http://{}/api/health", addr), "Server listening");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
