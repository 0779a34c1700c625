//! # Initialization
//!
//! Process setup before any controller runs: rustls provider, tracing,
//! configuration, metrics, the HTTP server and the Kubernetes client.

use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::OperatorConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::server::{start_server, ServerState};
use crate::observability;

/// Everything the controllers need once the process is set up
pub struct InitializationResult {
    pub client: Client,
    pub config: Arc<OperatorConfig>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("version", &self.config.version)
            .field("platform", &self.config.platform)
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Set up the process
///
/// # Errors
///
/// Fails when the crypto provider, metrics, HTTP server or Kubernetes client
/// cannot be set up.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything touches rustls.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tekton_installer_operator=info".into()),
        )
        .init();

    info!("Starting Tekton installer operator");
    info!(
        timestamp = env!("BUILD_TIMESTAMP"),
        datetime = env!("BUILD_DATETIME"),
        git_hash = env!("BUILD_GIT_HASH"),
        "Build info"
    );

    let config = Arc::new(OperatorConfig::from_env());
    info!(
        version = %config.version,
        platform = %config.platform.as_str(),
        ko_data_path = %config.ko_data_path.display(),
        "Operator configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, server_state_clone).await {
            error!(error = %e, "HTTP server error");
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    Ok(InitializationResult {
        client,
        config,
        server_state,
    })
}

async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
