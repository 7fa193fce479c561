use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use ppe_session::{
    serve_status, Config, DetectionSessionManager, HttpInferenceBackend, LocalDeviceAccess,
    PrometheusReporter, SessionState, UpdateKind,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    info!("Starting PPE detection session");
    info!("  Backend: {}", config.backend_url);
    info!("  Required PPE: {}", config.required_ppe.join(", "));
    info!("  Status port: {}", config.status_port);

    // Convert CLI config to domain config
    let session_config = config
        .to_session_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    // Create infrastructure implementations (dependency injection)
    let backend = Arc::new(HttpInferenceBackend::new(config.backend_url.clone())?);
    let devices = Arc::new(LocalDeviceAccess::new());
    let metrics_reporter = Arc::new(PrometheusReporter::new());

    let manager =
        DetectionSessionManager::spawn(session_config, backend, devices, metrics_reporter)
            .map_err(|e| anyhow::anyhow!("{}", e))?;

    // Start status server
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let status_server = tokio::spawn(serve_status(
        config.status_port,
        manager.clone(),
        async {
            shutdown_rx.await.ok();
        },
    ));

    let mut updates = manager.subscribe();
    let candidate = config.to_media_candidate().await?;
    let session_id = manager.start(candidate).await?;
    info!(%session_id, "Session requested");

    let mut failure = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                manager.stop().await?;
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else { break };
                match (update.kind, update.state) {
                    (UpdateKind::Frame, _) => debug!(
                        total = update.metrics.total_detections,
                        compliant = update.metrics.compliant_count,
                        violations = update.metrics.violation_count,
                        average_confidence = ?update.metrics.average_confidence,
                        "Detection window"
                    ),
                    (UpdateKind::Transition, SessionState::Failed { reason }) => {
                        error!(%reason, "Session failed");
                        failure = Some(reason);
                        break;
                    }
                    (UpdateKind::Transition, SessionState::Idle) => {
                        info!("Session finished");
                        break;
                    }
                    (UpdateKind::Transition, state) => info!(%state, "Session state"),
                }
            }
        }
    }

    manager.shutdown().await?;

    // Signal shutdown to status server
    let _ = shutdown_tx.send(());
    status_server.await?;

    info!("Session manager shutdown complete");

    match failure {
        Some(reason) => anyhow::bail!("Session failed: {}", reason),
        None => Ok(()),
    }
}
