use std::future::Future;

use serde::Serialize;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::PrometheusReporter;
use crate::application::services::DetectionSessionManager;
use crate::domain::errors::Result;

const SERVICE_NAME: &str = "ppe-session";

/// Health check response structure
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Routes of the status server: metrics, probes and the session endpoints
pub fn status_routes(
    manager: DetectionSessionManager,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").and(warp::get()).map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::path("health").map(|| {
        warp::reply::json(&HealthResponse {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
        })
    });

    let liveness_route =
        warp::path("livez").map(|| warp::reply::with_status("OK", StatusCode::OK));

    let readiness_route = warp::path("readyz").map(|| {
        warp::reply::json(&HealthResponse {
            status: "ready",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
        })
    });

    let with_manager = warp::any().map(move || manager.clone());

    let session_route = warp::path("session")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_manager.clone())
        .map(|manager: DetectionSessionManager| warp::reply::json(&manager.snapshot()));

    let stop_route = warp::path!("session" / "stop")
        .and(warp::post())
        .and(with_manager.clone())
        .and_then(|manager: DetectionSessionManager| async move {
            let result = manager.stop().await;
            Ok::<_, Rejection>(command_reply(&manager, result))
        });

    let acknowledge_route = warp::path!("session" / "acknowledge")
        .and(warp::post())
        .and(with_manager)
        .and_then(|manager: DetectionSessionManager| async move {
            let result = manager.acknowledge().await;
            Ok::<_, Rejection>(command_reply(&manager, result))
        });

    metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .or(session_route)
        .or(stop_route)
        .or(acknowledge_route)
        .with(cors)
}

fn command_reply(manager: &DetectionSessionManager, result: Result<()>) -> warp::reply::Response {
    match result {
        Ok(()) => warp::reply::json(&manager.snapshot()).into_response(),
        Err(e) => warp::reply::with_status(
            warp::reply::json(&ErrorResponse {
                error: e.to_string(),
            }),
            StatusCode::SERVICE_UNAVAILABLE,
        )
        .into_response(),
    }
}

/// Serve the status routes until `shutdown` resolves
pub async fn serve_status<S>(port: u16, manager: DetectionSessionManager, shutdown: S)
where
    S: Future<Output = ()> + Send + 'static,
{
    let (addr, server) = warp::serve(status_routes(manager))
        .bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown);

    tracing::info!("Status server listening on http://{}", addr);
    server.await;
}
