//! Prometheus metrics and health probes.
//!
//! Serves `/metrics`, `/healthz` and `/readyz` from a small axum router.
//! Readiness flips once every watcher has been started.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::ControllerError;

/// Reconcile counters and latencies per controller
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounterVec,
    reconcile_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();
        let reconcile_total = IntCounterVec::new(
            Opts::new("fleet_reconcile_total", "Reconcile passes by controller and result"),
            &["controller", "result"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new("fleet_reconcile_duration_seconds", "Duration of reconcile passes"),
            &["controller"],
        )?;
        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        Ok(Self {
            registry,
            reconcile_total,
            reconcile_duration,
        })
    }

    /// Record one reconcile pass
    pub fn observe(&self, controller: &str, success: bool, elapsed: Duration) {
        let result = if success { "success" } else { "error" };
        self.reconcile_total.with_label_values(&[controller, result]).inc();
        self.reconcile_duration
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, ControllerError> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

#[derive(Debug, Clone)]
struct ServerState {
    metrics: Arc<Metrics>,
    ready: Arc<AtomicBool>,
}

/// Router for metrics and probes
pub fn router(metrics: Arc<Metrics>, ready: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(ServerState { metrics, ready })
}

/// Serve the probe router until the listener fails
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>, ready: Arc<AtomicBool>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics and probes listening on {}", addr);
    axum::serve(listener, router(metrics, ready)).await?;
    Ok(())
}

async fn metrics_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ServerState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_path(app: Router, path: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_observe_counts_by_result() {
        let metrics = Metrics::new().unwrap();
        metrics.observe("ManagedCluster", true, Duration::from_millis(20));
        metrics.observe("ManagedCluster", false, Duration::from_millis(5));
        metrics.observe("ManagedCluster", false, Duration::from_millis(5));

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"fleet_reconcile_total{controller="ManagedCluster",result="success"} 1"#));
        assert!(text.contains(r#"fleet_reconcile_total{controller="ManagedCluster",result="error"} 2"#));
        assert!(text.contains(r#"fleet_reconcile_duration_seconds_count{controller="ManagedCluster"} 3"#));
    }

    #[tokio::test]
    async fn test_readiness_follows_flag() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let ready = Arc::new(AtomicBool::new(false));

        let (status, _) = get_path(router(metrics.clone(), ready.clone()), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        ready.store(true, Ordering::Relaxed);
        let (status, body) = get_path(router(metrics.clone(), ready.clone()), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ready");

        let (status, body) = get_path(router(metrics, ready), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.observe("Management", true, Duration::from_millis(1));

        let (status, body) = get_path(router(metrics, Arc::new(AtomicBool::new(true))), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("fleet_reconcile_total"));
    }
}
