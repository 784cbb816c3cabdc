//! Operational HTTP surface: prometheus exposition plus liveness and
//! readiness probes for the process supervisor.

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::metrics::BridgeMetrics;

/// Content type declared by prometheus-client's text encoding.
const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Readiness is reached once every cluster passed its identity check and
/// the consumer is subscribed. The probe then reports which clusters this
/// instance fans out to, so an operator can tell instances apart without
/// reading logs.
#[derive(Default)]
pub struct Readiness {
    clusters: OnceLock<Vec<String>>,
}

impl Readiness {
    /// Publish the connected cluster names. Startup runs once; a repeat
    /// call keeps the first list.
    pub fn mark_consuming(&self, cluster_names: Vec<String>) {
        let _ = self.clusters.set(cluster_names);
    }
}

struct ExpositionState {
    metrics: BridgeMetrics,
    readiness: Arc<Readiness>,
}

fn router(metrics: BridgeMetrics, readiness: Arc<Readiness>) -> Router {
    let state = Arc::new(ExpositionState { metrics, readiness });
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(expose_metrics))
        .with_state(state)
}

/// Bind the exposition port and serve until the process exits.
pub async fn serve(port: u16, metrics: BridgeMetrics, readiness: Arc<Readiness>) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics port {port}"))?;
    info!("Serving metrics and probes on {addr}");
    axum::serve(listener, router(metrics, readiness))
        .await
        .context("metrics server exited")
}

async fn health() -> &'static str {
    concat!("esbridged ", env!("CARGO_PKG_VERSION"))
}

async fn ready(State(state): State<Arc<ExpositionState>>) -> Result<String, StatusCode> {
    match state.readiness.clusters.get() {
        Some(clusters) => Ok(format!("consuming; clusters: {}", clusters.join(", "))),
        None => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn expose_metrics(State(state): State<Arc<ExpositionState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
        state.metrics.encode(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_identifies_the_daemon() {
        let app = router(BridgeMetrics::new(), Arc::new(Readiness::default()));
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.starts_with("esbridged "));
    }

    #[tokio::test]
    async fn ready_reports_clusters_once_consuming() {
        let readiness = Arc::new(Readiness::default());
        let app = router(BridgeMetrics::new(), readiness.clone());

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.mark_consuming(vec!["chi".to_string(), "eqiad".to_string()]);
        let resp = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "consuming; clusters: chi, eqiad");
    }

    #[tokio::test]
    async fn repeat_mark_consuming_keeps_the_first_list() {
        let readiness = Readiness::default();
        readiness.mark_consuming(vec!["chi".to_string()]);
        readiness.mark_consuming(vec!["psi".to_string()]);
        assert_eq!(readiness.clusters.get().unwrap(), &["chi".to_string()]);
    }

    #[tokio::test]
    async fn metrics_serve_openmetrics_text() {
        let app = router(BridgeMetrics::new(), Arc::new(Readiness::default()));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.contains("openmetrics-text"));

        let text = body_text(resp).await;
        assert!(text.contains("esbridge_records"));
        assert!(text.contains("esbridge_bulk_action"));
    }
}
