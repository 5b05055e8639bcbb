//! Operational HTTP endpoints: `/health` and `/metrics`.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use roundnote_core::{Dispatcher, DispatcherStatus};

use crate::metrics;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub dispatcher: DispatcherStatus,
}

pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

pub async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> Json<HealthResponse> {
    let status = dispatcher.status();
    Json(HealthResponse {
        status: if status.accepting { "ok" } else { "draining" },
        version: crate::VERSION,
        dispatcher: status,
    })
}

pub async fn metrics_handler(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    metrics::collect_dynamic_metrics(&dispatcher.status());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use roundnote_core::{
        converter::TransformParams,
        testing::{MockConverter, MockTransport},
        DispatcherConfig, JobPipeline, WorkspaceConfig, WorkspaceManager,
    };

    fn dispatcher(temp: &tempfile::TempDir) -> Arc<Dispatcher> {
        let converter = Arc::new(MockConverter::new());
        let pipeline = JobPipeline::new(
            Arc::new(MockTransport::new()),
            converter.clone(),
            converter,
            Arc::new(WorkspaceManager::new(WorkspaceConfig {
                temp_dir: temp.path().to_path_buf(),
            })),
            TransformParams::default(),
        );
        Arc::new(Dispatcher::new(pipeline, DispatcherConfig::default()))
    }

    #[tokio::test]
    async fn test_health_reports_draining() {
        let temp = tempfile::TempDir::new().unwrap();
        let dispatcher = dispatcher(&temp);

        let Json(response) = health(State(dispatcher.clone())).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.dispatcher.max_concurrent, 4);

        assert!(dispatcher.drain(Duration::from_secs(1)).await);
        let Json(response) = health(State(dispatcher)).await;
        assert_eq!(response.status, "draining");
        assert!(!response.dispatcher.accepting);
    }
}
