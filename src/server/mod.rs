//! HTTP surface: document routes, progress WebSocket, health.

pub mod documents;
pub mod ws;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, APP_NAME, APP_VERSION, MAX_BATCH_FILES, MAX_FILE_SIZE};
use crate::pipeline::batch::{BatchProcessor, JobError};
use crate::pipeline::ingest::IngestError;
use crate::providers::ProviderError;
use crate::router::RouterError;

#[derive(Clone)]
pub struct AppState {
    pub batch: Arc<BatchProcessor>,
}

/// Uniform HTTP error body: `{ "error": "<message>" }` with a status chosen
/// by the failure class.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::Unsupported { .. } | IngestError::TooLarge { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let status = match &err {
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::NotCancellable { .. } => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/documents/batch-upload", post(documents::batch_upload))
        .route("/api/documents/import-zip", post(documents::import_zip))
        .route("/api/documents/import-clients", post(documents::import_clients))
        .route(
            "/api/documents/transcribe-audio",
            post(documents::transcribe_audio),
        )
        .route(
            "/api/documents/processing-status/:job_id",
            get(documents::processing_status),
        )
        .route("/api/documents/active-jobs", get(documents::active_jobs))
        .route("/api/documents/cancel/:job_id", post(documents::cancel_job))
        .route("/ws/document-progress", get(ws::document_progress))
        .layer(DefaultBodyLimit::max(
            MAX_BATCH_FILES * MAX_FILE_SIZE as usize + 1024 * 1024,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": APP_NAME, "version": APP_VERSION }))
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn serve(config: &Config, state: AppState) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_service_identity() {
        let app = build_router(test_support::offline_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], APP_NAME);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(test_support::offline_state());
        let response = app
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
