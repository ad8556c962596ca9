//! HTTP transport
//!
//! Thin axum layer over [`Service`]: JSON in, JSON out, domain errors mapped
//! to status codes with a `{detail, code}` body. CPU-heavy calls (batches and
//! reloads) run on the blocking pool so they never stall the reactor.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, StarlingError};
use crate::service::{BatchRow, PredictRequest, Service};

/// Error body sent to clients
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

/// Handler error carrying its status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    code: &'static str,
}

impl ApiError {
    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
            code: "internal",
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
            code: "bad_request",
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Client => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StarlingError> for ApiError {
    fn from(err: StarlingError) -> Self {
        Self {
            status: status_for(err.kind()),
            detail: err.to_string(),
            code: err.code(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(code = self.code, "{}", self.detail);
        }
        let body = ErrorBody {
            detail: self.detail,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Run `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> std::result::Result<T, StarlingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn metadata(State(svc): State<Service>) -> ApiResult<impl Serialize> {
    Ok(Json(svc.metadata()?))
}

async fn feature_info(State(svc): State<Service>) -> ApiResult<impl Serialize> {
    Ok(Json(svc.feature_info()?))
}

async fn echo_sample(State(svc): State<Service>) -> ApiResult<impl Serialize> {
    Ok(Json(svc.echo_sample()?))
}

async fn predict(
    State(svc): State<Service>,
    body: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> ApiResult<impl Serialize> {
    let Json(req) = body?;
    Ok(Json(svc.predict(&req)?))
}

async fn batch_predict(
    State(svc): State<Service>,
    body: std::result::Result<Json<Vec<BatchRow>>, JsonRejection>,
) -> ApiResult<impl Serialize> {
    let Json(rows) = body?;
    let out = blocking(move || svc.batch_predict(rows)).await?;
    Ok(Json(out))
}

async fn metrics_full(State(svc): State<Service>) -> ApiResult<impl Serialize> {
    Ok(Json(svc.metrics_full()?))
}

async fn health(State(svc): State<Service>) -> impl IntoResponse {
    Json(svc.health())
}

#[derive(Debug, Default, Deserialize)]
struct ReloadRequest {
    #[serde(default)]
    artifacts_dir: Option<PathBuf>,
}

async fn reload(State(svc): State<Service>, body: Bytes) -> ApiResult<impl Serialize> {
    let req: ReloadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReloadRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("invalid reload body: {e}")))?
    };

    let registry = svc.registry().clone();
    blocking(move || registry.reload(req.artifacts_dir.as_deref())).await?;
    Ok(Json(svc.health()))
}

/// Build the router with CORS and per-request tracing.
pub fn router(service: Service) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        tracing::info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %req.method(),
            uri = %req.uri(),
        )
    });

    Router::new()
        .route("/metadata", get(metadata))
        .route("/feature_info", get(feature_info))
        .route("/echo-sample", get(echo_sample))
        .route("/predict", post(predict))
        .route("/batch_predict", post(batch_predict))
        .route("/metrics_full", get(metrics_full))
        .route("/health", get(health))
        .route("/reload", post(reload))
        .layer(trace)
        .layer(cors)
        .with_state(service)
}

/// Serve until Ctrl-C.
pub async fn serve(service: Service, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("starling v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequest;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StarlingError::UnknownFeature { name: "d".into() }, StatusCode::BAD_REQUEST),
            (StarlingError::EmptyVector, StatusCode::BAD_REQUEST),
            (StarlingError::InvalidThreshold { value: 1.5 }, StatusCode::BAD_REQUEST),
            (StarlingError::NoSamples, StatusCode::NOT_FOUND),
            (StarlingError::ModelUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (StarlingError::Metrics("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    async fn error_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_body() {
        let req = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from("{\"features\": "))
            .unwrap();
        let rejection = Json::<PredictRequest>::from_request(req, &()).await.unwrap_err();
        let resp = ApiError::from(rejection).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = error_body(resp).await;
        assert_eq!(body["code"], "bad_request");
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_missing_content_type_gets_error_body() {
        let req = Request::builder()
            .method("POST")
            .uri("/batch_predict")
            .body(Body::from("[]"))
            .unwrap();
        let rejection = Json::<Vec<BatchRow>>::from_request(req, &()).await.unwrap_err();
        let resp = ApiError::from(rejection).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(resp).await["code"], "bad_request");
    }

    #[test]
    fn test_batch_item_uses_inner_status() {
        let err = StarlingError::BatchItem {
            index: 3,
            source: Box::new(StarlingError::EmptyVector),
        };
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, "empty_vector");
        assert!(api.detail.contains("row 3"));
    }
}
