use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prmetrics_config::Secret;
use prmetrics_core::short_sha;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::pipeline::{MetricSubmission, MetricsPipeline, PipelineError};

pub const METRICS_ROUTE: &str = "/api/v1/metrics";
pub const HEALTH_ROUTE: &str = "/healthz";

const BEARER_CHALLENGE: &str = "Bearer realm=\"pr-metrics\"";

#[derive(Clone)]
pub struct AppState {
    pipeline: MetricsPipeline,
    secret: Arc<Secret>,
}

impl AppState {
    pub fn new(pipeline: MetricsPipeline, secret: Secret) -> Self {
        Self {
            pipeline,
            secret: Arc::new(secret),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal server error")]
    Internal,
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(message) => Self::BadRequest(message),
            PipelineError::Store(err) => {
                tracing::error!(error = %err, "failed to persist metric");
                Self::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (status, self.to_string()).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(BEARER_CHALLENGE),
            );
        }
        response
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = Router::new()
        .route(METRICS_ROUTE, post(post_metric))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .merge(metrics)
        .route(HEALTH_ROUTE, get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

async fn post_metric(
    State(state): State<AppState>,
    payload: Result<Json<MetricSubmission>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(submission) = payload?;
    let metric = state.pipeline.ingest(submission).await?;

    // Reference commits have no open pull requests to report into.
    if !metric.is_reference {
        tracing::debug!(commit = short_sha(&metric.commit_sha), "dispatching metrics report");
        state.pipeline.dispatch_report(metric.commit_sha);
    }

    Ok(StatusCode::OK)
}

async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .is_some_and(|token| state.secret.matches(token));

    if !authorized {
        tracing::info!(path = %request.uri().path(), "rejected request with missing or invalid bearer token");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim())
}
