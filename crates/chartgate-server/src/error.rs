//! HTTP error responses
//!
//! Every failure is answered with HTTP 500 and `{"status": "failed",
//! "reason": ...}`, the reason being the underlying error text.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chartgate_kube::KubeError;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ApiError {
    /// A release operation failed
    #[error(transparent)]
    #[diagnostic(code(chartgate::release))]
    Release(#[from] KubeError),

    /// The request body or query string could not be read
    #[error("Invalid request: {0}")]
    #[diagnostic(code(chartgate::request))]
    InvalidRequest(String),

    /// The server could not be set up
    #[error("{message}")]
    #[diagnostic(code(chartgate::startup))]
    Startup {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl ApiError {
    /// Category name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Release(e) => e.kind().as_str(),
            ApiError::InvalidRequest(_) => "validation_error",
            ApiError::Startup { .. } => "startup_error",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct FailureBody {
    status: &'static str,
    reason: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let reason = self.to_string();
        tracing::warn!(kind = self.kind(), reason = %reason, "Request failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(FailureBody {
                status: "failed",
                reason,
            }),
        )
            .into_response()
    }
}
