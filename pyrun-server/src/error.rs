//! Error types for the HTTP surface

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pyrun_sandbox::{Outcome, SandboxError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Sent instead of any detail about a failure of the sandbox itself
pub const INTERNAL_FAILURE_MESSAGE: &str = "internal execution failure";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The body never became an `ExecutionRequest`
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("Sandbox failure: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Body of every response that did not run any code
#[derive(Debug, Serialize)]
pub(crate) struct RejectionBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidBody(rejection) => {
                let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                let body = RejectionBody {
                    error: rejection.body_text(),
                    outcome: Some(Outcome::RejectedInvalidInput),
                };
                (status, Json(body)).into_response()
            }
            Self::Sandbox(err) => {
                error!(error = %err, "sandbox failure while serving submission");
                let body = RejectionBody {
                    error: INTERNAL_FAILURE_MESSAGE.to_string(),
                    outcome: None,
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
