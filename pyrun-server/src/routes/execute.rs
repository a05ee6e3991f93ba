//! Code execution endpoints
//!
//! Status codes separate "your code failed" from "your request was wrong"
//! from "try again later": every run that got as far as the interpreter is
//! a 200, rejected input is a 400, and a full sandbox is a 503.

use crate::error::{ApiError, RejectionBody};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pyrun_sandbox::{ExecutionRequest, ExecutionResult, Outcome};
use serde::Serialize;
use tracing::debug;

/// Seconds a client should wait after a 503
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Serialize)]
struct SuccessBody {
    output: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    stderr: String,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    duration_ms: u64,
    truncated: bool,
}

/// A run that reached the interpreter but did not complete cleanly
#[derive(Debug, Serialize)]
struct FailureBody {
    error: String,
    /// stdout followed by stderr
    output: String,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    duration_ms: u64,
    truncated: bool,
}

/// `POST /api/run-code` and `POST /api/execute-code`
pub async fn run_code(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    debug!(code_len = request.code.len(), "submission received");

    let result = state.sandbox.submit(request).await?;
    Ok(render(result))
}

/// Map a classified result onto status code, headers and body.
pub fn render(result: ExecutionResult) -> Response {
    let duration_ms = result.duration.as_millis() as u64;
    let error = result
        .error
        .clone()
        .unwrap_or_else(|| result.outcome.to_string());

    match result.outcome {
        Outcome::Completed => {
            let body = SuccessBody {
                outcome: result.outcome,
                exit_code: result.exit_code,
                duration_ms,
                truncated: result.truncated,
                output: result.stdout,
                stderr: result.stderr,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Outcome::RejectedInvalidInput => {
            let body = RejectionBody {
                error,
                outcome: Some(result.outcome),
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
        Outcome::RejectedOverloaded => {
            let body = RejectionBody {
                error,
                outcome: Some(result.outcome),
            };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
                Json(body),
            )
                .into_response()
        }
        Outcome::Crashed
        | Outcome::TimedOut
        | Outcome::MemoryExceeded
        | Outcome::OutputTruncated => {
            let body = FailureBody {
                error,
                output: result.diagnostic_output(),
                outcome: result.outcome,
                exit_code: result.exit_code,
                duration_ms,
                truncated: result.truncated,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}
