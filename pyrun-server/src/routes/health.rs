//! Health check endpoint

use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "runtime": state.sandbox.runtime_name(),
        "in_flight": state.sandbox.in_flight(),
        "max_concurrent_executions": state.sandbox.max_concurrent(),
    }))
}
