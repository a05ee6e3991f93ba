//! A real pyrun server on an ephemeral port

use anyhow::{Context, Result};
use pyrun_sandbox::{InterpreterConfig, LimitPolicy};
use pyrun_server::config::AppConfig;
use pyrun_server::{build_sandbox, create_router, serve, AppState};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Runs the full router until dropped
pub struct TestServer {
    pub base_url: String,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<()>>>,
}

/// Status, `Retry-After` header and JSON body of one response
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub retry_after: Option<String>,
    pub body: Value,
}

impl TestServer {
    pub async fn start(mut config: AppConfig) -> Result<Self> {
        super::setup_test_logging();

        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.validate()?;

        let sandbox = build_sandbox(&config).context("Failed to build sandbox")?;
        let app = create_router(AppState::new(sandbox), &config.server);

        let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, app, async move {
            rx.await.ok();
        }));

        Ok(Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    /// `/bin/sh` as the interpreter, so tests run on any Unix host
    pub async fn shell(limits: LimitPolicy) -> Result<Self> {
        Self::start(shell_config(limits)).await
    }

    /// `None` when python3 is not installed
    pub async fn python(limits: LimitPolicy) -> Result<Option<Self>> {
        if !super::python_available() {
            return Ok(None);
        }
        let config = AppConfig {
            limits,
            interpreter: InterpreterConfig::python3(),
            ..AppConfig::default()
        };
        Ok(Some(Self::start(config).await?))
    }

    pub async fn run_code(&self, code: &str) -> Result<ApiResponse> {
        self.post_json("/api/run-code", &serde_json::json!({ "code": code }))
            .await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        Self::into_api_response(response).await
    }

    /// POST a raw body with the given content type
    pub async fn post_raw(&self, path: &str, content_type: &str, body: &str) -> Result<ApiResponse> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body.to_string())
            .send()
            .await?;
        Self::into_api_response(response).await
    }

    pub async fn health(&self) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Stop accepting connections and wait for the server task to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await??;
        }
        Ok(())
    }

    async fn into_api_response(response: reqwest::Response) -> Result<ApiResponse> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.json().await.context("Response body is not JSON")?;
        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn shell_config(limits: LimitPolicy) -> AppConfig {
    AppConfig {
        limits,
        interpreter: InterpreterConfig::shell().with_env("PATH", "/usr/bin:/bin"),
        ..AppConfig::default()
    }
}

/// Generous limits so only the ceiling under test can trip
pub fn relaxed_limits() -> LimitPolicy {
    LimitPolicy {
        max_wall_time: Duration::from_secs(10),
        max_cpu_time: Duration::from_secs(10),
        ..LimitPolicy::default()
    }
}
