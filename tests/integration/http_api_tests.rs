//! Integration tests for the execution API over real HTTP
//!
//! The server runs with `/bin/sh` as its interpreter so these tests do not
//! depend on a Python installation.

use assert_matches::assert_matches;
use pyrun_sandbox::{LimitPolicy, Outcome, SchedulerConfig, TRUNCATION_MARKER};
use pyrun_tests::{relaxed_limits, shell_config, TestServer};
use reqwest::StatusCode;
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_successful_run_returns_stdout() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let response = server.run_code("echo hello").await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["output"], "hello\n");
    assert_eq!(response.body["outcome"], "completed");
    assert_eq!(response.body["exit_code"], 0);
    assert_eq!(response.body["truncated"], false);
    assert!(response.body.get("error").is_none());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_both_route_names_execute() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    for path in ["/api/run-code", "/api/execute-code"] {
        let response = server
            .post_json(path, &json!({ "code": "printf 'a\\nb\\n'" }))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK, "path {}", path);
        assert_eq!(response.body["output"], "a\nb\n");
    }
}

#[tokio::test]
async fn test_missing_or_empty_code_is_400() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    for body in [json!({}), json!({ "code": "" })] {
        let response = server.post_json("/api/run-code", &body).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], "No code provided");
        assert_eq!(response.body["outcome"], "rejected_invalid_input");
    }

    let health = server.health().await.unwrap();
    assert_eq!(health["in_flight"], 0);
}

#[tokio::test]
async fn test_malformed_bodies_are_400() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let response = server
        .post_raw("/api/run-code", "application/json", "{\"code\": ")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());

    let response = server
        .post_raw("/api/run-code", "text/plain", "echo hi")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = server
        .post_json("/api/run-code", &json!({ "code": 42 }))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_crash_is_200_with_diagnostics() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let response = server
        .run_code("echo partial\necho 'something broke' >&2\nexit 2")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "crashed");
    assert_eq!(response.body["error"], "something broke");
    assert_eq!(response.body["output"], "partial\nsomething broke\n");
    assert_eq!(response.body["exit_code"], 2);
}

#[tokio::test]
async fn test_unbounded_loop_times_out_with_partial_output() {
    let limits = LimitPolicy {
        max_wall_time: Duration::from_millis(500),
        ..relaxed_limits()
    };
    let server = TestServer::shell(limits).await.unwrap();

    let started = Instant::now();
    let response = server
        .run_code("echo started\nwhile :; do :; done")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let outcome: Outcome = serde_json::from_value(response.body["outcome"].clone()).unwrap();
    assert_matches!(outcome, Outcome::TimedOut);
    assert_eq!(response.body["output"], "started\n");
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("wall-clock"));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_overrides_can_only_tighten() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let response = server
        .post_json(
            "/api/run-code",
            &json!({ "code": "sleep 5", "limits": { "max_wall_time": "300ms" } }),
        )
        .await
        .unwrap();
    assert_eq!(response.body["outcome"], "timed_out");

    let response = server
        .post_json(
            "/api/run-code",
            &json!({ "code": "echo ok", "limits": { "max_output_bytes": 0 } }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["outcome"], "rejected_invalid_input");
}

#[tokio::test]
async fn test_output_over_ceiling_is_truncated_not_killed() {
    let limits = LimitPolicy {
        max_output_bytes: 64,
        ..relaxed_limits()
    };
    let server = TestServer::shell(limits).await.unwrap();

    let code = "i=0\nwhile [ $i -lt 500 ]; do echo line-$i; i=$((i+1)); done\necho done >&2";
    let response = server.run_code(code).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "output_truncated");
    assert_eq!(response.body["truncated"], true);
    assert_eq!(response.body["exit_code"], 0);

    let output = response.body["output"].as_str().unwrap();
    assert!(output.starts_with("line-0\nline-1\n"));
    assert!(output.contains(TRUNCATION_MARKER));
    // stderr still arrived after stdout overflowed
    assert!(output.ends_with("done\n"));
}

#[tokio::test]
async fn test_concurrency_ceiling_rejects_the_excess() {
    let limits = LimitPolicy {
        max_concurrent_executions: 2,
        ..relaxed_limits()
    };
    let server = TestServer::shell(limits).await.unwrap();

    let (a, b, c) = tokio::join!(
        server.run_code("sleep 1; echo done"),
        server.run_code("sleep 1; echo done"),
        server.run_code("sleep 1; echo done"),
    );
    let responses = [a.unwrap(), b.unwrap(), c.unwrap()];

    let rejected: Vec<_> = responses
        .iter()
        .filter(|r| r.status == StatusCode::SERVICE_UNAVAILABLE)
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].body["outcome"], "rejected_overloaded");
    assert_eq!(rejected[0].retry_after.as_deref(), Some("1"));

    let completed = responses
        .iter()
        .filter(|r| r.status == StatusCode::OK && r.body["output"] == "done\n")
        .count();
    assert_eq!(completed, 2);

    assert_eq!(server.health().await.unwrap()["in_flight"], 0);
}

#[tokio::test]
async fn test_queueing_policy_admits_everyone() {
    let mut config = shell_config(LimitPolicy {
        max_concurrent_executions: 2,
        ..relaxed_limits()
    });
    config.scheduler = SchedulerConfig::queueing(Duration::from_secs(10));
    let server = TestServer::start(config).await.unwrap();

    let (a, b, c) = tokio::join!(
        server.run_code("sleep 0.5; echo done"),
        server.run_code("sleep 0.5; echo done"),
        server.run_code("sleep 0.5; echo done"),
    );
    for response in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["output"], "done\n");
    }
}

#[tokio::test]
async fn test_health_reports_capacity() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let health = server.health().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["runtime"], "process");
    assert_eq!(health["in_flight"], 0);
    assert_eq!(
        health["max_concurrent_executions"],
        LimitPolicy::default().max_concurrent_executions
    );
}
