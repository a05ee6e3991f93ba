//! Executions must not observe each other or the host

use pyrun_sandbox::{Confinement, IsolationConfig};
use pyrun_tests::{relaxed_limits, TestServer};
use reqwest::StatusCode;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_concurrent_runs_do_not_share_variables() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let (define, read) = tokio::join!(
        server.run_code("x=41\nsleep 0.2\necho $x"),
        server.run_code("sleep 0.1\necho ${x:?x is not defined}"),
    );
    let define = define.unwrap();
    let read = read.unwrap();

    assert_eq!(define.body["output"], "41\n");
    assert_eq!(read.status, StatusCode::OK);
    assert_eq!(read.body["outcome"], "crashed");
    assert!(!read.body["output"].as_str().unwrap().contains("41"));
}

#[tokio::test]
async fn test_files_do_not_survive_between_runs() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let first = server
        .run_code("echo secret > note.txt\nls")
        .await
        .unwrap();
    assert_eq!(first.body["output"], "main.sh\nnote.txt\n");

    let second = server.run_code("ls\ncat note.txt").await.unwrap();
    assert_eq!(second.body["outcome"], "crashed");
    assert!(second.body["output"]
        .as_str()
        .unwrap()
        .starts_with("main.sh\n"));
}

#[tokio::test]
async fn test_host_environment_is_not_visible() {
    std::env::set_var("PYRUN_TEST_HOST_SECRET", "hunter2");
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let response = server.run_code("env").await.unwrap();
    let output = response.body["output"].as_str().unwrap();
    assert!(!output.contains("hunter2"));
    assert!(output.contains("PATH=/usr/bin:/bin"));
}

#[tokio::test]
async fn test_stdin_is_empty() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let started = Instant::now();
    let response = server.run_code("cat; echo eof").await.unwrap();
    assert_eq!(response.body["output"], "eof\n");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_background_processes_are_reaped() {
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let started = Instant::now();
    let response = server
        .run_code("sleep 60 &\necho detached")
        .await
        .unwrap();
    assert_eq!(response.body["outcome"], "completed");
    assert_eq!(response.body["output"], "detached\n");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.health().await.unwrap()["in_flight"], 0);
}

#[tokio::test]
async fn test_server_environment_is_unreadable() {
    let confinement = Confinement::detect(&IsolationConfig::default());
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let response = server
        .run_code("tr '\\0' '\\n' < /proc/$PPID/environ && echo environ-readable\necho done")
        .await
        .unwrap();
    let output = response.body["output"].as_str().unwrap();
    assert!(output.ends_with("done\n"));
    if confinement.hides_host_memory() {
        assert!(!output.contains("environ-readable"));
        assert!(!output.contains("PATH="));
    }
}

#[tokio::test]
async fn test_server_cannot_be_signalled() {
    let confinement = Confinement::detect(&IsolationConfig::default());
    let server = TestServer::shell(relaxed_limits()).await.unwrap();

    let response = server
        .run_code("kill -0 $PPID && echo delivered\necho done")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    let output = response.body["output"].as_str().unwrap();
    assert!(output.ends_with("done\n"));
    if confinement.blocks_host_signals() {
        assert!(!output.contains("delivered"));
    }
    assert_eq!(server.health().await.unwrap()["status"], "healthy");
}
