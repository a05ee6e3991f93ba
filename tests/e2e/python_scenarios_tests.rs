//! End-to-end scenarios against a real CPython interpreter
//!
//! Each test returns early when `python3` is not on `PATH`.

use pyrun_sandbox::LimitPolicy;
use pyrun_tests::{relaxed_limits, TestServer};
use reqwest::StatusCode;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_print_hello() {
    let Some(server) = TestServer::python(relaxed_limits()).await.unwrap() else {
        return;
    };

    let response = server.run_code("print(\"hello\")").await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["output"], "hello\n");
}

#[tokio::test]
async fn test_division_by_zero_is_a_crash_not_a_500() {
    let Some(server) = TestServer::python(relaxed_limits()).await.unwrap() else {
        return;
    };

    let response = server.run_code("1/0").await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "crashed");
    assert_eq!(response.body["error"], "ZeroDivisionError: division by zero");
    assert!(response.body["output"]
        .as_str()
        .unwrap()
        .contains("Traceback"));
}

#[tokio::test]
async fn test_globals_are_not_shared_between_submissions() {
    let Some(server) = TestServer::python(relaxed_limits()).await.unwrap() else {
        return;
    };

    let (define, read) = tokio::join!(
        server.run_code("import time\nsecret = 41\ntime.sleep(0.3)\nprint(secret)"),
        server.run_code("import time\ntime.sleep(0.1)\nprint(secret)"),
    );
    let define = define.unwrap();
    let read = read.unwrap();

    assert_eq!(define.body["output"], "41\n");
    assert_eq!(read.body["outcome"], "crashed");
    assert!(read.body["error"].as_str().unwrap().starts_with("NameError"));

    // Sequential runs are just as fresh
    let again = server.run_code("print(secret)").await.unwrap();
    assert_eq!(again.body["outcome"], "crashed");
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let limits = LimitPolicy {
        max_wall_time: Duration::from_secs(1),
        ..relaxed_limits()
    };
    let Some(server) = TestServer::python(limits).await.unwrap() else {
        return;
    };

    let started = Instant::now();
    let response = server
        .run_code("print('spinning')\nwhile True:\n    pass")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "timed_out");
    assert_eq!(response.body["output"], "spinning\n");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_huge_allocation_hits_memory_ceiling() {
    let limits = LimitPolicy {
        max_memory_bytes: 128 * 1024 * 1024,
        ..relaxed_limits()
    };
    let Some(server) = TestServer::python(limits).await.unwrap() else {
        return;
    };

    let response = server
        .run_code("data = bytearray(1024 * 1024 * 1024)\nprint(len(data))")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "memory_exceeded");
}

#[tokio::test]
async fn test_exception_mentioning_memory_error_is_a_crash() {
    let Some(server) = TestServer::python(relaxed_limits()).await.unwrap() else {
        return;
    };

    let response = server
        .run_code("raise ValueError('not a MemoryError at all')")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["outcome"], "crashed");
    assert_eq!(
        response.body["error"],
        "ValueError: not a MemoryError at all"
    );
}

#[tokio::test]
async fn test_non_ascii_output_survives() {
    let Some(server) = TestServer::python(relaxed_limits()).await.unwrap() else {
        return;
    };

    let response = server
        .run_code("import sys\nsys.stdout.buffer.write('héllo ✓\\n'.encode())")
        .await
        .unwrap();
    assert_eq!(response.body["output"], "héllo ✓\n");
}

#[tokio::test]
async fn test_host_environment_is_hidden_from_python() {
    std::env::set_var("PYRUN_TEST_PY_SECRET", "swordfish");
    let Some(server) = TestServer::python(relaxed_limits()).await.unwrap() else {
        return;
    };

    let response = server
        .run_code("import os\nprint(os.environ.get('PYRUN_TEST_PY_SECRET', 'absent'))")
        .await
        .unwrap();
    assert_eq!(response.body["output"], "absent\n");
}
