//! Run a few shell snippets through the sandbox and print the results

use pyrun_sandbox::{
    ExecutionRequest, InterpreterConfig, LimitOverrides, LimitPolicy, ProcessRuntime,
    SandboxService, SchedulerConfig,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let runtime = ProcessRuntime::new(InterpreterConfig::shell().with_env("PATH", "/usr/bin:/bin"))?;
    let service = SandboxService::new(runtime, LimitPolicy::strict(), SchedulerConfig::default())?;

    println!("=== Sandbox Service Example ===\n");
    println!("Runtime: {}\n", service.runtime_name());

    println!("Example 1: Simple echo");
    run_and_print(&service, ExecutionRequest::new("echo 'Hello from sandbox!'")).await?;

    println!("\nExample 2: Count to 5");
    run_and_print(
        &service,
        ExecutionRequest::new("for i in 1 2 3 4 5; do echo $i; done"),
    )
    .await?;

    println!("\nExample 3: Wall-clock limit");
    let overrides = LimitOverrides {
        max_wall_time: Some(Duration::from_millis(500)),
        ..LimitOverrides::default()
    };
    run_and_print(
        &service,
        ExecutionRequest::new("echo started; sleep 10; echo 'Done!'").with_limits(overrides),
    )
    .await?;

    println!("\nExample 4: Error to stderr");
    run_and_print(
        &service,
        ExecutionRequest::new("echo 'Error message' >&2; exit 1"),
    )
    .await?;

    println!("\nExample 5: Output ceiling");
    let overrides = LimitOverrides {
        max_output_bytes: Some(64),
        ..LimitOverrides::default()
    };
    run_and_print(
        &service,
        ExecutionRequest::new("yes sandbox | head -n 100").with_limits(overrides),
    )
    .await?;

    Ok(())
}

async fn run_and_print(service: &SandboxService, request: ExecutionRequest) -> anyhow::Result<()> {
    let result = service.submit(request).await?;

    for line in result.stdout.lines() {
        println!("  stdout: {}", line);
    }
    for line in result.stderr.lines() {
        println!("  stderr: {}", line);
    }
    println!(
        "  Result: outcome={} exit_code={:?} duration={}ms truncated={}",
        result.outcome,
        result.exit_code,
        result.duration.as_millis(),
        result.truncated
    );
    if let Some(error) = result.error {
        println!("  Error: {}", error);
    }

    Ok(())
}
