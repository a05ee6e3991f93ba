//! Pyrun Sandbox - isolated execution of untrusted interpreter code
//!
//! Each submission runs in a fresh interpreter process with its own
//! workspace, an empty environment, kernel resource limits and its own
//! user, network and Landlock confinement where the host allows. Wall-clock,
//! CPU, memory and output ceilings are enforced per execution, and a
//! fixed concurrency ceiling is enforced across executions. Every
//! submission resolves to exactly one classified [`ExecutionResult`].
//!
//! ```no_run
//! use pyrun_sandbox::{
//!     ExecutionRequest, InterpreterConfig, LimitPolicy, ProcessRuntime, SandboxService,
//!     SchedulerConfig,
//! };
//!
//! # async fn demo() -> pyrun_sandbox::Result<()> {
//! let runtime = ProcessRuntime::new(InterpreterConfig::python3())?;
//! let service = SandboxService::new(runtime, LimitPolicy::default(), SchedulerConfig::default())?;
//! let result = service.submit(ExecutionRequest::new("print('hi')")).await?;
//! assert_eq!(result.stdout, "hi\n");
//! # Ok(())
//! # }
//! ```

mod capture;
mod classify;
mod error;
mod execution;
mod limits;
mod policy;
mod runtime;
mod service;
mod types;

pub use capture::{CaptureBuffer, CapturedOutput, TRUNCATION_MARKER};
pub use classify::{classify, OVERLOADED_MESSAGE};
pub use error::{Result, SandboxError};
pub use execution::{Execution, ExecutionId, ExecutionState};
pub use limits::{LimitOverrides, LimitPolicy};
pub use policy::{InterpreterConfig, IsolationConfig, RunAs, SchedulerConfig, WatchdogConfig};
pub use runtime::{
    Confinement, FinishedRun, ProcessRuntime, ProcessUsage, RawOutcome, Runtime, Termination,
};
pub use service::SandboxService;
pub use types::{ExecutionRequest, ExecutionResult, Outcome};
