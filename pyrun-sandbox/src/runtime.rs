//! Runtime trait and implementations

mod confine;
mod process;
mod usage;

use crate::capture::CapturedOutput;
use crate::error::Result;
use crate::execution::ExecutionId;
use crate::limits::LimitPolicy;
use crate::types::ExecutionRequest;
use async_trait::async_trait;
use std::time::Duration;

pub use confine::Confinement;
pub use process::ProcessRuntime;
pub use usage::ProcessUsage;

/// Why a running execution stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with a status code
    Exited(i32),
    /// Killed by a signal nobody in the sandbox sent
    Signaled(i32),
    /// Killed at the wall-clock deadline
    WallTimeExceeded,
    /// CPU ceiling hit, by the watchdog or the kernel (`SIGXCPU`)
    CpuTimeExceeded,
    /// Memory ceiling hit, by the watchdog or a refused allocation
    MemoryExceeded,
}

/// Everything observed about a run that got past validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRun {
    pub id: ExecutionId,
    pub termination: Termination,
    pub stdout: CapturedOutput,
    pub stderr: CapturedOutput,
    pub duration: Duration,
    /// The limits that were in force, after overrides
    pub limits: LimitPolicy,
}

/// Raw outcome reported by an executor, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    RejectedInvalidInput {
        id: Option<ExecutionId>,
        reason: String,
    },
    RejectedOverloaded,
    Finished(FinishedRun),
}

/// Runtime abstraction for executing code
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run one submission in a fresh isolation context and tear it down.
    ///
    /// `Err` is reserved for failures of the sandbox itself.
    async fn run(
        &self,
        id: ExecutionId,
        request: ExecutionRequest,
        limits: LimitPolicy,
    ) -> Result<RawOutcome>;

    /// Get runtime name
    fn name(&self) -> &str;
}
