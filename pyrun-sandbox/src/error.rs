//! Error types for the sandbox
//!
//! Every variant here is an internal fault from the caller's point of view:
//! problems with the submitted code are reported through
//! [`ExecutionResult`](crate::ExecutionResult), never through this type.

use crate::execution::ExecutionState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Interpreter '{program}' not found: {reason}")]
    InterpreterNotFound { program: String, reason: String },

    #[error("Invalid limit policy: {0}")]
    InvalidLimits(String),

    #[error("Invalid isolation settings: {0}")]
    Confinement(String),

    #[error("Failed to prepare execution workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Failed to spawn interpreter: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to wait for interpreter: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Illegal execution state transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
    },

    #[error("Execution task failed: {0}")]
    TaskFailed(String),
}
