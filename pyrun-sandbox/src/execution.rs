//! Execution identity and lifecycle state machine

use crate::error::{Result, SandboxError};
use crate::types::ExecutionRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Unique execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution state
///
/// ```text
/// Created -> Validating -> RejectedInvalidInput
///                       -> Running -> Completed | Crashed | TimedOut | MemoryExceeded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    Created,
    Validating,
    Running,
    RejectedInvalidInput,
    Completed,
    Crashed,
    TimedOut,
    MemoryExceeded,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ExecutionState::Created | ExecutionState::Validating | ExecutionState::Running
        )
    }

    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Created, Validating)
                | (Validating, RejectedInvalidInput)
                | (Validating, Running)
                | (Running, Completed)
                | (Running, Crashed)
                | (Running, TimedOut)
                | (Running, MemoryExceeded)
        )
    }
}

/// A live unit of work, owned by the executor that created it
#[derive(Debug)]
pub struct Execution {
    id: ExecutionId,
    request: ExecutionRequest,
    started_at: DateTime<Utc>,
    started: Instant,
    state: ExecutionState,
}

impl Execution {
    pub fn new(id: ExecutionId, request: ExecutionRequest) -> Self {
        Self {
            id,
            request,
            started_at: Utc::now(),
            started: Instant::now(),
            state: ExecutionState::Created,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn request(&self) -> &ExecutionRequest {
        &self.request
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, refusing any edge outside the lifecycle graph.
    pub fn advance(&mut self, next: ExecutionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SandboxError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(execution_id = %self.id, from = ?self.state, to = ?next, "state transition");
        self.state = next;
        Ok(())
    }
}
