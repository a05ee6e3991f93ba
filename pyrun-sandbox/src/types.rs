//! Core types for sandbox execution

use crate::execution::ExecutionId;
use crate::limits::LimitOverrides;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request to execute code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The code to execute
    #[serde(default)]
    pub code: String,

    /// Optional per-submission limits; can only tighten the configured policy
    #[serde(default, skip_serializing_if = "LimitOverrides::is_empty")]
    pub limits: LimitOverrides,
}

impl ExecutionRequest {
    /// Create a simple execution request
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            limits: LimitOverrides::default(),
        }
    }

    /// Tighten the limits for this submission only
    pub fn with_limits(mut self, limits: LimitOverrides) -> Self {
        self.limits = limits;
        self
    }

    /// Empty code is rejected before any execution resource is allocated.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.code.is_empty() {
            return Err("No code provided".to_string());
        }
        Ok(())
    }
}

/// Closed set of terminal outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    TimedOut,
    MemoryExceeded,
    OutputTruncated,
    Crashed,
    RejectedInvalidInput,
    RejectedOverloaded,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// Outcomes where the code never ran
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            Outcome::RejectedInvalidInput | Outcome::RejectedOverloaded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::TimedOut => "timed_out",
            Outcome::MemoryExceeded => "memory_exceeded",
            Outcome::OutputTruncated => "output_truncated",
            Outcome::Crashed => "crashed",
            Outcome::RejectedInvalidInput => "rejected_invalid_input",
            Outcome::RejectedOverloaded => "rejected_overloaded",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of code execution, produced exactly once per submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Absent when the submission was rejected before an execution existed
    pub id: Option<ExecutionId>,

    pub outcome: Outcome,

    /// Captured standard output, ending in a marker when truncated
    pub stdout: String,

    /// Captured standard error, ending in a marker when truncated
    pub stderr: String,

    /// Whether either stream hit the output ceiling
    pub truncated: bool,

    /// Present only for `Completed`, `OutputTruncated` and exit-coded `Crashed`
    pub exit_code: Option<i32>,

    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Caller-facing explanation for every non-success outcome
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Check if execution succeeded
    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Diagnostic text for failure responses: stdout followed by stderr
    pub fn diagnostic_output(&self) -> String {
        let mut output = String::with_capacity(self.stdout.len() + self.stderr.len());
        output.push_str(&self.stdout);
        output.push_str(&self.stderr);
        output
    }
}
