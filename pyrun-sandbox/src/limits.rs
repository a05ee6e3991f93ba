//! Limit policy for sandboxed execution

use crate::error::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ceilings enforced against every execution.
///
/// Loaded once at startup and read-only afterwards. A submission may carry
/// [`LimitOverrides`] which can only tighten these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitPolicy {
    /// Wall-clock budget before the execution is forcibly terminated
    #[serde(with = "humantime_serde")]
    pub max_wall_time: Duration,

    /// CPU time budget (user + system) of the interpreter process
    #[serde(with = "humantime_serde")]
    pub max_cpu_time: Duration,

    /// Address-space ceiling; peak resident memory is also watched against it
    pub max_memory_bytes: u64,

    /// Bytes kept per output stream before truncation
    pub max_output_bytes: usize,

    /// Largest file the interpreter may create in its workspace
    pub max_file_bytes: u64,

    /// Executions allowed to run at the same time
    pub max_concurrent_executions: usize,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            max_wall_time: Duration::from_secs(5),
            max_cpu_time: Duration::from_secs(5),
            max_memory_bytes: 256 * 1024 * 1024,
            max_output_bytes: 64 * 1024,
            max_file_bytes: 16 * 1024 * 1024,
            max_concurrent_executions: 4,
        }
    }
}

impl LimitPolicy {
    /// Tight limits for demos and tests
    pub fn strict() -> Self {
        Self {
            max_wall_time: Duration::from_secs(2),
            max_cpu_time: Duration::from_secs(2),
            max_memory_bytes: 128 * 1024 * 1024,
            max_output_bytes: 16 * 1024,
            max_file_bytes: 1024 * 1024,
            max_concurrent_executions: 2,
        }
    }

    /// Reject zero ceilings. Called once when configuration is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.max_wall_time.is_zero() {
            return Err(SandboxError::InvalidLimits(
                "max_wall_time must be positive".to_string(),
            ));
        }
        if self.max_cpu_time.is_zero() {
            return Err(SandboxError::InvalidLimits(
                "max_cpu_time must be positive".to_string(),
            ));
        }
        if self.max_memory_bytes == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_memory_bytes must be positive".to_string(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_output_bytes must be positive".to_string(),
            ));
        }
        if self.max_file_bytes == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_file_bytes must be positive".to_string(),
            ));
        }
        if self.max_concurrent_executions == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_concurrent_executions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply per-submission overrides, keeping the stricter value of each pair.
    ///
    /// Returns a message describing the first zero-valued override, which
    /// the caller reports as invalid input.
    pub fn tightened(&self, overrides: &LimitOverrides) -> std::result::Result<Self, String> {
        let mut limits = self.clone();

        if let Some(wall) = overrides.max_wall_time {
            if wall.is_zero() {
                return Err("limits.max_wall_time must be positive".to_string());
            }
            limits.max_wall_time = limits.max_wall_time.min(wall);
        }
        if let Some(cpu) = overrides.max_cpu_time {
            if cpu.is_zero() {
                return Err("limits.max_cpu_time must be positive".to_string());
            }
            limits.max_cpu_time = limits.max_cpu_time.min(cpu);
        }
        if let Some(memory) = overrides.max_memory_bytes {
            if memory == 0 {
                return Err("limits.max_memory_bytes must be positive".to_string());
            }
            limits.max_memory_bytes = limits.max_memory_bytes.min(memory);
        }
        if let Some(output) = overrides.max_output_bytes {
            if output == 0 {
                return Err("limits.max_output_bytes must be positive".to_string());
            }
            limits.max_output_bytes = limits.max_output_bytes.min(output);
        }

        Ok(limits)
    }
}

/// Per-submission subset of [`LimitPolicy`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitOverrides {
    #[serde(with = "humantime_serde")]
    pub max_wall_time: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub max_cpu_time: Option<Duration>,

    pub max_memory_bytes: Option<u64>,

    pub max_output_bytes: Option<usize>,
}

impl LimitOverrides {
    pub fn is_empty(&self) -> bool {
        self.max_wall_time.is_none()
            && self.max_cpu_time.is_none()
            && self.max_memory_bytes.is_none()
            && self.max_output_bytes.is_none()
    }
}
