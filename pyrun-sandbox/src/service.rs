//! Sandbox service - main entry point
//!
//! Owns the only shared mutable state in the crate: the count of executions
//! in flight, kept as semaphore permits. A permit is taken before any
//! isolation resource is allocated and travels with the spawned execution
//! task, so it is returned on every exit path, panics included.

use crate::classify::classify;
use crate::error::{Result, SandboxError};
use crate::execution::ExecutionId;
use crate::limits::LimitPolicy;
use crate::policy::SchedulerConfig;
use crate::runtime::{RawOutcome, Runtime};
use crate::types::{ExecutionRequest, ExecutionResult};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

/// Admits, runs and classifies submissions against a fixed concurrency ceiling
pub struct SandboxService {
    runtime: Arc<dyn Runtime>,
    limits: LimitPolicy,
    scheduler: SchedulerConfig,
    slots: Arc<Semaphore>,
}

impl SandboxService {
    /// Create a new sandbox service with the given runtime and policies
    pub fn new(
        runtime: impl Runtime + 'static,
        limits: LimitPolicy,
        scheduler: SchedulerConfig,
    ) -> Result<Self> {
        limits.validate()?;
        let slots = Arc::new(Semaphore::new(limits.max_concurrent_executions));

        info!(
            runtime = runtime.name(),
            max_concurrent = limits.max_concurrent_executions,
            admission_timeout_ms = scheduler.admission_timeout.as_millis() as u64,
            "sandbox service ready"
        );

        Ok(Self {
            runtime: Arc::new(runtime),
            limits,
            scheduler,
            slots,
        })
    }

    /// Run one submission to a classified result.
    ///
    /// Every caller-visible outcome, rejections included, comes back as
    /// `Ok`. `Err` means the sandbox itself failed.
    pub async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        if let Err(reason) = request.validate() {
            debug!(reason = %reason, "submission rejected before admission");
            return Ok(classify(RawOutcome::RejectedInvalidInput { id: None, reason }));
        }

        let limits = match self.limits.tightened(&request.limits) {
            Ok(limits) => limits,
            Err(reason) => {
                debug!(reason = %reason, "submission carried invalid limit overrides");
                return Ok(classify(RawOutcome::RejectedInvalidInput { id: None, reason }));
            }
        };

        let Some(permit) = self.admit().await else {
            warn!(
                in_flight = self.in_flight(),
                max_concurrent = self.max_concurrent(),
                "submission rejected, capacity exhausted"
            );
            return Ok(classify(RawOutcome::RejectedOverloaded));
        };

        let id = ExecutionId::new();
        let runtime = Arc::clone(&self.runtime);
        let task = tokio::spawn(async move {
            let _permit = permit;
            runtime.run(id, request, limits).await
        });

        let raw = match task.await {
            Ok(raw) => raw?,
            Err(join_error) => {
                error!(execution_id = %id, error = %join_error, "execution task aborted");
                return Err(SandboxError::TaskFailed(join_error.to_string()));
            }
        };

        let result = classify(raw);
        info!(
            execution_id = %id,
            outcome = %result.outcome,
            duration_ms = result.duration.as_millis() as u64,
            truncated = result.truncated,
            "submission classified"
        );
        Ok(result)
    }

    async fn admit(&self) -> Option<OwnedSemaphorePermit> {
        let slots = Arc::clone(&self.slots);
        if self.scheduler.rejects_immediately() {
            return slots.try_acquire_owned().ok();
        }
        match tokio::time::timeout(self.scheduler.admission_timeout, slots.acquire_owned()).await {
            Ok(Ok(permit)) => Some(permit),
            // Closed semaphore or timeout; the semaphore is never closed
            _ => None,
        }
    }

    /// Executions currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.limits.max_concurrent_executions - self.slots.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.limits.max_concurrent_executions
    }

    pub fn limits(&self) -> &LimitPolicy {
        &self.limits
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }
}
