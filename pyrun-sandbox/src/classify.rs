//! Maps raw executor outcomes onto the caller-facing result taxonomy

use crate::execution::ExecutionId;
use crate::runtime::{FinishedRun, RawOutcome, Termination};
use crate::types::{ExecutionResult, Outcome};
use std::time::Duration;

pub const OVERLOADED_MESSAGE: &str = "execution capacity exhausted, retry later";

/// Total over [`RawOutcome`]; never fails.
pub fn classify(raw: RawOutcome) -> ExecutionResult {
    match raw {
        RawOutcome::RejectedInvalidInput { id, reason } => {
            rejected(id, Outcome::RejectedInvalidInput, reason)
        }
        RawOutcome::RejectedOverloaded => {
            rejected(None, Outcome::RejectedOverloaded, OVERLOADED_MESSAGE.to_string())
        }
        RawOutcome::Finished(run) => classify_finished(run),
    }
}

fn rejected(id: Option<ExecutionId>, outcome: Outcome, message: String) -> ExecutionResult {
    ExecutionResult {
        id,
        outcome,
        stdout: String::new(),
        stderr: String::new(),
        truncated: false,
        exit_code: None,
        duration: Duration::ZERO,
        error: Some(message),
    }
}

fn classify_finished(run: FinishedRun) -> ExecutionResult {
    let truncated = run.stdout.truncated || run.stderr.truncated;

    let (outcome, exit_code, error) = match run.termination {
        Termination::Exited(0) if truncated => (
            Outcome::OutputTruncated,
            Some(0),
            Some(format!(
                "output exceeded {} bytes and was truncated",
                run.limits.max_output_bytes
            )),
        ),
        Termination::Exited(0) => (Outcome::Completed, Some(0), None),
        Termination::Exited(code) => (
            Outcome::Crashed,
            Some(code),
            Some(crash_message(&run.stderr.text).unwrap_or_else(|| {
                format!("process exited with status {}", code)
            })),
        ),
        Termination::Signaled(signal) => (
            Outcome::Crashed,
            None,
            Some(crash_message(&run.stderr.text).unwrap_or_else(|| {
                format!("process terminated by signal {}", signal)
            })),
        ),
        Termination::WallTimeExceeded => (
            Outcome::TimedOut,
            None,
            Some(format!(
                "execution exceeded the wall-clock limit of {}",
                humanize(run.limits.max_wall_time)
            )),
        ),
        Termination::CpuTimeExceeded => (
            Outcome::TimedOut,
            None,
            Some(format!(
                "execution exceeded the CPU time limit of {}",
                humanize(run.limits.max_cpu_time)
            )),
        ),
        Termination::MemoryExceeded => (
            Outcome::MemoryExceeded,
            None,
            Some(format!(
                "execution exceeded the memory limit of {} bytes",
                run.limits.max_memory_bytes
            )),
        ),
    };

    ExecutionResult {
        id: Some(run.id),
        outcome,
        stdout: run.stdout.text,
        stderr: run.stderr.text,
        truncated,
        exit_code,
        duration: run.duration,
        error,
    }
}

/// Last meaningful stderr line, e.g. `ZeroDivisionError: division by zero`
fn crash_message(stderr: &str) -> Option<String> {
    last_stderr_line(stderr).map(str::to_string)
}

fn last_stderr_line(stderr: &str) -> Option<&str> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != crate::capture::TRUNCATION_MARKER.trim())
        .last()
}

/// Whether the final diagnostic is an `exception` error, bare or with a message.
///
/// Only the last line counts: earlier lines may be source text or an
/// unrelated message that merely mentions the name.
pub(crate) fn reports_exception(stderr: &str, exception: &str) -> bool {
    last_stderr_line(stderr).is_some_and(|line| {
        line.strip_prefix(exception)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

fn humanize(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}
