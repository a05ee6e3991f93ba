//! Interpreter and admission policies

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the interpreter is launched for each execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Program name or path; resolved against `PATH` once at startup
    pub program: String,

    /// Arguments placed before the script path
    pub args: Vec<String>,

    /// File name the submitted code is written to inside the workspace
    pub script_name: String,

    /// The only environment the child sees
    pub env: Vec<(String, String)>,

    /// Exception name that, as the last stderr line, means the interpreter ran out of memory
    pub memory_error_marker: Option<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::python3()
    }
}

impl InterpreterConfig {
    /// CPython in isolated, unbuffered mode
    pub fn python3() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-I".to_string(), "-u".to_string()],
            script_name: "main.py".to_string(),
            env: Vec::new(),
            memory_error_marker: Some("MemoryError".to_string()),
        }
    }

    /// POSIX shell, available on every Unix host
    pub fn shell() -> Self {
        Self {
            program: "/bin/sh".to_string(),
            args: Vec::new(),
            script_name: "main.sh".to_string(),
            env: Vec::new(),
            memory_error_marker: None,
        }
    }

    /// Add an allowlisted environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// What the scheduler does when every slot is taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Zero rejects immediately; otherwise wait this long for a slot
    #[serde(with = "humantime_serde")]
    pub admission_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            admission_timeout: Duration::ZERO,
        }
    }
}

impl SchedulerConfig {
    pub fn queueing(admission_timeout: Duration) -> Self {
        Self { admission_timeout }
    }

    pub fn rejects_immediately(&self) -> bool {
        self.admission_timeout.is_zero()
    }
}

/// Knobs of the process executor that are not caller-facing limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// How often CPU time and peak memory are sampled
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,

    /// How long output readers may run on after the child is reaped
    #[serde(with = "humantime_serde")]
    pub drain_grace: Duration,

    /// Open file descriptor ceiling inside the child
    pub max_open_files: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(25),
            drain_grace: Duration::from_millis(250),
            max_open_files: 64,
        }
    }
}

/// Kernel confinement around each interpreter process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Mark this process non-dumpable so same-user processes cannot read it through procfs
    pub protect_host: bool,

    /// Fresh user, network, IPC and UTS namespaces where the kernel allows them
    pub namespaces: bool,

    /// Landlock domain that refuses signals to processes outside the run
    pub confine_signals: bool,

    /// RLIMIT_NPROC inside the run, applied when it has its own user namespace or account
    pub max_processes: u64,

    /// Unprivileged account the interpreter runs as; the server must start as root
    pub run_as: Option<RunAs>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            protect_host: true,
            namespaces: true,
            confine_signals: true,
            max_processes: 64,
            run_as: None,
        }
    }
}

/// Numeric credentials for the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAs {
    pub uid: u32,
    pub gid: u32,
}
