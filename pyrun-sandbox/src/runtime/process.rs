//! Process-based runtime
//!
//! Every submission gets its own interpreter process in its own session,
//! started from an empty environment inside a throwaway working directory,
//! with kernel resource limits and confinement applied before `exec`. A
//! watchdog samples the process from procfs and the whole process group is
//! killed on any breach, at the wall-clock deadline, and unconditionally
//! when the run is over.

use super::confine::{self, ChildConfinement, Confinement};
use super::usage::ProcessUsage;
use super::{FinishedRun, RawOutcome, Runtime, Termination};
use crate::capture::{CaptureBuffer, CapturedOutput};
use crate::classify::reports_exception;
use crate::error::{Result, SandboxError};
use crate::execution::{Execution, ExecutionId, ExecutionState};
use crate::limits::LimitPolicy;
use crate::policy::{InterpreterConfig, IsolationConfig, WatchdogConfig};
use crate::types::ExecutionRequest;
use async_trait::async_trait;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Process-based runtime - runs each submission in a fresh interpreter process
pub struct ProcessRuntime {
    interpreter: InterpreterConfig,
    program: PathBuf,
    watchdog: WatchdogConfig,
    isolation: IsolationConfig,
    confinement: Confinement,
    child_confinement: ChildConfinement,
}

impl ProcessRuntime {
    /// Resolve the interpreter once; a missing interpreter is a startup error.
    pub fn new(interpreter: InterpreterConfig) -> Result<Self> {
        Self::with_watchdog(interpreter, WatchdogConfig::default())
    }

    pub fn with_watchdog(interpreter: InterpreterConfig, watchdog: WatchdogConfig) -> Result<Self> {
        Self::with_isolation(interpreter, watchdog, IsolationConfig::default())
    }

    pub fn with_isolation(
        interpreter: InterpreterConfig,
        watchdog: WatchdogConfig,
        isolation: IsolationConfig,
    ) -> Result<Self> {
        let program = which::which(&interpreter.program).map_err(|e| {
            SandboxError::InterpreterNotFound {
                program: interpreter.program.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!(program = %program.display(), "resolved interpreter");

        let confinement = confine::establish(&isolation)?;
        let child_confinement = ChildConfinement::new(&isolation, &confinement);

        Ok(Self {
            interpreter,
            program,
            watchdog,
            isolation,
            confinement,
            child_confinement,
        })
    }

    pub fn interpreter(&self) -> &InterpreterConfig {
        &self.interpreter
    }

    /// Absolute path of the interpreter binary
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// What each run is actually confined by on this host
    pub fn confinement(&self) -> &Confinement {
        &self.confinement
    }

    async fn supervise(
        &self,
        execution: &Execution,
        mut context: IsolationContext,
        limits: &LimitPolicy,
    ) -> Result<(Termination, CapturedOutput, CapturedOutput)> {
        let pid = context.pid;
        let stdout = spawn_reader(context.child.stdout.take(), limits.max_output_bytes);
        let stderr = spawn_reader(context.child.stderr.take(), limits.max_output_bytes);

        let breach = tokio::select! {
            biased;
            exited = context.leader_exited() => {
                exited?;
                None
            }
            _ = tokio::time::sleep(limits.max_wall_time) => Some(Termination::WallTimeExceeded),
            breach = watch(pid, limits, self.watchdog.sample_interval) => Some(breach),
        };

        // Nothing in the group outlives the run, including background children
        context.kill_group();
        let status = context.child.wait().await.map_err(SandboxError::Wait)?;

        let termination = match breach {
            Some(breach) => {
                warn!(
                    execution_id = %execution.id(),
                    termination = ?breach,
                    elapsed_ms = execution.elapsed().as_millis() as u64,
                    "limit breached, process group killed"
                );
                breach
            }
            None => termination_from_status(status),
        };

        let stdout = stdout.collect(self.watchdog.drain_grace).await;
        let stderr = stderr.collect(self.watchdog.drain_grace).await;

        let termination = match (termination, &self.interpreter.memory_error_marker) {
            (Termination::Exited(code), Some(marker))
                if code != 0 && reports_exception(&stderr.text, marker) =>
            {
                Termination::MemoryExceeded
            }
            (other, _) => other,
        };

        // Dropping the context removes the workspace
        drop(context);
        Ok((termination, stdout, stderr))
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn run(
        &self,
        id: ExecutionId,
        request: ExecutionRequest,
        limits: LimitPolicy,
    ) -> Result<RawOutcome> {
        let mut execution = Execution::new(id, request);
        execution.advance(ExecutionState::Validating)?;

        if let Err(reason) = execution.request().validate() {
            execution.advance(ExecutionState::RejectedInvalidInput)?;
            return Ok(RawOutcome::RejectedInvalidInput {
                id: Some(id),
                reason,
            });
        }

        let context = IsolationContext::create(
            &self.program,
            &self.interpreter,
            ChildLimits::new(&limits, &self.watchdog, &self.isolation),
            self.child_confinement.clone(),
            &execution.request().code,
        )
        .await?;
        execution.advance(ExecutionState::Running)?;

        info!(
            execution_id = %id,
            runtime = self.name(),
            pid = context.pid,
            code_len = execution.request().code.len(),
            started_at = %execution.started_at(),
            "execution started"
        );

        let (termination, stdout, stderr) = self.supervise(&execution, context, &limits).await?;
        execution.advance(terminal_state(termination))?;

        let duration = execution.elapsed();
        info!(
            execution_id = %id,
            termination = ?termination,
            duration_ms = duration.as_millis() as u64,
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "execution finished"
        );

        Ok(RawOutcome::Finished(FinishedRun {
            id,
            termination,
            stdout,
            stderr,
            duration,
            limits,
        }))
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// The OS-level context of one execution: its process group and workspace.
///
/// The group is killed exactly once: by [`IsolationContext::kill_group`]
/// while the leader is still unreaped, or on drop if the run was abandoned
/// before that. Dropping also removes the workspace.
struct IsolationContext {
    child: Child,
    /// Also the process group id, since the child calls `setsid`
    pid: u32,
    /// Readable once the leader exits, before it is reaped
    exit_fd: Option<AsyncFd<OwnedFd>>,
    armed: bool,
    _workspace: TempDir,
}

impl IsolationContext {
    async fn create(
        program: &std::path::Path,
        interpreter: &InterpreterConfig,
        limits: ChildLimits,
        confinement: ChildConfinement,
        code: &str,
    ) -> Result<Self> {
        let workspace = tempfile::Builder::new()
            .prefix("pyrun-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;
        let script = workspace.path().join(&interpreter.script_name);
        tokio::fs::write(&script, code)
            .await
            .map_err(SandboxError::Workspace)?;
        if let Some(account) = confinement.run_as() {
            for path in [workspace.path(), script.as_path()] {
                std::os::unix::fs::chown(path, Some(account.uid), Some(account.gid))
                    .map_err(SandboxError::Workspace)?;
            }
        }

        let mut command = Command::new(program);
        command
            .args(&interpreter.args)
            .arg(&script)
            .current_dir(workspace.path())
            .env_clear()
            .envs(interpreter.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // SAFETY: the hook only makes raw syscalls on memory prepared before the fork
        unsafe {
            command.pre_exec(move || prepare_child(&limits, &confinement));
        }

        let child = command.spawn().map_err(SandboxError::Spawn)?;
        let pid = child.id().ok_or_else(|| {
            SandboxError::Spawn(io::Error::other("interpreter exited before its pid was read"))
        })?;
        let exit_fd = open_pidfd(pid).and_then(|fd| AsyncFd::new(fd).ok());

        Ok(Self {
            child,
            pid,
            exit_fd,
            armed: true,
            _workspace: workspace,
        })
    }

    /// Resolves when the group leader exits. With a pidfd the leader stays
    /// unreaped, so its pid cannot be recycled before the group is killed.
    async fn leader_exited(&mut self) -> Result<()> {
        match &self.exit_fd {
            Some(fd) => {
                fd.readable().await.map_err(SandboxError::Wait)?;
            }
            None => {
                self.child.wait().await.map_err(SandboxError::Wait)?;
            }
        }
        Ok(())
    }

    /// SIGKILL the whole group. Returns false if it was already killed.
    fn kill_group(&mut self) -> bool {
        if !std::mem::replace(&mut self.armed, false) {
            return false;
        }
        // SAFETY: plain syscall; ESRCH once the group is gone is expected
        unsafe {
            libc::killpg(self.pid as libc::pid_t, libc::SIGKILL);
        }
        true
    }
}

impl Drop for IsolationContext {
    fn drop(&mut self) {
        self.kill_group();
    }
}

fn open_pidfd(pid: u32) -> Option<OwnedFd> {
    // SAFETY: pidfd_open takes no pointers
    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid as libc::pid_t, 0 as libc::c_uint) };
    if fd < 0 {
        debug!("pidfd_open failed, exit is observed by reaping: {}", io::Error::last_os_error());
        return None;
    }
    // SAFETY: the kernel just returned this descriptor and nothing else owns it
    Some(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// Runs in the forked child, in this order: new session, account switch,
/// namespaces, resource limits, Landlock.
fn prepare_child(limits: &ChildLimits, confinement: &ChildConfinement) -> io::Result<()> {
    // SAFETY: setsid is async-signal-safe
    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }
    confinement.drop_privileges()?;
    let own_user_namespace = confinement.enter_namespaces();
    limits.apply(own_user_namespace || confinement.run_as().is_some())?;
    confinement.restrict_self();
    Ok(())
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type Resource = libc::c_int;

/// Kernel limits applied in the child between fork and exec
#[derive(Debug, Clone, Copy)]
struct ChildLimits {
    address_space: u64,
    cpu_seconds: u64,
    file_size: u64,
    open_files: u64,
    processes: u64,
}

impl ChildLimits {
    fn new(limits: &LimitPolicy, watchdog: &WatchdogConfig, isolation: &IsolationConfig) -> Self {
        let cpu = limits.max_cpu_time;
        let cpu_seconds = cpu.as_secs() + u64::from(cpu.subsec_nanos() > 0);
        Self {
            address_space: limits.max_memory_bytes,
            cpu_seconds: cpu_seconds.max(1),
            file_size: limits.max_file_bytes,
            open_files: watchdog.max_open_files,
            processes: isolation.max_processes,
        }
    }

    /// Must not allocate. RLIMIT_NPROC counts per user, so it is only set
    /// when the run has a user of its own.
    fn apply(&self, limit_processes: bool) -> io::Result<()> {
        set_rlimit(libc::RLIMIT_AS, self.address_space, self.address_space)?;
        set_rlimit(libc::RLIMIT_CPU, self.cpu_seconds, self.cpu_seconds + 1)?;
        set_rlimit(libc::RLIMIT_FSIZE, self.file_size, self.file_size)?;
        set_rlimit(libc::RLIMIT_NOFILE, self.open_files, self.open_files)?;
        set_rlimit(libc::RLIMIT_CORE, 0, 0)?;
        if limit_processes {
            set_rlimit(libc::RLIMIT_NPROC, self.processes, self.processes)?;
        }
        Ok(())
    }
}

fn set_rlimit(resource: Resource, soft: u64, hard: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit for the duration of the call
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// A pipe drained into a shared buffer so partial output survives an abort
struct StreamReader {
    buffer: Arc<Mutex<CaptureBuffer>>,
    task: Option<JoinHandle<()>>,
}

fn spawn_reader<R>(stream: Option<R>, limit: usize) -> StreamReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(CaptureBuffer::new(limit)));
    let task = stream.map(|mut stream| {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => buffer
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .write(&chunk[..n]),
                    Err(e) => {
                        debug!("output pipe read failed: {}", e);
                        break;
                    }
                }
            }
        })
    });
    StreamReader { buffer, task }
}

impl StreamReader {
    /// Wait up to `grace` for EOF, then keep whatever arrived.
    async fn collect(mut self, grace: Duration) -> CapturedOutput {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                debug!("output pipe still open after teardown, abandoning reader");
                task.abort();
            }
        }
        let mut guard = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, CaptureBuffer::new(0)).finalize()
    }
}

/// Resolves only when the process crosses its CPU or memory ceiling.
async fn watch(pid: u32, limits: &LimitPolicy, interval: Duration) -> Termination {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        // Sampling fails after exit or without procfs; the other branches decide then
        if let Ok(usage) = ProcessUsage::sample(pid).await {
            if usage.cpu_time >= limits.max_cpu_time {
                return Termination::CpuTimeExceeded;
            }
            if usage.peak_memory_bytes >= limits.max_memory_bytes {
                return Termination::MemoryExceeded;
            }
        }
    }
}

fn termination_from_status(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Exited(code);
    }
    match status.signal() {
        Some(libc::SIGXCPU) => Termination::CpuTimeExceeded,
        Some(signal) => Termination::Signaled(signal),
        None => Termination::Exited(1),
    }
}

fn terminal_state(termination: Termination) -> ExecutionState {
    match termination {
        Termination::Exited(0) => ExecutionState::Completed,
        Termination::Exited(_) | Termination::Signaled(_) => ExecutionState::Crashed,
        Termination::WallTimeExceeded | Termination::CpuTimeExceeded => ExecutionState::TimedOut,
        Termination::MemoryExceeded => ExecutionState::MemoryExceeded,
    }
}
