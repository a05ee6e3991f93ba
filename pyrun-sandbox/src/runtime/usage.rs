//! Resource usage sampling from procfs

use std::io;
use std::sync::OnceLock;
use std::time::Duration;

/// Point-in-time usage of one process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessUsage {
    /// User + system CPU time consumed so far
    pub cpu_time: Duration,
    /// High-water mark of resident memory
    pub peak_memory_bytes: u64,
}

impl ProcessUsage {
    /// Read `/proc/<pid>/stat` and `/proc/<pid>/status`.
    ///
    /// Fails once the process has been reaped, and always on hosts
    /// without procfs.
    pub async fn sample(pid: u32) -> io::Result<Self> {
        let stat = tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await?;
        let status = tokio::fs::read_to_string(format!("/proc/{pid}/status")).await?;

        let ticks = parse_cpu_ticks(&stat)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed stat"))?;
        let peak_kib = parse_peak_kib(&status).unwrap_or(0);

        Ok(Self {
            cpu_time: ticks_to_duration(ticks, clock_ticks_per_second()),
            peak_memory_bytes: peak_kib.saturating_mul(1024),
        })
    }
}

/// `utime + stime` in clock ticks.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    // state is field 3 of the full line; utime and stime are 14 and 15
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime.saturating_add(stime))
}

/// `VmHWM` in KiB
fn parse_peak_kib(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|kib| kib.parse().ok())
}

fn ticks_to_duration(ticks: u64, per_second: u64) -> Duration {
    let per_second = per_second.max(1);
    let secs = ticks / per_second;
    let rem = ticks % per_second;
    Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / per_second)
}

fn clock_ticks_per_second() -> u64 {
    static TICKS: OnceLock<u64> = OnceLock::new();
    *TICKS.get_or_init(|| {
        // SAFETY: sysconf has no preconditions
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks > 0 {
            ticks as u64
        } else {
            100
        }
    })
}
