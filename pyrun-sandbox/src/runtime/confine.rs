//! Kernel confinement of interpreter processes
//!
//! Resource limits bound what a run may consume; this module bounds what it
//! may reach. Each interpreter gets a user namespace of its own (so it holds
//! no capabilities over the host and cannot read the server through procfs),
//! fresh network, IPC and UTS namespaces, and a Landlock domain that refuses
//! signals to anything outside the run. Hosts that start as root can also
//! hand each run a dedicated account.
//!
//! Everything the forked child calls is a raw syscall on memory prepared by
//! the parent, so it is safe between `fork` and `exec`.

use crate::error::{Result, SandboxError};
use crate::policy::{IsolationConfig, RunAs};
use std::io;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Id the interpreter sees for itself inside its user namespace
const SANDBOX_ID: u32 = 1000;

const LANDLOCK_CREATE_RULESET_VERSION: libc::c_uint = 1 << 0;
const LANDLOCK_ACCESS_FS_MAKE_CHAR: u64 = 1 << 6;
const LANDLOCK_ACCESS_FS_MAKE_BLOCK: u64 = 1 << 11;
const LANDLOCK_SCOPE_ABSTRACT_UNIX_SOCKET: u64 = 1 << 0;
const LANDLOCK_SCOPE_SIGNAL: u64 = 1 << 1;
/// First ABI with IPC scoping
const LANDLOCK_SCOPE_ABI: i64 = 6;

#[repr(C)]
struct LandlockRulesetAttr {
    handled_access_fs: u64,
    handled_access_net: u64,
    scoped: u64,
}

/// The confinement this host actually applies, after probing the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confinement {
    /// Each run gets its own user, network, IPC and UTS namespaces
    pub user_namespaces: bool,
    /// Landlock ABI version in use, if any
    pub landlock_abi: Option<i64>,
    /// Runs execute under `IsolationConfig::run_as`
    pub dedicated_account: bool,
    /// The server marks itself non-dumpable
    pub protect_host: bool,
    /// The server runs as root, so non-dumpable alone hides nothing from a same-uid child
    pub privileged_host: bool,
}

impl Confinement {
    /// Probe what `config` can achieve here, without changing this process.
    pub fn detect(config: &IsolationConfig) -> Self {
        // SAFETY: geteuid has no preconditions
        let privileged_host = unsafe { libc::geteuid() } == 0;
        Self {
            user_namespaces: config.namespaces && user_namespaces_available(),
            landlock_abi: if config.confine_signals {
                landlock_abi()
            } else {
                None
            },
            dedicated_account: config.run_as.is_some(),
            protect_host: config.protect_host,
            privileged_host,
        }
    }

    /// The server's memory and environment are unreadable from inside a run
    pub fn hides_host_memory(&self) -> bool {
        self.dedicated_account
            || self.user_namespaces
            || (self.protect_host && !self.privileged_host)
    }

    /// Signals from inside a run cannot reach the server
    pub fn blocks_host_signals(&self) -> bool {
        self.dedicated_account
            || self
                .landlock_abi
                .is_some_and(|abi| abi >= LANDLOCK_SCOPE_ABI)
    }
}

/// Validate `config`, protect this process and report what each run will get.
pub(super) fn establish(config: &IsolationConfig) -> Result<Confinement> {
    let confinement = Confinement::detect(config);

    if let Some(account) = config.run_as {
        if account.uid == 0 || account.gid == 0 {
            return Err(SandboxError::Confinement(
                "run_as must name an unprivileged account".to_string(),
            ));
        }
        if !confinement.privileged_host {
            return Err(SandboxError::Confinement(format!(
                "running interpreters as uid {} requires starting as root",
                account.uid
            )));
        }
    }
    if config.max_processes == 0 {
        return Err(SandboxError::Confinement(
            "max_processes must be positive".to_string(),
        ));
    }

    if config.protect_host {
        // SAFETY: plain prctl on this process
        if unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0, 0, 0, 0) } != 0 {
            warn!(
                "failed to mark server non-dumpable: {}",
                io::Error::last_os_error()
            );
        }
    }

    info!(
        user_namespaces = confinement.user_namespaces,
        landlock_abi = ?confinement.landlock_abi,
        run_as = ?config.run_as.map(|account| account.uid),
        "interpreter confinement"
    );
    if !confinement.hides_host_memory() {
        warn!("user namespaces unavailable: interpreters can read this server through procfs; set isolation.run_as");
    }
    if !confinement.blocks_host_signals() {
        warn!("Landlock signal scoping unavailable: interpreters can signal this server; set isolation.run_as");
    }

    Ok(confinement)
}

/// Everything the forked child needs, prepared in the parent
#[derive(Debug, Clone)]
pub(super) struct ChildConfinement {
    run_as: Option<RunAs>,
    namespaces: bool,
    uid_map: Vec<u8>,
    gid_map: Vec<u8>,
    landlock_abi: Option<i64>,
}

impl ChildConfinement {
    pub(super) fn new(config: &IsolationConfig, confinement: &Confinement) -> Self {
        let (uid, gid) = match config.run_as {
            Some(account) => (account.uid, account.gid),
            // SAFETY: geteuid and getegid have no preconditions
            None => unsafe { (libc::geteuid(), libc::getegid()) },
        };
        Self {
            run_as: config.run_as,
            namespaces: confinement.user_namespaces,
            uid_map: format!("{} {} 1\n", SANDBOX_ID, uid).into_bytes(),
            gid_map: format!("{} {} 1\n", SANDBOX_ID, gid).into_bytes(),
            landlock_abi: confinement.landlock_abi,
        }
    }

    /// Account the workspace must belong to, if runs get their own
    pub(super) fn run_as(&self) -> Option<RunAs> {
        self.run_as
    }

    /// Switch to the configured account. Runs in the forked child.
    pub(super) fn drop_privileges(&self) -> io::Result<()> {
        if let Some(account) = self.run_as {
            // SAFETY: credential syscalls on the calling process only
            unsafe {
                if libc::setgroups(0, std::ptr::null()) != 0
                    || libc::setresgid(account.gid, account.gid, account.gid) != 0
                    || libc::setresuid(account.uid, account.uid, account.uid) != 0
                {
                    return Err(io::Error::last_os_error());
                }
            }
        }
        // Inherited from a non-dumpable server or reset by setresuid; /proc/self
        // must belong to the child for the id maps to be writable
        // SAFETY: plain prctl on this process
        unsafe {
            libc::prctl(libc::PR_SET_DUMPABLE, 1, 0, 0, 0);
        }
        Ok(())
    }

    /// Returns whether the child now has a user namespace of its own. Runs in the forked child.
    pub(super) fn enter_namespaces(&self) -> bool {
        if !self.namespaces {
            return false;
        }
        // SAFETY: unshare only affects the calling process
        if unsafe { libc::unshare(libc::CLONE_NEWUSER) } != 0 {
            return false;
        }
        write_proc_file(b"/proc/self/setgroups\0", b"deny");
        write_proc_file(b"/proc/self/uid_map\0", &self.uid_map);
        write_proc_file(b"/proc/self/gid_map\0", &self.gid_map);
        // Best effort; the user namespace alone already strips host capabilities
        // SAFETY: as above
        unsafe {
            libc::unshare(libc::CLONE_NEWNET | libc::CLONE_NEWIPC | libc::CLONE_NEWUTS);
        }
        true
    }

    /// Enter a Landlock domain scoped to this run. Runs in the forked child.
    pub(super) fn restrict_self(&self) {
        let Some(abi) = self.landlock_abi else {
            return;
        };
        let scoped = abi >= LANDLOCK_SCOPE_ABI;
        let attr = LandlockRulesetAttr {
            // Device nodes are never legitimate, and some access must be handled
            handled_access_fs: LANDLOCK_ACCESS_FS_MAKE_CHAR | LANDLOCK_ACCESS_FS_MAKE_BLOCK,
            handled_access_net: 0,
            scoped: if scoped {
                LANDLOCK_SCOPE_SIGNAL | LANDLOCK_SCOPE_ABSTRACT_UNIX_SOCKET
            } else {
                0
            },
        };
        let size = if scoped {
            std::mem::size_of::<LandlockRulesetAttr>()
        } else {
            std::mem::size_of::<u64>()
        };

        // SAFETY: `attr` is valid for `size` bytes; the descriptor is closed before returning
        unsafe {
            if libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) != 0 {
                return;
            }
            let fd = libc::syscall(
                libc::SYS_landlock_create_ruleset,
                &attr as *const LandlockRulesetAttr,
                size,
                0 as libc::c_uint,
            );
            if fd < 0 {
                return;
            }
            libc::syscall(
                libc::SYS_landlock_restrict_self,
                fd as libc::c_int,
                0 as libc::c_uint,
            );
            libc::close(fd as libc::c_int);
        }
    }
}

fn write_proc_file(path: &[u8], contents: &[u8]) -> bool {
    // SAFETY: `path` is NUL-terminated and `contents` is valid for its length
    unsafe {
        let fd = libc::open(
            path.as_ptr().cast::<libc::c_char>(),
            libc::O_WRONLY | libc::O_CLOEXEC,
        );
        if fd < 0 {
            return false;
        }
        let written = libc::write(fd, contents.as_ptr().cast::<libc::c_void>(), contents.len());
        libc::close(fd);
        written == contents.len() as isize
    }
}

fn landlock_abi() -> Option<i64> {
    // SAFETY: a null attribute with the version flag only queries the ABI
    let abi = unsafe {
        libc::syscall(
            libc::SYS_landlock_create_ruleset,
            std::ptr::null::<LandlockRulesetAttr>(),
            0 as libc::size_t,
            LANDLOCK_CREATE_RULESET_VERSION,
        )
    };
    (abi > 0).then_some(abi as i64)
}

/// Fork a throwaway child and see whether it may create a user namespace.
fn user_namespaces_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        // SAFETY: the child only calls unshare and _exit
        match unsafe { libc::fork() } {
            -1 => false,
            0 => unsafe {
                let code = if libc::unshare(libc::CLONE_NEWUSER) == 0 { 0 } else { 1 };
                libc::_exit(code)
            },
            pid => loop {
                let mut status = 0;
                // SAFETY: `pid` is our own child and `status` outlives the call
                let reaped = unsafe { libc::waitpid(pid, &mut status, 0) };
                if reaped == pid {
                    break libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0;
                }
                if reaped < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                break false;
            },
        }
    })
}
