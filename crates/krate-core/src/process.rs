//! Running a command as a zone identity.
//!
//! Forks, drops the child to the identity's groups, gid, and uid in that
//! order, and execs the command. The child reports a failed step to the
//! parent over a close-on-exec pipe before exiting, so the parent can tell
//! a setup failure from a command that merely exited non-zero.

use std::convert::Infallible;
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;

use krate_common::error::{KrateError, Result};
use krate_common::types::Identity;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Gid, Pid, Uid, execvp, fork, initgroups, pipe2, setgid, setuid};

/// Exit status of a child that could not drop privileges.
pub const EXIT_PRIVILEGE_FAILURE: i32 = 126;

/// Exit status of a child whose `execvp(3)` failed.
pub const EXIT_EXEC_FAILURE: i32 = 127;

/// Steps performed by the child after `fork(2)`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Step {
    InitGroups = 0,
    SetGid = 1,
    SetUid = 2,
    Exec = 3,
}

impl Step {
    const fn name(self) -> &'static str {
        match self {
            Self::InitGroups => "initgroups",
            Self::SetGid => "setgid",
            Self::SetUid => "setuid",
            Self::Exec => "execvp",
        }
    }

    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::InitGroups),
            1 => Some(Self::SetGid),
            2 => Some(Self::SetUid),
            3 => Some(Self::Exec),
            _ => None,
        }
    }
}

/// Everything the child needs, allocated before `fork(2)`.
struct Prepared {
    user: CString,
    uid: Uid,
    gid: Gid,
    argv: Vec<CString>,
}

impl Prepared {
    fn new(identity: &Identity, argv: &[String], default_shell: &Path) -> Result<Self> {
        let cstring = |s: &str| {
            CString::new(s).map_err(|_| KrateError::Config {
                message: format!("argument contains NUL byte: {s:?}"),
            })
        };

        let argv = if argv.is_empty() {
            vec![cstring(&default_shell.to_string_lossy())?]
        } else {
            argv.iter().map(|a| cstring(a)).collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            user: cstring(&identity.name)?,
            uid: Uid::from_raw(identity.uid),
            gid: Gid::from_raw(identity.gid),
            argv,
        })
    }

    fn program(&self) -> &CStr {
        // `new` never builds an empty argv.
        self.argv.first().map_or(c"/bin/sh", CString::as_c_str)
    }
}

/// Runs `argv` as `identity` and returns its exit status.
///
/// An empty `argv` starts `default_shell`. The environment is inherited.
/// A child killed by a signal reports `128 + signo`.
///
/// The calling process must be single-threaded: the child only performs
/// async-signal-safe calls between `fork(2)` and `execvp(3)`.
///
/// # Errors
///
/// Returns [`KrateError::Privilege`] if the child could not drop to the
/// identity, [`KrateError::Syscall`] if `fork`, `execvp`, or `waitpid`
/// failed, or [`KrateError::Config`] if an argument contains a NUL byte.
pub fn run_as_identity(identity: &Identity, argv: &[String], default_shell: &Path) -> Result<i32> {
    let prepared = Prepared::new(identity, argv, default_shell)?;
    let (status_read, status_write) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| KrateError::syscall("pipe2", e))?;

    tracing::info!(identity = %identity, program = ?prepared.program(), "launching command");

    // SAFETY: the child only calls initgroups/setgid/setuid/execvp, write,
    // and _exit on memory prepared before the fork.
    #[allow(unsafe_code)]
    let fork_result = unsafe { fork() }.map_err(|e| KrateError::syscall("fork", e))?;

    match fork_result {
        ForkResult::Child => {
            drop(status_read);
            exec_child(&prepared, &status_write)
        }
        ForkResult::Parent { child } => {
            drop(status_write);
            let failure = read_failure(status_read)?;
            let status = wait_for(child)?;
            match failure {
                None => {
                    tracing::debug!(%child, status, "command exited");
                    Ok(status)
                }
                Some((Step::Exec, errno)) => Err(KrateError::syscall("execvp", errno)),
                Some((step, errno)) => Err(KrateError::Privilege {
                    op: step.name(),
                    errno,
                }),
            }
        }
    }
}

fn drop_and_exec(prepared: &Prepared) -> std::result::Result<Infallible, (Step, Errno)> {
    initgroups(&prepared.user, prepared.gid).map_err(|e| (Step::InitGroups, e))?;
    setgid(prepared.gid).map_err(|e| (Step::SetGid, e))?;
    setuid(prepared.uid).map_err(|e| (Step::SetUid, e))?;
    execvp(prepared.program(), prepared.argv.as_slice()).map_err(|e| (Step::Exec, e))
}

fn exec_child(prepared: &Prepared, status_write: &OwnedFd) -> ! {
    let (step, errno) = match drop_and_exec(prepared) {
        Ok(never) => match never {},
        Err(failure) => failure,
    };

    let mut report = [0_u8; 5];
    report[0] = step as u8;
    report[1..].copy_from_slice(&(errno as i32).to_ne_bytes());
    let _ = nix::unistd::write(status_write.as_fd(), &report);

    let stderr = std::io::stderr();
    let message = [
        b"krate: ".as_slice(),
        step.name().as_bytes(),
        b": ",
        errno.desc().as_bytes(),
        b"\n",
    ];
    for part in message {
        let _ = nix::unistd::write(stderr.as_fd(), part);
    }

    let code = if step == Step::Exec {
        EXIT_EXEC_FAILURE
    } else {
        EXIT_PRIVILEGE_FAILURE
    };
    // SAFETY: _exit skips atexit handlers and stdio flushing that belong
    // to the parent's copy of the process state.
    #[allow(unsafe_code)]
    unsafe {
        libc::_exit(code)
    }
}

/// Reads the child's failure report; EOF means `execvp` succeeded.
fn read_failure(status_read: OwnedFd) -> Result<Option<(Step, Errno)>> {
    let mut report = Vec::with_capacity(5);
    let _ = File::from(status_read)
        .read_to_end(&mut report)
        .map_err(|e| KrateError::Resource {
            path: "status pipe".into(),
            source: e,
        })?;

    let &[byte, a, b, c, d] = report.as_slice() else {
        return Ok(None);
    };
    let errno = Errno::from_raw(i32::from_ne_bytes([a, b, c, d]));
    Ok(Step::from_byte(byte).map(|step| (step, errno)))
}

fn wait_for(child: Pid) -> Result<i32> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => return Err(KrateError::syscall("waitpid", e)),
        }
    }
}
