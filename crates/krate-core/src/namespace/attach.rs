//! Joining the namespaces of a running zone leader.

use std::fs::File;
use std::io::ErrorKind;
use std::os::fd::AsFd;
use std::path::Path;

use krate_common::error::{KrateError, Result};
use krate_common::types::{NamespaceSet, Pid};
use nix::errno::Errno;

use crate::kernel::Kernel;

/// Mount point of procfs on the host.
pub const PROC_ROOT: &str = "/proc";

/// Moves the calling process into the namespaces of `leader`.
///
/// Each requested kind is joined through `/proc/<leader>/ns/<kind>`. A
/// kind whose entry does not exist for a live leader is skipped, but a
/// leader exposing none of the requested entries is treated as gone. Every
/// namespace descriptor is closed before the next one is opened.
///
/// # Errors
///
/// Returns [`KrateError::Syscall`] with `ESRCH` if `leader` is not running,
/// or with the failing errno if an entry cannot be opened or `setns(2)`
/// fails. Namespaces joined before the failure stay joined.
pub fn attach_to(kernel: &dyn Kernel, leader: Pid, namespaces: &NamespaceSet) -> Result<()> {
    attach_via(kernel, Path::new(PROC_ROOT), leader, namespaces)
}

/// [`attach_to`] against an explicit procfs mount point.
///
/// # Errors
///
/// See [`attach_to`].
pub fn attach_via(
    kernel: &dyn Kernel,
    proc_root: &Path,
    leader: Pid,
    namespaces: &NamespaceSet,
) -> Result<()> {
    let process_dir = proc_root.join(leader.to_string());
    if !process_dir.is_dir() {
        return Err(KrateError::syscall(format!("attach to pid {leader}"), Errno::ESRCH));
    }

    let mut joined = 0_usize;
    for kind in namespaces.iter() {
        let path = process_dir.join("ns").join(kind.proc_name());
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(%leader, namespace = %kind, "namespace not present, skipping");
                continue;
            }
            Err(e) => {
                let errno = e.raw_os_error().map_or(Errno::EIO, Errno::from_raw);
                return Err(KrateError::syscall(format!("open {}", path.display()), errno));
            }
        };

        kernel
            .setns(file.as_fd(), kind.clone_flag())
            .map_err(|e| KrateError::syscall(format!("setns {kind}"), e))?;
        joined += 1;
        tracing::debug!(%leader, namespace = %kind, "joined namespace");
    }

    // An exited but unreaped leader keeps /proc/<pid> with an empty ns dir.
    if joined == 0 && !namespaces.is_empty() {
        return Err(KrateError::syscall(format!("attach to pid {leader}"), Errno::ESRCH));
    }

    tracing::info!(%leader, "attached to zone");
    Ok(())
}
