//! The syscall seam between zone logic and the Linux kernel.
//!
//! Namespace building and joining go through [`Kernel`] so the session
//! manager can be driven by a recording fake in tests, without root and
//! without touching the host mount table.

use std::os::fd::BorrowedFd;
use std::path::Path;

use nix::mount::MsFlags;
use nix::sched::CloneFlags;

/// The namespace and mount syscalls used by the session manager.
pub trait Kernel: Send + Sync {
    /// Moves the calling process into new namespaces (`unshare(2)`).
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn unshare(&self, flags: CloneFlags) -> nix::Result<()>;

    /// Attaches a filesystem or changes mount attributes (`mount(2)`).
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()>;

    /// Joins the namespace referred to by `fd` (`setns(2)`).
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn setns(&self, fd: BorrowedFd<'_>, nstype: CloneFlags) -> nix::Result<()>;
}

/// [`Kernel`] backed by the real syscalls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemKernel;

impl Kernel for SystemKernel {
    fn unshare(&self, flags: CloneFlags) -> nix::Result<()> {
        nix::sched::unshare(flags)
    }

    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()> {
        nix::mount::mount(source, target, fstype, flags, data)
    }

    fn setns(&self, fd: BorrowedFd<'_>, nstype: CloneFlags) -> nix::Result<()> {
        nix::sched::setns(fd, nstype)
    }
}
