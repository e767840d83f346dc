//! Mount execution for zone manifest entries.
//!
//! Applies one manifest mount with the bind/remount retry the kernel needs
//! for attributes that can only be set on an existing mount.

use std::fs::OpenOptions;
use std::path::Path;

use krate_common::error::{KrateError, Result};
use nix::mount::MsFlags;

use super::options::parse_mount_options;
use crate::kernel::Kernel;

/// How a missing mount path is created before mounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreatePolicy {
    /// The path must already exist.
    #[default]
    None,
    /// Create an empty regular file, and its parent directories.
    File,
    /// Create the directory and its parents.
    Dir,
}

impl CreatePolicy {
    /// Parses the `create` attribute of a manifest path element.
    #[must_use]
    pub fn from_attribute(value: &str) -> Option<Self> {
        match value {
            "file" => Some(Self::File),
            "dir" => Some(Self::Dir),
            _ => None,
        }
    }

    /// Creates `path` according to the policy. Existing paths are left as is.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or file cannot be created.
    pub fn apply(self, path: &Path) -> Result<()> {
        match self {
            Self::None => {}
            Self::Dir => std::fs::create_dir_all(path).map_err(io_err(path))?,
            Self::File => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(io_err(parent))?;
                }
                let _file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path)
                    .map_err(io_err(path))?;
            }
        }
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> KrateError {
    let path = path.to_path_buf();
    move |source| KrateError::Resource { path, source }
}

/// Mounts `source` on `destination` with the given filesystem type and
/// option string.
///
/// The first attempt never carries `MS_REMOUNT`. When it fails and the
/// options asked for a bind or a remount, the mount is retried once with
/// `MS_REMOUNT` added. A mount that still fails is an error unless the
/// entry is `optional`, in which case it is logged and skipped.
///
/// # Errors
///
/// Returns [`KrateError::Mount`] naming both paths if the mount fails and
/// the entry is not optional.
pub fn mount_entry(
    kernel: &dyn Kernel,
    source: &str,
    destination: &str,
    fstype: &str,
    options: &str,
    optional: bool,
) -> Result<()> {
    let parsed = parse_mount_options(options);
    let target = Path::new(destination);
    let fstype = (!fstype.is_empty()).then_some(fstype);
    let data = parsed.data();

    let first = kernel.mount(
        Some(source),
        target,
        fstype,
        parsed.flags.difference(MsFlags::MS_REMOUNT),
        data,
    );

    let result = match first {
        Err(errno) if parsed.flags.intersects(MsFlags::MS_REMOUNT | MsFlags::MS_BIND) => {
            tracing::debug!(source, destination, %errno, "retrying mount as remount");
            kernel.mount(
                Some(source),
                target,
                fstype,
                parsed.flags | MsFlags::MS_REMOUNT,
                data,
            )
        }
        other => other,
    };

    match result {
        Ok(()) => {
            tracing::debug!(source, destination, ?fstype, "mounted");
            Ok(())
        }
        Err(errno) if optional => {
            tracing::warn!(source, destination, %errno, "optional mount failed, skipping");
            Ok(())
        }
        Err(errno) => Err(KrateError::Mount {
            src: source.to_string(),
            dst: destination.to_string(),
            errno,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::BorrowedFd;
    use std::sync::Mutex;

    use nix::errno::Errno;
    use nix::sched::CloneFlags;

    use super::*;

    /// Records every mount call and fails the first `failures` of them.
    struct ScriptedKernel {
        calls: Mutex<Vec<MsFlags>>,
        failures: usize,
    }

    impl ScriptedKernel {
        fn failing(failures: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures,
            }
        }

        fn calls(&self) -> Vec<MsFlags> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl Kernel for ScriptedKernel {
        fn unshare(&self, _flags: CloneFlags) -> nix::Result<()> {
            Ok(())
        }

        fn mount(
            &self,
            _source: Option<&str>,
            _target: &Path,
            _fstype: Option<&str>,
            flags: MsFlags,
            _data: Option<&str>,
        ) -> nix::Result<()> {
            let mut calls = self.calls.lock().expect("lock");
            calls.push(flags);
            if calls.len() <= self.failures {
                Err(Errno::EINVAL)
            } else {
                Ok(())
            }
        }

        fn setns(&self, _fd: BorrowedFd<'_>, _nstype: CloneFlags) -> nix::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn successful_mount_is_not_retried() {
        let kernel = ScriptedKernel::failing(0);
        mount_entry(&kernel, "/srv/a", "/home/a", "none", "bind", false).expect("mount");
        assert_eq!(kernel.calls(), vec![MsFlags::MS_BIND]);
    }

    #[test]
    fn first_attempt_strips_remount() {
        let kernel = ScriptedKernel::failing(0);
        mount_entry(&kernel, "tmpfs", "/tmp/x", "tmpfs", "remount,ro", false).expect("mount");
        assert_eq!(kernel.calls(), vec![MsFlags::MS_RDONLY]);
    }

    #[test]
    fn failed_bind_is_retried_with_remount() {
        let kernel = ScriptedKernel::failing(1);
        mount_entry(&kernel, "/srv/a", "/home/a", "none", "bind,ro", false).expect("mount");
        assert_eq!(
            kernel.calls(),
            vec![
                MsFlags::MS_BIND | MsFlags::MS_RDONLY,
                MsFlags::MS_BIND | MsFlags::MS_RDONLY | MsFlags::MS_REMOUNT,
            ]
        );
    }

    #[test]
    fn plain_mount_failure_is_not_retried() {
        let kernel = ScriptedKernel::failing(1);
        let err = mount_entry(&kernel, "proc", "/proc", "proc", "nosuid", false)
            .expect_err("should fail");
        assert_eq!(kernel.calls().len(), 1);
        assert!(matches!(err, KrateError::Mount { errno: Errno::EINVAL, .. }));
    }

    #[test]
    fn failed_retry_is_fatal_and_names_paths() {
        let kernel = ScriptedKernel::failing(2);
        let err =
            mount_entry(&kernel, "/srv/a", "/home/a", "none", "bind", false).expect_err("fail");
        match err {
            KrateError::Mount { src, dst, .. } => {
                assert_eq!(src, "/srv/a");
                assert_eq!(dst, "/home/a");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(kernel.calls().len(), 2);
    }

    #[test]
    fn optional_failure_is_ignored() {
        let kernel = ScriptedKernel::failing(2);
        mount_entry(&kernel, "/srv/a", "/home/a", "none", "bind", true).expect("optional");
    }

    #[test]
    fn create_policy_file_creates_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a/b/c.txt");
        CreatePolicy::File.apply(&path).expect("create");
        assert!(path.is_file());
    }

    #[test]
    fn create_policy_dir_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x/y");
        CreatePolicy::Dir.apply(&path).expect("create");
        CreatePolicy::Dir.apply(&path).expect("again");
        assert!(path.is_dir());
    }

    #[test]
    fn create_policy_none_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing");
        CreatePolicy::None.apply(&path).expect("noop");
        assert!(!path.exists());
    }
}
