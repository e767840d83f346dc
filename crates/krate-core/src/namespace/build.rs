//! Creation of a zone's namespace set.

use std::path::Path;

use krate_common::error::{KrateError, Result};
use krate_common::types::{Identity, NamespaceKind};
use nix::mount::MsFlags;

use crate::filesystem::mount::mount_entry;
use crate::kernel::Kernel;
use crate::manifest::Manifest;
use crate::substitute::substitute;

/// Unshares the namespaces requested by `manifest` and performs its mounts.
///
/// When a mount namespace is created, `/` is first made a recursive slave
/// so mounts performed here never propagate back to the host. Mount
/// entries are then applied in manifest order with identity placeholders
/// expanded. Only the calling process (and its future children) ends up
/// in the new namespaces.
///
/// # Errors
///
/// Returns an error if `unshare(2)` fails, if `/` cannot be re-propagated,
/// if a mount point cannot be created, or if a non-optional mount fails.
pub fn build_namespaces(kernel: &dyn Kernel, manifest: &Manifest, identity: &Identity) -> Result<()> {
    let flags = manifest.namespaces.clone_flags();
    tracing::info!(identity = %identity.name, ?flags, "creating namespaces");

    if !flags.is_empty() {
        kernel
            .unshare(flags)
            .map_err(|e| KrateError::syscall("unshare", e))?;
    }

    if manifest.namespaces.contains(NamespaceKind::Mount) {
        kernel
            .mount(
                None,
                Path::new("/"),
                None,
                MsFlags::MS_SLAVE | MsFlags::MS_REC,
                None,
            )
            .map_err(|e| KrateError::syscall("mount --make-rslave /", e))?;
        tracing::debug!("root mount propagation set to rslave");
    }

    for entry in &manifest.mounts {
        let source = substitute(&entry.source, identity);
        let destination = substitute(&entry.destination, identity);

        entry.source_create.apply(Path::new(&source))?;
        entry.destination_create.apply(Path::new(&destination))?;

        mount_entry(
            kernel,
            &source,
            &destination,
            &entry.fstype,
            &entry.options,
            entry.optional,
        )?;
    }

    tracing::info!(
        identity = %identity.name,
        mounts = manifest.mounts.len(),
        "namespaces ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::fd::BorrowedFd;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use krate_common::types::NamespaceSet;
    use nix::errno::Errno;
    use nix::sched::CloneFlags;

    use super::*;
    use crate::filesystem::mount::CreatePolicy;
    use crate::manifest::MountEntry;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Unshare(CloneFlags),
        Mount(String, PathBuf, MsFlags),
    }

    #[derive(Default)]
    struct RecordingKernel {
        calls: Mutex<Vec<Call>>,
        fail_mounts: bool,
    }

    impl RecordingKernel {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl Kernel for RecordingKernel {
        fn unshare(&self, flags: CloneFlags) -> nix::Result<()> {
            self.calls.lock().expect("lock").push(Call::Unshare(flags));
            Ok(())
        }

        fn mount(
            &self,
            source: Option<&str>,
            target: &Path,
            _fstype: Option<&str>,
            flags: MsFlags,
            _data: Option<&str>,
        ) -> nix::Result<()> {
            self.calls.lock().expect("lock").push(Call::Mount(
                source.unwrap_or_default().to_string(),
                target.to_path_buf(),
                flags,
            ));
            if self.fail_mounts && source.is_some() {
                return Err(Errno::EACCES);
            }
            Ok(())
        }

        fn setns(&self, _fd: BorrowedFd<'_>, _nstype: CloneFlags) -> nix::Result<()> {
            Ok(())
        }
    }

    fn alice() -> Identity {
        Identity {
            name: "alice".into(),
            uid: 1000,
            group: "users".into(),
            gid: 100,
        }
    }

    fn bind(source: &str, destination: &str) -> MountEntry {
        MountEntry {
            source: source.into(),
            source_create: CreatePolicy::None,
            destination: destination.into(),
            destination_create: CreatePolicy::None,
            fstype: "none".into(),
            options: "bind".into(),
            optional: false,
        }
    }

    fn manifest(kinds: &[NamespaceKind], mounts: Vec<MountEntry>) -> Manifest {
        Manifest {
            path: PathBuf::from("owner.xml"),
            namespaces: kinds.iter().copied().collect::<NamespaceSet>(),
            mounts,
        }
    }

    #[test]
    fn mount_namespace_is_privatized_before_entries() {
        let kernel = RecordingKernel::default();
        let m = manifest(&[NamespaceKind::Mount], vec![bind("/srv/zoneA", "%HOME%")]);

        build_namespaces(&kernel, &m, &alice()).expect("build");
        assert_eq!(
            kernel.calls(),
            vec![
                Call::Unshare(CloneFlags::CLONE_NEWNS),
                Call::Mount(String::new(), PathBuf::from("/"), MsFlags::MS_SLAVE | MsFlags::MS_REC),
                Call::Mount("/srv/zoneA".into(), PathBuf::from("/home/alice"), MsFlags::MS_BIND),
            ]
        );
    }

    #[test]
    fn without_mount_namespace_root_is_untouched() {
        let kernel = RecordingKernel::default();
        let m = manifest(&[NamespaceKind::Uts, NamespaceKind::Ipc], Vec::new());

        build_namespaces(&kernel, &m, &alice()).expect("build");
        assert_eq!(
            kernel.calls(),
            vec![Call::Unshare(CloneFlags::CLONE_NEWIPC | CloneFlags::CLONE_NEWUTS)]
        );
    }

    #[test]
    fn empty_namespace_set_skips_unshare() {
        let kernel = RecordingKernel::default();
        build_namespaces(&kernel, &manifest(&[], Vec::new()), &alice()).expect("build");
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn failing_entry_stops_the_build() {
        let kernel = RecordingKernel {
            fail_mounts: true,
            ..RecordingKernel::default()
        };
        let m = manifest(
            &[NamespaceKind::Mount],
            vec![bind("/srv/a", "/home/a"), bind("/srv/b", "/home/b")],
        );

        let err = build_namespaces(&kernel, &m, &alice()).expect_err("should fail");
        assert!(matches!(err, KrateError::Mount { .. }));
        assert!(!kernel
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Mount(s, _, _) if s == "/srv/b")));
    }

    #[test]
    fn destination_is_created_from_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kernel = RecordingKernel::default();
        let mut entry = bind("/srv/zoneA", &format!("{}/%USER%/data", dir.path().display()));
        entry.destination_create = CreatePolicy::Dir;

        build_namespaces(&kernel, &manifest(&[], vec![entry]), &alice()).expect("build");
        assert!(dir.path().join("alice/data").is_dir());
    }
}
