//! The session hook interface.
//!
//! [`SessionHook`] is what a login-hook runtime drives at session start and
//! end. [`NamespaceSession`] implements it by deciding, through the
//! [`Registry`], whether the caller builds the identity's zone or joins the
//! one that already exists. [`HookAdapter`] turns the results into the
//! plain success/failure status the host runtime expects.

use krate_common::config::KrateConfig;
use krate_common::error::Result;
use krate_common::types::Pid;
use krate_core::identity::{IdentityResolver, SystemIdentities};
use krate_core::kernel::{Kernel, SystemKernel};
use krate_core::manifest;
use krate_core::namespace::{attach_to, build_namespaces};

use crate::lock::{SemaphoreLock, SessionLock};
use crate::registry::{Outcome, Registry, Role};

/// Callbacks invoked by a login-hook runtime.
pub trait SessionHook {
    /// Decides whether `user` may start a session. Accepts every user
    /// unless overridden.
    ///
    /// # Errors
    ///
    /// Returns an error to deny the session.
    fn authenticate(&self, user: &str) -> Result<()> {
        let _ = user;
        Ok(())
    }

    /// Starts a session for `user` in the calling process.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be set up; the host
    /// should then abort the login.
    fn open_session(&self, user: &str) -> Result<Outcome>;

    /// Ends the calling process's session for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry could not be updated.
    fn close_session(&self, user: &str) -> Result<()>;
}

/// [`SessionHook`] that places every session of an identity in one shared
/// set of namespaces.
pub struct NamespaceSession {
    config: KrateConfig,
    kernel: Box<dyn Kernel>,
    lock: Box<dyn SessionLock>,
    identities: Box<dyn IdentityResolver>,
    registry: Registry,
}

impl std::fmt::Debug for NamespaceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceSession")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl NamespaceSession {
    /// Creates a session manager using the host kernel, the named
    /// semaphore from `config`, and the system user database.
    ///
    /// # Errors
    ///
    /// Returns an error if the session semaphore cannot be opened.
    pub fn new(config: KrateConfig) -> Result<Self> {
        let lock = SemaphoreLock::open(&config.semaphore_name)?;
        Ok(Self::with_parts(
            config,
            Box::new(SystemKernel),
            Box::new(lock),
            Box::new(SystemIdentities),
        ))
    }

    /// Creates a session manager from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: KrateConfig,
        kernel: Box<dyn Kernel>,
        lock: Box<dyn SessionLock>,
        identities: Box<dyn IdentityResolver>,
    ) -> Self {
        let registry = Registry::new(&config.registry_dir);
        Self {
            config,
            kernel,
            lock,
            identities,
            registry,
        }
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Opens a session of `user` owned by `pid`.
    ///
    /// The first session of an identity unshares the namespaces named by
    /// its manifest and performs the manifest mounts; `pid` becomes the
    /// leader. Every later session joins the leader's namespaces. Either
    /// way `pid` is recorded only once the namespaces are in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity or its manifest cannot be
    /// resolved, or if building or joining the namespaces fails.
    pub fn open(&self, user: &str, pid: Pid) -> Result<Outcome> {
        let identity = self.identities.resolve(user)?;
        let manifest = manifest::load(&self.config.manifest_dir, &identity.name)?;
        tracing::debug!(
            identity = %identity,
            manifest = %manifest.path.display(),
            mounts = manifest.mounts.len(),
            "manifest loaded"
        );

        let outcome = self.registry.open_session(
            self.lock.as_ref(),
            &identity.name,
            pid,
            |outcome| match outcome.role {
                Role::Builder => build_namespaces(self.kernel.as_ref(), &manifest, &identity),
                Role::Attacher => {
                    attach_to(self.kernel.as_ref(), outcome.leader, &manifest.namespaces)
                }
            },
        )?;

        tracing::info!(identity = %identity, %pid, role = ?outcome.role, leader = %outcome.leader, "session opened");
        Ok(outcome)
    }

    /// Closes the session of `user` owned by `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the registry file cannot
    /// be rewritten.
    pub fn close(&self, user: &str, pid: Pid) -> Result<()> {
        self.registry.close_session(self.lock.as_ref(), user, pid)
    }
}

impl SessionHook for NamespaceSession {
    fn authenticate(&self, user: &str) -> Result<()> {
        let _ = self.identities.resolve(user)?;
        Ok(())
    }

    fn open_session(&self, user: &str) -> Result<Outcome> {
        self.open(user, Pid::this())
    }

    fn close_session(&self, user: &str) -> Result<()> {
        self.close(user, Pid::this())
    }
}

/// Result reported back to the login-hook runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    /// The call succeeded.
    Success,
    /// The call failed with the given diagnostic code.
    Failure(i32),
}

impl HookStatus {
    /// Returns `true` for [`HookStatus::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the numeric code, zero on success.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure(code) => code,
        }
    }
}

/// Translates host callbacks into [`SessionHook`] calls.
#[derive(Debug)]
pub struct HookAdapter<H> {
    hook: H,
}

impl<H: SessionHook> HookAdapter<H> {
    /// Wraps `hook`.
    pub const fn new(hook: H) -> Self {
        Self { hook }
    }

    /// Returns the wrapped hook.
    pub const fn hook(&self) -> &H {
        &self.hook
    }

    /// Host callback for the authentication phase.
    pub fn authenticate(&self, user: &str) -> HookStatus {
        report("authenticate", user, self.hook.authenticate(user))
    }

    /// Host callback for session start.
    pub fn open_session(&self, user: &str) -> HookStatus {
        report("open_session", user, self.hook.open_session(user).map(|_| ()))
    }

    /// Host callback for session end.
    pub fn close_session(&self, user: &str) -> HookStatus {
        report("close_session", user, self.hook.close_session(user))
    }
}

fn report(call: &str, user: &str, result: Result<()>) -> HookStatus {
    match result {
        Ok(()) => HookStatus::Success,
        Err(e) => {
            let code = e.status_code();
            tracing::error!(call, user, code, error = %e, "session hook failed");
            HookStatus::Failure(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use krate_common::error::KrateError;
    use nix::errno::Errno;

    use super::*;

    /// Hook that fails every call except authentication.
    #[derive(Default)]
    struct Refusing {
        closes: Cell<usize>,
    }

    impl SessionHook for Refusing {
        fn open_session(&self, user: &str) -> Result<Outcome> {
            Err(KrateError::Syscall {
                op: format!("unshare for {user}"),
                errno: Errno::EPERM,
            })
        }

        fn close_session(&self, _user: &str) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            Err(KrateError::Manifest {
                path: "owner.xml".into(),
                message: "broken".into(),
            })
        }
    }

    #[test]
    fn default_authenticate_accepts() {
        let adapter = HookAdapter::new(Refusing::default());
        assert_eq!(adapter.authenticate("alice"), HookStatus::Success);
        assert!(adapter.authenticate("alice").is_success());
    }

    #[test]
    fn failures_carry_status_codes() {
        let adapter = HookAdapter::new(Refusing::default());

        let open = adapter.open_session("alice");
        assert_eq!(open, HookStatus::Failure(Errno::EPERM as i32));

        let close = adapter.close_session("alice");
        assert!(!close.is_success());
        assert_eq!(close.code(), 1001);
        assert_eq!(adapter.hook().closes.get(), 1);
    }

    #[test]
    fn success_code_is_zero() {
        assert_eq!(HookStatus::Success.code(), 0);
        assert_eq!(HookStatus::Failure(5).code(), 5);
    }
}
