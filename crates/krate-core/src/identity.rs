//! Identity resolution through the system user database.

use krate_common::error::{KrateError, Result};
use krate_common::types::Identity;
use nix::unistd::{Group, User};

/// Resolves a login name into an [`Identity`].
pub trait IdentityResolver: Send + Sync {
    /// Looks up `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KrateError::NotFound`] if no such user exists, or a
    /// syscall error if the lookup itself fails.
    fn resolve(&self, name: &str) -> Result<Identity>;
}

/// [`IdentityResolver`] backed by `getpwnam_r(3)` and `getgrgid_r(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentities;

impl IdentityResolver for SystemIdentities {
    fn resolve(&self, name: &str) -> Result<Identity> {
        Identity::validate_name(name)?;

        let user = User::from_name(name)
            .map_err(|e| KrateError::syscall("getpwnam", e))?
            .ok_or_else(|| KrateError::NotFound {
                kind: "user",
                id: name.to_string(),
            })?;

        // A primary group missing from the group database is tolerated;
        // %GROUP% then expands to the numeric gid.
        let group = Group::from_gid(user.gid)
            .map_err(|e| KrateError::syscall("getgrgid", e))?
            .map_or_else(|| user.gid.to_string(), |g| g.name);

        Ok(Identity {
            name: user.name,
            uid: user.uid.as_raw(),
            group,
            gid: user.gid.as_raw(),
        })
    }
}
