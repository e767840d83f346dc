//! The per-identity session registry.
//!
//! Each identity with at least one open session has a file in the registry
//! directory listing the pids of its session processes, one per line. The
//! first pid is the leader: the process whose namespaces every later
//! session joins. The file is created by the first session, appended to by
//! every later one, rewritten without the caller's pid on close, and
//! removed when the last session closes.
//!
//! Mutations only happen while the [`SessionLock`] is held. Rewrites go
//! through a temporary file renamed over the registry file, so a reader
//! sees either the old or the new pid list.

use std::fs::{File, OpenOptions, Permissions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use krate_common::error::{KrateError, Result};
use krate_common::types::{Identity, Pid};
use tempfile::NamedTempFile;

use crate::lock::{SessionGuard, SessionLock};

/// Whether a session created the zone or joined an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// First session of the identity; creates the namespaces.
    Builder,
    /// Later session; joins the leader's namespaces.
    Attacher,
}

/// Decision taken by [`Registry::open_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Role of the opening session.
    pub role: Role,
    /// Process whose namespaces make up the zone.
    pub leader: Pid,
}

/// The open sessions of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Identity name.
    pub identity: String,
    /// Session pids, leader first.
    pub pids: Vec<Pid>,
}

/// Directory of per-identity session files.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    /// Creates a registry rooted at `dir`. The directory is created on the
    /// first session open.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the registry file of `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`KrateError::Config`] if the name cannot be used as a file
    /// name.
    pub fn path(&self, identity: &str) -> Result<PathBuf> {
        Identity::validate_name(identity)?;
        Ok(self.dir.join(identity))
    }

    /// Registers session `pid` for `identity`.
    ///
    /// Under the session lock, decides whether `pid` builds the zone (no
    /// registry file, or an empty one) or attaches to the existing leader,
    /// then runs `prepare` with that decision. Only if `prepare` succeeds is
    /// `pid` appended. A build whose `prepare` or append fails removes the
    /// registry file again so that its existence keeps meaning "a session
    /// is open"; a failure of that removal is logged and the original error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of `prepare`, or a resource error if the registry
    /// file cannot be created, read, or appended to.
    pub fn open_session<F>(
        &self,
        lock: &dyn SessionLock,
        identity: &str,
        pid: Pid,
        prepare: F,
    ) -> Result<Outcome>
    where
        F: FnOnce(&Outcome) -> Result<()>,
    {
        self.register(lock, identity, pid, prepare, append_pid)
    }

    /// [`Registry::open_session`] with the pid append supplied by the caller.
    fn register<F, A>(
        &self,
        lock: &dyn SessionLock,
        identity: &str,
        pid: Pid,
        prepare: F,
        append: A,
    ) -> Result<Outcome>
    where
        F: FnOnce(&Outcome) -> Result<()>,
        A: FnOnce(&mut File, Pid) -> std::io::Result<()>,
    {
        let path = self.path(identity)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| KrateError::Resource {
            path: self.dir.clone(),
            source: e,
        })?;

        let _guard = SessionGuard::acquire(lock)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| resource(&path, e))?;
        let pids = read_pids(&mut file, &path)?;

        let outcome = match pids.first() {
            Some(&leader) => Outcome {
                role: Role::Attacher,
                leader,
            },
            None => Outcome {
                role: Role::Builder,
                leader: pid,
            },
        };
        tracing::info!(identity, %pid, leader = %outcome.leader, role = ?outcome.role, "opening session");

        let recorded = prepare(&outcome)
            .and_then(|()| append(&mut file, pid).map_err(|e| resource(&path, e)));
        if let Err(e) = recorded {
            if outcome.role == Role::Builder {
                drop(file);
                if let Err(cleanup) = remove_if_present(&path) {
                    tracing::warn!(identity, error = %cleanup, "could not remove registry file of failed build");
                }
            }
            return Err(e);
        }
        Ok(outcome)
    }

    /// Unregisters session `pid` of `identity`.
    ///
    /// Closing an identity without a registry file is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a resource error if the registry file cannot be read,
    /// rewritten, or removed.
    pub fn close_session(&self, lock: &dyn SessionLock, identity: &str, pid: Pid) -> Result<()> {
        let path = self.path(identity)?;
        let _guard = SessionGuard::acquire(lock)?;

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(identity, %pid, "no registry entry to close");
                return Ok(());
            }
            Err(e) => return Err(resource(&path, e)),
        };
        let remaining: Vec<Pid> = read_pids(&mut file, &path)?
            .into_iter()
            .filter(|p| *p != pid)
            .collect();
        drop(file);

        if remaining.is_empty() {
            remove_if_present(&path)?;
            tracing::info!(identity, %pid, "last session closed");
            return Ok(());
        }

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| resource(&self.dir, e))?;
        tmp.as_file()
            .set_permissions(Permissions::from_mode(0o644))
            .map_err(|e| resource(tmp.path(), e))?;
        for p in &remaining {
            writeln!(tmp, "{p}").map_err(|e| resource(&path, e))?;
        }
        let _ = tmp
            .persist(&path)
            .map_err(|e| resource(&path, e.error))?;

        tracing::info!(identity, %pid, remaining = remaining.len(), "session closed");
        Ok(())
    }

    /// Returns the session pids of `identity`, leader first. An identity
    /// without open sessions yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns a resource error if the registry file exists but cannot be
    /// read.
    pub fn pids(&self, identity: &str) -> Result<Vec<Pid>> {
        let path = self.path(identity)?;
        match File::open(&path) {
            Ok(mut file) => read_pids(&mut file, &path),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(resource(&path, e)),
        }
    }

    /// Returns the leader pid of `identity`, if a session is open.
    ///
    /// # Errors
    ///
    /// See [`Registry::pids`].
    pub fn leader(&self, identity: &str) -> Result<Option<Pid>> {
        Ok(self.pids(identity)?.first().copied())
    }

    /// Lists every identity with an open registry entry, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns a resource error if the registry directory or one of its
    /// files cannot be read.
    pub fn list(&self) -> Result<Vec<RegistryEntry>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(resource(&self.dir, e)),
        };

        let mut listed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| resource(&self.dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if Identity::validate_name(&name).is_err() || !entry.path().is_file() {
                continue;
            }
            let pids = self.pids(&name)?;
            if !pids.is_empty() {
                listed.push(RegistryEntry {
                    identity: name,
                    pids,
                });
            }
        }
        listed.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(listed)
    }
}

fn resource(path: &Path, source: std::io::Error) -> KrateError {
    KrateError::Resource {
        path: path.to_path_buf(),
        source,
    }
}

fn read_pids(file: &mut File, path: &Path) -> Result<Vec<Pid>> {
    let mut content = String::new();
    let _ = file
        .read_to_string(&mut content)
        .map_err(|e| resource(path, e))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<i32>() {
            Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
            _ => {
                tracing::warn!(path = %path.display(), line, "ignoring malformed registry line");
                None
            }
        })
        .collect())
}

fn append_pid(file: &mut File, pid: Pid) -> std::io::Result<()> {
    file.write_all(format!("{pid}\n").as_bytes())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(resource(path, e)),
    }
}
