//! Domain primitive types used across the krate workspace.

use std::collections::BTreeSet;
use std::fmt;

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

use crate::error::{KrateError, Result};

pub use nix::unistd::Pid;

/// A resolved user identity that owns a zone.
///
/// Produced by an identity lookup and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Login name.
    pub name: String,
    /// Numeric user id.
    pub uid: u32,
    /// Name of the primary group.
    pub group: String,
    /// Numeric primary group id.
    pub gid: u32,
}

impl Identity {
    /// Checks that `name` is usable as a file name inside the registry and
    /// manifest directories.
    ///
    /// # Errors
    ///
    /// Returns [`KrateError::Config`] for empty names, names starting with a
    /// dot, or names containing `/` or NUL.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\0']) {
            return Err(KrateError::Config {
                message: format!("invalid identity name: {name:?}"),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.uid)
    }
}

/// A kind of Linux namespace a zone can isolate.
///
/// The declaration order is the order in which namespaces are joined:
/// the user namespace first so the remaining `setns(2)` calls are checked
/// against it, the mount namespace last so `/proc` stays reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// User and group id mappings.
    User,
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Hostname and domain name.
    Uts,
    /// Network stack.
    Network,
    /// Process id space. Only joined by the operator CLI.
    Pid,
    /// Cgroup root view.
    Cgroup,
    /// Mount table.
    Mount,
}

impl NamespaceKind {
    /// Every kind, in join order.
    pub const ALL: [Self; 7] = [
        Self::User,
        Self::Ipc,
        Self::Uts,
        Self::Network,
        Self::Pid,
        Self::Cgroup,
        Self::Mount,
    ];

    /// Clone flag passed to `unshare(2)` and `setns(2)`.
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::User => CloneFlags::CLONE_NEWUSER,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Cgroup => CloneFlags::CLONE_NEWCGROUP,
            Self::Mount => CloneFlags::CLONE_NEWNS,
        }
    }

    /// Entry name under `/proc/<pid>/ns/`.
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ipc => "ipc",
            Self::Uts => "uts",
            Self::Network => "net",
            Self::Pid => "pid",
            Self::Cgroup => "cgroup",
            Self::Mount => "mnt",
        }
    }

    /// Parses the element name used in the `namespaces` section of a
    /// manifest.
    #[must_use]
    pub fn from_manifest_name(name: &str) -> Option<Self> {
        match name {
            "mount" => Some(Self::Mount),
            "network" => Some(Self::Network),
            "uts" => Some(Self::Uts),
            "ipc" => Some(Self::Ipc),
            "user" => Some(Self::User),
            "pid" => Some(Self::Pid),
            "cgroup" => Some(Self::Cgroup),
            _ => None,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// A set of namespace kinds requested for a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSet(BTreeSet<NamespaceKind>);

impl NamespaceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a kind; returns `false` if it was already present.
    pub fn insert(&mut self, kind: NamespaceKind) -> bool {
        self.0.insert(kind)
    }

    /// Returns whether `kind` is requested.
    #[must_use]
    pub fn contains(&self, kind: NamespaceKind) -> bool {
        self.0.contains(&kind)
    }

    /// Returns whether no namespace is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the requested kinds in join order.
    pub fn iter(&self) -> impl Iterator<Item = NamespaceKind> + '_ {
        self.0.iter().copied()
    }

    /// OR of the clone flags of every requested kind.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        self.iter()
            .fold(CloneFlags::empty(), |acc, kind| acc | kind.clone_flag())
    }
}

impl FromIterator<NamespaceKind> for NamespaceSet {
    fn from_iter<I: IntoIterator<Item = NamespaceKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
