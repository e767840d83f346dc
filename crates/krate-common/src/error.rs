//! Unified error types for the krate workspace.
//!
//! Every fallible operation of the session manager reports one of these
//! variants. None of them are retried by the caller; the login-hook
//! boundary turns them into a denied session and the CLI into a non-zero
//! exit status.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum KrateError {
    /// A registry, temporary, or manifest file could not be opened, read,
    /// written, or renamed.
    #[error("I/O error at {path}: {source}")]
    Resource {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A namespace or process syscall failed.
    #[error("{op} failed: {errno}")]
    Syscall {
        /// Name of the failing operation.
        op: String,
        /// Errno reported by the kernel.
        errno: Errno,
    },

    /// A manifest mount entry could not be mounted.
    #[error("mount {src} on {dst} failed: {errno}")]
    Mount {
        /// Substituted source path.
        src: String,
        /// Substituted destination path.
        dst: String,
        /// Errno reported by the final `mount(2)` attempt.
        errno: Errno,
    },

    /// The manifest is malformed or misses a required field.
    #[error("invalid manifest {path}: {message}")]
    Manifest {
        /// Manifest file the error was found in.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Dropping privileges to the target identity failed.
    #[error("privilege change {op} failed: {errno}")]
    Privilege {
        /// Name of the failing step (`initgroups`, `setgid`, `setuid`).
        op: &'static str,
        /// Errno reported by the kernel.
        errno: Errno,
    },

    /// A configuration value or argument is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },
}

impl KrateError {
    /// Builds a [`KrateError::Syscall`] for the named operation.
    pub fn syscall(op: impl Into<String>, errno: Errno) -> Self {
        Self::Syscall {
            op: op.into(),
            errno,
        }
    }

    /// Numeric diagnostic code reported alongside a failed session.
    ///
    /// Kernel failures report their errno; the remaining variants use
    /// fixed codes above the errno range.
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Syscall { errno, .. }
            | Self::Mount { errno, .. }
            | Self::Privilege { errno, .. } => *errno as i32,
            Self::Resource { source, .. } => source.raw_os_error().unwrap_or(Errno::EIO as i32),
            Self::Manifest { .. } => 1001,
            Self::Config { .. } => 1002,
            Self::NotFound { .. } => 1003,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, KrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_status_code_is_errno() {
        let err = KrateError::syscall("setns", Errno::EPERM);
        assert_eq!(err.status_code(), Errno::EPERM as i32);
        assert_eq!(err.to_string(), format!("setns failed: {}", Errno::EPERM));
    }

    #[test]
    fn resource_status_code_uses_os_error() {
        let err = KrateError::Resource {
            path: "/run/krate/alice".into(),
            source: std::io::Error::from_raw_os_error(Errno::EACCES as i32),
        };
        assert_eq!(err.status_code(), Errno::EACCES as i32);
    }

    #[test]
    fn mount_error_names_both_paths() {
        let err = KrateError::Mount {
            src: "/srv/zoneA".into(),
            dst: "/home/alice".into(),
            errno: Errno::ENOENT,
        };
        let msg = err.to_string();
        assert!(msg.contains("/srv/zoneA"));
        assert!(msg.contains("/home/alice"));
    }

    #[test]
    fn non_kernel_errors_have_distinct_codes() {
        let manifest = KrateError::Manifest {
            path: "owner.xml".into(),
            message: "x".into(),
        };
        let config = KrateError::Config {
            message: "x".into(),
        };
        assert_ne!(manifest.status_code(), config.status_code());
    }
}
