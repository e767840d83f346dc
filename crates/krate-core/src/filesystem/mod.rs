//! Filesystem setup for zone mount namespaces.
//!
//! Provides the mount option parser and the executor that applies a
//! manifest entry, including pre-creation of missing mount points.

pub mod mount;
pub mod options;
