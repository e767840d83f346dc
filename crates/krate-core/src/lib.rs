//! # krate-core
//!
//! Low-level Linux primitives for per-identity zones.
//!
//! This crate provides safe abstractions over:
//! - **Manifests**: loading the namespace set and mount list of an identity.
//! - **Mounts**: option parsing and the bind/remount retry policy.
//! - **Namespaces**: creating a zone with `unshare(2)` and joining a running
//!   one with `setns(2)`.
//! - **Processes**: running a command as the zone identity.
//!
//! Syscalls that change namespaces or the mount table go through the
//! [`kernel::Kernel`] trait. The remaining unsafe calls carry a
//! `// SAFETY:` note.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod identity;
pub mod kernel;
pub mod manifest;
pub mod namespace;
pub mod process;
pub mod substitute;
