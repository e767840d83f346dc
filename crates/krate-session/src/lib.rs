//! Session management for krate zones.
//!
//! Decides, per identity and under one host-wide lock, whether a new
//! session creates the identity's namespaces or joins those of the
//! session that created them, and exposes that decision to login hooks.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod lock;
pub mod registry;
pub mod session;

pub use lock::{SemaphoreLock, SessionGuard, SessionLock};
pub use registry::{Outcome, Registry, RegistryEntry, Role};
pub use session::{HookAdapter, HookStatus, NamespaceSession, SessionHook};
