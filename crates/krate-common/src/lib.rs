//! # krate-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the krate workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the identity and namespace vocabulary that
//! the session manager and operator CLI build upon.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
