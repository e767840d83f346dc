//! Linux namespace management for zones.
//!
//! A zone's namespaces are created once, by the first session of an
//! identity (`unshare(2)`), and joined by every later session and by the
//! operator CLI (`setns(2)` through `/proc/<pid>/ns`).

pub mod attach;
pub mod build;

pub use attach::attach_to;
pub use build::build_namespaces;
