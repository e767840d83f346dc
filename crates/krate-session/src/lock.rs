//! The host-wide session lock.
//!
//! Every registry mutation for every identity happens under one lock. The
//! lock is an explicit capability handed to the registry so tests can use
//! an in-process implementation instead of a named semaphore.

use std::ffi::CString;

use krate_common::error::{KrateError, Result};
use nix::errno::Errno;

/// A mutual-exclusion primitive shared by all session processes.
pub trait SessionLock: Send + Sync {
    /// Blocks until the lock is held by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the underlying primitive fails.
    fn acquire(&self) -> Result<()>;

    /// Releases a lock previously obtained with [`SessionLock::acquire`].
    fn release(&self);
}

/// Holds a [`SessionLock`] until dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SessionGuard<'a> {
    lock: &'a dyn SessionLock,
}

impl<'a> SessionGuard<'a> {
    /// Acquires `lock` for the lifetime of the returned guard.
    ///
    /// # Errors
    ///
    /// Returns the error of [`SessionLock::acquire`].
    pub fn acquire(lock: &'a dyn SessionLock) -> Result<Self> {
        lock.acquire()?;
        Ok(Self { lock })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// [`SessionLock`] backed by a POSIX named semaphore (`sem_open(3)`).
///
/// The semaphore is created with an initial count of one the first time
/// any process opens it and persists until the host reboots.
#[derive(Debug)]
pub struct SemaphoreLock {
    name: String,
    sem: *mut libc::sem_t,
}

// SAFETY: a sem_t handle returned by sem_open may be used from any thread.
#[allow(unsafe_code)]
unsafe impl Send for SemaphoreLock {}
// SAFETY: sem_wait/sem_post are thread-safe on a shared handle.
#[allow(unsafe_code)]
unsafe impl Sync for SemaphoreLock {}

#[allow(unsafe_code)]
impl SemaphoreLock {
    /// Opens the named semaphore, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `sem_open(3)` fails or the name contains
    /// a NUL byte.
    pub fn open(name: &str) -> Result<Self> {
        let c_name = CString::new(name).map_err(|_| KrateError::Config {
            message: format!("semaphore name contains NUL byte: {name:?}"),
        })?;
        let mode: libc::c_uint = 0o600;
        let initial: libc::c_uint = 1;

        // SAFETY: c_name is a valid NUL-terminated string; the variadic
        // mode and value arguments are required with O_CREAT.
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT, mode, initial) };
        if sem == libc::SEM_FAILED {
            return Err(KrateError::syscall(format!("sem_open {name}"), Errno::last()));
        }

        tracing::debug!(name, "session semaphore opened");
        Ok(Self {
            name: name.to_string(),
            sem,
        })
    }

    /// Returns the semaphore name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[allow(unsafe_code)]
impl SessionLock for SemaphoreLock {
    fn acquire(&self) -> Result<()> {
        loop {
            // SAFETY: self.sem was returned by a successful sem_open and is
            // only closed on drop.
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => {}
                errno => return Err(KrateError::syscall("sem_wait", errno)),
            }
        }
    }

    fn release(&self) {
        // SAFETY: see `acquire`.
        if unsafe { libc::sem_post(self.sem) } != 0 {
            tracing::warn!(name = %self.name, errno = %Errno::last(), "sem_post failed");
        }
    }
}

#[allow(unsafe_code)]
impl Drop for SemaphoreLock {
    fn drop(&mut self) {
        // SAFETY: self.sem is a live handle from sem_open; it is not used
        // after this point.
        let _ = unsafe { libc::sem_close(self.sem) };
    }
}
