// crates/post-forge-store-sqlite/src/lock.rs
// ============================================================================
// Module: Data Directory Lock
// Description: PID lockfile guaranteeing one orchestrator per database.
// Purpose: Make the governor's in-memory lifetime tally safe to maintain.
// Dependencies: std
// ============================================================================

//! ## Overview
//! At most one orchestrator may run against a database. The lock is an
//! advisory file lock on `pid.lock` in the data directory: the kernel
//! releases it when the process exits, so a crashed run never leaves a
//! stale lock behind. The process id is written into the file for
//! diagnostics only; liveness comes from the lock itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lockfile name inside the data directory.
pub const LOCK_FILE_NAME: &str = "pid.lock";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lock acquisition errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("data directory locked by another process: {0}")]
    Contended(String),
    /// Filesystem error while acquiring the lock.
    #[error("lock io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Lock
// ============================================================================

/// Held advisory lock on the data directory.
///
/// # Invariants
/// - The lock is released when this value drops or the process dies.
pub struct PidLock {
    /// Open, locked lockfile handle.
    file: File,
    /// Lockfile path.
    path: PathBuf,
}

impl PidLock {
    /// Acquires the lock inside a data directory, without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contended`] when another live process holds the
    /// lock, or [`LockError::Io`] for filesystem failures.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(data_dir).map_err(|error| LockError::Io(error.to_string()))?;
        let path = data_dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|error| LockError::Io(error.to_string()))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(std::fs::TryLockError::WouldBlock) => {
                return Err(LockError::Contended(path.display().to_string()));
            }
            Err(std::fs::TryLockError::Error(error)) => {
                return Err(LockError::Io(error.to_string()));
            }
        }
        file.set_len(0).map_err(|error| LockError::Io(error.to_string()))?;
        writeln!(file, "{}", std::process::id())
            .map_err(|error| LockError::Io(error.to_string()))?;
        Ok(Self {
            file,
            path,
        })
    }

    /// Returns the lockfile path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        // Explicit unlock; the handle closing would release it anyway.
        let _ = self.file.unlock();
        let _ = fs::remove_file(&self.path);
    }
}
