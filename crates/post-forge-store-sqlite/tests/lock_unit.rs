// crates/post-forge-store-sqlite/tests/lock_unit.rs
// ============================================================================
// Module: Data Lock Unit Tests
// Description: Single-orchestrator enforcement via the advisory lockfile.
// Purpose: Pin contention detection and release-on-drop.
// ============================================================================

//! ## Overview
//! A held lock must refuse a second acquisition without side effects; once
//! the holder drops, acquisition succeeds again. The lockfile carries the
//! holder's pid for diagnostics.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use post_forge_store_sqlite::LOCK_FILE_NAME;
use post_forge_store_sqlite::LockError;
use post_forge_store_sqlite::PidLock;
use tempfile::TempDir;

#[test]
fn second_acquisition_is_contended_while_held() {
    let dir = TempDir::new().expect("tempdir");
    let held = PidLock::acquire(dir.path()).expect("first acquire");
    let second = PidLock::acquire(dir.path());
    assert!(matches!(second, Err(LockError::Contended(_))));
    drop(held);
}

#[test]
fn lock_releases_on_drop() {
    let dir = TempDir::new().expect("tempdir");
    {
        let _held = PidLock::acquire(dir.path()).expect("first acquire");
    }
    let again = PidLock::acquire(dir.path()).expect("reacquire after drop");
    drop(again);
}

#[test]
fn lockfile_records_the_holder_pid() {
    let dir = TempDir::new().expect("tempdir");
    let held = PidLock::acquire(dir.path()).expect("acquire");
    let content = std::fs::read_to_string(dir.path().join(LOCK_FILE_NAME)).expect("lockfile");
    assert_eq!(content.trim(), std::process::id().to_string());
    drop(held);
}
