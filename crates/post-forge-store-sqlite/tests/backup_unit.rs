// crates/post-forge-store-sqlite/tests/backup_unit.rs
// ============================================================================
// Module: Backup Manager Unit Tests
// Description: Snapshot round-trips, retention tiers, and restore safety.
// Purpose: Pin that backups are restorable and the set stays bounded.
// ============================================================================

//! ## Overview
//! Takes real snapshots of a populated store, restores them, checks the
//! tiered retention against a synthetic month of stamped files, and
//! verifies that a corrupt snapshot never touches the live database.

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

use std::fs;
use std::io::Write;

use post_forge_core::PipelineStore;
use post_forge_core::Post;
use post_forge_core::PostId;
use post_forge_core::Timestamp;
use post_forge_store_sqlite::BackupError;
use post_forge_store_sqlite::BackupManager;
use post_forge_store_sqlite::SqlitePipelineStore;
use post_forge_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

fn post(id: &str) -> Post {
    Post {
        post_id: PostId::new(id),
        title: "t".to_string(),
        body: "b".to_string(),
        origin: "r/x".to_string(),
        author: "a".to_string(),
        score: 1,
        url: "https://x".to_string(),
        original_ts: Timestamp::from_unix_secs(1),
        raw_payload: Vec::new(),
    }
}

#[test]
fn snapshot_then_restore_preserves_rows() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("pipeline.db");
    let store = SqlitePipelineStore::open(&SqliteStoreConfig::new(&db_path)).expect("open");
    store.save_post(&post("kept")).expect("insert");
    drop(store);

    let manager = BackupManager::new(dir.path().join("backups")).expect("manager");
    let snapshot = manager.snapshot(&db_path).expect("snapshot");
    assert!(snapshot.to_string_lossy().ends_with(".db.gz"));

    // Lose the row, then restore the snapshot over the live file.
    fs::remove_file(&db_path).expect("drop live db");
    manager.restore(&snapshot, &db_path).expect("restore");
    let restored = SqlitePipelineStore::open(&SqliteStoreConfig::new(&db_path)).expect("reopen");
    assert_eq!(restored.list_unprocessed_posts().expect("list").len(), 1);
}

#[test]
fn snapshots_are_owner_only_on_unix() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("pipeline.db");
    let store = SqlitePipelineStore::open(&SqliteStoreConfig::new(&db_path)).expect("open");
    store.save_post(&post("p")).expect("insert");
    drop(store);

    let manager = BackupManager::new(dir.path().join("backups")).expect("manager");
    let snapshot = manager.snapshot(&db_path).expect("snapshot");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&snapshot).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
    let _ = snapshot;
}

#[test]
fn retention_keeps_daily_weekly_and_monthly_tiers() {
    let dir = TempDir::new().expect("tempdir");
    let backups = dir.path().join("backups");
    let manager = BackupManager::new(&backups).expect("manager");

    // One snapshot per day across January and February 2026.
    for month in [1u8, 2] {
        for day in 1u8..=28 {
            let stamped = format!("2026{month:02}{day:02}T120000Z.db.gz");
            fs::write(backups.join(stamped), b"fake").expect("stamp");
        }
    }
    manager.apply_retention().expect("retention");

    let kept = manager.list_snapshots().expect("list");
    // Seven dailies survive from the newest week.
    let newest_seven: Vec<_> =
        kept.iter().filter(|snap| snap.taken_at.date().month() as u8 == 2).collect();
    assert!(newest_seven.len() >= 7);
    // Both months remain represented through the monthly tier.
    assert!(kept.iter().any(|snap| snap.taken_at.date().month() as u8 == 1));
    // The overall set is bounded well below the 56 files written.
    assert!(kept.len() <= 7 + 4 + 12, "kept {} snapshots", kept.len());
}

#[test]
fn corrupt_snapshot_leaves_the_live_database_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("pipeline.db");
    let store = SqlitePipelineStore::open(&SqliteStoreConfig::new(&db_path)).expect("open");
    store.save_post(&post("survivor")).expect("insert");
    drop(store);

    let manager = BackupManager::new(dir.path().join("backups")).expect("manager");
    // A gzip file whose payload is not a SQLite database.
    let bogus = dir.path().join("backups").join("20260101T000000Z.db.gz");
    let file = fs::File::create(&bogus).expect("bogus file");
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(b"not a database").expect("payload");
    encoder.finish().expect("finish");

    let error = manager.restore(&bogus, &db_path).expect_err("must refuse");
    assert!(matches!(error, BackupError::Corrupt(_)));

    let intact = SqlitePipelineStore::open(&SqliteStoreConfig::new(&db_path)).expect("reopen");
    assert_eq!(intact.list_unprocessed_posts().expect("list").len(), 1);
}
