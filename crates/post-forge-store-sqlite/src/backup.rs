// crates/post-forge-store-sqlite/src/backup.rs
// ============================================================================
// Module: Store Backup Manager
// Description: Gzip snapshots of the database with tiered retention.
// Purpose: Keep restorable copies without letting the backup set grow
//          unbounded.
// Dependencies: post-forge-core, rusqlite, flate2, time
// ============================================================================

//! ## Overview
//! Snapshots go through the `SQLite` online-backup API into a staging file
//! (a consistent read that never blocks the writer for long), then compress
//! into `<artifacts_root>/backups/<iso_ts>.db.gz` readable by the owner
//! only. Retention keeps the last 7 daily, 4 ISO-weekly, and 12 monthly
//! snapshots; cleanup runs after every snapshot. Restore decompresses to a
//! staging path, verifies the database header and integrity, safety-copies
//! the live database, and atomically replaces it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use post_forge_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::backup::Backup;
use thiserror::Error;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Snapshot filename timestamp layout (filesystem-safe ISO 8601 basic form).
const SNAPSHOT_TS_FORMAT: &str = "[year][month][day]T[hour][minute][second]Z";
/// Pages copied per backup step.
const BACKUP_PAGES_PER_STEP: i32 = 64;
/// Daily snapshots kept.
const KEEP_DAILY: usize = 7;
/// Weekly snapshots kept.
const KEEP_WEEKLY: usize = 4;
/// Monthly snapshots kept.
const KEEP_MONTHLY: usize = 12;
/// `SQLite` database file header magic.
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backup manager errors.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Filesystem error.
    #[error("backup io error: {0}")]
    Io(String),
    /// `SQLite` error during snapshot or verification.
    #[error("backup db error: {0}")]
    Db(String),
    /// The snapshot failed verification.
    #[error("backup verification failed: {0}")]
    Corrupt(String),
    /// A snapshot filename does not carry a parseable timestamp.
    #[error("backup name invalid: {0}")]
    InvalidName(String),
}

impl From<io::Error> for BackupError {
    fn from(error: io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<rusqlite::Error> for BackupError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Snapshot Listing
// ============================================================================

/// One stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Snapshot file path.
    pub path: PathBuf,
    /// Moment the snapshot was taken, from its filename.
    pub taken_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Snapshot and retention driver for the pipeline database.
pub struct BackupManager {
    /// Directory holding the compressed snapshots.
    backups_dir: PathBuf,
}

impl BackupManager {
    /// Creates a manager, creating the backups directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when the directory cannot be created.
    pub fn new(backups_dir: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let backups_dir = backups_dir.into();
        fs::create_dir_all(&backups_dir)?;
        Ok(Self {
            backups_dir,
        })
    }

    /// Takes one snapshot and enforces retention.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when the snapshot or cleanup fails.
    pub fn snapshot(&self, db_path: &Path) -> Result<PathBuf, BackupError> {
        let stamp = format_stamp(OffsetDateTime::now_utc())?;
        let staging = self.backups_dir.join(format!("{stamp}.db.staging"));
        copy_database(db_path, &staging)?;
        let target = self.backups_dir.join(format!("{stamp}.db.gz"));
        let compress_result = compress_file(&staging, &target);
        let cleanup_result = fs::remove_file(&staging);
        compress_result?;
        cleanup_result?;
        restrict_permissions(&target)?;
        self.apply_retention()?;
        Ok(target)
    }

    /// Returns all snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when the directory cannot be read.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, BackupError> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.backups_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(stamp) = name.strip_suffix(".db.gz") else {
                continue;
            };
            match parse_stamp(stamp) {
                Ok(taken_at) => snapshots.push(SnapshotInfo {
                    path,
                    taken_at,
                }),
                Err(_) => continue,
            }
        }
        snapshots.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
        Ok(snapshots)
    }

    /// Deletes snapshots outside every retention tier.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when listing or deletion fails.
    pub fn apply_retention(&self) -> Result<(), BackupError> {
        let snapshots = self.list_snapshots()?;
        let mut daily_seen: Vec<(i32, u16)> = Vec::new();
        let mut weekly_seen: Vec<(i32, u8)> = Vec::new();
        let mut monthly_seen: Vec<(i32, u8)> = Vec::new();
        for snapshot in &snapshots {
            let date = snapshot.taken_at.date();
            let day_key = (date.year(), date.ordinal());
            let week_key = (date.year(), date.iso_week());
            let month_key = (date.year(), u8::from(date.month()));
            let keep_daily = tier_accepts(&mut daily_seen, day_key, KEEP_DAILY);
            let keep_weekly = tier_accepts(&mut weekly_seen, week_key, KEEP_WEEKLY);
            let keep_monthly = tier_accepts(&mut monthly_seen, month_key, KEEP_MONTHLY);
            if !(keep_daily || keep_weekly || keep_monthly) {
                fs::remove_file(&snapshot.path)?;
            }
        }
        Ok(())
    }

    /// Restores a snapshot over the live database.
    ///
    /// The snapshot is decompressed to a staging path and verified (header
    /// magic plus `PRAGMA integrity_check`) before the live file is touched;
    /// a safety copy of the current database is kept next to it.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when verification or any filesystem step
    /// fails; the live database is unchanged in that case.
    pub fn restore(&self, snapshot: &Path, db_path: &Path) -> Result<(), BackupError> {
        let staging = db_path.with_extension("restore-staging");
        decompress_file(snapshot, &staging)?;
        if let Err(error) = verify_database(&staging) {
            let _ = fs::remove_file(&staging);
            return Err(error);
        }
        if db_path.exists() {
            let safety = db_path.with_extension(format!(
                "pre-restore-{}",
                Timestamp::now().as_unix_secs()
            ));
            fs::copy(db_path, &safety)?;
        }
        fs::rename(&staging, db_path)?;
        Ok(())
    }
}

/// Records a tier key, returning whether the tier keeps this snapshot.
fn tier_accepts<K: PartialEq + Copy>(seen: &mut Vec<K>, key: K, cap: usize) -> bool {
    if seen.contains(&key) {
        return false;
    }
    if seen.len() >= cap {
        return false;
    }
    seen.push(key);
    true
}

// ============================================================================
// SECTION: Snapshot Internals
// ============================================================================

/// Copies the live database to a staging file via the online-backup API.
fn copy_database(source: &Path, staging: &Path) -> Result<(), BackupError> {
    let src = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;
    let mut dst = Connection::open(staging)?;
    let backup = Backup::new(&src, &mut dst)?;
    backup.run_to_completion(
        BACKUP_PAGES_PER_STEP,
        std::time::Duration::from_millis(50),
        None,
    )?;
    Ok(())
}

/// Compresses a file with gzip.
fn compress_file(source: &Path, target: &Path) -> Result<(), BackupError> {
    let mut input = File::open(source)?;
    let output = File::create(target)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    Ok(())
}

/// Decompresses a gzip file.
fn decompress_file(source: &Path, target: &Path) -> Result<(), BackupError> {
    let input = File::open(source)?;
    let mut decoder = GzDecoder::new(input);
    let mut output = File::create(target)?;
    io::copy(&mut decoder, &mut output)?;
    output.sync_all()?;
    Ok(())
}

/// Verifies a restored database: header magic and integrity check.
fn verify_database(path: &Path) -> Result<(), BackupError> {
    let mut header = [0u8; 16];
    let mut file = File::open(path)?;
    file.read_exact(&mut header)
        .map_err(|_| BackupError::Corrupt("database header truncated".to_string()))?;
    if &header != SQLITE_MAGIC {
        return Err(BackupError::Corrupt("database header magic mismatch".to_string()));
    }
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;
    let verdict: String =
        connection.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(BackupError::Corrupt(format!("integrity check failed: {verdict}")));
    }
    Ok(())
}

/// Restricts a snapshot to owner read/write.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), BackupError> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

/// Permission bits are not portable off unix; snapshots stay readable.
#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), BackupError> {
    Ok(())
}

// ============================================================================
// SECTION: Timestamp Stamps
// ============================================================================

/// Formats a snapshot timestamp.
fn format_stamp(moment: OffsetDateTime) -> Result<String, BackupError> {
    let format = format_description::parse(SNAPSHOT_TS_FORMAT)
        .map_err(|error| BackupError::InvalidName(error.to_string()))?;
    moment.format(&format).map_err(|error| BackupError::InvalidName(error.to_string()))
}

/// Parses a snapshot timestamp back from a filename stem.
fn parse_stamp(stamp: &str) -> Result<OffsetDateTime, BackupError> {
    let format = format_description::parse(SNAPSHOT_TS_FORMAT)
        .map_err(|error| BackupError::InvalidName(error.to_string()))?;
    PrimitiveDateTime::parse(stamp, &format)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|error| BackupError::InvalidName(format!("{stamp}: {error}")))
}
