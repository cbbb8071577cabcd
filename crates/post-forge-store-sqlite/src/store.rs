// crates/post-forge-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Pipeline Store
// Description: Durable PipelineStore backed by SQLite WAL.
// Purpose: Persist posts, stage runs, cost entries, and the audit trail.
// Dependencies: post-forge-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements the pipeline's relational store. One writer (the
//! orchestrator) serializes all mutations through a mutex-guarded WAL
//! connection; readers (the dashboard, the backup snapshot) open their own
//! read-only connections and see consistent snapshots. Stage runs, cost
//! entries, and audit events are append-only: the store exposes no update or
//! delete for them, and corrections append new rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use post_forge_core::AuditAction;
use post_forge_core::AuditEntry;
use post_forge_core::AuditEvent;
use post_forge_core::CostRecord;
use post_forge_core::PipelineStore;
use post_forge_core::Post;
use post_forge_core::PostId;
use post_forge_core::RunId;
use post_forge_core::SaveOutcome;
use post_forge_core::Stage;
use post_forge_core::StageRecord;
use post_forge_core::StageRun;
use post_forge_core::StageStatus;
use post_forge_core::StoreError;
use post_forge_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Window within which a run's latest cost entry counts as "in progress".
const LIVE_RUN_WINDOW_SECS: i64 = 600;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` pipeline store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a config with default timeouts.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw post bodies or model output.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption detected.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a rusqlite error into a store error.
fn db_err(error: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(error.to_string())
}

// ============================================================================
// SECTION: Dashboard Projections
// ============================================================================

/// Terminal-condition counts over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TerminalCounts {
    /// Posts whose upload completed.
    pub uploaded: u64,
    /// Posts discarded at the problem gate.
    pub discarded: u64,
    /// Posts rejected at an acceptance gate.
    pub rejected: u64,
    /// Posts that failed terminally.
    pub failed: u64,
    /// Posts stopped by a cost refusal.
    pub cost_exhausted: u64,
}

/// Live counters of the most recent run, when one appears to be in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProjection {
    /// Run identifier.
    pub run_id: RunId,
    /// Tokens sent so far.
    pub tokens_sent: u64,
    /// Tokens received so far.
    pub tokens_received: u64,
    /// Realized spend so far, in USD.
    pub run_cost_usd: f64,
    /// Timestamp of the latest cost entry.
    pub updated_at: Timestamp,
}

/// One post currently between its first stage run and a terminal condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightPost {
    /// Post identifier.
    pub post_id: PostId,
    /// Post title.
    pub title: String,
    /// Most recent stage attempted.
    pub last_stage: Stage,
    /// Outcome of that attempt.
    pub last_status: StageStatus,
    /// Timestamp of that attempt.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed pipeline store.
///
/// # Invariants
/// - All access serializes through one mutex-guarded connection per handle.
/// - Read-only handles refuse every mutation at the `SQLite` level.
#[derive(Clone)]
pub struct SqlitePipelineStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqlitePipelineStore {
    /// Opens (and initializes) the store for the single writer.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is unusable, the schema
    /// version mismatches, or `SQLite` refuses the connection.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_path(&config.path)?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut connection =
            Connection::open_with_flags(&config.path, flags).map_err(|err| db_err(&err))?;
        apply_pragmas(&connection, config.busy_timeout_ms)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens the store read-only; the writer is never blocked.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database is missing or its
    /// schema version mismatches.
    pub fn open_read_only(path: &Path) -> Result<Self, SqliteStoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(path, flags).map_err(|err| db_err(&err))?;
        connection
            .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .map_err(|err| db_err(&err))?;
        verify_schema_version(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection for one operation.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("store mutex poisoned".to_string()))
    }

    // ------------------------------------------------------------------
    // Dashboard projections
    // ------------------------------------------------------------------

    /// Returns realized spend since the given timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn spend_since(&self, since: Timestamp) -> Result<f64, SqliteStoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT COALESCE(SUM(usd_cost), 0.0) FROM cost_entries
                 WHERE abort_reason IS NULL AND created_at >= ?1",
                params![since.as_unix_secs()],
                |row| row.get(0),
            )
            .map_err(|err| db_err(&err))
    }

    /// Returns terminal-condition counts since the given timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn terminal_counts_since(
        &self,
        since: Timestamp,
    ) -> Result<TerminalCounts, SqliteStoreError> {
        let guard = self.lock()?;
        let uploaded = count_rows(
            &guard,
            "SELECT COUNT(*) FROM stage_runs
             WHERE stage = 'upload' AND status = 'completed' AND created_at >= ?1",
            since,
        )?;
        Ok(TerminalCounts {
            uploaded,
            discarded: status_count(&guard, StageStatus::Discarded, since)?,
            rejected: status_count(&guard, StageStatus::Rejected, since)?,
            failed: status_count(&guard, StageStatus::Failed, since)?,
            cost_exhausted: status_count(&guard, StageStatus::CostExhausted, since)?,
        })
    }

    /// Returns the latest run's live counters when its most recent cost
    /// entry is younger than the live-run window.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn current_run_projection(
        &self,
        now: Timestamp,
    ) -> Result<Option<RunProjection>, SqliteStoreError> {
        let guard = self.lock()?;
        let latest: Option<(String, i64)> = guard
            .query_row(
                "SELECT run_id, created_at FROM cost_entries ORDER BY id DESC LIMIT 1",
                params![],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        let Some((run_id, updated_at)) = latest else {
            return Ok(None);
        };
        if now.as_unix_secs() - updated_at > LIVE_RUN_WINDOW_SECS {
            return Ok(None);
        }
        let (tokens_sent, tokens_received, run_cost_usd): (i64, i64, f64) = guard
            .query_row(
                "SELECT COALESCE(SUM(tokens_in), 0), COALESCE(SUM(tokens_out), 0),
                        COALESCE(SUM(usd_cost), 0.0)
                 FROM cost_entries WHERE run_id = ?1 AND abort_reason IS NULL",
                params![run_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|err| db_err(&err))?;
        Ok(Some(RunProjection {
            run_id: RunId::new(run_id),
            tokens_sent: unsigned(tokens_sent),
            tokens_received: unsigned(tokens_received),
            run_cost_usd,
            updated_at: Timestamp::from_unix_secs(updated_at),
        }))
    }

    /// Returns posts with at least one stage run and no terminal condition.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn posts_in_flight(&self) -> Result<Vec<InFlightPost>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT p.post_id, p.title, s.stage, s.status, s.created_at
                 FROM posts p
                 JOIN stage_runs s ON s.id = (
                     SELECT id FROM stage_runs WHERE post_id = p.post_id
                     ORDER BY id DESC LIMIT 1
                 )
                 WHERE NOT EXISTS (
                     SELECT 1 FROM stage_runs t
                     WHERE t.post_id = p.post_id
                       AND (t.status IN
                                ('discarded', 'rejected', 'failed', 'cost_exhausted')
                            OR (t.stage = 'upload' AND t.status = 'completed'))
                 )
                 ORDER BY s.created_at DESC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        let mut posts = Vec::new();
        for row in rows {
            let (post_id, title, stage, status, created_at) = row.map_err(|err| db_err(&err))?;
            posts.push(InFlightPost {
                post_id: PostId::new(post_id),
                title,
                last_stage: parse_stage(&stage)?,
                last_status: parse_status(&status)?,
                updated_at: Timestamp::from_unix_secs(created_at),
            });
        }
        Ok(posts)
    }

    /// Returns recent audit events, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn recent_audit_events(&self, limit: u32) -> Result<Vec<AuditEvent>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT id, action, post_id, run_id, details, error_flag,
                        cost_exhausted_flag, created_at
                 FROM audit_events ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|err| db_err(&err))?;
        let rows =
            statement.query_map(params![limit], audit_from_row).map_err(|err| db_err(&err))?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(|err| db_err(&err))??);
        }
        Ok(events)
    }
}

// ============================================================================
// SECTION: PipelineStore Implementation
// ============================================================================

impl PipelineStore for SqlitePipelineStore {
    fn save_post(&self, post: &Post) -> Result<SaveOutcome, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let changed = guard
            .execute(
                "INSERT INTO posts
                     (post_id, title, body, origin, author, score, url,
                      original_ts, raw_payload, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(post_id) DO NOTHING",
                params![
                    post.post_id.as_str(),
                    post.title,
                    post.body,
                    post.origin,
                    post.author,
                    post.score,
                    post.url,
                    post.original_ts.as_unix_secs(),
                    post.raw_payload,
                    Timestamp::now().as_unix_secs(),
                ],
            )
            .map_err(|err| StoreError::from(db_err(&err)))?;
        if changed == 0 {
            Ok(SaveOutcome::AlreadyPresent)
        } else {
            Ok(SaveOutcome::Inserted)
        }
    }

    fn list_unprocessed_posts(&self) -> Result<Vec<Post>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT post_id, title, body, origin, author, score, url,
                        original_ts, raw_payload
                 FROM posts p
                 WHERE NOT EXISTS (
                     SELECT 1 FROM stage_runs s
                     WHERE s.post_id = p.post_id
                       AND s.stage = 'upload' AND s.status = 'completed'
                 )
                 ORDER BY p.original_ts DESC",
            )
            .map_err(|err| StoreError::from(db_err(&err)))?;
        let rows = statement
            .query_map(params![], post_from_row)
            .map_err(|err| StoreError::from(db_err(&err)))?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row.map_err(|err| StoreError::from(db_err(&err)))?);
        }
        Ok(posts)
    }

    fn record_stage(&self, record: &StageRecord) -> Result<i64, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        insert_stage_run(&guard, record).map_err(StoreError::from)
    }

    fn record_stage_transition(
        &self,
        record: &StageRecord,
        audit: &AuditEntry,
    ) -> Result<i64, StoreError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| StoreError::from(db_err(&err)))?;
        let run_row = insert_stage_run(&tx, record).map_err(StoreError::from)?;
        insert_audit(&tx, audit).map_err(StoreError::from)?;
        tx.commit().map_err(|err| StoreError::from(db_err(&err)))?;
        Ok(run_row)
    }

    fn stage_runs(&self, post_id: &PostId) -> Result<Vec<StageRun>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT id, post_id, stage, status, artifact_path, error_message, created_at
                 FROM stage_runs WHERE post_id = ?1 ORDER BY id ASC",
            )
            .map_err(|err| StoreError::from(db_err(&err)))?;
        let rows = statement
            .query_map(params![post_id.as_str()], stage_run_from_row)
            .map_err(|err| StoreError::from(db_err(&err)))?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.map_err(|err| StoreError::from(db_err(&err)))??);
        }
        Ok(runs)
    }

    fn append_cost_entry(&self, record: &CostRecord) -> Result<i64, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO cost_entries
                     (run_id, tokens_in, tokens_out, usd_cost, model, abort_reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.run_id.as_str(),
                    signed(record.tokens_in),
                    signed(record.tokens_out),
                    record.usd_cost,
                    record.model,
                    record.abort_reason,
                    Timestamp::now().as_unix_secs(),
                ],
            )
            .map_err(|err| StoreError::from(db_err(&err)))?;
        Ok(guard.last_insert_rowid())
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<i64, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        insert_audit(&guard, entry).map_err(StoreError::from)
    }

    fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError> {
        self.recent_audit_events(limit).map_err(StoreError::from)
    }

    fn lifetime_spend(&self) -> Result<f64, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .query_row(
                "SELECT COALESCE(SUM(usd_cost), 0.0) FROM cost_entries
                 WHERE abort_reason IS NULL",
                params![],
                |row| row.get(0),
            )
            .map_err(|err| StoreError::from(db_err(&err)))
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a posts row into a [`Post`].
fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        post_id: PostId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        body: row.get(2)?,
        origin: row.get(3)?,
        author: row.get(4)?,
        score: row.get(5)?,
        url: row.get(6)?,
        original_ts: Timestamp::from_unix_secs(row.get(7)?),
        raw_payload: row.get(8)?,
    })
}

/// Maps a stage_runs row into a [`StageRun`], deferring label validation.
fn stage_run_from_row(row: &Row<'_>) -> rusqlite::Result<Result<StageRun, SqliteStoreError>> {
    let stage: String = row.get(2)?;
    let status: String = row.get(3)?;
    let run = StageRun {
        id: row.get(0)?,
        post_id: PostId::new(row.get::<_, String>(1)?),
        stage: Stage::Problem,
        status: StageStatus::Completed,
        artifact_path: row.get(4)?,
        error_message: row.get(5)?,
        created_at: Timestamp::from_unix_secs(row.get(6)?),
    };
    Ok(match (parse_stage(&stage), parse_status(&status)) {
        (Ok(stage), Ok(status)) => Ok(StageRun {
            stage,
            status,
            ..run
        }),
        (Err(error), _) | (_, Err(error)) => Err(error),
    })
}

/// Maps an audit_events row into an [`AuditEvent`], deferring validation.
fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<Result<AuditEvent, SqliteStoreError>> {
    let action: String = row.get(1)?;
    let details: String = row.get(4)?;
    let post_id: Option<String> = row.get(2)?;
    let run_id: Option<String> = row.get(3)?;
    let error_flag: i64 = row.get(5)?;
    let cost_flag: i64 = row.get(6)?;
    let id: i64 = row.get(0)?;
    let created_at: i64 = row.get(7)?;
    let parsed_action = AuditAction::from_wire(&action).ok_or_else(|| {
        SqliteStoreError::Corrupt(format!("unknown audit action: {action}"))
    });
    let parsed_details = serde_json::from_str(&details)
        .map_err(|error| SqliteStoreError::Corrupt(format!("audit details not json: {error}")));
    Ok(match (parsed_action, parsed_details) {
        (Ok(action), Ok(details)) => Ok(AuditEvent {
            id,
            action,
            post_id: post_id.map(PostId::new),
            run_id: run_id.map(RunId::new),
            details,
            error_flag: error_flag != 0,
            cost_exhausted_flag: cost_flag != 0,
            created_at: Timestamp::from_unix_secs(created_at),
        }),
        (Err(error), _) | (_, Err(error)) => Err(error),
    })
}

/// Parses a stage label or reports corruption.
fn parse_stage(label: &str) -> Result<Stage, SqliteStoreError> {
    Stage::from_wire(label)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown stage label: {label}")))
}

/// Parses a status label or reports corruption.
fn parse_status(label: &str) -> Result<StageStatus, SqliteStoreError> {
    StageStatus::from_wire(label)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown status label: {label}")))
}

// ============================================================================
// SECTION: Insert Helpers
// ============================================================================

/// Inserts one stage run row.
fn insert_stage_run(connection: &Connection, record: &StageRecord) -> Result<i64, SqliteStoreError> {
    connection
        .execute(
            "INSERT INTO stage_runs
                 (post_id, stage, status, artifact_path, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.post_id.as_str(),
                record.stage.as_str(),
                record.status.as_str(),
                record.artifact_path,
                record.error_message,
                Timestamp::now().as_unix_secs(),
            ],
        )
        .map_err(|err| db_err(&err))?;
    Ok(connection.last_insert_rowid())
}

/// Inserts one audit event row.
fn insert_audit(connection: &Connection, entry: &AuditEntry) -> Result<i64, SqliteStoreError> {
    let details = serde_json::to_string(&entry.details)
        .map_err(|error| SqliteStoreError::Invalid(format!("audit details not json: {error}")))?;
    connection
        .execute(
            "INSERT INTO audit_events
                 (action, post_id, run_id, details, error_flag, cost_exhausted_flag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.action.as_str(),
                entry.post_id.as_ref().map(PostId::as_str),
                entry.run_id.as_ref().map(RunId::as_str),
                details,
                i64::from(entry.error_flag),
                i64::from(entry.cost_exhausted_flag),
                Timestamp::now().as_unix_secs(),
            ],
        )
        .map_err(|err| db_err(&err))?;
    Ok(connection.last_insert_rowid())
}

// ============================================================================
// SECTION: Numeric Helpers
// ============================================================================

/// Converts a token count for storage.
fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Converts a stored count back to unsigned.
fn unsigned(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Runs a single-parameter COUNT query.
fn count_rows(
    connection: &Connection,
    sql: &str,
    since: Timestamp,
) -> Result<u64, SqliteStoreError> {
    connection
        .query_row(sql, params![since.as_unix_secs()], |row| row.get::<_, i64>(0))
        .map_err(|err| db_err(&err))
        .map(unsigned)
}

/// Counts stage runs with one status in a window.
fn status_count(
    connection: &Connection,
    status: StageStatus,
    since: Timestamp,
) -> Result<u64, SqliteStoreError> {
    connection
        .query_row(
            "SELECT COUNT(*) FROM stage_runs WHERE status = ?1 AND created_at >= ?2",
            params![status.as_str(), since.as_unix_secs()],
            |row| row.get::<_, i64>(0),
        )
        .map_err(|err| db_err(&err))
        .map(unsigned)
}

// ============================================================================
// SECTION: Open Helpers
// ============================================================================

/// Validates the configured database path.
fn validate_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, busy_timeout_ms: u64) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA journal_mode = wal;")
        .map_err(|err| db_err(&err))?;
    connection
        .execute_batch("PRAGMA synchronous = full;")
        .map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(Duration::from_millis(busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS posts (
                    post_id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL,
                    origin TEXT NOT NULL,
                    author TEXT NOT NULL,
                    score INTEGER NOT NULL,
                    url TEXT NOT NULL,
                    original_ts INTEGER NOT NULL,
                    raw_payload BLOB NOT NULL,
                    ingested_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_posts_original_ts
                    ON posts (original_ts);
                CREATE TABLE IF NOT EXISTS stage_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    post_id TEXT NOT NULL,
                    stage TEXT NOT NULL,
                    status TEXT NOT NULL,
                    artifact_path TEXT,
                    error_message TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_stage_runs_post_id
                    ON stage_runs (post_id);
                CREATE INDEX IF NOT EXISTS idx_stage_runs_status
                    ON stage_runs (status);
                CREATE INDEX IF NOT EXISTS idx_stage_runs_created_at
                    ON stage_runs (created_at);
                CREATE TABLE IF NOT EXISTS cost_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id TEXT NOT NULL,
                    tokens_in INTEGER NOT NULL,
                    tokens_out INTEGER NOT NULL,
                    usd_cost REAL NOT NULL,
                    model TEXT NOT NULL,
                    abort_reason TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_cost_entries_created_at
                    ON cost_entries (created_at);
                CREATE TABLE IF NOT EXISTS audit_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    action TEXT NOT NULL,
                    post_id TEXT,
                    run_id TEXT,
                    details TEXT NOT NULL,
                    error_flag INTEGER NOT NULL DEFAULT 0,
                    cost_exhausted_flag INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_events_post_id
                    ON audit_events (post_id);
                CREATE INDEX IF NOT EXISTS idx_audit_events_action
                    ON audit_events (action);
                CREATE INDEX IF NOT EXISTS idx_audit_events_created_at
                    ON audit_events (created_at DESC);",
            )
            .map_err(|err| db_err(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_err(&err))?;
    Ok(())
}

/// Verifies the schema version on a read-only connection.
fn verify_schema_version(connection: &Connection) -> Result<(), SqliteStoreError> {
    let version: Option<i64> = connection
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        Some(value) if value == SCHEMA_VERSION => Ok(()),
        Some(value) => Err(SqliteStoreError::VersionMismatch(format!(
            "unsupported schema version: {value}"
        ))),
        None => Err(SqliteStoreError::Corrupt("store_meta has no version row".to_string())),
    }
}
