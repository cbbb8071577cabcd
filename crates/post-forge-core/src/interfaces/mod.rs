// crates/post-forge-core/src/interfaces/mod.rs
// ============================================================================
// Module: Post Forge Interfaces
// Description: Backend-agnostic interfaces for storage, remotes, and progress.
// Purpose: Define the contract surfaces the pipeline core consumes.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the pipeline integrates with external systems
//! without embedding backend-specific details. Implementations must fail
//! closed on missing or invalid data: a remote that cannot be classified is
//! terminal, and a store that cannot append refuses rather than drops.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::audit::AuditEntry;
use crate::core::audit::AuditEvent;
use crate::core::cost::CostRecord;
use crate::core::identifiers::PostId;
use crate::core::identifiers::RunId;
use crate::core::post::Post;
use crate::core::stage::Stage;
use crate::core::stage::StageRecord;
use crate::core::stage::StageRun;
use crate::core::stage::StageStatus;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Pipeline store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw post bodies or model output.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Storage engine error.
    #[error("store engine error: {0}")]
    Store(String),
    /// Store corruption detected.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("store invalid data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Pipeline Store
// ============================================================================

/// Outcome of an idempotent post insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The post was inserted.
    Inserted,
    /// A row with the same post id already existed; nothing was mutated.
    AlreadyPresent,
}

/// Relational persistence for posts, stage runs, cost entries, and audit.
///
/// # Invariants
/// - `record_stage`, `append_cost_entry`, and `append_audit` are append-only.
/// - No update or delete is exposed for the audit table.
/// - A single writer may run concurrently with any number of readers.
pub trait PipelineStore: Send + Sync {
    /// Persists a post. Duplicate ingestion returns
    /// [`SaveOutcome::AlreadyPresent`] without mutating the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn save_post(&self, post: &Post) -> Result<SaveOutcome, StoreError>;

    /// Returns posts with no terminal-success run for the final stage,
    /// ordered by original timestamp descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_unprocessed_posts(&self) -> Result<Vec<Post>, StoreError>;

    /// Appends one stage run row and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn record_stage(&self, record: &StageRecord) -> Result<i64, StoreError>;

    /// Appends one stage run row and its audit event in a single
    /// transaction, returning the stage run identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails; neither row is
    /// written in that case.
    fn record_stage_transition(
        &self,
        record: &StageRecord,
        audit: &AuditEntry,
    ) -> Result<i64, StoreError>;

    /// Returns all stage runs for a post in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn stage_runs(&self, post_id: &PostId) -> Result<Vec<StageRun>, StoreError>;

    /// Appends one cost entry and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append_cost_entry(&self, record: &CostRecord) -> Result<i64, StoreError>;

    /// Appends one audit event and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append_audit(&self, entry: &AuditEntry) -> Result<i64, StoreError>;

    /// Returns recent audit events, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError>;

    /// Returns the exact realized spend over all executed cost entries.
    ///
    /// Refusal rows (`abort_reason` set) are excluded; they record a call
    /// that never happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn lifetime_spend(&self) -> Result<f64, StoreError>;
}

// ============================================================================
// SECTION: Artifact Sink
// ============================================================================

/// Artifact tree errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem error while writing an artifact.
    #[error("artifact io error: {0}")]
    Io(String),
    /// The target artifact path already exists; artifacts are write-once.
    #[error("artifact already exists: {0}")]
    Exists(String),
    /// The artifact payload could not be serialized.
    #[error("artifact serialization failed: {0}")]
    Serialize(String),
    /// An identifier is unusable as a path component.
    #[error("artifact path component invalid: {0}")]
    InvalidComponent(String),
}

/// Body of a stage artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactBody {
    /// Structured JSON payload (problem, spec, verify, upload stages).
    Json(Value),
    /// Free text payload (content markdown, listing copy).
    Text(String),
}

/// Write-once on-disk artifact tree.
///
/// # Invariants
/// - Every write lands on a fresh path; existing files are never replaced.
/// - Paths returned refer to files that exist at return time.
pub trait ArtifactSink: Send + Sync {
    /// Writes a stage artifact and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the write fails or the path exists.
    fn write_stage_artifact(
        &self,
        post_id: &PostId,
        stage: Stage,
        body: &ArtifactBody,
    ) -> Result<PathBuf, ArtifactError>;

    /// Writes a verification artifact for a numbered content attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the write fails or the path exists.
    fn write_verify_artifact(
        &self,
        post_id: &PostId,
        attempt: u32,
        body: &Value,
    ) -> Result<PathBuf, ArtifactError>;

    /// Writes an error sidecar for a failed stage attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the write fails or the path exists.
    fn write_error_artifact(
        &self,
        post_id: &PostId,
        stage: Stage,
        details: &Value,
    ) -> Result<PathBuf, ArtifactError>;

    /// Writes the run-level abort artifact for a cost-exhausted run.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the write fails or the path exists.
    fn write_abort_artifact(&self, run_id: &RunId, payload: &Value)
    -> Result<PathBuf, ArtifactError>;
}

// ============================================================================
// SECTION: Remote Errors
// ============================================================================

/// Errors surfaced by remote collaborators (forum, LLM, storefront).
///
/// # Invariants
/// - Messages avoid embedding raw response bodies.
/// - The transient/terminal split is decided by [`RemoteError::is_transient`]
///   alone; callers must not re-classify.
#[derive(Debug, Error, Clone)]
pub enum RemoteError {
    /// The request exceeded its deadline.
    #[error("remote deadline exceeded: {0}")]
    Timeout(String),
    /// The connection failed or was reset.
    #[error("remote connection failed: {0}")]
    Connect(String),
    /// The remote answered with a non-success status code.
    #[error("remote returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Short diagnostic message.
        message: String,
    },
    /// The remote answered, but the payload failed schema-level validation.
    #[error("remote payload invalid: {0}")]
    Payload(String),
}

impl RemoteError {
    /// Returns whether the error is transient and eligible for backoff.
    ///
    /// Transient: timeouts, connection failures, HTTP 429 and 5xx retryable
    /// statuses. Everything else is terminal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) => true,
            Self::Status {
                status, ..
            } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Payload(_) => false,
        }
    }
}

// ============================================================================
// SECTION: Forum Client
// ============================================================================

/// Read-only client for the originating discussion forum.
pub trait ForumClient: Send + Sync {
    /// Fetches candidate posts for one origin, already filtered to the
    /// minimum score, newest first, at most `limit` items.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] following the transient/terminal split.
    fn fetch_posts(&self, origin: &str, min_score: i64, limit: u32)
    -> Result<Vec<Post>, RemoteError>;
}

// ============================================================================
// SECTION: Completion Client
// ============================================================================

/// Completion mode requested from the language model remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// The response text must parse as the caller's schema.
    Structured,
    /// Free-form text.
    Text,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    /// System prompt.
    pub system: &'a str,
    /// User text.
    pub user: &'a str,
    /// Output token ceiling.
    pub max_out_tokens: u32,
    /// Completion mode.
    pub mode: CompletionMode,
    /// Model identifier passed through to the remote.
    pub model: &'a str,
}

/// One completion response.
///
/// # Invariants
/// - `tokens_in` / `tokens_out` are `None` when the provider omits usage;
///   callers substitute their conservative estimates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response text.
    pub text: String,
    /// Provider-reported input token count.
    pub tokens_in: Option<u64>,
    /// Provider-reported output token count.
    pub tokens_out: Option<u64>,
    /// Model that served the request.
    pub model: String,
}

/// Client for the language model remote.
pub trait CompletionClient: Send + Sync {
    /// Executes one completion request.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] following the transient/terminal split.
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionResponse, RemoteError>;
}

// ============================================================================
// SECTION: Storefront Client
// ============================================================================

/// Product submitted to the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    /// Listing title.
    pub title: String,
    /// Listing description, sanitized for embedding in storefront HTML.
    pub description: String,
    /// Price in integer cents.
    pub price_cents: u64,
}

/// Receipt returned by a successful product creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReceipt {
    /// Storefront-assigned product identifier.
    pub product_id: String,
    /// Public product URL.
    pub url: String,
}

/// Client for the e-commerce storefront.
pub trait StorefrontClient: Send + Sync {
    /// Creates one product. Callers make exactly one logical attempt per
    /// post; transport-level retries happen beneath this call.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] following the transient/terminal split.
    fn create_product(&self, draft: &ProductDraft) -> Result<ProductReceipt, RemoteError>;
}

// ============================================================================
// SECTION: Progress Reporting
// ============================================================================

/// Sink for per-stage progress lines.
///
/// The orchestrator reports every stage transition; hosts decide whether to
/// print, collect, or discard them.
pub trait ProgressReporter: Send + Sync {
    /// Reports one stage transition.
    fn stage_transition(&self, post_id: &PostId, stage: Stage, status: StageStatus);
}

/// Progress sink that discards all reports.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn stage_transition(&self, _post_id: &PostId, _stage: Stage, _status: StageStatus) {}
}

// ============================================================================
// SECTION: Kill Switch
// ============================================================================

/// Cooperative stop flag read at startup and between posts.
pub trait KillSwitch: Send + Sync {
    /// Returns whether the pipeline must stop before the next post.
    fn engaged(&self) -> bool;
}

/// Kill switch with a fixed value, for tests and single-shot runs.
pub struct StaticKillSwitch(bool);

impl StaticKillSwitch {
    /// Creates a kill switch with a fixed value.
    #[must_use]
    pub const fn new(engaged: bool) -> Self {
        Self(engaged)
    }
}

impl KillSwitch for StaticKillSwitch {
    fn engaged(&self) -> bool {
        self.0
    }
}
