// crates/post-forge-core/src/core/stage.rs
// ============================================================================
// Module: Post Forge Stage Model
// Description: Closed stage and status enums plus per-stage run records.
// Purpose: Name the fixed pipeline steps and their recorded outcomes.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! The pipeline applies a fixed, totally ordered sequence of stages to each
//! post. Stages and statuses are closed enums with stable snake_case wire
//! forms shared by the database, artifacts, and the dashboard. A
//! [`StageRun`] is one attempt at one stage for one post; rows are
//! append-only, so a post may accumulate several runs for the same stage
//! across regeneration attempts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PostId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Stage
// ============================================================================

/// One of the seven ordered pipeline steps.
///
/// # Invariants
/// - Variants are stable for serialization and database storage.
/// - [`Stage::Ingest`] is a run-scoped prelude; the remaining six are
///   applied per post in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Forum ingestion prelude (no model call).
    Ingest,
    /// Problem extraction from the post body.
    Problem,
    /// Product specification from the extracted problem.
    Spec,
    /// Content generation from the specification.
    Content,
    /// Content verification.
    Verify,
    /// Storefront listing copy generation.
    Listing,
    /// Storefront upload (no model call).
    Upload,
}

/// The six per-post stages in execution order.
pub const PER_POST_STAGES: [Stage; 6] =
    [Stage::Problem, Stage::Spec, Stage::Content, Stage::Verify, Stage::Listing, Stage::Upload];

impl Stage {
    /// Returns the stable wire label for the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Problem => "problem",
            Self::Spec => "spec",
            Self::Content => "content",
            Self::Verify => "verify",
            Self::Listing => "listing",
            Self::Upload => "upload",
        }
    }

    /// Parses a stable wire label back into a stage.
    #[must_use]
    pub fn from_wire(label: &str) -> Option<Self> {
        match label {
            "ingest" => Some(Self::Ingest),
            "problem" => Some(Self::Problem),
            "spec" => Some(Self::Spec),
            "content" => Some(Self::Content),
            "verify" => Some(Self::Verify),
            "listing" => Some(Self::Listing),
            "upload" => Some(Self::Upload),
            _ => None,
        }
    }

    /// Returns the artifact file extension for the stage's output.
    ///
    /// Structured stages persist JSON, content persists markdown, and the
    /// listing copy persists plain text.
    #[must_use]
    pub const fn artifact_extension(self) -> &'static str {
        match self {
            Self::Ingest | Self::Problem | Self::Spec | Self::Verify | Self::Upload => "json",
            Self::Content => "md",
            Self::Listing => "txt",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Stage Status
// ============================================================================

/// Recorded outcome of one stage attempt.
///
/// # Invariants
/// - Variants are stable for serialization and database storage.
/// - Every status except [`StageStatus::Completed`] is terminal for the post
///   within the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage produced an accepted output.
    Completed,
    /// The problem stage judged the post not worth pursuing.
    Discarded,
    /// An acceptance gate rejected the stage output.
    Rejected,
    /// The stage failed on a terminal error.
    Failed,
    /// A cost projection refused the stage's model call.
    CostExhausted,
}

impl StageStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Discarded => "discarded",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::CostExhausted => "cost_exhausted",
        }
    }

    /// Parses a stable wire label back into a status.
    #[must_use]
    pub fn from_wire(label: &str) -> Option<Self> {
        match label {
            "completed" => Some(Self::Completed),
            "discarded" => Some(Self::Discarded),
            "rejected" => Some(Self::Rejected),
            "failed" => Some(Self::Failed),
            "cost_exhausted" => Some(Self::CostExhausted),
            _ => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Stage Run Records
// ============================================================================

/// One attempt at one stage for one post, as stored.
///
/// # Invariants
/// - Immutable once written. Regeneration appends further rows for the same
///   `(post_id, stage)` pair.
/// - `artifact_path`, when present on a completed run, refers to an existing
///   file on disk at the time of recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRun {
    /// Store-assigned row identifier.
    pub id: i64,
    /// Post the attempt belongs to.
    pub post_id: PostId,
    /// Stage that was attempted.
    pub stage: Stage,
    /// Recorded outcome.
    pub status: StageStatus,
    /// Path of the artifact written for this attempt, when one exists.
    pub artifact_path: Option<String>,
    /// Terminal error message, when the attempt failed.
    pub error_message: Option<String>,
    /// Insertion timestamp.
    pub created_at: Timestamp,
}

/// Append form of a stage run; the store assigns the id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Post the attempt belongs to.
    pub post_id: PostId,
    /// Stage that was attempted.
    pub stage: Stage,
    /// Recorded outcome.
    pub status: StageStatus,
    /// Path of the artifact written for this attempt, when one exists.
    pub artifact_path: Option<String>,
    /// Terminal error message, when the attempt failed.
    pub error_message: Option<String>,
}

impl StageRecord {
    /// Creates a record with no artifact and no error.
    #[must_use]
    pub const fn new(post_id: PostId, stage: Stage, status: StageStatus) -> Self {
        Self {
            post_id,
            stage,
            status,
            artifact_path: None,
            error_message: None,
        }
    }

    /// Attaches the artifact path written for this attempt.
    #[must_use]
    pub fn with_artifact(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    /// Attaches a terminal error message.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}
