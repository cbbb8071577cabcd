// crates/post-forge-core/src/core/audit.rs
// ============================================================================
// Module: Post Forge Audit Trail
// Description: Closed audit action enum and append-only event records.
// Purpose: Describe everything that happened, including refusals and discards.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are a superset of stage-run transitions: every status change
//! produces an event, and events additionally record ingestions, cost
//! refusals, and discards. The store exposes no update or delete for this
//! table; any correction appends a new event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::PostId;
use crate::core::identifiers::RunId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Audit Actions
// ============================================================================

/// Closed set of auditable actions.
///
/// # Invariants
/// - Variants are stable for serialization and database storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A post was persisted by ingestion.
    PostIngested,
    /// The problem stage produced an accepted analysis.
    ProblemExtracted,
    /// The spec stage produced an accepted specification.
    SpecGenerated,
    /// The content stage produced a draft.
    ContentGenerated,
    /// The verify stage accepted the content.
    ContentVerified,
    /// The verify stage rejected the content.
    ContentRejected,
    /// The listing stage produced storefront copy.
    ListingGenerated,
    /// The storefront accepted the product.
    UploadSucceeded,
    /// The storefront upload failed terminally.
    UploadFailed,
    /// The post left the pipeline at a discard or rejection gate.
    PostDiscarded,
    /// A cost projection refused a model call.
    CostExhausted,
    /// A stage failed on an unexpected error.
    ErrorOccurred,
}

impl AuditAction {
    /// Returns the stable wire label for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostIngested => "post_ingested",
            Self::ProblemExtracted => "problem_extracted",
            Self::SpecGenerated => "spec_generated",
            Self::ContentGenerated => "content_generated",
            Self::ContentVerified => "content_verified",
            Self::ContentRejected => "content_rejected",
            Self::ListingGenerated => "listing_generated",
            Self::UploadSucceeded => "upload_succeeded",
            Self::UploadFailed => "upload_failed",
            Self::PostDiscarded => "post_discarded",
            Self::CostExhausted => "cost_exhausted",
            Self::ErrorOccurred => "error_occurred",
        }
    }

    /// Parses a stable wire label back into an action.
    #[must_use]
    pub fn from_wire(label: &str) -> Option<Self> {
        match label {
            "post_ingested" => Some(Self::PostIngested),
            "problem_extracted" => Some(Self::ProblemExtracted),
            "spec_generated" => Some(Self::SpecGenerated),
            "content_generated" => Some(Self::ContentGenerated),
            "content_verified" => Some(Self::ContentVerified),
            "content_rejected" => Some(Self::ContentRejected),
            "listing_generated" => Some(Self::ListingGenerated),
            "upload_succeeded" => Some(Self::UploadSucceeded),
            "upload_failed" => Some(Self::UploadFailed),
            "post_discarded" => Some(Self::PostDiscarded),
            "cost_exhausted" => Some(Self::CostExhausted),
            "error_occurred" => Some(Self::ErrorOccurred),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Audit Records
// ============================================================================

/// One audit event, as stored.
///
/// # Invariants
/// - Immutable once written; the store exposes no update or delete.
/// - Ordering is database insertion order; `created_at` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Store-assigned row identifier.
    pub id: i64,
    /// What happened.
    pub action: AuditAction,
    /// Post the event concerns, when post-scoped.
    pub post_id: Option<PostId>,
    /// Run the event occurred in, when run-scoped.
    pub run_id: Option<RunId>,
    /// Structured event payload.
    pub details: Value,
    /// Set when the event records an error.
    pub error_flag: bool,
    /// Set when the event records a cost refusal.
    pub cost_exhausted_flag: bool,
    /// Insertion timestamp.
    pub created_at: Timestamp,
}

/// Append form of an audit event; the store assigns the id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened.
    pub action: AuditAction,
    /// Post the event concerns, when post-scoped.
    pub post_id: Option<PostId>,
    /// Run the event occurred in, when run-scoped.
    pub run_id: Option<RunId>,
    /// Structured event payload.
    pub details: Value,
    /// Set when the event records an error.
    pub error_flag: bool,
    /// Set when the event records a cost refusal.
    pub cost_exhausted_flag: bool,
}

impl AuditEntry {
    /// Creates an entry with an empty payload and no flags.
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            post_id: None,
            run_id: None,
            details: Value::Object(serde_json::Map::new()),
            error_flag: false,
            cost_exhausted_flag: false,
        }
    }

    /// Scopes the entry to a post.
    #[must_use]
    pub fn with_post(mut self, post_id: PostId) -> Self {
        self.post_id = Some(post_id);
        self
    }

    /// Scopes the entry to a run.
    #[must_use]
    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Replaces the structured payload.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Marks the entry as recording an error.
    #[must_use]
    pub const fn with_error_flag(mut self) -> Self {
        self.error_flag = true;
        self
    }

    /// Marks the entry as recording a cost refusal.
    #[must_use]
    pub const fn with_cost_exhausted_flag(mut self) -> Self {
        self.cost_exhausted_flag = true;
        self
    }
}
