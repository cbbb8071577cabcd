// crates/post-forge-core/src/core/post.rs
// ============================================================================
// Module: Post Forge Candidate Posts
// Description: Immutable candidate items sourced from a discussion forum.
// Purpose: Carry forum content through the pipeline without mutation.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A [`Post`] is inserted once by ingestion and never mutated afterwards.
//! All externally sourced text fields are expected to have passed the ingress
//! and store sanitizers before construction; the type itself performs no
//! cleansing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PostId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Post
// ============================================================================

/// A candidate item sourced from a discussion forum.
///
/// # Invariants
/// - Inserted once; never mutated. Regeneration happens via stage runs, not
///   by editing the post row.
/// - `raw_payload` is the opaque upstream representation, kept byte-for-byte
///   for post-mortem inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Forum-assigned post identifier.
    pub post_id: PostId,
    /// Post title.
    pub title: String,
    /// Post body text.
    pub body: String,
    /// Origin namespace (subreddit or forum section).
    pub origin: String,
    /// Author handle.
    pub author: String,
    /// Forum score at ingestion time.
    pub score: i64,
    /// Canonical URL of the post.
    pub url: String,
    /// Original publication timestamp.
    pub original_ts: Timestamp,
    /// Opaque upstream payload, kept verbatim.
    pub raw_payload: Vec<u8>,
}
