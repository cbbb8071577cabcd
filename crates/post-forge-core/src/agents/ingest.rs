// crates/post-forge-core/src/agents/ingest.rs
// ============================================================================
// Module: Ingest Agent
// Description: Fetches candidate posts from the configured forum origins.
// Purpose: Feed the pipeline with sanitized, score-filtered candidates.
// Dependencies: crate::interfaces, crate::retry, crate::sanitize
// ============================================================================

//! ## Overview
//! The ingest agent is the run-scoped prelude: it walks the configured
//! origins in order, fetches candidates through the forum retry schedule,
//! and sanitizes every text field with the ingress cleanser before anything
//! reaches a prompt or the store. A failing origin does not abort the run;
//! its failure is reported alongside the posts that were fetched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::post::Post;
use crate::interfaces::ForumClient;
use crate::interfaces::RemoteError;
use crate::retry::Remote;
use crate::retry::RetryPolicy;
use crate::sanitize;

// ============================================================================
// SECTION: Report
// ============================================================================

/// Result of one ingestion pass over all origins.
#[derive(Debug)]
pub struct IngestReport {
    /// Sanitized candidate posts, in origin order.
    pub posts: Vec<Post>,
    /// Origins that failed after retries, with their final error.
    pub failures: Vec<(String, RemoteError)>,
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Fetches and sanitizes candidates from every configured origin.
#[must_use]
pub fn fetch_candidates(
    forum: &dyn ForumClient,
    retry: &RetryPolicy,
    origins: &[String],
    min_score: i64,
    limit_per_origin: u32,
) -> IngestReport {
    let mut posts = Vec::new();
    let mut failures = Vec::new();
    for origin in origins {
        match retry.execute(Remote::Forum, || {
            forum.fetch_posts(origin, min_score, limit_per_origin)
        }) {
            Ok(fetched) => posts.extend(fetched.into_iter().map(sanitize_post)),
            Err(error) => failures.push((origin.clone(), error)),
        }
    }
    IngestReport {
        posts,
        failures,
    }
}

/// Applies the ingress cleanser to every text field of a post.
fn sanitize_post(post: Post) -> Post {
    Post {
        post_id: post.post_id,
        title: sanitize::ingress(&post.title),
        body: sanitize::ingress(&post.body),
        origin: sanitize::ingress(&post.origin),
        author: sanitize::ingress(&post.author),
        score: post.score,
        url: sanitize::ingress(&post.url),
        original_ts: post.original_ts,
        raw_payload: post.raw_payload,
    }
}
