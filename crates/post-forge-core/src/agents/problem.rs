// crates/post-forge-core/src/agents/problem.rs
// ============================================================================
// Module: Problem Extraction Agent
// Description: Distills a forum post into a structured problem analysis.
// Purpose: Decide early whether a post is worth the rest of the pipeline.
// Dependencies: crate::gateway, crate::prompts, serde
// ============================================================================

//! ## Overview
//! The problem agent receives a sanitized post body truncated to a bounded
//! prefix ending at a paragraph or sentence boundary, and returns the
//! structured analysis. `discard = true` is a terminal gate; the orchestrator
//! records the stage as discarded and runs nothing further for the post.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::post::Post;
use crate::gateway::GatewayError;
use crate::gateway::ModelGateway;
use crate::prompts::PromptCatalog;
use crate::prompts::render;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum post body prefix injected into the prompt, in characters.
pub const MAX_BODY_CHARS: usize = 2000;
/// Output token ceiling for the stage.
const MAX_OUT_TOKENS: u32 = 1_024;
/// Fixed system role for the stage.
const SYSTEM_PROMPT: &str =
    "You are the problem analyst of an unattended content-production pipeline. \
     Respond with exactly one JSON object and nothing else.";

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Structured problem analysis.
///
/// # Invariants
/// - `urgency` is in `0..=100`; out-of-range values fail schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemAnalysis {
    /// Whether the post should be discarded.
    pub discard: bool,
    /// One-paragraph problem summary.
    pub summary: String,
    /// Who has the problem.
    pub audience: String,
    /// Why the problem matters to that audience.
    pub why_matters: String,
    /// Existing solutions that fall short.
    pub bad_solutions: Vec<String>,
    /// Urgency score, 0 to 100.
    pub urgency: u8,
    /// Supporting quotes from the post.
    pub quotes: Vec<String>,
}

impl ProblemAnalysis {
    /// Validates range constraints the type system cannot express.
    fn validate(&self) -> Result<(), String> {
        if self.urgency > 100 {
            return Err(format!("urgency out of range: {}", self.urgency));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Extracts a problem analysis from a post.
///
/// # Errors
///
/// Returns [`GatewayError`] on cost refusal, remote failure, or
/// non-conforming model output.
pub fn extract_problem(
    gateway: &mut ModelGateway,
    prompts: &PromptCatalog,
    post: &Post,
) -> Result<ProblemAnalysis, GatewayError> {
    let body = truncate_at_boundary(&post.body, MAX_BODY_CHARS);
    let score = post.score.to_string();
    let user = render(&prompts.problem, &[
        ("origin", post.origin.as_str()),
        ("score", score.as_str()),
        ("body", body),
    ]);
    let analysis: ProblemAnalysis = gateway.call_structured(SYSTEM_PROMPT, &user, MAX_OUT_TOKENS)?;
    analysis.validate().map_err(GatewayError::Schema)?;
    Ok(analysis)
}

// ============================================================================
// SECTION: Truncation
// ============================================================================

/// Returns a prefix of at most `max_chars` characters, preferring a
/// paragraph break, then a sentence end, then a hard character cut.
#[must_use]
pub fn truncate_at_boundary(text: &str, max_chars: usize) -> &str {
    if text.chars().count() <= max_chars {
        return text;
    }
    let hard_cut = byte_offset_of_char(text, max_chars);
    let window = &text[..hard_cut];
    if let Some(paragraph) = window.rfind("\n\n") {
        if paragraph > 0 {
            return &text[..paragraph];
        }
    }
    if let Some(sentence) = window.rfind(". ") {
        return &text[..=sentence];
    }
    window
}

/// Returns the byte offset of the nth character.
fn byte_offset_of_char(text: &str, nth: usize) -> usize {
    text.char_indices().nth(nth).map_or(text.len(), |(offset, _)| offset)
}
