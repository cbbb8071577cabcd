// crates/post-forge-core/src/agents/verify.rs
// ============================================================================
// Module: Content Verification Agent
// Description: Reviews generated content against its specification.
// Purpose: Gate content quality and request bounded regeneration.
// Dependencies: crate::gateway, crate::prompts, serde, serde_json
// ============================================================================

//! ## Overview
//! The verify agent scores one content attempt. A failing verdict requests
//! regeneration; the orchestrator bounds how many times that request is
//! honored. Schema-invalid verifier output fails the stage outright rather
//! than burning a regeneration attempt on a broken judge.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::agents::spec::ProductSpec;
use crate::gateway::GatewayError;
use crate::gateway::ModelGateway;
use crate::prompts::PromptCatalog;
use crate::prompts::render;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Output token ceiling for the stage.
const MAX_OUT_TOKENS: u32 = 768;
/// Fixed system role for the stage.
const SYSTEM_PROMPT: &str =
    "You are the reviewer of an unattended content-production pipeline. \
     Respond with exactly one JSON object and nothing else.";

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Structured verification verdict.
///
/// # Invariants
/// - `example_score` is in `0..=10`; out-of-range values fail schema
///   validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verification {
    /// Whether the content is acceptable.
    pub pass: bool,
    /// Reasons behind the verdict.
    pub reasons: Vec<String>,
    /// Deliverables the content is missing.
    pub missing: Vec<String>,
    /// Whether the content reads as generic filler.
    pub generic: bool,
    /// Quality of worked examples, 0 to 10.
    pub example_score: u8,
    /// Whether a fresh generation attempt is worth making.
    pub needs_regeneration: bool,
}

impl Verification {
    /// Validates range constraints the type system cannot express.
    fn validate(&self) -> Result<(), String> {
        if self.example_score > 10 {
            return Err(format!("example_score out of range: {}", self.example_score));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Verifies one content attempt against its specification.
///
/// # Errors
///
/// Returns [`GatewayError`] on cost refusal, remote failure, or
/// non-conforming model output.
pub fn verify_content(
    gateway: &mut ModelGateway,
    prompts: &PromptCatalog,
    spec: &ProductSpec,
    content: &str,
) -> Result<Verification, GatewayError> {
    let spec_json = serde_json::to_string_pretty(spec)
        .map_err(|error| GatewayError::Schema(error.to_string()))?;
    let user = render(&prompts.verify, &[("spec", spec_json.as_str()), ("content", content)]);
    let verdict: Verification = gateway.call_structured(SYSTEM_PROMPT, &user, MAX_OUT_TOKENS)?;
    verdict.validate().map_err(GatewayError::Schema)?;
    Ok(verdict)
}
