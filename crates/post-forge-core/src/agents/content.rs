// crates/post-forge-core/src/agents/content.rs
// ============================================================================
// Module: Content Generation Agent
// Description: Generates the product content from an accepted specification.
// Purpose: Produce storefront-safe markdown for verification.
// Dependencies: crate::gateway, crate::prompts, crate::sanitize, serde_json
// ============================================================================

//! ## Overview
//! The content agent is the only free-form stage. Output passes the listing
//! sanitizer before anything else sees it, so raw HTML a model might emit is
//! neutralized at the source. Blank output fails schema validation; the
//! orchestrator counts that failure toward the regeneration budget.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::agents::spec::ProductSpec;
use crate::gateway::GatewayError;
use crate::gateway::ModelGateway;
use crate::prompts::PromptCatalog;
use crate::prompts::render;
use crate::sanitize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Output token ceiling for the stage.
const MAX_OUT_TOKENS: u32 = 4_096;
/// Fixed system role for the stage.
const SYSTEM_PROMPT: &str =
    "You are the writer of an unattended content-production pipeline. \
     Produce complete, specific markdown; never placeholders.";

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Generates product content for a specification.
///
/// # Errors
///
/// Returns [`GatewayError`] on cost refusal, remote failure, or blank
/// output.
pub fn generate_content(
    gateway: &mut ModelGateway,
    prompts: &PromptCatalog,
    spec: &ProductSpec,
) -> Result<String, GatewayError> {
    let spec_json = serde_json::to_string_pretty(spec)
        .map_err(|error| GatewayError::Schema(error.to_string()))?;
    let user = render(&prompts.content, &[("spec", spec_json.as_str())]);
    let raw = gateway.call_text(SYSTEM_PROMPT, &user, MAX_OUT_TOKENS)?;
    let cleaned = sanitize::listing(&raw);
    if cleaned.trim().is_empty() {
        return Err(GatewayError::Schema("content output is blank".to_string()));
    }
    Ok(cleaned)
}
