// crates/post-forge-core/src/agents/spec.rs
// ============================================================================
// Module: Product Specification Agent
// Description: Turns a problem analysis into a product specification.
// Purpose: Apply the build/confidence/deliverables acceptance gates.
// Dependencies: crate::gateway, crate::prompts, serde, serde_json
// ============================================================================

//! ## Overview
//! The spec agent proposes a concrete digital product for an accepted
//! problem. Three gates can reject it: the model declining to build, a
//! confidence score below the floor, or too few deliverables. Rejection is
//! terminal for the post.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::agents::problem::ProblemAnalysis;
use crate::gateway::GatewayError;
use crate::gateway::ModelGateway;
use crate::prompts::PromptCatalog;
use crate::prompts::render;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Confidence floor below which the spec is rejected.
pub const MIN_CONFIDENCE: u8 = 70;
/// Minimum number of deliverables an accepted spec must carry.
pub const MIN_DELIVERABLES: usize = 3;
/// Output token ceiling for the stage.
const MAX_OUT_TOKENS: u32 = 1_024;
/// Fixed system role for the stage.
const SYSTEM_PROMPT: &str =
    "You are the product strategist of an unattended content-production pipeline. \
     Respond with exactly one JSON object and nothing else.";

// ============================================================================
// SECTION: Schema
// ============================================================================

/// The kind of digital product a spec proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// A written how-to guide.
    Guide,
    /// A fill-in template.
    Template,
    /// A curated prompt pack.
    PromptPack,
}

/// Structured product specification.
///
/// # Invariants
/// - `confidence` is in `0..=100`; out-of-range values fail schema validation.
/// - `price` is USD and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductSpec {
    /// Whether a product should be built at all.
    pub build: bool,
    /// Product kind.
    #[serde(rename = "type")]
    pub kind: ProductKind,
    /// Product title.
    pub title: String,
    /// Who would buy it.
    pub buyer: String,
    /// The job the buyer hires the product for.
    pub job_to_be_done: String,
    /// Concrete deliverables.
    pub deliverables: Vec<String>,
    /// Why not to build, when `build` is false.
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Proposed price in USD.
    pub price: f64,
    /// Model confidence, 0 to 100.
    pub confidence: u8,
}

impl ProductSpec {
    /// Validates range constraints the type system cannot express.
    fn validate(&self) -> Result<(), String> {
        if self.confidence > 100 {
            return Err(format!("confidence out of range: {}", self.confidence));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!("price out of range: {}", self.price));
        }
        Ok(())
    }

    /// Returns the gate reasons that reject this spec; empty means accepted.
    #[must_use]
    pub fn rejection_reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if !self.build {
            reasons.push("build_declined");
        }
        if self.confidence < MIN_CONFIDENCE {
            reasons.push("confidence_below_floor");
        }
        if self.deliverables.len() < MIN_DELIVERABLES {
            reasons.push("too_few_deliverables");
        }
        reasons
    }
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Drafts a product specification from a problem analysis.
///
/// # Errors
///
/// Returns [`GatewayError`] on cost refusal, remote failure, or
/// non-conforming model output.
pub fn draft_spec(
    gateway: &mut ModelGateway,
    prompts: &PromptCatalog,
    problem: &ProblemAnalysis,
) -> Result<ProductSpec, GatewayError> {
    let problem_json = serde_json::to_string_pretty(problem)
        .map_err(|error| GatewayError::Schema(error.to_string()))?;
    let user = render(&prompts.spec, &[("problem", problem_json.as_str())]);
    let spec: ProductSpec = gateway.call_structured(SYSTEM_PROMPT, &user, MAX_OUT_TOKENS)?;
    spec.validate().map_err(GatewayError::Schema)?;
    Ok(spec)
}
