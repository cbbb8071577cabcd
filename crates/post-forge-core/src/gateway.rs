// crates/post-forge-core/src/gateway.rs
// ============================================================================
// Module: Post Forge Model Gateway
// Description: Thin front over the LLM remote wrapping cost and retry.
// Purpose: Make every model call pass the governor gate and record usage.
// Dependencies: crate::core::cost, crate::interfaces, crate::retry,
//               serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Both gateway operations follow the same sequence: estimate tokens, pass
//! the governor's pre-call gate, execute under the LLM retry schedule, then
//! record actual usage. When the provider omits usage figures the
//! conservative estimates are recorded instead. Structured-mode output that
//! does not parse as the caller's schema is terminal for the attempt and is
//! never retried here; the orchestrator decides regeneration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::cost::CostError;
use crate::core::cost::CostGovernor;
use crate::interfaces::CompletionClient;
use crate::interfaces::CompletionMode;
use crate::interfaces::CompletionRequest;
use crate::interfaces::RemoteError;
use crate::retry::Remote;
use crate::retry::RetryPolicy;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The governor refused the call or failed to record accounting.
    #[error(transparent)]
    Cost(#[from] CostError),
    /// The remote failed after classification and backoff.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The model's output does not conform to the stage schema.
    #[error("model output does not conform to schema: {0}")]
    Schema(String),
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// Thin front over the language model remote.
///
/// # Invariants
/// - No remote call happens without a passed pre-call check.
/// - Usage is recorded exactly once per successful call.
pub struct ModelGateway {
    /// LLM remote.
    client: Arc<dyn CompletionClient>,
    /// Cost accountant; owned so every call shares one tally.
    governor: CostGovernor,
    /// Retry executor.
    retry: RetryPolicy,
    /// Model identifier passed to the remote.
    model: String,
}

impl ModelGateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        governor: CostGovernor,
        retry: RetryPolicy,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            governor,
            retry,
            model: model.into(),
        }
    }

    /// Returns the governor for run-context inspection.
    #[must_use]
    pub const fn governor(&self) -> &CostGovernor {
        &self.governor
    }

    /// Calls the model expecting output that parses as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Schema`] when the output does not parse as
    /// `T`; cost and remote failures propagate unchanged.
    pub fn call_structured<T: DeserializeOwned>(
        &mut self,
        system_prompt: &str,
        user_text: &str,
        max_out_tokens: u32,
    ) -> Result<T, GatewayError> {
        let text =
            self.call(system_prompt, user_text, max_out_tokens, CompletionMode::Structured)?;
        let payload = extract_json_payload(&text);
        serde_json::from_str(payload).map_err(|error| GatewayError::Schema(error.to_string()))
    }

    /// Calls the model for free-form text.
    ///
    /// # Errors
    ///
    /// Cost and remote failures propagate unchanged.
    pub fn call_text(
        &mut self,
        system_prompt: &str,
        user_text: &str,
        max_out_tokens: u32,
    ) -> Result<String, GatewayError> {
        self.call(system_prompt, user_text, max_out_tokens, CompletionMode::Text)
    }

    /// Shared call sequence: estimate, gate, execute, record.
    fn call(
        &mut self,
        system_prompt: &str,
        user_text: &str,
        max_out_tokens: u32,
        mode: CompletionMode,
    ) -> Result<String, GatewayError> {
        let est_in =
            self.governor.estimate_tokens(system_prompt) + self.governor.estimate_tokens(user_text);
        let est_out = u64::from(max_out_tokens);
        self.governor.check_before_call(est_in, est_out)?;

        let request = CompletionRequest {
            system: system_prompt,
            user: user_text,
            max_out_tokens,
            mode,
            model: &self.model,
        };
        let client = Arc::clone(&self.client);
        let response = self.retry.execute(Remote::Llm, || client.complete(&request))?;

        let actual_in = response.tokens_in.unwrap_or(est_in);
        let actual_out = response.tokens_out.unwrap_or(est_out);
        self.governor
            .record_usage(actual_in, actual_out, &response.model)
            .map_err(CostError::Store)?;
        Ok(response.text)
    }
}

// ============================================================================
// SECTION: Payload Extraction
// ============================================================================

/// Trims markdown code fences that models wrap around JSON payloads.
fn extract_json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = after_open.strip_prefix("json").unwrap_or(after_open);
    let body = body.strip_prefix('\n').unwrap_or(body);
    body.strip_suffix("```").map_or(body, str::trim).trim()
}
