// crates/post-forge-remotes/src/llm.rs
// ============================================================================
// Module: HTTP Completion Client
// Description: Language model remote over a JSON completion API.
// Purpose: Implement the CompletionClient interface with usage pass-through.
// Dependencies: post-forge-core, reqwest, serde
// ============================================================================

//! ## Overview
//! One endpoint, one request shape: system prompt, user text, output
//! ceiling, mode, model. The provider answers with the completion text and,
//! when it meters usage, the token counts; absent counts surface as `None`
//! and the gateway records its conservative estimates instead. Structured
//! mode is a pass-through hint; conformance is judged by the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use post_forge_core::CompletionClient;
use post_forge_core::CompletionMode;
use post_forge_core::CompletionRequest;
use post_forge_core::CompletionResponse;
use post_forge_core::RemoteError;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::Serialize;

use crate::common::RemoteSettings;
use crate::common::build_client;
use crate::common::map_transport_error;
use crate::common::read_json;

// ============================================================================
// SECTION: Wire Format
// ============================================================================

/// Completion request body.
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    /// Model identifier.
    model: &'a str,
    /// System prompt.
    system: &'a str,
    /// User text.
    user: &'a str,
    /// Output token ceiling.
    max_tokens: u32,
    /// Requested mode.
    mode: CompletionMode,
}

/// Completion response body.
#[derive(Debug, Deserialize)]
struct CompletionReply {
    /// Completion text.
    text: String,
    /// Provider-reported input tokens.
    #[serde(default)]
    tokens_in: Option<u64>,
    /// Provider-reported output tokens.
    #[serde(default)]
    tokens_out: Option<u64>,
    /// Model that served the request.
    model: String,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Completion client over a JSON API.
pub struct HttpCompletionClient {
    /// Transport settings.
    settings: RemoteSettings,
    /// Blocking HTTP client.
    client: Client,
}

impl HttpCompletionClient {
    /// Creates a completion client.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the HTTP client cannot be built.
    pub fn new(settings: RemoteSettings) -> Result<Self, RemoteError> {
        let client = build_client(&settings)?;
        Ok(Self {
            settings,
            client,
        })
    }

    /// Returns the completion endpoint URL.
    fn endpoint(&self) -> String {
        format!("{}/complete", self.settings.base_url.trim_end_matches('/'))
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionResponse, RemoteError> {
        let body = CompletionBody {
            model: request.model,
            system: request.system,
            user: request.user,
            max_tokens: request.max_out_tokens,
            mode: request.mode,
        };
        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.settings.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().map_err(|error| map_transport_error(&error))?;
        let reply: CompletionReply = read_json(response)?;
        Ok(CompletionResponse {
            text: reply.text,
            tokens_in: reply.tokens_in,
            tokens_out: reply.tokens_out,
            model: reply.model,
        })
    }
}
