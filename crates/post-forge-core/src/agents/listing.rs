// crates/post-forge-core/src/agents/listing.rs
// ============================================================================
// Module: Listing Copy Agent
// Description: Generates storefront listing copy from spec and content.
// Purpose: Produce the title and description text the storefront displays.
// Dependencies: crate::gateway, crate::prompts, serde_json
// ============================================================================

//! ## Overview
//! The listing agent writes the storefront-facing copy. Its output is plain
//! text carrying recognizable `Title:` and `Description:` fields; output
//! missing either marker fails schema validation and the stage records as
//! failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::agents::spec::ProductSpec;
use crate::gateway::GatewayError;
use crate::gateway::ModelGateway;
use crate::prompts::PromptCatalog;
use crate::prompts::render;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Characters of content included as the preview.
pub const PREVIEW_CHARS: usize = 500;
/// Output token ceiling for the stage.
const MAX_OUT_TOKENS: u32 = 768;
/// Title field marker.
const TITLE_MARKER: &str = "Title:";
/// Description field marker.
const DESCRIPTION_MARKER: &str = "Description:";
/// Fixed system role for the stage.
const SYSTEM_PROMPT: &str =
    "You are the copywriter of an unattended content-production pipeline. \
     Output plain text with Title: and Description: fields.";

// ============================================================================
// SECTION: Listing Copy
// ============================================================================

/// Storefront listing copy with recognizable field markers.
///
/// # Invariants
/// - `text` contains both `Title:` and `Description:` markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCopy {
    /// Full listing text.
    pub text: String,
}

impl ListingCopy {
    /// Parses listing text, requiring both field markers.
    ///
    /// # Errors
    ///
    /// Returns the missing marker's name.
    pub fn parse(text: String) -> Result<Self, String> {
        for marker in [TITLE_MARKER, DESCRIPTION_MARKER] {
            if !text.contains(marker) {
                return Err(format!("listing output missing {marker} field"));
            }
        }
        Ok(Self {
            text,
        })
    }

    /// Returns the title field value.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        field_after(&self.text, TITLE_MARKER).map(|rest| rest.lines().next().unwrap_or("").trim())
    }

    /// Returns the description field value (everything after the marker).
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        field_after(&self.text, DESCRIPTION_MARKER).map(str::trim)
    }
}

/// Returns the text following a field marker.
fn field_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.find(marker).map(|at| &text[at + marker.len()..])
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Generates listing copy from the spec and a content preview.
///
/// # Errors
///
/// Returns [`GatewayError`] on cost refusal, remote failure, or output
/// missing a required field marker.
pub fn generate_listing(
    gateway: &mut ModelGateway,
    prompts: &PromptCatalog,
    spec: &ProductSpec,
    content: &str,
) -> Result<ListingCopy, GatewayError> {
    let spec_json = serde_json::to_string_pretty(spec)
        .map_err(|error| GatewayError::Schema(error.to_string()))?;
    let preview = content_preview(content, PREVIEW_CHARS);
    let user =
        render(&prompts.listing, &[("spec", spec_json.as_str()), ("preview", preview)]);
    let text = gateway.call_text(SYSTEM_PROMPT, &user, MAX_OUT_TOKENS)?;
    ListingCopy::parse(text).map_err(GatewayError::Schema)
}

/// Returns a character-bounded content prefix.
#[must_use]
pub fn content_preview(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((offset, _)) => &content[..offset],
        None => content,
    }
}
