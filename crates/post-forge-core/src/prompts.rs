// crates/post-forge-core/src/prompts.rs
// ============================================================================
// Module: Post Forge Prompt Catalog
// Description: Stage prompt templates loaded once per run.
// Purpose: Keep prompt authoring outside the core while pinning the
//          substitution contract.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Prompt templates are an external collaborator: five files, one per
//! model-backed stage, loaded read-only once per run. Templates use
//! `{{name}}` placeholders; unresolved placeholders are left in place so a
//! missing substitution is visible in artifacts instead of silently
//! vanishing. Built-in templates keep the pipeline runnable without a
//! template directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Prompt catalog errors.
#[derive(Debug, Error)]
pub enum PromptError {
    /// A template file could not be read.
    #[error("prompt template unreadable: {name}: {message}")]
    Unreadable {
        /// Template name (file stem).
        name: &'static str,
        /// Underlying I/O message.
        message: String,
    },
}

// ============================================================================
// SECTION: Built-in Templates
// ============================================================================

/// Default problem-extraction template.
const BUILTIN_PROBLEM: &str = "\
You analyze one forum post and decide whether it describes a problem worth \
solving with a small digital product. Answer with a single JSON object with \
fields: discard (bool), summary, audience, why_matters, bad_solutions \
(array of strings), urgency (0-100), quotes (array of strings).\n\n\
Post from {{origin}} (score {{score}}):\n{{body}}\n";

/// Default specification template.
const BUILTIN_SPEC: &str = "\
You turn a problem analysis into a concrete digital product specification. \
Answer with a single JSON object with fields: build (bool), type (one of \
guide, template, prompt_pack), title, buyer, job_to_be_done, deliverables \
(array of strings), failure_reason, price (decimal USD), confidence (0-100).\n\n\
Problem analysis:\n{{problem}}\n";

/// Default content-generation template.
const BUILTIN_CONTENT: &str = "\
Write the complete product content in markdown for the following \
specification. Be specific and practical; include worked examples.\n\n\
Specification:\n{{spec}}\n";

/// Default verification template.
const BUILTIN_VERIFY: &str = "\
You review generated product content against its specification. Answer with \
a single JSON object with fields: pass (bool), reasons (array of strings), \
missing (array of strings), generic (bool), example_score (0-10), \
needs_regeneration (bool).\n\n\
Specification:\n{{spec}}\n\nContent:\n{{content}}\n";

/// Default listing-copy template.
const BUILTIN_LISTING: &str = "\
Write storefront listing copy for the product below. Output plain text with \
a line starting with Title: and a section starting with Description:.\n\n\
Specification:\n{{spec}}\n\nContent preview:\n{{preview}}\n";

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// The five stage templates for one run.
///
/// # Invariants
/// - Loaded once per run; never reloaded mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptCatalog {
    /// Problem-extraction template.
    pub problem: String,
    /// Specification template.
    pub spec: String,
    /// Content-generation template.
    pub content: String,
    /// Verification template.
    pub verify: String,
    /// Listing-copy template.
    pub listing: String,
}

impl PromptCatalog {
    /// Returns the built-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            problem: BUILTIN_PROBLEM.to_string(),
            spec: BUILTIN_SPEC.to_string(),
            content: BUILTIN_CONTENT.to_string(),
            verify: BUILTIN_VERIFY.to_string(),
            listing: BUILTIN_LISTING.to_string(),
        }
    }

    /// Loads templates from a directory, one `<stage>.txt` file per stage.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when any template file cannot be read.
    pub fn load_dir(dir: &Path) -> Result<Self, PromptError> {
        Ok(Self {
            problem: read_template(dir, "problem")?,
            spec: read_template(dir, "spec")?,
            content: read_template(dir, "content")?,
            verify: read_template(dir, "verify")?,
            listing: read_template(dir, "listing")?,
        })
    }
}

/// Reads one template file.
fn read_template(dir: &Path, name: &'static str) -> Result<String, PromptError> {
    let path = dir.join(format!("{name}.txt"));
    fs::read_to_string(&path).map_err(|error| PromptError::Unreadable {
        name,
        message: error.to_string(),
    })
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Substitutes `{{name}}` placeholders; unresolved placeholders remain.
#[must_use]
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in substitutions {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}
