// crates/post-forge-core/tests/prompts_unit.rs
// ============================================================================
// Module: Prompt Catalog Unit Tests
// Description: Template loading and placeholder substitution.
// Purpose: Pin the substitution contract and the directory layout.
// ============================================================================

//! ## Overview
//! Placeholders substitute by name and unresolved ones stay visible; a
//! template directory needs all five stage files; built-ins carry every
//! placeholder their agent substitutes.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use post_forge_core::PromptCatalog;
use post_forge_core::prompts::render;
use tempfile::TempDir;

#[test]
fn render_substitutes_named_placeholders() {
    let rendered = render("Hello {{name}}, {{name}} again. Score {{score}}.", &[
        ("name", "world"),
        ("score", "42"),
    ]);
    assert_eq!(rendered, "Hello world, world again. Score 42.");
}

#[test]
fn unresolved_placeholders_stay_visible() {
    let rendered = render("Keep {{missing}} as is.", &[("other", "x")]);
    assert_eq!(rendered, "Keep {{missing}} as is.");
}

#[test]
fn load_dir_requires_all_five_templates() {
    let dir = TempDir::new().expect("tempdir");
    for name in ["problem", "spec", "content", "verify"] {
        std::fs::write(dir.path().join(format!("{name}.txt")), "t {{body}}").expect("write");
    }
    // listing.txt is missing.
    let error = PromptCatalog::load_dir(dir.path()).expect_err("incomplete dir");
    assert!(error.to_string().contains("listing"));

    std::fs::write(dir.path().join("listing.txt"), "l {{spec}}").expect("write");
    let catalog = PromptCatalog::load_dir(dir.path()).expect("complete dir");
    assert_eq!(catalog.listing, "l {{spec}}");
}

#[test]
fn builtin_templates_carry_their_placeholders() {
    let catalog = PromptCatalog::builtin();
    for placeholder in ["{{origin}}", "{{score}}", "{{body}}"] {
        assert!(catalog.problem.contains(placeholder), "problem misses {placeholder}");
    }
    assert!(catalog.spec.contains("{{problem}}"));
    assert!(catalog.content.contains("{{spec}}"));
    assert!(catalog.verify.contains("{{spec}}"));
    assert!(catalog.verify.contains("{{content}}"));
    assert!(catalog.listing.contains("{{spec}}"));
    assert!(catalog.listing.contains("{{preview}}"));
}
