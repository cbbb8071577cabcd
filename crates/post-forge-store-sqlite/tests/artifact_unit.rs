// crates/post-forge-store-sqlite/tests/artifact_unit.rs
// ============================================================================
// Module: Artifact Tree Unit Tests
// Description: Layout, write-once behavior, and path component safety.
// Purpose: Pin the on-disk contract the orchestrator and humans rely on.
// ============================================================================

//! ## Overview
//! Artifacts land under the post directory with stage-specific extensions,
//! error sidecars live under `error_logs/`, the abort artifact sits at the
//! root, collisions advance the timestamp instead of replacing files, and
//! traversal-shaped identifiers are rejected outright.

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

use post_forge_core::ArtifactBody;
use post_forge_core::ArtifactError;
use post_forge_core::ArtifactSink;
use post_forge_core::PostId;
use post_forge_core::RunId;
use post_forge_core::Stage;
use post_forge_store_sqlite::FileArtifactSink;
use serde_json::json;
use tempfile::TempDir;

fn sink(dir: &TempDir) -> FileArtifactSink {
    FileArtifactSink::new(dir.path().join("artifacts")).expect("sink")
}

#[test]
fn stage_artifacts_use_stage_extensions() {
    let dir = TempDir::new().expect("tempdir");
    let sink = sink(&dir);
    let post = PostId::new("p1");

    let json_path = sink
        .write_stage_artifact(&post, Stage::Problem, &ArtifactBody::Json(json!({"a": 1})))
        .expect("json artifact");
    assert!(json_path.to_string_lossy().ends_with(".json"));
    assert!(json_path.parent().expect("parent").ends_with("p1"));

    let md_path = sink
        .write_stage_artifact(&post, Stage::Content, &ArtifactBody::Text("# md".to_string()))
        .expect("md artifact");
    assert!(md_path.to_string_lossy().ends_with(".md"));

    let txt_path = sink
        .write_stage_artifact(&post, Stage::Listing, &ArtifactBody::Text("Title: x".to_string()))
        .expect("txt artifact");
    assert!(txt_path.to_string_lossy().ends_with(".txt"));
}

#[test]
fn same_second_writes_never_replace_each_other() {
    let dir = TempDir::new().expect("tempdir");
    let sink = sink(&dir);
    let post = PostId::new("p1");
    let first = sink
        .write_stage_artifact(&post, Stage::Content, &ArtifactBody::Text("one".to_string()))
        .expect("first");
    let second = sink
        .write_stage_artifact(&post, Stage::Content, &ArtifactBody::Text("two".to_string()))
        .expect("second");
    assert_ne!(first, second);
    assert_eq!(std::fs::read_to_string(&first).expect("first body"), "one");
    assert_eq!(std::fs::read_to_string(&second).expect("second body"), "two");
}

#[test]
fn error_sidecars_live_under_error_logs() {
    let dir = TempDir::new().expect("tempdir");
    let sink = sink(&dir);
    let path = sink
        .write_error_artifact(&PostId::new("p1"), Stage::Spec, &json!({"error": "boom"}))
        .expect("sidecar");
    assert!(path.parent().expect("parent").ends_with("error_logs"));
    assert!(path.file_name().expect("name").to_string_lossy().starts_with("spec_"));
}

#[test]
fn abort_artifact_sits_at_the_tree_root() {
    let dir = TempDir::new().expect("tempdir");
    let sink = sink(&dir);
    let path = sink
        .write_abort_artifact(&RunId::new("run-7"), &json!({"reason": "per_run_usd"}))
        .expect("abort");
    assert_eq!(path, dir.path().join("artifacts").join("abort_run-7.json"));
    assert!(path.exists());
}

#[test]
fn verify_artifacts_are_numbered_per_attempt() {
    let dir = TempDir::new().expect("tempdir");
    let sink = sink(&dir);
    let post = PostId::new("p1");
    let first = sink.write_verify_artifact(&post, 1, &json!({"pass": false})).expect("first");
    assert!(first.to_string_lossy().ends_with("verify_attempt_1.json"));
    // A later run re-verifying attempt 1 must not replace the original.
    let again = sink.write_verify_artifact(&post, 1, &json!({"pass": true})).expect("again");
    assert_ne!(first, again);
    assert!(std::fs::read_to_string(&first).expect("body").contains("false"));
}

#[test]
fn traversal_shaped_identifiers_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let sink = sink(&dir);
    for hostile in ["../evil", "a/b", "a\\b", "", ".."] {
        let result = sink.write_stage_artifact(
            &PostId::new(hostile),
            Stage::Problem,
            &ArtifactBody::Json(json!({})),
        );
        assert!(
            matches!(result, Err(ArtifactError::InvalidComponent(_))),
            "{hostile:?} must be rejected"
        );
    }
}
