// crates/post-forge-core/tests/pipeline_scenarios.rs
// ============================================================================
// Module: Pipeline Scenario Tests
// Description: End-to-end orchestrator runs over scripted remotes.
// Purpose: Pin the concrete acceptance scenarios: happy path, discard,
//          rejection, regeneration, exhaustion, and cost termination.
// ============================================================================

//! ## Overview
//! Each test wires the orchestrator with an in-memory store, a real
//! tempdir artifact sink, and scripted remotes, then asserts the recorded
//! stage runs, audit trail, artifacts, and cost entries.

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

mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::DirSink;
use common::MemoryStore;
use common::RecordingSleeper;
use common::ScriptedForum;
use common::ScriptedLlm;
use common::ScriptedStorefront;
use common::listing_text;
use common::problem_json;
use common::sample_post;
use common::spec_json;
use common::verify_json;
use post_forge_core::CompletionResponse;
use post_forge_core::CostGovernor;
use post_forge_core::CostLimits;
use post_forge_core::ModelGateway;
use post_forge_core::Orchestrator;
use post_forge_core::OrchestratorConfig;
use post_forge_core::OrchestratorParts;
use post_forge_core::Post;
use post_forge_core::PostId;
use post_forge_core::PostOutcome;
use post_forge_core::RemoteError;
use post_forge_core::RetryPolicy;
use post_forge_core::RunId;
use post_forge_core::RunOutcome;
use post_forge_core::RunReport;
use post_forge_core::StaticKillSwitch;
use post_forge_core::TokenPrices;

/// Roomy default limits; scenario six overrides them.
const LIMITS: CostLimits = CostLimits {
    max_tokens_per_run: 10_000_000,
    max_usd_per_run: 100.0,
    max_usd_lifetime: 1_000.0,
};

const PRICES: TokenPrices = TokenPrices {
    input_per_token: 0.000_01,
    output_per_token: 0.000_02,
};

/// Everything a scenario needs to inspect after the run.
struct Scenario {
    store: Arc<MemoryStore>,
    sink_root: std::path::PathBuf,
    storefront: Arc<ScriptedStorefront>,
    llm: Arc<ScriptedLlm>,
    report: RunReport,
}

/// Wires the orchestrator and executes one run.
fn run_scenario(
    posts: Vec<Post>,
    llm_script: Vec<Result<CompletionResponse, RemoteError>>,
    storefront_script: Vec<Result<post_forge_core::ProductReceipt, RemoteError>>,
    limits: CostLimits,
    max_regenerations: u32,
    kill_switch: bool,
) -> Scenario {
    let store = Arc::new(MemoryStore::new());
    let sink = DirSink::new();
    let sink_root = sink.dir.path().to_path_buf();
    let llm = Arc::new(ScriptedLlm::new(llm_script));
    let storefront = Arc::new(ScriptedStorefront::new(storefront_script));
    let dyn_store: Arc<dyn post_forge_core::PipelineStore> = store.clone();
    let governor = CostGovernor::new(
        dyn_store,
        limits,
        PRICES,
        "unknown-test-model",
        RunId::new("run-s"),
    )
    .expect("governor");
    let retry = RetryPolicy::with_sleeper(Arc::new(RecordingSleeper::default()));
    let llm_client: Arc<dyn post_forge_core::CompletionClient> = llm.clone();
    let gateway = ModelGateway::new(llm_client, governor, retry.clone(), "unknown-test-model");
    let pipeline_store: Arc<dyn post_forge_core::PipelineStore> = store.clone();
    let storefront_client: Arc<dyn post_forge_core::StorefrontClient> = storefront.clone();
    let mut orchestrator = Orchestrator::new(OrchestratorParts {
        store: pipeline_store,
        artifacts: Arc::new(sink),
        forum: Arc::new(ScriptedForum {
            posts,
        }),
        storefront: storefront_client,
        gateway,
        retry,
        prompts: post_forge_core::PromptCatalog::builtin(),
        progress: Arc::new(post_forge_core::NoopProgress),
        kill_switch: Arc::new(StaticKillSwitch::new(kill_switch)),
        config: OrchestratorConfig {
            origins: vec!["r/somewhere".to_string()],
            min_score: 20,
            posts_per_origin: 25,
            max_regenerations,
        },
        run_id: RunId::new("run-s"),
    });
    let report = orchestrator.run().expect("run");
    Scenario {
        store,
        sink_root,
        storefront,
        llm,
        report,
    }
}

/// Asserts every recorded artifact path exists on disk.
fn assert_artifacts_exist(scenario: &Scenario) {
    for run in scenario.store.stage_runs.lock().unwrap().iter() {
        if let Some(path) = &run.artifact_path {
            assert!(Path::new(path).exists(), "missing artifact {path}");
        }
    }
}

// ============================================================================
// SECTION: Scenario 1 — Happy Path
// ============================================================================

#[test]
fn happy_path_uploads_and_audits_every_stage() {
    let scenario = run_scenario(
        vec![sample_post("p1", 50, 1_000)],
        vec![
            ScriptedLlm::reply(&problem_json(false), 200, 100),
            ScriptedLlm::reply(&spec_json(true, 87, 5), 200, 100),
            ScriptedLlm::reply("# Guide\n\nWorked example one.", 300, 400),
            ScriptedLlm::reply(&verify_json(true), 200, 50),
            ScriptedLlm::reply(&listing_text(), 100, 60),
        ],
        vec![ScriptedStorefront::receipt("prod-1")],
        LIMITS,
        1,
        false,
    );

    assert!(matches!(scenario.report.outcome, RunOutcome::Clean));
    assert_eq!(scenario.report.posts, vec![(PostId::new("p1"), PostOutcome::Uploaded)]);

    let labels = scenario.store.stage_labels(&PostId::new("p1"));
    let expected: Vec<(String, String)> =
        ["problem", "spec", "content", "verify", "listing", "upload"]
            .into_iter()
            .map(|stage| (stage.to_string(), "completed".to_string()))
            .collect();
    assert_eq!(labels, expected);

    let actions = scenario.store.audit_actions();
    for action in [
        "post_ingested",
        "problem_extracted",
        "spec_generated",
        "content_generated",
        "content_verified",
        "listing_generated",
        "upload_succeeded",
    ] {
        assert!(actions.contains(&action.to_string()), "missing audit action {action}");
    }
    assert_artifacts_exist(&scenario);

    // All five model calls were executed and recorded within limits.
    let entries = scenario.store.cost_entries.lock().unwrap();
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|entry| entry.abort_reason.is_none()));
    let spend: f64 = entries.iter().map(|entry| entry.usd_cost).sum();
    assert!(spend < LIMITS.max_usd_per_run);
}

// ============================================================================
// SECTION: Scenario 2 — Early Discard
// ============================================================================

#[test]
fn problem_discard_stops_the_pipeline_immediately() {
    let scenario = run_scenario(
        vec![sample_post("p2", 50, 1_000)],
        vec![ScriptedLlm::reply(&problem_json(true), 200, 100)],
        vec![ScriptedStorefront::receipt("never")],
        LIMITS,
        1,
        false,
    );

    assert_eq!(scenario.report.posts, vec![(PostId::new("p2"), PostOutcome::Discarded)]);
    let labels = scenario.store.stage_labels(&PostId::new("p2"));
    assert_eq!(labels, vec![("problem".to_string(), "discarded".to_string())]);

    let actions = scenario.store.audit_actions();
    assert_eq!(actions.last().map(String::as_str), Some("post_discarded"));
    assert_eq!(scenario.storefront.calls.load(Ordering::SeqCst), 0, "upload never called");
    assert_eq!(scenario.llm.calls.load(Ordering::SeqCst), 1, "only the problem stage ran");
    assert_artifacts_exist(&scenario);
}

// ============================================================================
// SECTION: Scenario 3 — Spec Rejection
// ============================================================================

#[test]
fn low_confidence_spec_rejects_without_downstream_stages() {
    let scenario = run_scenario(
        vec![sample_post("p3", 50, 1_000)],
        vec![
            ScriptedLlm::reply(&problem_json(false), 200, 100),
            ScriptedLlm::reply(&spec_json(true, 65, 4), 200, 100),
        ],
        vec![ScriptedStorefront::receipt("never")],
        LIMITS,
        1,
        false,
    );

    assert_eq!(scenario.report.posts, vec![(PostId::new("p3"), PostOutcome::Rejected)]);
    let labels = scenario.store.stage_labels(&PostId::new("p3"));
    assert_eq!(labels.last(), Some(&("spec".to_string(), "rejected".to_string())));
    assert!(labels.iter().all(|(stage, _)| stage != "content"));

    let actions = scenario.store.audit_actions();
    assert!(!actions.contains(&"content_rejected".to_string()), "rejection is at spec");
    assert_eq!(scenario.storefront.calls.load(Ordering::SeqCst), 0);
    assert_artifacts_exist(&scenario);
}

// ============================================================================
// SECTION: Scenario 4 — Regeneration Success
// ============================================================================

#[test]
fn failed_verify_regenerates_once_and_uploads() {
    let scenario = run_scenario(
        vec![sample_post("p4", 50, 1_000)],
        vec![
            ScriptedLlm::reply(&problem_json(false), 200, 100),
            ScriptedLlm::reply(&spec_json(true, 87, 5), 200, 100),
            ScriptedLlm::reply("# Draft one", 300, 400),
            ScriptedLlm::reply(&verify_json(false), 200, 50),
            ScriptedLlm::reply("# Draft two, improved", 300, 400),
            ScriptedLlm::reply(&verify_json(true), 200, 50),
            ScriptedLlm::reply(&listing_text(), 100, 60),
        ],
        vec![ScriptedStorefront::receipt("prod-4")],
        LIMITS,
        1,
        false,
    );

    assert_eq!(scenario.report.posts, vec![(PostId::new("p4"), PostOutcome::Uploaded)]);
    let labels = scenario.store.stage_labels(&PostId::new("p4"));
    let expected: Vec<(String, String)> = [
        ("problem", "completed"),
        ("spec", "completed"),
        ("content", "completed"),
        ("verify", "rejected"),
        ("content", "completed"),
        ("verify", "completed"),
        ("listing", "completed"),
        ("upload", "completed"),
    ]
    .into_iter()
    .map(|(stage, status)| (stage.to_string(), status.to_string()))
    .collect();
    assert_eq!(labels, expected);

    // Two content artifacts and two verify artifacts on disk.
    let post_dir = scenario.sink_root.join("p4");
    let mut content_files = 0;
    let mut verify_files = 0;
    for entry in std::fs::read_dir(&post_dir).expect("post dir") {
        let name = entry.expect("entry").file_name().to_string_lossy().into_owned();
        if name.starts_with("content_") {
            content_files += 1;
        }
        if name.starts_with("verify_attempt_") {
            verify_files += 1;
        }
    }
    assert_eq!(content_files, 2);
    assert_eq!(verify_files, 2);
    assert!(post_dir.join("verify_attempt_1.json").exists());
    assert!(post_dir.join("verify_attempt_2.json").exists());
}

// ============================================================================
// SECTION: Scenario 5 — Regeneration Exhaustion
// ============================================================================

#[test]
fn two_failed_verifies_hard_discard_without_upload() {
    let scenario = run_scenario(
        vec![sample_post("p5", 50, 1_000)],
        vec![
            ScriptedLlm::reply(&problem_json(false), 200, 100),
            ScriptedLlm::reply(&spec_json(true, 87, 5), 200, 100),
            ScriptedLlm::reply("# Draft one", 300, 400),
            ScriptedLlm::reply(&verify_json(false), 200, 50),
            ScriptedLlm::reply("# Draft two", 300, 400),
            ScriptedLlm::reply(&verify_json(false), 200, 50),
        ],
        vec![ScriptedStorefront::receipt("never")],
        LIMITS,
        1,
        false,
    );

    assert_eq!(scenario.report.posts, vec![(PostId::new("p5"), PostOutcome::HardDiscard)]);
    let labels = scenario.store.stage_labels(&PostId::new("p5"));
    assert_eq!(labels.last(), Some(&("verify".to_string(), "rejected".to_string())));
    assert!(labels.iter().all(|(stage, _)| stage != "listing" && stage != "upload"));

    // Total content attempts bounded by 1 + max_regenerations.
    let content_attempts =
        labels.iter().filter(|(stage, _)| stage == "content").count();
    assert_eq!(content_attempts, 2);
    assert_eq!(scenario.storefront.calls.load(Ordering::SeqCst), 0);
    assert_eq!(scenario.store.audit_actions().last().map(String::as_str), Some("post_discarded"));
}

// ============================================================================
// SECTION: Scenario 6 — Cost Exhaustion Mid-Run
// ============================================================================

#[test]
fn cost_exhaustion_during_content_halts_the_run() {
    // Budget sized so problem and spec pass but the content projection trips.
    let limits = CostLimits {
        max_tokens_per_run: 10_000_000,
        max_usd_per_run: 0.05,
        max_usd_lifetime: 1_000.0,
    };
    let scenario = run_scenario(
        vec![sample_post("p6", 50, 2_000), sample_post("p7", 50, 1_000)],
        vec![
            ScriptedLlm::reply(&problem_json(false), 100, 50),
            ScriptedLlm::reply(&spec_json(true, 87, 5), 100, 50),
        ],
        vec![ScriptedStorefront::receipt("never")],
        limits,
        1,
        false,
    );

    assert!(matches!(scenario.report.outcome, RunOutcome::CostExhausted));
    assert_eq!(
        scenario.report.posts,
        vec![(PostId::new("p6"), PostOutcome::CostExhausted)],
        "the second post is never started"
    );

    let labels = scenario.store.stage_labels(&PostId::new("p6"));
    assert_eq!(labels.last(), Some(&("content".to_string(), "cost_exhausted".to_string())));
    assert!(scenario.store.stage_labels(&PostId::new("p7")).is_empty());

    // A refusal entry with the per-run reason, and no model call for content.
    let entries = scenario.store.cost_entries.lock().unwrap();
    let refusals: Vec<_> =
        entries.iter().filter(|entry| entry.abort_reason.is_some()).collect();
    assert_eq!(refusals.len(), 1);
    assert_eq!(refusals[0].abort_reason.as_deref(), Some("per_run_usd"));
    assert_eq!(scenario.llm.calls.load(Ordering::SeqCst), 2, "content call never reached the remote");

    // The abort artifact exists and the audit trail flags the exhaustion.
    assert!(scenario.sink_root.join("abort_run-s.json").exists());
    let audit = scenario.store.audit.lock().unwrap();
    assert!(audit.iter().any(|event| event.cost_exhausted_flag));
}

// ============================================================================
// SECTION: Kill Switch
// ============================================================================

#[test]
fn kill_switch_between_posts_halts_without_remote_calls() {
    let scenario = run_scenario(
        vec![sample_post("p8", 50, 1_000)],
        vec![ScriptedLlm::reply(&problem_json(false), 100, 50)],
        vec![ScriptedStorefront::receipt("never")],
        LIMITS,
        1,
        true,
    );
    assert!(matches!(scenario.report.outcome, RunOutcome::Halted));
    assert!(scenario.report.posts.is_empty());
    assert_eq!(scenario.llm.calls.load(Ordering::SeqCst), 0);
}
