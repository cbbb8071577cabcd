// crates/post-forge-core/tests/gateway_unit.rs
// ============================================================================
// Module: Model Gateway Unit Tests
// Description: Gate-execute-record sequencing and schema handling.
// Purpose: Pin that every call is gated, recorded once, and parsed strictly.
// ============================================================================

//! ## Overview
//! The gateway must refuse before the network when the governor says no,
//! record provider usage exactly once per successful call (estimates when
//! the provider omits usage), pass schema failures through without retries,
//! and tolerate code-fenced JSON payloads.

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

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::MemoryStore;
use common::RecordingSleeper;
use common::ScriptedLlm;
use post_forge_core::CostError;
use post_forge_core::CostGovernor;
use post_forge_core::CostLimits;
use post_forge_core::GatewayError;
use post_forge_core::ModelGateway;
use post_forge_core::RemoteError;
use post_forge_core::RetryPolicy;
use post_forge_core::RunId;
use post_forge_core::TokenPrices;
use serde::Deserialize;

/// Minimal structured schema for the tests.
#[derive(Debug, Deserialize, PartialEq)]
struct Verdict {
    ok: bool,
}

const LIMITS: CostLimits = CostLimits {
    max_tokens_per_run: 10_000,
    max_usd_per_run: 10.0,
    max_usd_lifetime: 100.0,
};

const PRICES: TokenPrices = TokenPrices {
    input_per_token: 0.000_01,
    output_per_token: 0.000_02,
};

fn gateway(store: &Arc<MemoryStore>, llm: Arc<ScriptedLlm>) -> ModelGateway {
    let dyn_store: Arc<dyn post_forge_core::PipelineStore> = store.clone();
    let governor = CostGovernor::new(
        dyn_store,
        LIMITS,
        PRICES,
        "unknown-test-model",
        RunId::new("run-g"),
    )
    .expect("governor");
    let retry = RetryPolicy::with_sleeper(Arc::new(RecordingSleeper::default()));
    ModelGateway::new(llm, governor, retry, "unknown-test-model")
}

#[test]
fn successful_call_records_provider_usage() {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::reply("{\"ok\":true}", 42, 7)]));
    let mut gateway = gateway(&store, llm.clone());
    let verdict: Verdict = gateway.call_structured("system", "user", 100).expect("call");
    assert!(verdict.ok);

    let entries = store.cost_entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tokens_in, 42);
    assert_eq!(entries[0].tokens_out, 7);
    assert!(entries[0].abort_reason.is_none());
}

#[test]
fn missing_usage_falls_back_to_estimates() {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(post_forge_core::CompletionResponse {
        text: "free text".to_string(),
        tokens_in: None,
        tokens_out: None,
        model: "scripted".to_string(),
    })]));
    let mut gateway = gateway(&store, llm.clone());
    let text = gateway.call_text("sys", "user text", 64).expect("call");
    assert_eq!(text, "free text");

    let entries = store.cost_entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    // Estimated input covers both prompts; estimated output is the ceiling.
    assert!(entries[0].tokens_in > 0);
    assert_eq!(entries[0].tokens_out, 64);
}

#[test]
fn refusal_prevents_any_network_call() {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::reply("never", 1, 1)]));
    let mut gateway = gateway(&store, llm.clone());
    // Output ceiling alone blows the token budget.
    let error = gateway.call_text("sys", "user", 20_000).expect_err("refused");
    assert!(matches!(error, GatewayError::Cost(CostError::Limit(_))));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0, "no network call after refusal");

    let entries = store.cost_entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].abort_reason.is_some());
}

#[test]
fn schema_mismatch_is_terminal_without_retry() {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::reply("not json at all", 5, 5)]));
    let mut gateway = gateway(&store, llm.clone());
    let error = gateway.call_structured::<Verdict>("sys", "user", 50).expect_err("schema");
    assert!(matches!(error, GatewayError::Schema(_)));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1, "schema failures are not retried");
    // Usage is still recorded; the tokens were spent.
    assert_eq!(store.cost_entries.lock().unwrap().len(), 1);
}

#[test]
fn fenced_json_payloads_are_accepted() {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::reply(
        "```json\n{\"ok\": true}\n```",
        5,
        5,
    )]));
    let mut gateway = gateway(&store, llm.clone());
    let verdict: Verdict = gateway.call_structured("sys", "user", 50).expect("fenced json");
    assert!(verdict.ok);
}

#[test]
fn transient_remote_failures_retry_then_succeed() {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(ScriptedLlm::new(vec![
        Err(RemoteError::Timeout("slow".to_string())),
        Err(RemoteError::Status {
            status: 503,
            message: "busy".to_string(),
        }),
        ScriptedLlm::reply("{\"ok\":true}", 9, 3),
    ]));
    let mut gateway = gateway(&store, llm.clone());
    let verdict: Verdict = gateway.call_structured("sys", "user", 50).expect("retries succeed");
    assert!(verdict.ok);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    // One executed entry only; retries are one logical call.
    assert_eq!(store.cost_entries.lock().unwrap().len(), 1);
}
