// crates/post-forge-core/tests/cost_governor_unit.rs
// ============================================================================
// Module: Cost Governor Unit Tests
// Description: Pre-call gate, refusal recording, and accounting identities.
// Purpose: Pin the three-budget projection and the append-only cost trail.
// ============================================================================

//! ## Overview
//! Verifies that passing calls record exactly one executed cost entry with
//! the price identity, that refusals identify the breached budget and record
//! an abort row plus a flagged audit event without any network call, and
//! that realized spend never exceeds the lifetime ceiling.

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
    clippy::float_cmp,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;

use common::MemoryStore;
use post_forge_core::BudgetKind;
use post_forge_core::CostError;
use post_forge_core::CostGovernor;
use post_forge_core::CostLimits;
use post_forge_core::RunId;
use post_forge_core::TokenEstimator;
use post_forge_core::TokenPrices;
use post_forge_core::core::cost::heuristic_tokens;
use proptest::prelude::*;

/// Default test limits: roomy enough for a few calls.
const LIMITS: CostLimits = CostLimits {
    max_tokens_per_run: 10_000,
    max_usd_per_run: 1.0,
    max_usd_lifetime: 5.0,
};

/// Default test prices.
const PRICES: TokenPrices = TokenPrices {
    input_per_token: 0.000_01,
    output_per_token: 0.000_02,
};

fn governor(store: &Arc<MemoryStore>) -> CostGovernor {
    governor_with(store, LIMITS)
}

fn governor_with(store: &Arc<MemoryStore>, limits: CostLimits) -> CostGovernor {
    let dyn_store: Arc<dyn post_forge_core::PipelineStore> = store.clone();
    CostGovernor::new(dyn_store, limits, PRICES, "unknown-test-model", RunId::new("run-1"))
        .expect("governor")
}

#[test]
fn successful_calls_record_price_identity() {
    let store = Arc::new(MemoryStore::new());
    let mut governor = governor(&store);
    governor.check_before_call(100, 200).expect("within limits");
    governor.record_usage(100, 200, "m").expect("record");
    governor.check_before_call(50, 50).expect("within limits");
    governor.record_usage(50, 50, "m").expect("record");

    let entries = store.cost_entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries.iter() {
        assert!(entry.abort_reason.is_none());
        let expected = entry.tokens_in as f64 * PRICES.input_per_token
            + entry.tokens_out as f64 * PRICES.output_per_token;
        assert!((entry.usd_cost - expected).abs() < 1e-12);
    }
    assert_eq!(governor.run_context().tokens_sent, 150);
    assert_eq!(governor.run_context().tokens_received, 250);
}

#[test]
fn token_budget_refusal_identifies_limit_and_records_abort() {
    let store = Arc::new(MemoryStore::new());
    let mut governor = governor(&store);
    let error = governor.check_before_call(9_000, 2_000).expect_err("over token budget");
    let CostError::Limit(exceeded) = error else {
        panic!("expected limit error");
    };
    assert_eq!(exceeded.which, BudgetKind::PerRunTokens);
    assert_eq!(exceeded.limit, 10_000.0);

    let entries = store.cost_entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].abort_reason.as_deref(), Some("per_run_tokens"));

    let audit = store.audit.lock().unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].cost_exhausted_flag);
    assert_eq!(audit[0].action.as_str(), "cost_exhausted");
}

#[test]
fn run_usd_refusal_projects_spend_so_far() {
    let store = Arc::new(MemoryStore::new());
    // A token budget too large to trip, so the spend projection decides.
    let mut governor = governor_with(&store, CostLimits {
        max_tokens_per_run: 10_000_000,
        max_usd_per_run: 0.2,
        max_usd_lifetime: 5.0,
    });
    // Realize most of the run budget, then project past it.
    governor.check_before_call(4_000, 4_000).expect("ok");
    governor.record_usage(4_000, 4_000, "m").expect("record");
    let error = governor.check_before_call(100, 50_000).expect_err("over run budget");
    let CostError::Limit(exceeded) = error else {
        panic!("expected limit error");
    };
    assert_eq!(exceeded.which, BudgetKind::PerRunUsd);
}

#[test]
fn lifetime_refusal_counts_prior_runs() {
    let store = Arc::new(MemoryStore::new());
    // Seed spend from earlier runs: 4.99 of the 5.00 lifetime budget.
    {
        let seed: Arc<dyn post_forge_core::PipelineStore> = store.clone();
        seed.append_cost_entry(&post_forge_core::CostRecord {
            run_id: RunId::new("run-0"),
            tokens_in: 1,
            tokens_out: 1,
            usd_cost: 4.99,
            model: "m".to_string(),
            abort_reason: None,
        })
        .expect("seed");
    }
    let mut governor = governor(&store);
    assert_eq!(governor.lifetime_spend(), 4.99);
    let error = governor.check_before_call(1_000, 1_000).expect_err("over lifetime budget");
    let CostError::Limit(exceeded) = error else {
        panic!("expected limit error");
    };
    assert_eq!(exceeded.which, BudgetKind::LifetimeUsd);
    assert_eq!(exceeded.limit, 5.0);
}

#[test]
fn refusal_rows_never_count_as_spend() {
    let store = Arc::new(MemoryStore::new());
    let mut governor = governor(&store);
    governor.check_before_call(9_000, 2_000).expect_err("refused");
    governor.check_before_call(10, 10).expect("small call still fits");
    governor.record_usage(10, 10, "m").expect("record");

    let dyn_store: Arc<dyn post_forge_core::PipelineStore> = store.clone();
    let realized = dyn_store.lifetime_spend().expect("spend");
    let raw: f64 =
        store.cost_entries.lock().unwrap().iter().map(|entry| entry.usd_cost).sum();
    assert!(realized < raw, "abort row must be excluded from realized spend");
    assert!(realized <= LIMITS.max_usd_lifetime);
}

#[test]
fn fallback_estimate_matches_len_over_three_point_five() {
    assert_eq!(heuristic_tokens(""), 0);
    assert_eq!(heuristic_tokens("abc"), 1);
    // 35 characters / 3.5 = 10 exactly.
    assert_eq!(heuristic_tokens(&"a".repeat(35)), 10);
    // 36 characters round up to 11.
    assert_eq!(heuristic_tokens(&"a".repeat(36)), 11);
}

#[test]
fn unknown_model_uses_fallback_estimator() {
    let estimator = TokenEstimator::for_model("definitely-not-a-known-model");
    let text = "a ".repeat(100);
    assert_eq!(estimator.estimate(&text), heuristic_tokens(&text));
}

proptest! {
    /// The fallback never under-runs its own formula and grows monotonically.
    #[test]
    fn fallback_is_reproducible_and_monotone(text in ".{0,400}") {
        let estimator = TokenEstimator::heuristic();
        let estimate = estimator.estimate(&text);
        prop_assert_eq!(estimate, heuristic_tokens(&text));
        let extended = format!("{text}xxxx");
        prop_assert!(estimator.estimate(&extended) >= estimate);
    }
}
