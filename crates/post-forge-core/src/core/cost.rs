// crates/post-forge-core/src/core/cost.rs
// ============================================================================
// Module: Post Forge Cost Governor
// Description: Pre-call budget gate and post-call usage accounting.
// Purpose: Refuse any model call whose projection breaches a budget.
// Dependencies: crate::core, crate::interfaces, serde, thiserror, tiktoken-rs
// ============================================================================

//! ## Overview
//! The governor is the single correctness gate on spend. Every model call is
//! projected against three budgets (per-run tokens, per-run spend, lifetime
//! spend) before the network is touched; refusals are themselves recorded as
//! cost entries with an abort reason plus a flagged audit event. Actual usage
//! is recorded exactly once per successful call. The lifetime tally is read
//! from the store once at construction and maintained incrementally; this is
//! correct only while a single orchestrator process holds the data lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tiktoken_rs::get_bpe_from_model;

use crate::core::audit::AuditAction;
use crate::core::audit::AuditEntry;
use crate::core::identifiers::RunId;
use crate::core::time::Timestamp;
use crate::interfaces::PipelineStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Cost Records
// ============================================================================

/// One model call's accounting, as stored.
///
/// # Invariants
/// - `usd_cost = tokens_in * P_in + tokens_out * P_out` at the prices
///   configured when the row was recorded.
/// - Rows with `abort_reason` set record a refusal, not an execution; spend
///   queries must exclude them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// Store-assigned row identifier.
    pub id: i64,
    /// Run the call belonged to.
    pub run_id: RunId,
    /// Input tokens (actual, or the conservative estimate on refusal).
    pub tokens_in: u64,
    /// Output tokens (actual, or the conservative estimate on refusal).
    pub tokens_out: u64,
    /// Realized or projected cost in USD.
    pub usd_cost: f64,
    /// Model the call targeted.
    pub model: String,
    /// Refusal reason; `None` for executed calls.
    pub abort_reason: Option<String>,
    /// Insertion timestamp.
    pub created_at: Timestamp,
}

/// Append form of a cost entry; the store assigns the id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Run the call belonged to.
    pub run_id: RunId,
    /// Input tokens.
    pub tokens_in: u64,
    /// Output tokens.
    pub tokens_out: u64,
    /// Cost in USD.
    pub usd_cost: f64,
    /// Model the call targeted.
    pub model: String,
    /// Refusal reason; `None` for executed calls.
    pub abort_reason: Option<String>,
}

/// Per-invocation in-memory counters.
///
/// # Invariants
/// - Destroyed with the process; nothing here is persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Run identifier for this invocation.
    pub run_id: RunId,
    /// Tokens sent so far this run.
    pub tokens_sent: u64,
    /// Tokens received so far this run.
    pub tokens_received: u64,
    /// Realized spend so far this run, in USD.
    pub run_cost_usd: f64,
}

impl RunContext {
    /// Creates a zeroed context for a run.
    #[must_use]
    pub const fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            tokens_sent: 0,
            tokens_received: 0,
            run_cost_usd: 0.0,
        }
    }
}

// ============================================================================
// SECTION: Budgets
// ============================================================================

/// The three configured spend ceilings.
///
/// # Invariants
/// - All values are strictly positive; configuration validation enforces this
///   before a governor is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostLimits {
    /// Token ceiling per run (sent plus received).
    pub max_tokens_per_run: u64,
    /// Spend ceiling per run, in USD.
    pub max_usd_per_run: f64,
    /// Lifetime spend ceiling, in USD.
    pub max_usd_lifetime: f64,
}

/// Configured per-token prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenPrices {
    /// USD per input token.
    pub input_per_token: f64,
    /// USD per output token.
    pub output_per_token: f64,
}

impl TokenPrices {
    /// Returns the cost of a call at these prices.
    #[must_use]
    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        as_f64(tokens_in).mul_add(self.input_per_token, as_f64(tokens_out) * self.output_per_token)
    }
}

/// Converts a token count to f64 for price arithmetic.
#[allow(clippy::cast_precision_loss, reason = "Token counts stay far below 2^52.")]
const fn as_f64(tokens: u64) -> f64 {
    tokens as f64
}

/// The budget a projection breached.
///
/// # Invariants
/// - Wire labels are the stable abort reasons stored on refusal rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    /// Per-run token budget.
    PerRunTokens,
    /// Per-run spend budget.
    PerRunUsd,
    /// Lifetime spend budget.
    LifetimeUsd,
}

impl BudgetKind {
    /// Returns the stable abort-reason label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerRunTokens => "per_run_tokens",
            Self::PerRunUsd => "per_run_usd",
            Self::LifetimeUsd => "lifetime_usd",
        }
    }
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A pre-call projection exceeded a configured budget.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("cost limit exceeded ({which}): projected {actual} over limit {limit}")]
pub struct CostLimitExceeded {
    /// Which budget was breached.
    pub which: BudgetKind,
    /// Projected value (tokens or USD, per `which`).
    pub actual: f64,
    /// Configured limit.
    pub limit: f64,
}

/// Governor errors.
#[derive(Debug, Error)]
pub enum CostError {
    /// A projection exceeded a budget; the call was refused.
    #[error(transparent)]
    Limit(#[from] CostLimitExceeded),
    /// The store refused an accounting append.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Token Estimation
// ============================================================================

/// Safety margin applied on top of exact tokenizer counts, in percent.
const TOKENIZER_MARGIN_PERCENT: u64 = 10;

/// Conservative token estimator.
///
/// Uses the model's tokenizer when the configured model resolves to a known
/// encoding, with a flat safety margin; otherwise falls back to the
/// characters-per-token heuristic. The heuristic under-estimates on
/// punctuation-heavy prompts by a bounded amount; a reproducible upper bound
/// matters more here than occasional accuracy.
pub struct TokenEstimator {
    /// Tokenizer for the configured model, when one is known.
    bpe: Option<CoreBPE>,
}

impl TokenEstimator {
    /// Creates an estimator for the given model identifier.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        Self {
            bpe: get_bpe_from_model(model).ok(),
        }
    }

    /// Creates an estimator that always uses the heuristic fallback.
    #[must_use]
    pub const fn heuristic() -> Self {
        Self {
            bpe: None,
        }
    }

    /// Estimates the token count of a text.
    #[must_use]
    pub fn estimate(&self, text: &str) -> u64 {
        match &self.bpe {
            Some(bpe) => {
                let exact = u64::try_from(bpe.encode_ordinary(text).len()).unwrap_or(u64::MAX);
                exact + exact.div_ceil(100 / TOKENIZER_MARGIN_PERCENT)
            }
            None => heuristic_tokens(text),
        }
    }
}

/// Fallback estimate: `ceil(len / 3.5)` characters per token.
#[must_use]
pub fn heuristic_tokens(text: &str) -> u64 {
    let bytes = u64::try_from(text.len()).unwrap_or(u64::MAX / 2);
    (bytes * 2).div_ceil(7)
}

// ============================================================================
// SECTION: Governor
// ============================================================================

/// Process-wide cost accountant.
///
/// # Invariants
/// - `check_before_call` touches no network; refusals are recorded before
///   the error propagates.
/// - `record_usage` is called exactly once per successful model call and
///   never for refusals.
/// - The in-memory lifetime tally equals the store's filtered sum while this
///   process is the only writer.
pub struct CostGovernor {
    /// Accounting sink.
    store: Arc<dyn PipelineStore>,
    /// Configured ceilings.
    limits: CostLimits,
    /// Configured prices.
    prices: TokenPrices,
    /// Token estimator for the configured model.
    estimator: TokenEstimator,
    /// Per-run counters.
    run: RunContext,
    /// Realized lifetime spend, maintained incrementally.
    lifetime_spend: f64,
}

impl CostGovernor {
    /// Constructs a governor, reading the lifetime spend from the store once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lifetime spend cannot be read.
    pub fn new(
        store: Arc<dyn PipelineStore>,
        limits: CostLimits,
        prices: TokenPrices,
        model: &str,
        run_id: RunId,
    ) -> Result<Self, StoreError> {
        let lifetime_spend = store.lifetime_spend()?;
        Ok(Self {
            store,
            limits,
            prices,
            estimator: TokenEstimator::for_model(model),
            run: RunContext::new(run_id),
            lifetime_spend,
        })
    }

    /// Returns the per-run counters.
    #[must_use]
    pub const fn run_context(&self) -> &RunContext {
        &self.run
    }

    /// Returns the realized lifetime spend as maintained in memory.
    #[must_use]
    pub const fn lifetime_spend(&self) -> f64 {
        self.lifetime_spend
    }

    /// Returns the configured ceilings.
    #[must_use]
    pub const fn limits(&self) -> &CostLimits {
        &self.limits
    }

    /// Estimates the token count of a text.
    #[must_use]
    pub fn estimate_tokens(&self, text: &str) -> u64 {
        self.estimator.estimate(text)
    }

    /// Projects a call against all three budgets and refuses on any breach.
    ///
    /// On refusal a cost entry with the abort reason and a flagged audit
    /// event are appended before the error is returned. No network call may
    /// be made once this returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::Limit`] identifying the breached budget, or
    /// [`CostError::Store`] when recording the refusal fails.
    pub fn check_before_call(&mut self, est_in: u64, est_out: u64) -> Result<(), CostError> {
        let call_cost = self.prices.cost(est_in, est_out);
        let breach = self.project(est_in, est_out, call_cost);
        let Some(exceeded) = breach else {
            return Ok(());
        };
        self.record_refusal(est_in, est_out, call_cost, exceeded)?;
        Err(CostError::Limit(exceeded))
    }

    /// Records actual usage for one successful model call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the cost entry cannot be appended.
    pub fn record_usage(
        &mut self,
        actual_in: u64,
        actual_out: u64,
        model: &str,
    ) -> Result<(), StoreError> {
        let realized = self.prices.cost(actual_in, actual_out);
        self.run.tokens_sent += actual_in;
        self.run.tokens_received += actual_out;
        self.run.run_cost_usd += realized;
        self.lifetime_spend += realized;
        self.store.append_cost_entry(&CostRecord {
            run_id: self.run.run_id.clone(),
            tokens_in: actual_in,
            tokens_out: actual_out,
            usd_cost: realized,
            model: model.to_string(),
            abort_reason: None,
        })?;
        Ok(())
    }

    /// Returns the first breached budget for a projected call, if any.
    fn project(&self, est_in: u64, est_out: u64, call_cost: f64) -> Option<CostLimitExceeded> {
        let projected_tokens = self.run.tokens_sent + self.run.tokens_received + est_in + est_out;
        if projected_tokens > self.limits.max_tokens_per_run {
            return Some(CostLimitExceeded {
                which: BudgetKind::PerRunTokens,
                actual: as_f64(projected_tokens),
                limit: as_f64(self.limits.max_tokens_per_run),
            });
        }
        let projected_run = self.run.run_cost_usd + call_cost;
        if projected_run > self.limits.max_usd_per_run {
            return Some(CostLimitExceeded {
                which: BudgetKind::PerRunUsd,
                actual: projected_run,
                limit: self.limits.max_usd_per_run,
            });
        }
        let projected_lifetime = self.lifetime_spend + call_cost;
        if projected_lifetime > self.limits.max_usd_lifetime {
            return Some(CostLimitExceeded {
                which: BudgetKind::LifetimeUsd,
                actual: projected_lifetime,
                limit: self.limits.max_usd_lifetime,
            });
        }
        None
    }

    /// Appends the refusal cost entry and its flagged audit event.
    fn record_refusal(
        &self,
        est_in: u64,
        est_out: u64,
        call_cost: f64,
        exceeded: CostLimitExceeded,
    ) -> Result<(), StoreError> {
        self.store.append_cost_entry(&CostRecord {
            run_id: self.run.run_id.clone(),
            tokens_in: est_in,
            tokens_out: est_out,
            usd_cost: call_cost,
            model: String::new(),
            abort_reason: Some(exceeded.which.as_str().to_string()),
        })?;
        self.store.append_audit(
            &AuditEntry::new(AuditAction::CostExhausted)
                .with_run(self.run.run_id.clone())
                .with_details(json!({
                    "which": exceeded.which.as_str(),
                    "actual": exceeded.actual,
                    "limit": exceeded.limit,
                }))
                .with_cost_exhausted_flag(),
        )?;
        Ok(())
    }
}
