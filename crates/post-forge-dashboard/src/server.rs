// crates/post-forge-dashboard/src/server.rs
// ============================================================================
// Module: Dashboard Server
// Description: Read-only axum service over the pipeline store.
// Purpose: Project live metrics without ever blocking the writer.
// Dependencies: post-forge-core, post-forge-store-sqlite, axum, serde,
//               serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! Four endpoints, all read-only: the embedded HTML page, spend statistics,
//! recent audit activity, and in-flight posts. The store handle is opened in
//! read-only mode by the host; store queries run on the blocking pool so the
//! async runtime stays responsive. Every endpoint answers the same envelope:
//! `{ok, data}` on success, `{ok, error}` on failure. Timestamps are RFC
//! 3339 UTC strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use post_forge_core::Timestamp;
use post_forge_store_sqlite::RunProjection;
use post_forge_store_sqlite::SqlitePipelineStore;
use post_forge_store_sqlite::SqliteStoreError;
use post_forge_store_sqlite::TerminalCounts;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::page;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Audit events returned by the activity endpoint.
const ACTIVITY_LIMIT: u32 = 20;
/// Window for the "last 24h" statistics, in seconds.
const DAY_SECS: i64 = 86_400;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Dashboard service errors.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// The listener could not be bound.
    #[error("dashboard bind failed: {0}")]
    Bind(String),
    /// The server loop failed.
    #[error("dashboard serve failed: {0}")]
    Serve(String),
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared read-only state for all handlers.
#[derive(Clone)]
pub struct DashboardState {
    /// Read-only store handle.
    store: SqlitePipelineStore,
    /// Configured lifetime spend ceiling, for display.
    lifetime_limit: f64,
    /// Page poll interval in seconds.
    poll_interval_secs: u64,
}

impl DashboardState {
    /// Creates the dashboard state.
    #[must_use]
    pub const fn new(
        store: SqlitePipelineStore,
        lifetime_limit: f64,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            store,
            lifetime_limit,
            poll_interval_secs,
        }
    }
}

// ============================================================================
// SECTION: Wire Envelope
// ============================================================================

/// Wraps a projection result in the `{ok, data|error}` envelope.
fn envelope<T: Serialize>(result: Result<T, SqliteStoreError>) -> Json<Value> {
    match result {
        Ok(data) => Json(json!({ "ok": true, "data": data })),
        Err(error) => Json(json!({ "ok": false, "error": error.to_string() })),
    }
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Stats endpoint payload.
#[derive(Debug, Serialize)]
struct StatsPayload {
    /// Realized lifetime spend, USD.
    lifetime_spend: f64,
    /// Configured lifetime ceiling, USD.
    lifetime_limit: f64,
    /// Realized spend over the last 24 hours, USD.
    spend_24h: f64,
    /// Live counters of the current run, when one is in progress.
    current_run: Option<RunPayload>,
    /// Terminal-condition counts over the last 24 hours.
    last_24h: TerminalCounts,
}

/// Current-run payload.
#[derive(Debug, Serialize)]
struct RunPayload {
    /// Run identifier.
    run_id: String,
    /// Tokens sent so far.
    tokens_sent: u64,
    /// Tokens received so far.
    tokens_received: u64,
    /// Realized spend so far, USD.
    run_cost_usd: f64,
    /// Timestamp of the latest cost entry, RFC 3339.
    updated_at: String,
}

impl From<RunProjection> for RunPayload {
    fn from(projection: RunProjection) -> Self {
        Self {
            run_id: projection.run_id.as_str().to_string(),
            tokens_sent: projection.tokens_sent,
            tokens_received: projection.tokens_received,
            run_cost_usd: projection.run_cost_usd,
            updated_at: projection.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Serves the embedded page.
async fn index(State(state): State<DashboardState>) -> Html<String> {
    Html(page::render(state.poll_interval_secs))
}

/// Serves spend statistics.
async fn stats(State(state): State<DashboardState>) -> Json<Value> {
    let result = tokio::task::spawn_blocking(move || {
        let now = Timestamp::now();
        let since = Timestamp::from_unix_secs(now.as_unix_secs() - DAY_SECS);
        let lifetime_spend = state.store.spend_since(Timestamp::from_unix_secs(0))?;
        let spend_24h = state.store.spend_since(since)?;
        let current_run = state.store.current_run_projection(now)?.map(RunPayload::from);
        let last_24h = state.store.terminal_counts_since(since)?;
        Ok(StatsPayload {
            lifetime_spend,
            lifetime_limit: state.lifetime_limit,
            spend_24h,
            current_run,
            last_24h,
        })
    })
    .await
    .unwrap_or_else(|join_error| Err(SqliteStoreError::Db(join_error.to_string())));
    envelope(result)
}

/// Serves the recent audit trail, newest first.
async fn activity(State(state): State<DashboardState>) -> Json<Value> {
    let result = tokio::task::spawn_blocking(move || {
        let events = state.store.recent_audit_events(ACTIVITY_LIMIT)?;
        let payload: Vec<Value> = events
            .into_iter()
            .map(|event| {
                json!({
                    "id": event.id,
                    "action": event.action.as_str(),
                    "post_id": event.post_id.as_ref().map(ToString::to_string),
                    "run_id": event.run_id.as_ref().map(ToString::to_string),
                    "details": event.details,
                    "error_flag": event.error_flag,
                    "cost_exhausted_flag": event.cost_exhausted_flag,
                    "timestamp": event.created_at.to_rfc3339(),
                })
            })
            .collect();
        Ok(payload)
    })
    .await
    .unwrap_or_else(|join_error| Err(SqliteStoreError::Db(join_error.to_string())));
    envelope(result)
}

/// Serves posts currently in flight.
async fn posts(State(state): State<DashboardState>) -> Json<Value> {
    let result = tokio::task::spawn_blocking(move || {
        let in_flight = state.store.posts_in_flight()?;
        let payload: Vec<Value> = in_flight
            .into_iter()
            .map(|post| {
                json!({
                    "post_id": post.post_id.as_str(),
                    "title": post.title,
                    "last_stage": post.last_stage.as_str(),
                    "last_status": post.last_status.as_str(),
                    "updated_at": post.updated_at.to_rfc3339(),
                })
            })
            .collect();
        Ok(payload)
    })
    .await
    .unwrap_or_else(|join_error| Err(SqliteStoreError::Db(join_error.to_string())));
    envelope(result)
}

// ============================================================================
// SECTION: Router & Serve
// ============================================================================

/// Builds the dashboard router.
#[must_use]
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/stats", get(stats))
        .route("/api/activity", get(activity))
        .route("/api/posts", get(posts))
        .with_state(state)
}

/// Binds the loopback listener and serves until the process ends.
///
/// # Errors
///
/// Returns [`DashboardError`] when binding or serving fails.
pub async fn serve(state: DashboardState, port: u16) -> Result<(), DashboardError> {
    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| DashboardError::Bind(error.to_string()))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|error| DashboardError::Serve(error.to_string()))
}
