// crates/post-forge-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Fixtures
// Description: In-memory store, scripted remotes, and artifact sink for
//              orchestration tests.
// Purpose: Exercise the pipeline without a database or network.
// ============================================================================

//! ## Overview
//! Shared fixtures for core unit tests: a fully in-memory
//! [`PipelineStore`], scripted forum/LLM/storefront clients, a
//! tempdir-backed artifact sink, and an instant sleeper for retry tests.

#![allow(
    dead_code,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::cast_possible_truncation,
    reason = "Test-only fixtures; not every test uses every helper."
)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use post_forge_core::ArtifactBody;
use post_forge_core::ArtifactError;
use post_forge_core::ArtifactSink;
use post_forge_core::AuditEntry;
use post_forge_core::AuditEvent;
use post_forge_core::CompletionClient;
use post_forge_core::CompletionRequest;
use post_forge_core::CompletionResponse;
use post_forge_core::CostEntry;
use post_forge_core::CostRecord;
use post_forge_core::ForumClient;
use post_forge_core::PipelineStore;
use post_forge_core::Post;
use post_forge_core::PostId;
use post_forge_core::ProductDraft;
use post_forge_core::ProductReceipt;
use post_forge_core::RemoteError;
use post_forge_core::RunId;
use post_forge_core::SaveOutcome;
use post_forge_core::Sleeper;
use post_forge_core::Stage;
use post_forge_core::StageRecord;
use post_forge_core::StageRun;
use post_forge_core::StageStatus;
use post_forge_core::StoreError;
use post_forge_core::StorefrontClient;
use post_forge_core::Timestamp;
use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// Fully in-memory pipeline store.
#[derive(Default)]
pub struct MemoryStore {
    /// Stored posts.
    pub posts: Mutex<Vec<Post>>,
    /// Appended stage runs.
    pub stage_runs: Mutex<Vec<StageRun>>,
    /// Appended cost entries.
    pub cost_entries: Mutex<Vec<CostEntry>>,
    /// Appended audit events.
    pub audit: Mutex<Vec<AuditEvent>>,
    /// Row id counter.
    next_id: AtomicI64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next row id.
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns recorded audit actions in insertion order.
    pub fn audit_actions(&self) -> Vec<String> {
        self.audit
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.action.as_str().to_string())
            .collect()
    }

    /// Returns stage runs for one post as `(stage, status)` labels.
    pub fn stage_labels(&self, post_id: &PostId) -> Vec<(String, String)> {
        self.stage_runs
            .lock()
            .unwrap()
            .iter()
            .filter(|run| run.post_id == *post_id)
            .map(|run| (run.stage.as_str().to_string(), run.status.as_str().to_string()))
            .collect()
    }
}

impl PipelineStore for MemoryStore {
    fn save_post(&self, post: &Post) -> Result<SaveOutcome, StoreError> {
        let mut posts = self.posts.lock().unwrap();
        if posts.iter().any(|existing| existing.post_id == post.post_id) {
            return Ok(SaveOutcome::AlreadyPresent);
        }
        posts.push(post.clone());
        Ok(SaveOutcome::Inserted)
    }

    fn list_unprocessed_posts(&self) -> Result<Vec<Post>, StoreError> {
        let runs = self.stage_runs.lock().unwrap();
        let mut posts: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|post| {
                !runs.iter().any(|run| {
                    run.post_id == post.post_id
                        && run.stage == Stage::Upload
                        && run.status == StageStatus::Completed
                })
            })
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.original_ts.cmp(&a.original_ts));
        Ok(posts)
    }

    fn record_stage(&self, record: &StageRecord) -> Result<i64, StoreError> {
        let id = self.next_id();
        self.stage_runs.lock().unwrap().push(StageRun {
            id,
            post_id: record.post_id.clone(),
            stage: record.stage,
            status: record.status,
            artifact_path: record.artifact_path.clone(),
            error_message: record.error_message.clone(),
            created_at: Timestamp::now(),
        });
        Ok(id)
    }

    fn record_stage_transition(
        &self,
        record: &StageRecord,
        audit: &AuditEntry,
    ) -> Result<i64, StoreError> {
        let id = self.record_stage(record)?;
        self.append_audit(audit)?;
        Ok(id)
    }

    fn stage_runs(&self, post_id: &PostId) -> Result<Vec<StageRun>, StoreError> {
        Ok(self
            .stage_runs
            .lock()
            .unwrap()
            .iter()
            .filter(|run| run.post_id == *post_id)
            .cloned()
            .collect())
    }

    fn append_cost_entry(&self, record: &CostRecord) -> Result<i64, StoreError> {
        let id = self.next_id();
        self.cost_entries.lock().unwrap().push(CostEntry {
            id,
            run_id: record.run_id.clone(),
            tokens_in: record.tokens_in,
            tokens_out: record.tokens_out,
            usd_cost: record.usd_cost,
            model: record.model.clone(),
            abort_reason: record.abort_reason.clone(),
            created_at: Timestamp::now(),
        });
        Ok(id)
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<i64, StoreError> {
        let id = self.next_id();
        self.audit.lock().unwrap().push(AuditEvent {
            id,
            action: entry.action,
            post_id: entry.post_id.clone(),
            run_id: entry.run_id.clone(),
            details: entry.details.clone(),
            error_flag: entry.error_flag,
            cost_exhausted_flag: entry.cost_exhausted_flag,
            created_at: Timestamp::now(),
        });
        Ok(id)
    }

    fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError> {
        let audit = self.audit.lock().unwrap();
        Ok(audit.iter().rev().take(limit as usize).cloned().collect())
    }

    fn lifetime_spend(&self) -> Result<f64, StoreError> {
        Ok(self
            .cost_entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.abort_reason.is_none())
            .map(|entry| entry.usd_cost)
            .sum())
    }
}

// ============================================================================
// SECTION: Scripted Remotes
// ============================================================================

/// LLM client answering from a scripted queue.
pub struct ScriptedLlm {
    /// Scripted responses, popped per call.
    responses: Mutex<VecDeque<Result<CompletionResponse, RemoteError>>>,
    /// Number of calls made.
    pub calls: AtomicI64,
}

impl ScriptedLlm {
    /// Creates a scripted client.
    pub fn new(responses: Vec<Result<CompletionResponse, RemoteError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicI64::new(0),
        }
    }

    /// Convenience: a successful response carrying usage figures.
    pub fn reply(text: &str, tokens_in: u64, tokens_out: u64) -> Result<CompletionResponse, RemoteError> {
        Ok(CompletionResponse {
            text: text.to_string(),
            tokens_in: Some(tokens_in),
            tokens_out: Some(tokens_out),
            model: "scripted".to_string(),
        })
    }
}

impl CompletionClient for ScriptedLlm {
    fn complete(&self, _request: &CompletionRequest<'_>) -> Result<CompletionResponse, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::Payload("script exhausted".to_string())))
    }
}

/// Forum client returning a fixed post list.
pub struct ScriptedForum {
    /// Posts handed out per origin.
    pub posts: Vec<Post>,
}

impl ForumClient for ScriptedForum {
    fn fetch_posts(
        &self,
        origin: &str,
        min_score: i64,
        limit: u32,
    ) -> Result<Vec<Post>, RemoteError> {
        Ok(self
            .posts
            .iter()
            .filter(|post| post.origin == origin && post.score >= min_score)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Storefront client answering from a scripted queue.
pub struct ScriptedStorefront {
    /// Scripted responses, popped per call.
    responses: Mutex<VecDeque<Result<ProductReceipt, RemoteError>>>,
    /// Number of calls made.
    pub calls: AtomicI64,
    /// Drafts received, for assertions.
    pub drafts: Mutex<Vec<ProductDraft>>,
}

impl ScriptedStorefront {
    /// Creates a scripted client.
    pub fn new(responses: Vec<Result<ProductReceipt, RemoteError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicI64::new(0),
            drafts: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a successful receipt.
    pub fn receipt(product_id: &str) -> Result<ProductReceipt, RemoteError> {
        Ok(ProductReceipt {
            product_id: product_id.to_string(),
            url: format!("https://store.example/p/{product_id}"),
        })
    }
}

impl StorefrontClient for ScriptedStorefront {
    fn create_product(&self, draft: &ProductDraft) -> Result<ProductReceipt, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.drafts.lock().unwrap().push(draft.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::Payload("script exhausted".to_string())))
    }
}

// ============================================================================
// SECTION: Artifact Sink
// ============================================================================

/// Tempdir-backed artifact sink with counter-based unique names.
pub struct DirSink {
    /// Backing directory (kept alive for the test).
    pub dir: TempDir,
    /// File counter for unique names.
    counter: AtomicI64,
}

impl DirSink {
    /// Creates a sink over a fresh tempdir.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
            counter: AtomicI64::new(0),
        }
    }

    /// Writes one file under the sink root.
    fn write(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| ArtifactError::Io(error.to_string()))?;
        }
        std::fs::write(&path, bytes).map_err(|error| ArtifactError::Io(error.to_string()))?;
        Ok(path)
    }

    /// Mints a unique suffix.
    fn next(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

impl ArtifactSink for DirSink {
    fn write_stage_artifact(
        &self,
        post_id: &PostId,
        stage: Stage,
        body: &ArtifactBody,
    ) -> Result<PathBuf, ArtifactError> {
        let bytes = match body {
            ArtifactBody::Json(value) => serde_json::to_vec_pretty(value)
                .map_err(|error| ArtifactError::Serialize(error.to_string()))?,
            ArtifactBody::Text(text) => text.clone().into_bytes(),
        };
        let name = format!(
            "{post_id}/{stage}_{}.{}",
            self.next(),
            stage.artifact_extension()
        );
        self.write(&name, &bytes)
    }

    fn write_verify_artifact(
        &self,
        post_id: &PostId,
        attempt: u32,
        body: &Value,
    ) -> Result<PathBuf, ArtifactError> {
        let bytes = serde_json::to_vec_pretty(body)
            .map_err(|error| ArtifactError::Serialize(error.to_string()))?;
        self.write(&format!("{post_id}/verify_attempt_{attempt}.json"), &bytes)
    }

    fn write_error_artifact(
        &self,
        post_id: &PostId,
        stage: Stage,
        details: &Value,
    ) -> Result<PathBuf, ArtifactError> {
        let bytes = serde_json::to_vec_pretty(details)
            .map_err(|error| ArtifactError::Serialize(error.to_string()))?;
        self.write(&format!("{post_id}/error_logs/{stage}_{}.json", self.next()), &bytes)
    }

    fn write_abort_artifact(
        &self,
        run_id: &RunId,
        payload: &Value,
    ) -> Result<PathBuf, ArtifactError> {
        let bytes = serde_json::to_vec_pretty(payload)
            .map_err(|error| ArtifactError::Serialize(error.to_string()))?;
        self.write(&format!("abort_{run_id}.json"), &bytes)
    }
}

// ============================================================================
// SECTION: Sleeper
// ============================================================================

/// Sleeper that records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    /// Recorded delays in call order.
    pub delays: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

// ============================================================================
// SECTION: Sample Data
// ============================================================================

/// Builds a candidate post.
pub fn sample_post(id: &str, score: i64, ts: i64) -> Post {
    Post {
        post_id: PostId::new(id),
        title: format!("title of {id}"),
        body: "I keep spending hours reconciling invoices by hand.".to_string(),
        origin: "r/somewhere".to_string(),
        author: "tester".to_string(),
        score,
        url: format!("https://forum.example/{id}"),
        original_ts: Timestamp::from_unix_secs(ts),
        raw_payload: b"{}".to_vec(),
    }
}

/// JSON for an accepting problem analysis.
pub fn problem_json(discard: bool) -> String {
    serde_json::json!({
        "discard": discard,
        "summary": "manual invoice reconciliation",
        "audience": "freelancers",
        "why_matters": "hours lost monthly",
        "bad_solutions": ["spreadsheets"],
        "urgency": 70,
        "quotes": ["hours reconciling"],
    })
    .to_string()
}

/// JSON for a product spec with the given gate inputs.
pub fn spec_json(build: bool, confidence: u8, deliverables: usize) -> String {
    let items: Vec<String> =
        (0..deliverables).map(|index| format!("deliverable {index}")).collect();
    serde_json::json!({
        "build": build,
        "type": "guide",
        "title": "Invoice Reconciliation Guide",
        "buyer": "freelancers",
        "job_to_be_done": "reconcile invoices fast",
        "deliverables": items,
        "failure_reason": null,
        "price": 19.0,
        "confidence": confidence,
    })
    .to_string()
}

/// JSON for a verification verdict.
pub fn verify_json(pass: bool) -> String {
    serde_json::json!({
        "pass": pass,
        "reasons": if pass { Vec::<String>::new() } else { vec!["too generic".to_string()] },
        "missing": [],
        "generic": !pass,
        "example_score": if pass { 8 } else { 2 },
        "needs_regeneration": !pass,
    })
    .to_string()
}

/// Plain-text listing copy with both required markers.
pub fn listing_text() -> String {
    "Title: Invoice Reconciliation Guide\nDescription: Stop losing hours every month.".to_string()
}
