// crates/post-forge-core/src/orchestrator.rs
// ============================================================================
// Module: Post Forge Orchestrator
// Description: Deterministic per-post stage machine for one pipeline run.
// Purpose: Drive every post through the ordered stages with bounded
//          regeneration and clean cost-exhaustion termination.
// Dependencies: crate::agents, crate::core, crate::gateway, crate::interfaces,
//               crate::prompts, crate::retry, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The orchestrator is the single place that decides terminal versus
//! retriable-by-regeneration. Each run ingests candidates, then processes
//! unprocessed posts strictly in store order, one stage at a time, one
//! remote call in flight at a time. Every stage outcome writes an artifact,
//! appends a stage run with its audit event in one transaction, and reports
//! a progress line. Cost exhaustion anywhere terminates the current post and
//! prevents any further post from starting; storage failures are fatal for
//! the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::agents::content::generate_content;
use crate::agents::ingest::fetch_candidates;
use crate::agents::listing::ListingCopy;
use crate::agents::listing::generate_listing;
use crate::agents::problem::extract_problem;
use crate::agents::spec::ProductSpec;
use crate::agents::spec::draft_spec;
use crate::agents::upload::upload_product;
use crate::agents::verify::verify_content;
use crate::core::audit::AuditAction;
use crate::core::audit::AuditEntry;
use crate::core::cost::CostError;
use crate::core::cost::CostLimitExceeded;
use crate::core::identifiers::PostId;
use crate::core::identifiers::RunId;
use crate::core::post::Post;
use crate::core::stage::Stage;
use crate::core::stage::StageRecord;
use crate::core::stage::StageStatus;
use crate::core::time::Timestamp;
use crate::gateway::GatewayError;
use crate::gateway::ModelGateway;
use crate::interfaces::ArtifactBody;
use crate::interfaces::ArtifactError;
use crate::interfaces::ArtifactSink;
use crate::interfaces::ForumClient;
use crate::interfaces::KillSwitch;
use crate::interfaces::PipelineStore;
use crate::interfaces::ProgressReporter;
use crate::interfaces::SaveOutcome;
use crate::interfaces::StoreError;
use crate::interfaces::StorefrontClient;
use crate::prompts::PromptCatalog;
use crate::retry::RetryPolicy;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Run-scoped orchestrator settings.
///
/// # Invariants
/// - `max_regenerations` counts retries after the first content attempt;
///   total content attempts are `1 + max_regenerations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Ordered forum origins to ingest from.
    pub origins: Vec<String>,
    /// Minimum forum score for a candidate.
    pub min_score: i64,
    /// Candidate limit per origin.
    pub posts_per_origin: u32,
    /// Content regeneration budget.
    pub max_regenerations: u32,
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Terminal condition reached by one post in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// The product was uploaded.
    Uploaded,
    /// The problem stage discarded the post.
    Discarded,
    /// A spec gate rejected the post.
    Rejected,
    /// The regeneration budget was exhausted without passing verification.
    HardDiscard,
    /// A stage failed terminally.
    Failed,
    /// A cost projection refused a call for this post.
    CostExhausted,
}

/// How the run as a whole ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The post list was exhausted.
    Clean,
    /// A cost refusal terminated the run early.
    CostExhausted,
    /// The kill switch was observed between posts.
    Halted,
}

/// Summary of one orchestrator invocation.
#[derive(Debug)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Per-post terminal conditions, in processing order.
    pub posts: Vec<(PostId, PostOutcome)>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures that abort the whole run.
///
/// Remote and model failures never appear here; they terminate a single
/// post. Only broken persistence ends the run with an error.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The store refused a write or read.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The artifact tree refused a write.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Collaborators and settings for one orchestrator.
pub struct OrchestratorParts {
    /// Relational store.
    pub store: Arc<dyn PipelineStore>,
    /// Artifact tree.
    pub artifacts: Arc<dyn ArtifactSink>,
    /// Forum remote.
    pub forum: Arc<dyn ForumClient>,
    /// Storefront remote.
    pub storefront: Arc<dyn StorefrontClient>,
    /// Model gateway (owns the cost governor).
    pub gateway: ModelGateway,
    /// Retry executor for forum and storefront calls.
    pub retry: RetryPolicy,
    /// Stage prompt templates.
    pub prompts: PromptCatalog,
    /// Progress sink.
    pub progress: Arc<dyn ProgressReporter>,
    /// Cooperative stop flag.
    pub kill_switch: Arc<dyn KillSwitch>,
    /// Run-scoped settings.
    pub config: OrchestratorConfig,
    /// Run identifier.
    pub run_id: RunId,
}

/// Drives the per-post stage machine for one run.
pub struct Orchestrator {
    /// Relational store.
    store: Arc<dyn PipelineStore>,
    /// Artifact tree.
    artifacts: Arc<dyn ArtifactSink>,
    /// Forum remote.
    forum: Arc<dyn ForumClient>,
    /// Storefront remote.
    storefront: Arc<dyn StorefrontClient>,
    /// Model gateway.
    gateway: ModelGateway,
    /// Retry executor.
    retry: RetryPolicy,
    /// Stage prompt templates.
    prompts: PromptCatalog,
    /// Progress sink.
    progress: Arc<dyn ProgressReporter>,
    /// Cooperative stop flag.
    kill_switch: Arc<dyn KillSwitch>,
    /// Run-scoped settings.
    config: OrchestratorConfig,
    /// Run identifier.
    run_id: RunId,
}

impl Orchestrator {
    /// Assembles an orchestrator from its parts.
    #[must_use]
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            store: parts.store,
            artifacts: parts.artifacts,
            forum: parts.forum,
            storefront: parts.storefront,
            gateway: parts.gateway,
            retry: parts.retry,
            prompts: parts.prompts,
            progress: parts.progress,
            kill_switch: parts.kill_switch,
            config: parts.config,
            run_id: parts.run_id,
        }
    }

    /// Executes one full run: ingestion prelude, then the per-post loop.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] only when persistence fails; every
    /// remote or model failure terminates a single post instead.
    pub fn run(&mut self) -> Result<RunReport, OrchestratorError> {
        self.ingest()?;
        let pending = self.store.list_unprocessed_posts()?;
        let mut posts = Vec::new();
        let mut outcome = RunOutcome::Clean;
        for post in pending {
            if self.kill_switch.engaged() {
                outcome = RunOutcome::Halted;
                break;
            }
            let post_outcome = self.process_post(&post)?;
            let exhausted = matches!(post_outcome, PostOutcome::CostExhausted);
            posts.push((post.post_id.clone(), post_outcome));
            if exhausted {
                outcome = RunOutcome::CostExhausted;
                break;
            }
        }
        Ok(RunReport {
            run_id: self.run_id.clone(),
            outcome,
            posts,
        })
    }

    // ------------------------------------------------------------------
    // Ingestion prelude
    // ------------------------------------------------------------------

    /// Fetches candidates and persists the new ones.
    fn ingest(&self) -> Result<(), OrchestratorError> {
        let report = fetch_candidates(
            self.forum.as_ref(),
            &self.retry,
            &self.config.origins,
            self.config.min_score,
            self.config.posts_per_origin,
        );
        for (origin, error) in &report.failures {
            self.store.append_audit(
                &AuditEntry::new(AuditAction::ErrorOccurred)
                    .with_run(self.run_id.clone())
                    .with_details(json!({
                        "stage": Stage::Ingest.as_str(),
                        "origin": origin,
                        "error": error.to_string(),
                    }))
                    .with_error_flag(),
            )?;
        }
        for post in report.posts {
            if matches!(self.store.save_post(&post)?, SaveOutcome::Inserted) {
                self.store.append_audit(
                    &AuditEntry::new(AuditAction::PostIngested)
                        .with_post(post.post_id.clone())
                        .with_run(self.run_id.clone())
                        .with_details(json!({
                            "origin": post.origin,
                            "score": post.score,
                        })),
                )?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Per-post stage machine
    // ------------------------------------------------------------------

    /// Drives one post to a terminal condition.
    fn process_post(&mut self, post: &Post) -> Result<PostOutcome, OrchestratorError> {
        // problem
        let problem = match extract_problem(&mut self.gateway, &self.prompts, post) {
            Ok(analysis) => analysis,
            Err(error) => return self.stage_off_ramp(post, Stage::Problem, error),
        };
        let problem_path = self.artifacts.write_stage_artifact(
            &post.post_id,
            Stage::Problem,
            &ArtifactBody::Json(as_json(&problem)?),
        )?;
        if problem.discard {
            self.transition(
                post,
                Stage::Problem,
                StageStatus::Discarded,
                Some(problem_path),
                None,
                AuditAction::PostDiscarded,
                json!({ "stage": Stage::Problem.as_str(), "summary": problem.summary }),
            )?;
            return Ok(PostOutcome::Discarded);
        }
        self.transition(
            post,
            Stage::Problem,
            StageStatus::Completed,
            Some(problem_path),
            None,
            AuditAction::ProblemExtracted,
            json!({ "urgency": problem.urgency }),
        )?;

        // spec
        let spec = match draft_spec(&mut self.gateway, &self.prompts, &problem) {
            Ok(spec) => spec,
            Err(error) => return self.stage_off_ramp(post, Stage::Spec, error),
        };
        let spec_path = self.artifacts.write_stage_artifact(
            &post.post_id,
            Stage::Spec,
            &ArtifactBody::Json(as_json(&spec)?),
        )?;
        let reasons = spec.rejection_reasons();
        if !reasons.is_empty() {
            self.transition(
                post,
                Stage::Spec,
                StageStatus::Rejected,
                Some(spec_path),
                None,
                AuditAction::PostDiscarded,
                json!({ "stage": Stage::Spec.as_str(), "reasons": reasons }),
            )?;
            return Ok(PostOutcome::Rejected);
        }
        self.transition(
            post,
            Stage::Spec,
            StageStatus::Completed,
            Some(spec_path),
            None,
            AuditAction::SpecGenerated,
            json!({ "title": spec.title, "price": spec.price, "confidence": spec.confidence }),
        )?;

        // content + verify, bounded regeneration
        let content = match self.content_loop(post, &spec)? {
            ContentVerdict::Accepted(content) => content,
            ContentVerdict::Terminal(outcome) => return Ok(outcome),
        };

        // listing
        let listing = match generate_listing(&mut self.gateway, &self.prompts, &spec, &content) {
            Ok(listing) => listing,
            Err(error) => return self.stage_off_ramp(post, Stage::Listing, error),
        };
        let listing_path = self.artifacts.write_stage_artifact(
            &post.post_id,
            Stage::Listing,
            &ArtifactBody::Text(listing.text.clone()),
        )?;
        self.transition(
            post,
            Stage::Listing,
            StageStatus::Completed,
            Some(listing_path),
            None,
            AuditAction::ListingGenerated,
            json!({ "title": listing.title() }),
        )?;

        // upload
        self.upload(post, &spec, &listing)
    }

    /// Runs the bounded content/verify loop.
    fn content_loop(
        &mut self,
        post: &Post,
        spec: &ProductSpec,
    ) -> Result<ContentVerdict, OrchestratorError> {
        let max_attempts = 1 + self.config.max_regenerations;
        let mut attempt: u32 = 1;
        loop {
            let content = match generate_content(&mut self.gateway, &self.prompts, spec) {
                Ok(content) => content,
                Err(GatewayError::Schema(message)) => {
                    // Blank output burns a regeneration attempt.
                    let sidecar = self.artifacts.write_error_artifact(
                        &post.post_id,
                        Stage::Content,
                        &json!({ "attempt": attempt, "error": message }),
                    )?;
                    self.transition(
                        post,
                        Stage::Content,
                        StageStatus::Failed,
                        Some(sidecar),
                        Some(message),
                        AuditAction::ErrorOccurred,
                        json!({ "attempt": attempt }),
                    )?;
                    if attempt >= max_attempts {
                        self.append_hard_discard(post, "content_exhausted")?;
                        return Ok(ContentVerdict::Terminal(PostOutcome::HardDiscard));
                    }
                    attempt += 1;
                    continue;
                }
                Err(error) => {
                    return self.stage_off_ramp(post, Stage::Content, error).map(ContentVerdict::Terminal);
                }
            };
            let content_path = self.artifacts.write_stage_artifact(
                &post.post_id,
                Stage::Content,
                &ArtifactBody::Text(content.clone()),
            )?;
            self.transition(
                post,
                Stage::Content,
                StageStatus::Completed,
                Some(content_path),
                None,
                AuditAction::ContentGenerated,
                json!({ "attempt": attempt }),
            )?;

            let verdict = match verify_content(&mut self.gateway, &self.prompts, spec, &content) {
                Ok(verdict) => verdict,
                Err(error) => {
                    return self.stage_off_ramp(post, Stage::Verify, error).map(ContentVerdict::Terminal);
                }
            };
            let verify_path =
                self.artifacts.write_verify_artifact(&post.post_id, attempt, &as_json(&verdict)?)?;
            if verdict.pass {
                self.transition(
                    post,
                    Stage::Verify,
                    StageStatus::Completed,
                    Some(verify_path),
                    None,
                    AuditAction::ContentVerified,
                    json!({ "attempt": attempt, "example_score": verdict.example_score }),
                )?;
                return Ok(ContentVerdict::Accepted(content));
            }
            self.transition(
                post,
                Stage::Verify,
                StageStatus::Rejected,
                Some(verify_path),
                None,
                AuditAction::ContentRejected,
                json!({ "attempt": attempt, "reasons": verdict.reasons }),
            )?;
            if attempt >= max_attempts {
                self.append_hard_discard(post, "verification_exhausted")?;
                return Ok(ContentVerdict::Terminal(PostOutcome::HardDiscard));
            }
            attempt += 1;
        }
    }

    /// Makes the single logical upload attempt.
    fn upload(
        &mut self,
        post: &Post,
        spec: &ProductSpec,
        listing: &ListingCopy,
    ) -> Result<PostOutcome, OrchestratorError> {
        match upload_product(self.storefront.as_ref(), &self.retry, spec, listing) {
            Ok(receipt) => {
                let upload_path = self.artifacts.write_stage_artifact(
                    &post.post_id,
                    Stage::Upload,
                    &ArtifactBody::Json(json!({
                        "product_id": receipt.product_id,
                        "url": receipt.url,
                        "title": spec.title,
                        "price": spec.price,
                    })),
                )?;
                self.transition(
                    post,
                    Stage::Upload,
                    StageStatus::Completed,
                    Some(upload_path),
                    None,
                    AuditAction::UploadSucceeded,
                    json!({ "product_id": receipt.product_id, "url": receipt.url }),
                )?;
                Ok(PostOutcome::Uploaded)
            }
            Err(error) => {
                let sidecar = self.artifacts.write_error_artifact(
                    &post.post_id,
                    Stage::Upload,
                    &json!({ "error": error.to_string() }),
                )?;
                self.transition(
                    post,
                    Stage::Upload,
                    StageStatus::Failed,
                    Some(sidecar),
                    Some(error.to_string()),
                    AuditAction::UploadFailed,
                    json!({ "error": error.to_string() }),
                )?;
                Ok(PostOutcome::Failed)
            }
        }
    }

    // ------------------------------------------------------------------
    // Off-ramps
    // ------------------------------------------------------------------

    /// Routes a gateway failure to the cost-exhaustion or failure off-ramp.
    fn stage_off_ramp(
        &mut self,
        post: &Post,
        stage: Stage,
        error: GatewayError,
    ) -> Result<PostOutcome, OrchestratorError> {
        match error {
            GatewayError::Cost(CostError::Limit(exceeded)) => {
                self.cost_exhausted(post, stage, exceeded)
            }
            GatewayError::Cost(CostError::Store(error)) => Err(OrchestratorError::Store(error)),
            GatewayError::Remote(error) => self.stage_failed(post, stage, &error.to_string()),
            GatewayError::Schema(message) => self.stage_failed(post, stage, &message),
        }
    }

    /// Records a terminally failed stage and keeps the run going.
    fn stage_failed(
        &self,
        post: &Post,
        stage: Stage,
        message: &str,
    ) -> Result<PostOutcome, OrchestratorError> {
        let sidecar = self.artifacts.write_error_artifact(
            &post.post_id,
            stage,
            &json!({ "error": message }),
        )?;
        self.transition(
            post,
            stage,
            StageStatus::Failed,
            Some(sidecar),
            Some(message.to_string()),
            AuditAction::ErrorOccurred,
            json!({ "error": message }),
        )?;
        Ok(PostOutcome::Failed)
    }

    /// Records cost exhaustion: abort artifact, stage run, audit event.
    fn cost_exhausted(
        &self,
        post: &Post,
        stage: Stage,
        exceeded: CostLimitExceeded,
    ) -> Result<PostOutcome, OrchestratorError> {
        let run = self.gateway.governor().run_context();
        self.artifacts.write_abort_artifact(
            &self.run_id,
            &json!({
                "run_id": self.run_id.as_str(),
                "reason": exceeded.which.as_str(),
                "tokens_sent": run.tokens_sent,
                "tokens_received": run.tokens_received,
                "run_cost": run.run_cost_usd,
                "timestamp": Timestamp::now().to_rfc3339(),
            }),
        )?;
        self.transition(
            post,
            stage,
            StageStatus::CostExhausted,
            None,
            Some(exceeded.to_string()),
            AuditAction::CostExhausted,
            json!({
                "which": exceeded.which.as_str(),
                "actual": exceeded.actual,
                "limit": exceeded.limit,
            }),
        )?;
        Ok(PostOutcome::CostExhausted)
    }

    /// Appends the terminal discard event after an exhausted content budget.
    fn append_hard_discard(&self, post: &Post, reason: &str) -> Result<(), OrchestratorError> {
        self.store.append_audit(
            &AuditEntry::new(AuditAction::PostDiscarded)
                .with_post(post.post_id.clone())
                .with_run(self.run_id.clone())
                .with_details(json!({ "reason": reason })),
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence helper
    // ------------------------------------------------------------------

    /// Appends the stage run with its audit event and reports progress.
    #[allow(clippy::too_many_arguments, reason = "One call site per stage; a builder would obscure the transition.")]
    fn transition(
        &self,
        post: &Post,
        stage: Stage,
        status: StageStatus,
        artifact_path: Option<PathBuf>,
        error_message: Option<String>,
        action: AuditAction,
        details: Value,
    ) -> Result<(), OrchestratorError> {
        let mut record = StageRecord::new(post.post_id.clone(), stage, status);
        if let Some(path) = artifact_path {
            record = record.with_artifact(path.to_string_lossy());
        }
        if let Some(message) = error_message {
            record = record.with_error(message);
        }
        let mut entry = AuditEntry::new(action)
            .with_post(post.post_id.clone())
            .with_run(self.run_id.clone())
            .with_details(details);
        if matches!(status, StageStatus::Failed) {
            entry = entry.with_error_flag();
        }
        if matches!(status, StageStatus::CostExhausted) {
            entry = entry.with_cost_exhausted_flag();
        }
        self.store.record_stage_transition(&record, &entry)?;
        self.progress.stage_transition(&post.post_id, stage, status);
        Ok(())
    }
}

// ============================================================================
// SECTION: Content Verdict
// ============================================================================

/// Result of the content/verify loop.
enum ContentVerdict {
    /// Verified content, ready for listing.
    Accepted(String),
    /// The post reached a terminal condition inside the loop.
    Terminal(PostOutcome),
}

// ============================================================================
// SECTION: Serialization Helper
// ============================================================================

/// Serializes a stage output for its artifact.
fn as_json<T: Serialize>(value: &T) -> Result<Value, ArtifactError> {
    serde_json::to_value(value).map_err(|error| ArtifactError::Serialize(error.to_string()))
}
