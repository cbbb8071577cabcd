// crates/post-forge-config/src/lib.rs
// ============================================================================
// Module: Post Forge Config
// Description: Canonical configuration model, loading, and validation.
// Purpose: Turn one TOML file into validated settings for every subsystem.
// Dependencies: post-forge-core, serde, thiserror, toml, url
// ============================================================================

//! ## Overview
//! Configuration is one TOML file with strict loading guards (path shape,
//! size limit, UTF-8, unknown keys rejected) and a validation pass that
//! collects *all* failure reasons instead of stopping at the first. A config
//! that loads and validates is sufficient to construct every subsystem; no
//! other knob exists at runtime except the environment variables named by
//! `api_key_env`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use post_forge_core::CostLimits;
use post_forge_core::OrchestratorConfig;
use post_forge_core::TokenPrices;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config filename when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "post-forge.toml";
/// Database filename inside the data root.
pub const DATABASE_FILE: &str = "pipeline.db";
/// Artifact directory name inside the data root.
pub const ARTIFACTS_DIR: &str = "artifacts";
/// Maximum config file size in bytes.
const MAX_CONFIG_BYTES: u64 = 1_048_576;
/// Maximum total config path length.
const MAX_PATH_LENGTH: usize = 4_096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be loaded or parsed.
    #[error("config load failed: {0}")]
    Load(String),
    /// The file parsed but failed validation; all reasons are listed.
    #[error("config invalid: {0}")]
    Invalid(InvalidReasons),
}

/// Collected validation failure reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidReasons(pub Vec<String>);

impl fmt::Display for InvalidReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Forum ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Ordered forum origins.
    pub origins: Vec<String>,
    /// Minimum forum score for a candidate.
    pub min_score: i64,
    /// Candidate limit per origin.
    pub posts_per_origin: u32,
}

/// Cost ceilings and prices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Token ceiling per run.
    pub max_tokens_per_run: u64,
    /// Spend ceiling per run, USD.
    pub max_usd_per_run: f64,
    /// Lifetime spend ceiling, USD.
    pub max_usd_lifetime: f64,
    /// USD per input token.
    pub price_in_per_token: f64,
    /// USD per output token.
    pub price_out_per_token: f64,
}

/// Pipeline behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    /// Content regeneration budget (retries after the first attempt).
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,
    /// Cooperative stop flag.
    #[serde(default)]
    pub kill_switch: bool,
    /// Model identifier passed to the LLM remote.
    pub model: String,
    /// Optional prompt template directory; built-ins otherwise.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
}

/// Persistence layout settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the database, artifacts, and lock.
    pub data_root: PathBuf,
}

impl StorageConfig {
    /// Returns the database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_root.join(DATABASE_FILE)
    }

    /// Returns the artifact tree root.
    #[must_use]
    pub fn artifacts_root(&self) -> PathBuf {
        self.data_root.join(ARTIFACTS_DIR)
    }
}

/// Dashboard settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    /// Listen port.
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
    /// Page poll interval, seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port: default_dashboard_port(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// One remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteEndpoint {
    /// Base URL of the remote API.
    pub base_url: String,
    /// Request deadline in milliseconds.
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable naming the bearer token, when one is required.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// The three remote endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemotesConfig {
    /// Discussion forum.
    pub forum: RemoteEndpoint,
    /// Language model provider.
    pub llm: RemoteEndpoint,
    /// E-commerce storefront.
    pub storefront: RemoteEndpoint,
}

/// Returns the default regeneration budget.
const fn default_max_regenerations() -> u32 {
    1
}

/// Returns the default dashboard port.
const fn default_dashboard_port() -> u16 {
    8_000
}

/// Returns the default dashboard poll interval.
const fn default_poll_interval_secs() -> u64 {
    3
}

/// Returns the default remote deadline.
const fn default_remote_timeout_ms() -> u64 {
    30_000
}

// ============================================================================
// SECTION: Config Root
// ============================================================================

/// The complete Post Forge configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Forum ingestion settings.
    pub ingest: IngestConfig,
    /// Cost ceilings and prices.
    pub budget: BudgetConfig,
    /// Pipeline behavior settings.
    pub pipeline: PipelineSection,
    /// Persistence layout settings.
    pub storage: StorageConfig,
    /// Dashboard settings.
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// Remote endpoints.
    pub remotes: RemotesConfig,
}

impl PipelineConfig {
    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when the file cannot be read or parsed
    /// and [`ConfigError::Invalid`] with every validation reason otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        validate_config_path(path)?;
        let metadata = fs::metadata(path)
            .map_err(|error| ConfigError::Load(format!("config file unreadable: {error}")))?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::Load(format!(
                "config file exceeds size limit: {} bytes (max {MAX_CONFIG_BYTES})",
                metadata.len()
            )));
        }
        let bytes = fs::read(path)
            .map_err(|error| ConfigError::Load(format!("config file unreadable: {error}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Load("config file must be utf-8".to_string()))?;
        let config: Self = toml::from_str(&text)
            .map_err(|error| ConfigError::Load(format!("config parse failed: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the parsed configuration, collecting every reason.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing all failures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();
        self.validate_ingest(&mut reasons);
        self.validate_budget(&mut reasons);
        self.validate_pipeline(&mut reasons);
        self.validate_storage(&mut reasons);
        self.validate_dashboard(&mut reasons);
        self.validate_remotes(&mut reasons);
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(InvalidReasons(reasons)))
        }
    }

    /// Validates the ingest section.
    fn validate_ingest(&self, reasons: &mut Vec<String>) {
        if self.ingest.origins.is_empty() {
            reasons.push("ingest.origins must not be empty".to_string());
        }
        if self.ingest.origins.iter().any(|origin| origin.trim().is_empty()) {
            reasons.push("ingest.origins entries must not be blank".to_string());
        }
        if self.ingest.posts_per_origin == 0 {
            reasons.push("ingest.posts_per_origin must be greater than zero".to_string());
        }
    }

    /// Validates the budget section.
    fn validate_budget(&self, reasons: &mut Vec<String>) {
        if self.budget.max_tokens_per_run == 0 {
            reasons.push("budget.max_tokens_per_run must be greater than zero".to_string());
        }
        for (name, value) in [
            ("budget.max_usd_per_run", self.budget.max_usd_per_run),
            ("budget.max_usd_lifetime", self.budget.max_usd_lifetime),
            ("budget.price_in_per_token", self.budget.price_in_per_token),
            ("budget.price_out_per_token", self.budget.price_out_per_token),
        ] {
            if !value.is_finite() || value <= 0.0 {
                reasons.push(format!("{name} must be a positive finite number"));
            }
        }
    }

    /// Validates the pipeline section.
    fn validate_pipeline(&self, reasons: &mut Vec<String>) {
        if self.pipeline.model.trim().is_empty() {
            reasons.push("pipeline.model must not be blank".to_string());
        }
    }

    /// Validates the storage section.
    fn validate_storage(&self, reasons: &mut Vec<String>) {
        if self.storage.data_root.as_os_str().is_empty() {
            reasons.push("storage.data_root must not be empty".to_string());
        }
    }

    /// Validates the dashboard section.
    fn validate_dashboard(&self, reasons: &mut Vec<String>) {
        if self.dashboard.port == 0 {
            reasons.push("dashboard.port must be greater than zero".to_string());
        }
        if self.dashboard.poll_interval_secs == 0 {
            reasons.push("dashboard.poll_interval_secs must be greater than zero".to_string());
        }
    }

    /// Validates the remotes section.
    fn validate_remotes(&self, reasons: &mut Vec<String>) {
        for (name, endpoint) in [
            ("remotes.forum", &self.remotes.forum),
            ("remotes.llm", &self.remotes.llm),
            ("remotes.storefront", &self.remotes.storefront),
        ] {
            match Url::parse(&endpoint.base_url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => {
                    reasons.push(format!("{name}.base_url scheme unsupported: {}", url.scheme()));
                }
                Err(error) => reasons.push(format!("{name}.base_url invalid: {error}")),
            }
            if endpoint.timeout_ms == 0 {
                reasons.push(format!("{name}.timeout_ms must be greater than zero"));
            }
            if let Some(env_name) = &endpoint.api_key_env
                && env_name.trim().is_empty()
            {
                reasons.push(format!("{name}.api_key_env must not be blank"));
            }
        }
    }

    // ------------------------------------------------------------------
    // Core conversions
    // ------------------------------------------------------------------

    /// Returns the cost ceilings for the governor.
    #[must_use]
    pub const fn cost_limits(&self) -> CostLimits {
        CostLimits {
            max_tokens_per_run: self.budget.max_tokens_per_run,
            max_usd_per_run: self.budget.max_usd_per_run,
            max_usd_lifetime: self.budget.max_usd_lifetime,
        }
    }

    /// Returns the token prices for the governor.
    #[must_use]
    pub const fn token_prices(&self) -> TokenPrices {
        TokenPrices {
            input_per_token: self.budget.price_in_per_token,
            output_per_token: self.budget.price_out_per_token,
        }
    }

    /// Returns the orchestrator settings.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            origins: self.ingest.origins.clone(),
            min_score: self.ingest.min_score,
            posts_per_origin: self.ingest.posts_per_origin,
            max_regenerations: self.pipeline.max_regenerations,
        }
    }
}

// ============================================================================
// SECTION: Path Guards
// ============================================================================

/// Validates the shape of the config path before touching the filesystem.
fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_PATH_LENGTH {
        return Err(ConfigError::Load("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Load("config path component too long".to_string()));
        }
    }
    Ok(())
}
