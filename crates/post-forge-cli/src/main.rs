// crates/post-forge-cli/src/main.rs
// ============================================================================
// Module: Post Forge CLI Entry Point
// Description: Command dispatcher for pipeline runs, the dashboard, and
//              backups.
// Purpose: Map every startup and runtime condition onto the documented exit
//          codes.
// Dependencies: clap, post-forge-config, post-forge-core,
//               post-forge-dashboard, post-forge-remotes,
//               post-forge-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! `post-forge run` executes one orchestrator invocation; `post-forge serve`
//! runs the read-only dashboard; `post-forge backup` drives snapshots.
//! Exit codes: 0 clean, 1 unrecovered failure, 2 configuration invalid,
//! 3 lock contention, 4 kill switch observed at startup, 5 cost exhausted
//! during the run. The orchestrator prints one line per stage transition;
//! everything else lives on disk and in the audit trail.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use post_forge_config::ConfigError;
use post_forge_config::PipelineConfig;
use post_forge_core::CostGovernor;
use post_forge_core::KillSwitch;
use post_forge_core::ModelGateway;
use post_forge_core::Orchestrator;
use post_forge_core::OrchestratorParts;
use post_forge_core::PostId;
use post_forge_core::ProgressReporter;
use post_forge_core::PromptCatalog;
use post_forge_core::RetryPolicy;
use post_forge_core::RunId;
use post_forge_core::RunOutcome;
use post_forge_core::Stage;
use post_forge_core::StageStatus;
use post_forge_core::Timestamp;
use post_forge_dashboard::DashboardState;
use post_forge_remotes::HttpCompletionClient;
use post_forge_remotes::HttpForumClient;
use post_forge_remotes::HttpStorefrontClient;
use post_forge_remotes::RemoteSettings;
use post_forge_store_sqlite::BackupManager;
use post_forge_store_sqlite::FileArtifactSink;
use post_forge_store_sqlite::LockError;
use post_forge_store_sqlite::PidLock;
use post_forge_store_sqlite::SqlitePipelineStore;
use post_forge_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Clean exit.
const EXIT_OK: u8 = 0;
/// Unrecovered failure.
const EXIT_FAILURE: u8 = 1;
/// Configuration invalid at startup.
const EXIT_CONFIG_INVALID: u8 = 2;
/// Another instance holds the data lock.
const EXIT_LOCK_CONTENDED: u8 = 3;
/// Kill switch observed at startup.
const EXIT_KILL_SWITCH: u8 = 4;
/// Cost exhausted during the run.
const EXIT_COST_EXHAUSTED: u8 = 5;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Unattended forum-to-storefront content pipeline.
#[derive(Parser, Debug)]
#[command(name = "post-forge", version, about)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute one pipeline run.
    Run(RunCommand),
    /// Serve the read-only dashboard.
    Serve(ServeCommand),
    /// Manage database snapshots.
    Backup {
        /// Backup operation.
        #[command(subcommand)]
        command: BackupCommand,
    },
}

/// Arguments for the run command.
#[derive(Args, Debug)]
struct RunCommand {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for the serve command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Backup operations.
#[derive(Subcommand, Debug)]
enum BackupCommand {
    /// Take one snapshot and enforce retention.
    Create(BackupCreateCommand),
    /// List stored snapshots, newest first.
    List(BackupListCommand),
    /// Restore a snapshot over the live database.
    Restore(BackupRestoreCommand),
}

/// Arguments for snapshot creation.
#[derive(Args, Debug)]
struct BackupCreateCommand {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for snapshot listing.
#[derive(Args, Debug)]
struct BackupListCommand {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for snapshot restore.
#[derive(Args, Debug)]
struct BackupRestoreCommand {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Snapshot file to restore.
    #[arg(long, value_name = "PATH")]
    snapshot: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying its exit code.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
    /// Process exit code.
    code: u8,
}

impl CliError {
    /// Constructs an error with an explicit exit code.
    const fn with_code(message: String, code: u8) -> Self {
        Self {
            message,
            code,
        }
    }

    /// Constructs a generic failure (exit 1).
    const fn failure(message: String) -> Self {
        Self::with_code(message, EXIT_FAILURE)
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            let _ = write_stderr_line(&error.message);
            ExitCode::from(error.code)
        }
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(command) => command_run(command).await,
        Commands::Serve(command) => command_serve(command).await,
        Commands::Backup {
            command,
        } => command_backup(command),
    }
}

// ============================================================================
// SECTION: Run Command
// ============================================================================

/// Executes the `run` command.
async fn command_run(command: RunCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    if config.pipeline.kill_switch {
        write_stdout_line("kill switch engaged; exiting without side effects")
            .map_err(|error| CliError::failure(output_error("stdout", &error)))?;
        return Ok(ExitCode::from(EXIT_KILL_SWITCH));
    }
    let config_path = command
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(post_forge_config::DEFAULT_CONFIG_FILE));
    let report = tokio::task::spawn_blocking(move || run_pipeline(&config, &config_path))
        .await
        .map_err(|error| CliError::failure(format!("run join failed: {error}")))??;
    match report {
        RunOutcome::CostExhausted => Ok(ExitCode::from(EXIT_COST_EXHAUSTED)),
        RunOutcome::Clean | RunOutcome::Halted => Ok(ExitCode::from(EXIT_OK)),
    }
}

/// Builds every subsystem and executes one orchestrator invocation.
fn run_pipeline(config: &PipelineConfig, config_path: &Path) -> CliResult<RunOutcome> {
    let _lock = match PidLock::acquire(&config.storage.data_root) {
        Ok(lock) => lock,
        Err(LockError::Contended(path)) => {
            return Err(CliError::with_code(
                format!("another orchestrator holds {path}"),
                EXIT_LOCK_CONTENDED,
            ));
        }
        Err(LockError::Io(message)) => {
            return Err(CliError::failure(format!("lock acquisition failed: {message}")));
        }
    };

    let store = SqlitePipelineStore::open(&SqliteStoreConfig::new(
        config.storage.database_path(),
    ))
    .map_err(|error| CliError::failure(format!("store unavailable: {error}")))?;
    let store = Arc::new(store);
    let artifacts = FileArtifactSink::new(config.storage.artifacts_root())
        .map_err(|error| CliError::failure(format!("artifact tree unavailable: {error}")))?;

    let forum = HttpForumClient::new(remote_settings(&config.remotes.forum))
        .map_err(|error| CliError::failure(format!("forum client unavailable: {error}")))?;
    let llm = HttpCompletionClient::new(remote_settings(&config.remotes.llm))
        .map_err(|error| CliError::failure(format!("llm client unavailable: {error}")))?;
    let storefront = HttpStorefrontClient::new(remote_settings(&config.remotes.storefront))
        .map_err(|error| CliError::failure(format!("storefront client unavailable: {error}")))?;

    let prompts = match &config.pipeline.prompts_dir {
        Some(dir) => PromptCatalog::load_dir(dir)
            .map_err(|error| CliError::failure(format!("prompt catalog unavailable: {error}")))?,
        None => PromptCatalog::builtin(),
    };

    let run_id = RunId::new(format!(
        "run-{}-{}",
        Timestamp::now().as_unix_secs(),
        process::id()
    ));
    let accounting_store: Arc<dyn post_forge_core::PipelineStore> = store.clone();
    let governor = CostGovernor::new(
        accounting_store,
        config.cost_limits(),
        config.token_prices(),
        &config.pipeline.model,
        run_id.clone(),
    )
    .map_err(|error| CliError::failure(format!("governor init failed: {error}")))?;
    let gateway =
        ModelGateway::new(Arc::new(llm), governor, RetryPolicy::new(), &config.pipeline.model);

    let mut orchestrator = Orchestrator::new(OrchestratorParts {
        store,
        artifacts: Arc::new(artifacts),
        forum: Arc::new(forum),
        storefront: Arc::new(storefront),
        gateway,
        retry: RetryPolicy::new(),
        prompts,
        progress: Arc::new(StdoutProgress),
        kill_switch: Arc::new(ConfigKillSwitch::new(config_path.to_path_buf())),
        config: config.orchestrator_config(),
        run_id,
    });
    let report = orchestrator
        .run()
        .map_err(|error| CliError::failure(format!("run aborted: {error}")))?;
    Ok(report.outcome)
}

/// Maps a config endpoint onto remote transport settings.
fn remote_settings(endpoint: &post_forge_config::RemoteEndpoint) -> RemoteSettings {
    let api_key =
        endpoint.api_key_env.as_ref().and_then(|name| std::env::var(name).ok());
    RemoteSettings {
        base_url: endpoint.base_url.clone(),
        timeout_ms: endpoint.timeout_ms,
        api_key,
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let store = SqlitePipelineStore::open_read_only(&config.storage.database_path())
        .map_err(|error| CliError::failure(format!("store unavailable: {error}")))?;
    let state = DashboardState::new(
        store,
        config.budget.max_usd_lifetime,
        config.dashboard.poll_interval_secs,
    );
    post_forge_dashboard::serve(state, config.dashboard.port)
        .await
        .map_err(|error| CliError::failure(error.to_string()))?;
    Ok(ExitCode::from(EXIT_OK))
}

// ============================================================================
// SECTION: Backup Command
// ============================================================================

/// Executes the `backup` command.
fn command_backup(command: BackupCommand) -> CliResult<ExitCode> {
    match command {
        BackupCommand::Create(command) => {
            let config = load_config(command.config.as_deref())?;
            let manager = backup_manager(&config)?;
            let path = manager
                .snapshot(&config.storage.database_path())
                .map_err(|error| CliError::failure(format!("snapshot failed: {error}")))?;
            write_stdout_line(&format!("snapshot written: {}", path.display()))
                .map_err(|error| CliError::failure(output_error("stdout", &error)))?;
        }
        BackupCommand::List(command) => {
            let config = load_config(command.config.as_deref())?;
            let manager = backup_manager(&config)?;
            let snapshots = manager
                .list_snapshots()
                .map_err(|error| CliError::failure(format!("listing failed: {error}")))?;
            for snapshot in snapshots {
                write_stdout_line(&format!(
                    "{}  {}",
                    snapshot.taken_at,
                    snapshot.path.display()
                ))
                .map_err(|error| CliError::failure(output_error("stdout", &error)))?;
            }
        }
        BackupCommand::Restore(command) => {
            let config = load_config(command.config.as_deref())?;
            let manager = backup_manager(&config)?;
            manager
                .restore(&command.snapshot, &config.storage.database_path())
                .map_err(|error| CliError::failure(format!("restore failed: {error}")))?;
            write_stdout_line("restore complete")
                .map_err(|error| CliError::failure(output_error("stdout", &error)))?;
        }
    }
    Ok(ExitCode::from(EXIT_OK))
}

/// Builds the backup manager rooted under the artifact tree.
fn backup_manager(config: &PipelineConfig) -> CliResult<BackupManager> {
    BackupManager::new(config.storage.artifacts_root().join("backups"))
        .map_err(|error| CliError::failure(format!("backup manager unavailable: {error}")))
}

// ============================================================================
// SECTION: Config Loading
// ============================================================================

/// Loads and validates the configuration, mapping failures to exit 2.
fn load_config(path: Option<&Path>) -> CliResult<PipelineConfig> {
    PipelineConfig::load(path).map_err(|error| match error {
        ConfigError::Load(message) => CliError::with_code(message, EXIT_CONFIG_INVALID),
        ConfigError::Invalid(reasons) => {
            CliError::with_code(format!("configuration invalid: {reasons}"), EXIT_CONFIG_INVALID)
        }
    })
}

// ============================================================================
// SECTION: Progress & Kill Switch
// ============================================================================

/// Progress sink printing one line per stage transition.
struct StdoutProgress;

impl ProgressReporter for StdoutProgress {
    fn stage_transition(&self, post_id: &PostId, stage: Stage, status: StageStatus) {
        let _ = write_stdout_line(&format!("{stage} {status} {post_id}"));
    }
}

/// Kill switch re-reading the configuration file between posts.
struct ConfigKillSwitch {
    /// Configuration file path.
    path: PathBuf,
}

impl ConfigKillSwitch {
    /// Creates the kill switch.
    const fn new(path: PathBuf) -> Self {
        Self {
            path,
        }
    }
}

impl KillSwitch for ConfigKillSwitch {
    fn engaged(&self) -> bool {
        PipelineConfig::load(Some(&self.path))
            .map(|config| config.pipeline.kill_switch)
            .unwrap_or(false)
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes one line to stdout.
fn write_stdout_line(text: &str) -> io::Result<()> {
    let mut handle = io::stdout().lock();
    handle.write_all(text.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()
}

/// Writes one line to stderr.
fn write_stderr_line(text: &str) -> io::Result<()> {
    let mut handle = io::stderr().lock();
    handle.write_all(text.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()
}

/// Formats an output-stream failure.
fn output_error(stream: &str, error: &io::Error) -> String {
    format!("{stream} write failed: {error}")
}
