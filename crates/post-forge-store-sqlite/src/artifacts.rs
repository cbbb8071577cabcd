// crates/post-forge-store-sqlite/src/artifacts.rs
// ============================================================================
// Module: File Artifact Tree
// Description: Write-once on-disk artifact store for stage outputs.
// Purpose: Keep every stage outcome on disk for post-mortem and resumption.
// Dependencies: post-forge-core, serde_json
// ============================================================================

//! ## Overview
//! Artifacts live under `<artifacts_root>/<post_id>/` with one timestamped
//! file per stage attempt, error sidecars under `error_logs/`, and the
//! run-level abort artifact at the root. Files are write-once: a name
//! collision (two attempts in the same second) advances the timestamp
//! suffix instead of replacing anything. Identifiers are validated as single
//! path components before they touch the filesystem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use post_forge_core::ArtifactBody;
use post_forge_core::ArtifactError;
use post_forge_core::ArtifactSink;
use post_forge_core::PostId;
use post_forge_core::RunId;
use post_forge_core::Stage;
use post_forge_core::Timestamp;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum timestamp bumps tried on a name collision.
const MAX_NAME_BUMPS: i64 = 1_000;
/// Maximum length of a single path component.
const MAX_COMPONENT_LENGTH: usize = 255;
/// Directory holding error sidecars per post.
const ERROR_DIR: &str = "error_logs";

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Write-once artifact tree rooted at a directory.
pub struct FileArtifactSink {
    /// Artifact tree root.
    root: PathBuf,
}

impl FileArtifactSink {
    /// Creates a sink, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the root cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|error| ArtifactError::Io(error.to_string()))?;
        Ok(Self {
            root,
        })
    }

    /// Returns the artifact tree root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the per-post directory, creating it if needed.
    fn post_dir(&self, post_id: &PostId) -> Result<PathBuf, ArtifactError> {
        let component = safe_component(post_id.as_str())?;
        let dir = self.root.join(component);
        fs::create_dir_all(&dir).map_err(|error| ArtifactError::Io(error.to_string()))?;
        Ok(dir)
    }
}

impl ArtifactSink for FileArtifactSink {
    fn write_stage_artifact(
        &self,
        post_id: &PostId,
        stage: Stage,
        body: &ArtifactBody,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.post_dir(post_id)?;
        let rendered = render_body(body)?;
        write_unique(&dir, stage.as_str(), stage.artifact_extension(), &rendered)
    }

    fn write_verify_artifact(
        &self,
        post_id: &PostId,
        attempt: u32,
        body: &Value,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.post_dir(post_id)?;
        let rendered = render_json(body)?;
        let path = dir.join(format!("verify_attempt_{attempt}.json"));
        match write_once(&path, &rendered) {
            Ok(()) => Ok(path),
            // A re-processed post meets its own earlier attempt file; fall
            // back to a timestamped name rather than replace it.
            Err(ArtifactError::Exists(_)) => {
                write_unique(&dir, &format!("verify_attempt_{attempt}"), "json", &rendered)
            }
            Err(error) => Err(error),
        }
    }

    fn write_error_artifact(
        &self,
        post_id: &PostId,
        stage: Stage,
        details: &Value,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.post_dir(post_id)?.join(ERROR_DIR);
        fs::create_dir_all(&dir).map_err(|error| ArtifactError::Io(error.to_string()))?;
        let rendered = render_json(details)?;
        write_unique(&dir, stage.as_str(), "json", &rendered)
    }

    fn write_abort_artifact(
        &self,
        run_id: &RunId,
        payload: &Value,
    ) -> Result<PathBuf, ArtifactError> {
        let component = safe_component(run_id.as_str())?;
        let rendered = render_json(payload)?;
        let path = self.root.join(format!("abort_{component}.json"));
        write_once(&path, &rendered)?;
        Ok(path)
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders an artifact body to bytes.
fn render_body(body: &ArtifactBody) -> Result<Vec<u8>, ArtifactError> {
    match body {
        ArtifactBody::Json(value) => render_json(value),
        ArtifactBody::Text(text) => Ok(text.clone().into_bytes()),
    }
}

/// Renders a JSON payload to pretty bytes.
fn render_json(value: &Value) -> Result<Vec<u8>, ArtifactError> {
    serde_json::to_vec_pretty(value).map_err(|error| ArtifactError::Serialize(error.to_string()))
}

// ============================================================================
// SECTION: Write Helpers
// ============================================================================

/// Writes `<dir>/<stem>_<unix_ts>.<ext>`, bumping the timestamp on
/// collisions so nothing is ever replaced.
fn write_unique(
    dir: &Path,
    stem: &str,
    extension: &str,
    bytes: &[u8],
) -> Result<PathBuf, ArtifactError> {
    let base = Timestamp::now().as_unix_secs();
    for bump in 0..MAX_NAME_BUMPS {
        let path = dir.join(format!("{stem}_{}.{extension}", base + bump));
        match write_once(&path, bytes) {
            Ok(()) => return Ok(path),
            Err(ArtifactError::Exists(_)) => {}
            Err(error) => return Err(error),
        }
    }
    Err(ArtifactError::Exists(format!(
        "no free artifact name for {stem} under {}",
        dir.display()
    )))
}

/// Writes one file, refusing to replace an existing one.
fn write_once(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::AlreadyExists {
            ArtifactError::Exists(path.display().to_string())
        } else {
            ArtifactError::Io(error.to_string())
        }
    })?;
    file.write_all(bytes).map_err(|error| ArtifactError::Io(error.to_string()))?;
    Ok(())
}

/// Validates an identifier as a single, traversal-free path component.
fn safe_component(raw: &str) -> Result<&str, ArtifactError> {
    let rejected = raw.is_empty()
        || raw.len() > MAX_COMPONENT_LENGTH
        || raw == "."
        || raw == ".."
        || raw.chars().any(|ch| ch == '/' || ch == '\\' || ch == '\0');
    if rejected {
        return Err(ArtifactError::InvalidComponent(raw.to_string()));
    }
    Ok(raw)
}
