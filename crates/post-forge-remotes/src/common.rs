// crates/post-forge-remotes/src/common.rs
// ============================================================================
// Module: Remote Client Plumbing
// Description: Shared HTTP client construction and error mapping.
// Purpose: Keep deadline, redirect, and classification policy in one place.
// Dependencies: post-forge-core, reqwest
// ============================================================================

//! ## Overview
//! All three remotes share the same transport posture: a bounded deadline,
//! redirects disabled, a fixed user agent, and rustls. Transport failures map
//! onto the core's [`RemoteError`] so the retry layer alone decides what is
//! transient; these helpers never retry anything themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use post_forge_core::RemoteError;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// User agent sent on every outbound request.
pub const USER_AGENT: &str = "post-forge/0.1";

// ============================================================================
// SECTION: Client Settings
// ============================================================================

/// Transport settings shared by every remote client.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Base URL of the remote API.
    pub base_url: String,
    /// Request deadline in milliseconds.
    pub timeout_ms: u64,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

/// Builds the blocking HTTP client for one remote.
///
/// # Errors
///
/// Returns [`RemoteError::Connect`] when the client cannot be constructed.
pub fn build_client(settings: &RemoteSettings) -> Result<Client, RemoteError> {
    Client::builder()
        .timeout(Duration::from_millis(settings.timeout_ms))
        .redirect(Policy::none())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|error| RemoteError::Connect(format!("http client build failed: {error}")))
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a transport failure onto the retry classification.
#[must_use]
pub fn map_transport_error(error: &reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout("request deadline exceeded".to_string())
    } else if error.is_connect() {
        RemoteError::Connect("connection failed".to_string())
    } else {
        RemoteError::Connect(format!("transport failure: {error}"))
    }
}

/// Converts a non-success status into a [`RemoteError::Status`].
#[must_use]
pub fn status_error(status: StatusCode) -> RemoteError {
    RemoteError::Status {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("unrecognized status").to_string(),
    }
}

/// Checks the status and decodes the JSON body.
///
/// # Errors
///
/// Returns [`RemoteError::Status`] for non-success responses and
/// [`RemoteError::Payload`] when the body does not decode as `T`.
pub fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status));
    }
    response
        .json::<T>()
        .map_err(|error| RemoteError::Payload(format!("response body undecodable: {error}")))
}
