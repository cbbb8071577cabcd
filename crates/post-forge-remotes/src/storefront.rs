// crates/post-forge-remotes/src/storefront.rs
// ============================================================================
// Module: HTTP Storefront Client
// Description: Product creation against the storefront API.
// Purpose: Implement the StorefrontClient interface; one logical attempt.
// Dependencies: post-forge-core, reqwest, serde
// ============================================================================

//! ## Overview
//! Product creation is a single POST. Logical rejections (4xx) surface as
//! terminal status errors and are never retried; only transport blips and
//! retryable 5xx responses re-enter the retry layer above this client.

// ============================================================================
// SECTION: Imports
// ============================================================================

use post_forge_core::ProductDraft;
use post_forge_core::ProductReceipt;
use post_forge_core::RemoteError;
use post_forge_core::StorefrontClient;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::common::RemoteSettings;
use crate::common::build_client;
use crate::common::map_transport_error;
use crate::common::read_json;

// ============================================================================
// SECTION: Wire Format
// ============================================================================

/// Product creation response body.
#[derive(Debug, Deserialize)]
struct CreateReply {
    /// Storefront-assigned product identifier.
    product_id: String,
    /// Public product URL.
    url: String,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Storefront client over a JSON API.
pub struct HttpStorefrontClient {
    /// Transport settings.
    settings: RemoteSettings,
    /// Blocking HTTP client.
    client: Client,
}

impl HttpStorefrontClient {
    /// Creates a storefront client.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the HTTP client cannot be built.
    pub fn new(settings: RemoteSettings) -> Result<Self, RemoteError> {
        let client = build_client(&settings)?;
        Ok(Self {
            settings,
            client,
        })
    }

    /// Returns the product creation endpoint URL.
    fn endpoint(&self) -> String {
        format!("{}/products", self.settings.base_url.trim_end_matches('/'))
    }
}

impl StorefrontClient for HttpStorefrontClient {
    fn create_product(&self, draft: &ProductDraft) -> Result<ProductReceipt, RemoteError> {
        let mut builder = self.client.post(self.endpoint()).json(draft);
        if let Some(api_key) = &self.settings.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().map_err(|error| map_transport_error(&error))?;
        let reply: CreateReply = read_json(response)?;
        Ok(ProductReceipt {
            product_id: reply.product_id,
            url: reply.url,
        })
    }
}
