// crates/post-forge-remotes/src/forum.rs
// ============================================================================
// Module: HTTP Forum Client
// Description: Forum listing fetch mapped onto candidate posts.
// Purpose: Implement the ForumClient interface over a JSON listing API.
// Dependencies: post-forge-core, reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! The forum exposes a per-origin listing endpoint returning scored items.
//! The client passes the score floor and item limit upstream and enforces
//! both again locally, failing closed on items the server should not have
//! sent. The upstream item JSON is kept verbatim as the post's raw payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use post_forge_core::ForumClient;
use post_forge_core::Post;
use post_forge_core::PostId;
use post_forge_core::RemoteError;
use post_forge_core::Timestamp;
use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::common::RemoteSettings;
use crate::common::build_client;
use crate::common::map_transport_error;
use crate::common::read_json;

// ============================================================================
// SECTION: Wire Format
// ============================================================================

/// Listing response envelope.
#[derive(Debug, Deserialize)]
struct ListingResponse {
    /// Items in the listing, newest first.
    posts: Vec<ListingItem>,
}

/// One listing item.
#[derive(Debug, Deserialize)]
struct ListingItem {
    /// Forum-assigned identifier.
    id: String,
    /// Item title.
    title: String,
    /// Item body text.
    #[serde(default)]
    body: String,
    /// Author handle.
    #[serde(default)]
    author: String,
    /// Current score.
    score: i64,
    /// Canonical URL.
    #[serde(default)]
    url: String,
    /// Publication time, unix seconds.
    created_at: i64,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Forum client over a JSON listing API.
pub struct HttpForumClient {
    /// Transport settings.
    settings: RemoteSettings,
    /// Blocking HTTP client.
    client: Client,
}

impl HttpForumClient {
    /// Creates a forum client.
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

    /// Builds the listing URL for one origin.
    fn listing_url(&self, origin: &str, min_score: i64, limit: u32) -> Result<Url, RemoteError> {
        let base = Url::parse(&self.settings.base_url)
            .map_err(|error| RemoteError::Payload(format!("forum base url invalid: {error}")))?;
        let mut url = base
            .join(&format!("origins/{origin}/posts"))
            .map_err(|error| RemoteError::Payload(format!("forum origin url invalid: {error}")))?;
        url.query_pairs_mut()
            .append_pair("min_score", &min_score.to_string())
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }
}

impl ForumClient for HttpForumClient {
    fn fetch_posts(
        &self,
        origin: &str,
        min_score: i64,
        limit: u32,
    ) -> Result<Vec<Post>, RemoteError> {
        let url = self.listing_url(origin, min_score, limit)?;
        let response =
            self.client.get(url).send().map_err(|error| map_transport_error(&error))?;
        let listing: ListingResponse = read_json(response)?;
        let posts = listing
            .posts
            .into_iter()
            .filter(|item| item.score >= min_score)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|item| item_to_post(origin, &item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

/// Maps one listing item onto a candidate post.
fn item_to_post(origin: &str, item: &ListingItem) -> Result<Post, RemoteError> {
    let raw_payload = serde_json::to_vec(&serde_json::json!({
        "id": item.id,
        "title": item.title,
        "body": item.body,
        "author": item.author,
        "score": item.score,
        "url": item.url,
        "created_at": item.created_at,
    }))
    .map_err(|error| RemoteError::Payload(format!("raw payload unserializable: {error}")))?;
    Ok(Post {
        post_id: PostId::new(item.id.clone()),
        title: item.title.clone(),
        body: item.body.clone(),
        origin: origin.to_string(),
        author: item.author.clone(),
        score: item.score,
        url: item.url.clone(),
        original_ts: Timestamp::from_unix_secs(item.created_at),
        raw_payload,
    })
}
