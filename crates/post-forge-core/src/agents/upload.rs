// crates/post-forge-core/src/agents/upload.rs
// ============================================================================
// Module: Upload Agent
// Description: Creates the storefront product for a verified post.
// Purpose: Make exactly one logical upload attempt with sanitized copy.
// Dependencies: crate::agents::{listing, spec}, crate::interfaces,
//               crate::retry, crate::sanitize
// ============================================================================

//! ## Overview
//! The upload agent assembles the product draft (title and price from the
//! specification, description from the listing copy, both re-sanitized for
//! storefront HTML) and calls the storefront exactly once logically. The
//! retry schedule beneath it covers transport blips only; a logical
//! rejection from the storefront is terminal and is never retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::agents::listing::ListingCopy;
use crate::agents::spec::ProductSpec;
use crate::interfaces::ProductDraft;
use crate::interfaces::ProductReceipt;
use crate::interfaces::RemoteError;
use crate::interfaces::StorefrontClient;
use crate::retry::Remote;
use crate::retry::RetryPolicy;
use crate::sanitize;

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Uploads one verified product to the storefront.
///
/// # Errors
///
/// Returns [`RemoteError`] when the storefront rejects the product or the
/// transport fails after retries.
pub fn upload_product(
    storefront: &dyn StorefrontClient,
    retry: &RetryPolicy,
    spec: &ProductSpec,
    listing: &ListingCopy,
) -> Result<ProductReceipt, RemoteError> {
    let draft = build_draft(spec, listing);
    retry.execute(Remote::Storefront, || storefront.create_product(&draft))
}

/// Assembles the sanitized product draft.
#[must_use]
pub fn build_draft(spec: &ProductSpec, listing: &ListingCopy) -> ProductDraft {
    let description = listing.description().unwrap_or(listing.text.as_str());
    ProductDraft {
        title: sanitize::listing(&spec.title),
        description: sanitize::listing(description),
        price_cents: price_to_cents(spec.price),
    }
}

/// Converts a USD price to integer cents, clamping at zero.
#[must_use]
pub fn price_to_cents(price: f64) -> u64 {
    let cents = (price * 100.0).round();
    if cents.is_finite() && cents >= 0.0 {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "Bounds checked on the line above; prices are far below 2^52 cents."
        )]
        {
            cents as u64
        }
    } else {
        0
    }
}
