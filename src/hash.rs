//! Deterministic content hashing for change detection.
//!
//! The digest covers the canonical content fields only — score,
//! version, and processing timestamps are excluded — so two records
//! that are semantically identical always hash identically, and any
//! canonical field change flips the hash. Equality test only, not a
//! security primitive.

use sha2::{Digest, Sha256};

use crate::models::{CanonicalContent, ContentMetrics};

/// Compute the canonical SHA-256 hash of a content item, hex encoded.
///
/// Field ordering and number formatting are fixed by
/// [`canonical_form`], so provider-side representation differences
/// (field order, float formatting of integral counts) never classify
/// an item as updated.
pub fn content_hash(content: &CanonicalContent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(content).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Render the hashed fields as a stable key=value listing.
///
/// Timestamps are unix seconds, counts are plain decimal integers,
/// categories keep their given order. `transformed_at`, score, version,
/// and created/updated timestamps are deliberately absent.
fn canonical_form(content: &CanonicalContent) -> String {
    let metrics = match &content.metrics {
        ContentMetrics::Video { views, likes } => {
            format!("video:views={},likes={}", views, likes)
        }
        ContentMetrics::Article {
            reading_time_minutes,
            reactions,
        } => format!(
            "article:reading_time_minutes={},reactions={}",
            reading_time_minutes, reactions
        ),
    };

    format!(
        "id={}\ntitle={}\ntype={}\npublished_at={}\ncategories={}\nprovider={}\nmetrics={}",
        content.id,
        content.title,
        content.content_type.as_str(),
        content.published_at.timestamp(),
        content.categories.join(","),
        content.source_provider,
        metrics,
    )
}
