//! Core data models flowing through the synchronization and search
//! pipeline.
//!
//! [`CanonicalContent`] is the provider-agnostic form produced at the
//! mapping boundary. [`PersistedContent`] is its durable counterpart,
//! owned exclusively by the persistence gateway. [`ChangeNotification`]
//! carries identifiers only — never payload data — so a consumer can
//! never act on stale content.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Fault, Result};

/// Maximum accepted title length, in characters.
pub const MAX_TITLE_CHARS: usize = 1000;

/// Discriminant for the two supported content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Article,
}

impl ContentType {
    /// Stable lowercase label used in hashes, SQL columns, and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Article => "article",
        }
    }
}

/// Per-type engagement metrics, decoded once at the provider boundary.
///
/// Closed tagged union selected by the content-type discriminant; the
/// scoring engine treats a variant mismatch as malformed input and
/// degrades to a zero score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentMetrics {
    Video { views: u64, likes: u64 },
    Article { reading_time_minutes: u32, reactions: u64 },
}

impl ContentMetrics {
    /// Whether these metrics belong to the given content type.
    pub fn matches_type(&self, content_type: ContentType) -> bool {
        matches!(
            (self, content_type),
            (Self::Video { .. }, ContentType::Video)
                | (Self::Article { .. }, ContentType::Article)
        )
    }
}

/// Provider-agnostic normalized representation of one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalContent {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    pub published_at: DateTime<Utc>,
    /// Non-empty, ordered, duplicates removed at construction.
    pub categories: Vec<String>,
    pub source_provider: String,
    pub transformed_at: DateTime<Utc>,
    pub metrics: ContentMetrics,
}

impl CanonicalContent {
    /// Construct a canonical item, enforcing the model invariants.
    ///
    /// Fails with [`Fault::Validation`] when the id is empty, the title
    /// exceeds [`MAX_TITLE_CHARS`], the publication date is in the
    /// future, or no category is present.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content_type: ContentType,
        published_at: DateTime<Utc>,
        categories: Vec<String>,
        source_provider: impl Into<String>,
        metrics: ContentMetrics,
    ) -> Result<Self> {
        let id = id.into();
        let title = title.into();

        if id.trim().is_empty() {
            return Err(Fault::validation("content id must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(Fault::validation(format!(
                "title for '{}' exceeds {} characters",
                id, MAX_TITLE_CHARS
            )));
        }
        if published_at > Utc::now() {
            return Err(Fault::validation(format!(
                "published_at for '{}' is in the future",
                id
            )));
        }

        let mut seen = std::collections::HashSet::new();
        let categories: Vec<String> = categories
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();
        if categories.is_empty() {
            return Err(Fault::validation(format!(
                "content '{}' must carry at least one category",
                id
            )));
        }

        Ok(Self {
            id,
            title,
            content_type,
            published_at,
            categories,
            source_provider: source_provider.into(),
            transformed_at: Utc::now(),
            metrics,
        })
    }
}

/// Durable form of [`CanonicalContent`]: score, hash, and version
/// attached. Constructed only by the bulk persistence gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedContent {
    pub content: CanonicalContent,
    /// Non-negative relevance score, rounded to 2 decimals.
    pub score: f64,
    /// Canonicalization-stable digest over content fields.
    pub content_hash: String,
    /// Monotonic: 1 for new items, prior + 1 on update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How an item changed relative to its persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Append-only audit row for one mutated item. Never updated or
/// deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChangeLog {
    pub id: Uuid,
    pub content_id: String,
    pub change_type: ChangeType,
    pub content_hash: String,
    pub batch_id: Uuid,
    pub changed_at: DateTime<Utc>,
}

impl ContentChangeLog {
    pub fn new(
        content_id: impl Into<String>,
        change_type: ChangeType,
        content_hash: impl Into<String>,
        batch_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_id: content_id.into(),
            change_type,
            content_hash: content_hash.into(),
            batch_id,
            changed_at: Utc::now(),
        }
    }
}

/// Dirty-bit notification published after a synchronization run.
///
/// Carries only the changed ids plus correlation metadata. Consumers
/// must re-fetch truth from durable storage; the type makes stale-data
/// reads impossible by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Ordered list of changed content ids (unchanged items excluded).
    pub content_ids: Vec<String>,
    pub change_type: ChangeType,
    pub source_provider: String,
    pub processed_at: DateTime<Utc>,
    /// Correlation id of the synchronization run.
    pub batch_id: Uuid,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ChangeNotification {
    pub fn new(
        content_ids: Vec<String>,
        change_type: ChangeType,
        source_provider: impl Into<String>,
        batch_id: Uuid,
    ) -> Self {
        Self {
            content_ids,
            change_type,
            source_provider: source_provider.into(),
            processed_at: Utc::now(),
            batch_id,
            metadata: BTreeMap::new(),
        }
    }
}

/// Index-side projection of [`PersistedContent`].
///
/// Rebuilt wholesale on every (re)index — never patched — which makes
/// re-indexing after redelivery a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub content_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub categories: Vec<String>,
    pub score: f64,
    /// Unix seconds.
    pub published_at: i64,
    /// Denormalized searchable text (title + categories).
    pub search_text: String,
}

impl SearchDocument {
    /// Project a persisted record into its searchable form.
    pub fn from_persisted(record: &PersistedContent) -> Self {
        let content = &record.content;
        let search_text = format!("{} {}", content.title, content.categories.join(" "));
        Self {
            content_id: content.id.clone(),
            title: content.title.clone(),
            content_type: content.content_type,
            categories: content.categories.clone(),
            score: record.score,
            published_at: content.published_at.timestamp(),
            search_text,
        }
    }
}
