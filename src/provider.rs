//! Content provider collaborators.
//!
//! A [`ContentProvider`] is responsible for talking to one external
//! source and returning canonical content. Provider-specific parsing
//! and HTTP live behind this trait — the pipeline only ever sees the
//! "fetch canonical content list" operation. Errors are classified
//! transient (worth retrying) or permanent.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::CanonicalContent;

/// Provider failure classification.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The source is temporarily unreachable; a later run may succeed.
    #[error("transient provider error from {provider}: {message}")]
    Transient { provider: String, message: String },

    /// The source rejected the request or returned garbage; retrying
    /// without intervention will not help.
    #[error("permanent provider error from {provider}: {message}")]
    Permanent { provider: String, message: String },

    /// The fetch was cancelled before completion.
    #[error("fetch from {0} cancelled")]
    Cancelled(String),
}

impl ProviderError {
    pub fn transient(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Permanent {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Cancelled(_))
    }
}

/// One page of canonical content from a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderPage {
    pub items: Vec<CanonicalContent>,
    /// Items the source returned but canonical validation rejected.
    /// These count toward the run's failed items.
    pub skipped: u64,
    /// Total items the source reports, when known.
    pub total_available: Option<u64>,
    /// Whether more pages exist beyond this one.
    pub has_more: bool,
}

impl ProviderPage {
    pub fn complete(items: Vec<CanonicalContent>) -> Self {
        Self {
            items,
            skipped: 0,
            total_available: None,
            has_more: false,
        }
    }

    pub fn with_skipped(items: Vec<CanonicalContent>, skipped: u64) -> Self {
        Self {
            skipped,
            ..Self::complete(items)
        }
    }
}

/// A source of canonical content for the synchronization pipeline.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Provider instance name, used in batch records and logs.
    fn name(&self) -> &str;

    /// Fetch the current canonical content list.
    ///
    /// Implementations should observe `cancel` at their own I/O
    /// boundaries and return [`ProviderError::Cancelled`] promptly.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<ProviderPage, ProviderError>;
}

/// Raw fixture entry as it appears in a provider JSON file.
#[derive(Debug, Deserialize)]
struct FixtureItem {
    id: String,
    title: String,
    content_type: crate::models::ContentType,
    published_at: chrono::DateTime<chrono::Utc>,
    categories: Vec<String>,
    metrics: crate::models::ContentMetrics,
}

/// File-backed provider for local runs and tests.
///
/// Reads a JSON array of canonical items from disk. Stands in for the
/// real provider clients, which are external collaborators.
pub struct FixtureProvider {
    name: String,
    path: std::path::PathBuf,
}

impl FixtureProvider {
    pub fn new(name: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl ContentProvider for FixtureProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<ProviderPage, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled(self.name.clone()));
        }

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ProviderError::transient(&self.name, e))?;
        let entries: Vec<FixtureItem> = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::permanent(&self.name, e))?;

        let mut items = Vec::with_capacity(entries.len());
        let mut skipped = 0u64;
        for entry in entries {
            match CanonicalContent::new(
                entry.id,
                entry.title,
                entry.content_type,
                entry.published_at,
                entry.categories,
                &self.name,
                entry.metrics,
            ) {
                Ok(content) => items.push(content),
                Err(fault) => {
                    tracing::warn!(provider = %self.name, %fault, "skipping invalid fixture item");
                    skipped += 1;
                }
            }
        }

        Ok(ProviderPage::with_skipped(items, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_provider_reads_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(
            &path,
            r#"[
                {
                    "id": "v1",
                    "title": "Intro to lifetimes",
                    "content_type": "video",
                    "published_at": "2021-03-10T10:00:00Z",
                    "categories": ["rust"],
                    "metrics": { "kind": "video", "views": 5000, "likes": 200 }
                },
                {
                    "id": "",
                    "title": "Invalid, empty id",
                    "content_type": "article",
                    "published_at": "2021-02-01T10:00:00Z",
                    "categories": ["rust"],
                    "metrics": { "kind": "article", "reading_time_minutes": 5, "reactions": 3 }
                }
            ]"#,
        )
        .unwrap();

        let provider = FixtureProvider::new("fixture", &path);
        let page = provider.fetch(&CancellationToken::new()).await.unwrap();
        // The invalid entry is skipped, not fatal, and reported.
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.skipped, 1);
        assert_eq!(page.items[0].id, "v1");
        assert_eq!(page.items[0].source_provider, "fixture");
    }

    #[tokio::test]
    async fn test_missing_file_is_transient() {
        let provider = FixtureProvider::new("fixture", "/nonexistent/items.json");
        let err = provider
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_json_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, "not json").unwrap();

        let provider = FixtureProvider::new("fixture", &path);
        let err = provider
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Permanent { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let provider = FixtureProvider::new("fixture", "/irrelevant.json");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider.fetch(&cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
    }
}
