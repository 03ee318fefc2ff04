//! Search request and result types shared by the backends and the
//! orchestrator.

use serde::{Deserialize, Serialize};

use crate::models::{ContentType, SearchDocument};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sort key for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Score,
    PublishedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One search query as the orchestrator sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text keyword; `None` or blank means filter/sort-only.
    pub keyword: Option<String>,
    pub content_type: Option<ContentType>,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            keyword: None,
            content_type: None,
            sort_field: SortField::Score,
            sort_order: SortOrder::Descending,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            min_score: None,
            max_score: None,
        }
    }
}

impl SearchRequest {
    /// Keyword-bearing request shorthand.
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Default::default()
        }
    }

    /// Whether the request carries a usable keyword.
    pub fn has_keyword(&self) -> bool {
        self.keyword
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    /// Page number clamped to 1-based, page size clamped to the cap.
    pub fn normalized_paging(&self) -> (u32, u32) {
        let page = self.page.max(1);
        let page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }

    /// Offset of the first row for the normalized page.
    pub fn offset(&self) -> u32 {
        let (page, page_size) = self.normalized_paging();
        (page - 1) * page_size
    }

    /// Whether a document passes the structured filters (type and
    /// score range); the keyword is the backend's business.
    pub fn filters_accept(&self, doc: &SearchDocument) -> bool {
        if let Some(ct) = self.content_type {
            if doc.content_type != ct {
                return false;
            }
        }
        if let Some(min) = self.min_score {
            if doc.score < min {
                return false;
            }
        }
        if let Some(max) = self.max_score {
            if doc.score > max {
                return false;
            }
        }
        true
    }
}

/// Sort documents in place per the request, with a deterministic id
/// tie-break.
pub fn sort_documents(docs: &mut [SearchDocument], request: &SearchRequest) {
    docs.sort_by(|a, b| {
        let ordering = match request.sort_field {
            SortField::Score => a
                .score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal),
            SortField::PublishedAt => a.published_at.cmp(&b.published_at),
        };
        let ordering = match request.sort_order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        ordering.then_with(|| a.content_id.cmp(&b.content_id))
    });
}

/// One result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub categories: Vec<String>,
    pub score: f64,
    pub published_at: i64,
    /// Backend-reported relevance for the query, when meaningful.
    pub relevance: Option<f64>,
}

impl SearchHit {
    pub fn from_document(doc: &SearchDocument, relevance: Option<f64>) -> Self {
        Self {
            content_id: doc.content_id.clone(),
            title: doc.title.clone(),
            content_type: doc.content_type,
            categories: doc.categories.clone(),
            score: doc.score,
            published_at: doc.published_at,
            relevance,
        }
    }
}

/// How the result was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Strategy that produced the result (or "Fallback").
    pub strategy: String,
    /// Backing data source (or "None").
    pub data_source: String,
    /// Total orchestration wall-clock time; overwritten by the
    /// orchestrator on success.
    pub latency_ms: u64,
    pub cache_hit: bool,
}

/// Unified search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub items: Vec<SearchHit>,
    pub total_items: u64,
    pub page: u32,
    pub page_size: u32,
    pub metadata: SearchMetadata,
}

impl SearchResult {
    /// The typed empty result returned when every strategy failed.
    pub fn empty_fallback(request: &SearchRequest) -> Self {
        let (page, page_size) = request.normalized_paging();
        Self {
            items: Vec::new(),
            total_items: 0,
            page,
            page_size,
            metadata: SearchMetadata {
                strategy: "Fallback".to_string(),
                data_source: "None".to_string(),
                latency_ms: 0,
                cache_hit: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, score: f64, published_at: i64, ct: ContentType) -> SearchDocument {
        SearchDocument {
            content_id: id.to_string(),
            title: format!("Title {}", id),
            content_type: ct,
            categories: vec!["rust".into()],
            score,
            published_at,
            search_text: format!("Title {} rust", id),
        }
    }

    #[test]
    fn test_has_keyword_blank_is_false() {
        assert!(!SearchRequest::default().has_keyword());
        assert!(!SearchRequest::keyword("   ").has_keyword());
        assert!(SearchRequest::keyword("rust").has_keyword());
    }

    #[test]
    fn test_paging_normalization() {
        let request = SearchRequest {
            page: 0,
            page_size: 1000,
            ..Default::default()
        };
        assert_eq!(request.normalized_paging(), (1, MAX_PAGE_SIZE));
        assert_eq!(request.offset(), 0);

        let request = SearchRequest {
            page: 3,
            page_size: 10,
            ..Default::default()
        };
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn test_filters_accept() {
        let request = SearchRequest {
            content_type: Some(ContentType::Video),
            min_score: Some(2.0),
            max_score: Some(8.0),
            ..Default::default()
        };
        assert!(request.filters_accept(&doc("a", 5.0, 0, ContentType::Video)));
        assert!(!request.filters_accept(&doc("a", 5.0, 0, ContentType::Article)));
        assert!(!request.filters_accept(&doc("a", 1.0, 0, ContentType::Video)));
        assert!(!request.filters_accept(&doc("a", 9.0, 0, ContentType::Video)));
    }

    #[test]
    fn test_sort_with_deterministic_tie_break() {
        let mut docs = vec![
            doc("b", 5.0, 10, ContentType::Video),
            doc("a", 5.0, 20, ContentType::Video),
            doc("c", 7.0, 5, ContentType::Video),
        ];
        sort_documents(&mut docs, &SearchRequest::default());
        let ids: Vec<&str> = docs.iter().map(|d| d.content_id.as_str()).collect();
        // Score descending, id ascending on ties.
        assert_eq!(ids, vec!["c", "a", "b"]);

        let request = SearchRequest {
            sort_field: SortField::PublishedAt,
            sort_order: SortOrder::Ascending,
            ..Default::default()
        };
        sort_documents(&mut docs, &request);
        let ids: Vec<&str> = docs.iter().map(|d| d.content_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_empty_fallback_shape() {
        let result = SearchResult::empty_fallback(&SearchRequest::keyword("rust"));
        assert_eq!(result.total_items, 0);
        assert!(result.items.is_empty());
        assert_eq!(result.metadata.strategy, "Fallback");
        assert_eq!(result.metadata.data_source, "None");
    }
}
