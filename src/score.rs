//! Relevance scoring engine.
//!
//! The score is a pure function of the content and the evaluation
//! instant:
//!
//! ```text
//! final = base × type_coefficient + freshness + engagement
//! ```
//!
//! Malformed metrics (variant disagreeing with the content type)
//! degrade to a zero score with a warning — scoring never aborts a
//! synchronization run.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{CanonicalContent, ContentMetrics, ContentType};

const VIDEO_COEFFICIENT: f64 = 1.5;
const ARTICLE_COEFFICIENT: f64 = 1.0;

/// Compute the relevance score for a content item at `now`.
///
/// Always non-negative and rounded to exactly 2 decimals.
pub fn calculate_score(content: &CanonicalContent, now: DateTime<Utc>) -> f64 {
    if !content.metrics.matches_type(content.content_type) {
        warn!(
            content_id = %content.id,
            content_type = content.content_type.as_str(),
            "metrics variant does not match content type; scoring as 0.0"
        );
        return 0.0;
    }

    let base = base_score(&content.metrics);
    let coefficient = match content.content_type {
        ContentType::Video => VIDEO_COEFFICIENT,
        ContentType::Article => ARTICLE_COEFFICIENT,
    };
    let freshness = freshness_score(content.published_at, now);
    let engagement = engagement_score(&content.metrics);

    let total = base * coefficient + freshness + engagement;
    round2(total.max(0.0))
}

fn base_score(metrics: &ContentMetrics) -> f64 {
    match metrics {
        ContentMetrics::Video { views, likes } => *views as f64 / 1000.0 + *likes as f64 / 100.0,
        ContentMetrics::Article {
            reading_time_minutes,
            reactions,
        } => *reading_time_minutes as f64 + *reactions as f64 / 50.0,
    }
}

fn freshness_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - published_at).num_days();
    if age_days <= 7 {
        5.0
    } else if age_days <= 30 {
        3.0
    } else if age_days <= 90 {
        1.0
    } else {
        0.0
    }
}

fn engagement_score(metrics: &ContentMetrics) -> f64 {
    match metrics {
        ContentMetrics::Video { views, likes } => {
            if *views == 0 {
                0.0
            } else {
                (*likes as f64 / *views as f64) * 10.0
            }
        }
        ContentMetrics::Article {
            reading_time_minutes,
            reactions,
        } => {
            if *reading_time_minutes == 0 {
                0.0
            } else {
                (*reactions as f64 / *reading_time_minutes as f64) * 5.0
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
