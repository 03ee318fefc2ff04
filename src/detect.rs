//! Hash-based change detection.
//!
//! Classifies incoming items as new, updated, or unchanged by comparing
//! the canonical content hash against persisted state. Deletion (an id
//! present in storage but absent from the incoming set) is explicitly
//! out of scope here; the pipeline runs a separate deletion pass.

use std::collections::HashMap;

use serde::Serialize;

use crate::hash::content_hash;
use crate::models::{CanonicalContent, PersistedContent};

/// Classification of a single incoming item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Updated,
    Unchanged,
}

/// An incoming item scheduled for update, with the version it replaces.
#[derive(Debug, Clone)]
pub struct UpdatedItem {
    pub content: CanonicalContent,
    pub content_hash: String,
    /// Version of the persisted record being superseded.
    pub prior_version: i64,
}

/// A new item never seen by storage before.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub content: CanonicalContent,
    pub content_hash: String,
}

/// Partition of one batch into new / updated / unchanged items.
#[derive(Debug, Default)]
pub struct ChangeDetectionResult {
    pub new_items: Vec<NewItem>,
    pub updated_items: Vec<UpdatedItem>,
    pub unchanged_items: Vec<CanonicalContent>,
}

impl ChangeDetectionResult {
    /// Total items examined.
    pub fn total_processed(&self) -> usize {
        self.new_items.len() + self.updated_items.len() + self.unchanged_items.len()
    }

    /// Items that require a write (new + updated).
    pub fn items_to_process(&self) -> usize {
        self.new_items.len() + self.updated_items.len()
    }

    /// Share of the batch that changed, in percent.
    pub fn change_percentage(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            0.0
        } else {
            (self.items_to_process() as f64 / total as f64) * 100.0
        }
    }

    /// Ids of all new items then all updated items, each class in
    /// incoming order.
    pub fn changed_ids(&self) -> Vec<String> {
        self.new_items
            .iter()
            .map(|item| item.content.id.clone())
            .chain(
                self.updated_items
                    .iter()
                    .map(|item| item.content.id.clone()),
            )
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.items_to_process() > 0
    }
}

/// Classify one incoming item against its persisted state, if any.
pub fn detect(incoming: &CanonicalContent, existing: Option<&PersistedContent>) -> ChangeKind {
    match existing {
        None => ChangeKind::New,
        Some(record) => {
            if record.content_hash == content_hash(incoming) {
                ChangeKind::Unchanged
            } else {
                ChangeKind::Updated
            }
        }
    }
}

/// Classify a full incoming batch against the full existing set.
///
/// Joins by content id. Existing records without an incoming
/// counterpart are ignored — that is the deletion pass's territory.
pub fn detect_batch(
    incoming: Vec<CanonicalContent>,
    existing: &[PersistedContent],
) -> ChangeDetectionResult {
    let existing_by_id: HashMap<&str, &PersistedContent> = existing
        .iter()
        .map(|record| (record.content.id.as_str(), record))
        .collect();

    let mut result = ChangeDetectionResult::default();

    for item in incoming {
        let hash = content_hash(&item);
        match existing_by_id.get(item.id.as_str()) {
            None => result.new_items.push(NewItem {
                content: item,
                content_hash: hash,
            }),
            Some(record) if record.content_hash == hash => {
                result.unchanged_items.push(item);
            }
            Some(record) => result.updated_items.push(UpdatedItem {
                content: item,
                content_hash: hash,
                prior_version: record.version,
            }),
        }
    }

    result
}
