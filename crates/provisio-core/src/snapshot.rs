//! Consolidated snapshots, provenance spans and validity windows.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::node::NodeType;
use crate::result::Coverage;

/// How a span of consolidated text came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Original,
    Inserted,
    Modified,
    Deleted,
    Renumbered,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Inserted => "inserted",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renumbered => "renumbered",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    Complete,
    /// Some directives could not be applied.
    Partial,
    Failed,
}

impl ComputationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ComputationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribution of one contiguous range of a snapshot's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSpan {
    pub node_path: String,
    pub start: usize,
    pub end: usize,
    pub source_document_id: String,
    /// Source node path and offsets, set when the text is copied verbatim.
    pub source_path: Option<String>,
    pub source_start: Option<usize>,
    pub source_end: Option<usize>,
    pub change: ChangeKind,
    pub amended_by: Option<String>,
    pub previous_text: Option<String>,
}

/// Audit record of a node removed from the consolidated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub path: String,
    pub node_type: NodeType,
    pub label: String,
    pub previous_text: String,
    pub source_document_id: String,
    pub deleted_by: String,
}

/// One point-in-time merged document state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedSnapshot {
    pub id: String,
    pub document_id: String,
    pub effective_date: NaiveDate,
    /// Inclusive start of the validity window.
    pub valid_from: NaiveDate,
    /// Exclusive end of the validity window; `None` while open.
    pub valid_until: Option<NaiveDate>,
    pub text: String,
    pub content_hash: String,
    pub tree_hash: String,
    /// Base document first, then amendments in application order.
    pub contributing_documents: Vec<String>,
    pub node_count: usize,
    pub article_count: usize,
    pub tombstone_count: usize,
    pub coverage: Coverage,
    pub status: ComputationStatus,
    pub fingerprint: String,
}

impl ConsolidatedSnapshot {
    pub fn is_open(&self) -> bool {
        self.valid_until.is_none()
    }

    pub fn window(&self) -> SnapshotWindow {
        SnapshotWindow {
            id: self.id.clone(),
            effective_date: self.effective_date,
            valid_until: self.valid_until,
        }
    }
}

/// Validity window of a stored, current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWindow {
    pub id: String,
    pub effective_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
}

/// Window changes to apply atomically alongside a new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPlan {
    /// End of the new snapshot's window.
    pub valid_until: Option<NaiveDate>,
    /// Existing snapshots whose window closes at the given date.
    pub truncate: Vec<(String, NaiveDate)>,
    /// Existing snapshots replaced outright (same effective date).
    pub supersede: Vec<String>,
}
