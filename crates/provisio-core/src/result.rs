//! Parse run outcome: status, warnings, metadata and summary statistics.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome of a parse run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Success,
    /// Usable tree with recorded warnings.
    Partial,
    /// No usable tree; callers must not treat the nodes as authoritative.
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifiers for per-item problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    BlockNotLocated,
    DuplicatePath,
    OffsetMismatch,
    ChildOutsideParent,
    DuplicateOrderIndex,
    NonContiguousOrder,
    SiblingOverlap,
    NoStructuralNodes,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockNotLocated => "block_not_located",
            Self::DuplicatePath => "duplicate_path",
            Self::OffsetMismatch => "offset_mismatch",
            Self::ChildOutsideParent => "child_outside_parent",
            Self::DuplicateOrderIndex => "duplicate_order_index",
            Self::NonContiguousOrder => "non_contiguous_order",
            Self::SiblingOverlap => "sibling_overlap",
            Self::NoStructuralNodes => "no_structural_nodes",
        }
    }

    /// Violations that leave no usable tree.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicatePath | Self::NoStructuralNodes)
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    pub path: Option<String>,
    pub offset: Option<usize>,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            offset: None,
        }
    }

    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Status implied by a warning list.
pub fn status_for(warnings: &[Warning]) -> ParseStatus {
    if warnings.iter().any(|w| w.code.is_fatal()) {
        ParseStatus::Failed
    } else if warnings.is_empty() {
        ParseStatus::Success
    } else {
        ParseStatus::Partial
    }
}

/// Text that could not be attributed to any structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnparsedSegment {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Regulation,
    Directive,
    Decision,
    Act,
    Law,
    Decree,
    Order,
    Ordinance,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 8] = [
        Self::Regulation,
        Self::Directive,
        Self::Decision,
        Self::Act,
        Self::Law,
        Self::Decree,
        Self::Order,
        Self::Ordinance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulation => "regulation",
            Self::Directive => "directive",
            Self::Decision => "decision",
            Self::Act => "act",
            Self::Law => "law",
            Self::Decree => "decree",
            Self::Order => "order",
            Self::Ordinance => "ordinance",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub instrument_kind: Option<InstrumentKind>,
    pub issue_number: Option<String>,
    pub item_number: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub effective_date: Option<NaiveDate>,
}

/// Parser id, version and config fingerprint: together the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParserIdentity {
    pub parser_id: String,
    pub version: String,
    pub config_fingerprint: String,
}

/// Union of content spans, in characters and as a share of the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub chars: usize,
    pub percent: f64,
}

impl Coverage {
    pub fn new(chars: usize, total_chars: usize) -> Self {
        let percent = if total_chars == 0 {
            0.0
        } else {
            (chars as f64 / total_chars as f64 * 10_000.0).round() / 100.0
        };
        Self { chars, percent }
    }
}

/// One parsing attempt over one document version. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub id: String,
    pub document_id: String,
    pub parser: ParserIdentity,
    pub status: ParseStatus,
    pub warnings: Vec<Warning>,
    pub unparsed: Vec<UnparsedSegment>,
    pub metadata: DocumentMetadata,
    /// Normalized text length in bytes.
    pub text_length: usize,
    pub char_count: usize,
    pub content_hash: String,
    pub node_count: usize,
    pub max_depth: u32,
    pub type_counts: BTreeMap<String, usize>,
    pub coverage: Coverage,
}

impl ParseResult {
    pub fn is_usable(&self) -> bool {
        self.status != ParseStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_warnings() {
        assert_eq!(status_for(&[]), ParseStatus::Success);
        let soft = Warning::new(WarningCode::SiblingOverlap, "overlap");
        assert_eq!(status_for(std::slice::from_ref(&soft)), ParseStatus::Partial);
        let fatal = Warning::new(WarningCode::DuplicatePath, "dup").at_path("/article:1");
        assert_eq!(status_for(&[soft, fatal]), ParseStatus::Failed);
    }

    #[test]
    fn coverage_percent_rounds() {
        let c = Coverage::new(1, 3);
        assert_eq!(c.percent, 33.33);
        assert_eq!(Coverage::new(0, 0).percent, 0.0);
    }

    #[test]
    fn warning_code_names() {
        assert_eq!(WarningCode::NoStructuralNodes.as_str(), "no_structural_nodes");
        let json = serde_json::to_string(&WarningCode::OffsetMismatch).unwrap();
        assert_eq!(json, "\"offset_mismatch\"");
    }
}
