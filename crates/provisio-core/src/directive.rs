//! Amendment directives extracted from amending documents.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    ReplaceArticle,
    ReplaceParagraph,
    InsertAfter,
    InsertBefore,
    Delete,
    Renumber,
    ReplaceWords,
    AddParagraph,
    AddPoint,
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplaceArticle => "replace_article",
            Self::ReplaceParagraph => "replace_paragraph",
            Self::InsertAfter => "insert_after",
            Self::InsertBefore => "insert_before",
            Self::Delete => "delete",
            Self::Renumber => "renumber",
            Self::ReplaceWords => "replace_words",
            Self::AddParagraph => "add_paragraph",
            Self::AddPoint => "add_point",
        }
    }

    /// Kinds that carry a replacement block.
    pub fn needs_text(&self) -> bool {
        matches!(
            self,
            Self::ReplaceArticle
                | Self::ReplaceParagraph
                | Self::InsertAfter
                | Self::InsertBefore
                | Self::AddParagraph
                | Self::AddPoint
        )
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence tier, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
    ManualOverride,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::ManualOverride => "manual_override",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSubstitution {
    pub search: String,
    /// Empty for word deletions.
    pub replace: String,
}

/// One parsed instruction from an amending document.
///
/// Extracted fields are never rewritten; review only sets `reviewed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentDirective {
    pub source_document_id: String,
    pub source_start: usize,
    pub source_end: usize,
    pub kind: DirectiveKind,
    pub target_path: String,
    pub new_text: Option<String>,
    pub words: Option<WordSubstitution>,
    pub new_path: Option<String>,
    pub confidence: Confidence,
    #[serde(default)]
    pub reviewed: bool,
}

impl AmendmentDirective {
    pub fn mark_reviewed(&mut self) {
        self.reviewed = true;
    }

    /// Whether the directive may be applied under a confidence floor.
    pub fn is_admissible(&self, min_confidence: Confidence) -> bool {
        self.reviewed || self.confidence >= min_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(confidence: Confidence) -> AmendmentDirective {
        AmendmentDirective {
            source_document_id: "amending".into(),
            source_start: 0,
            source_end: 10,
            kind: DirectiveKind::Delete,
            target_path: "/article:2".into(),
            new_text: None,
            words: None,
            new_path: None,
            confidence,
            reviewed: false,
        }
    }

    #[test]
    fn confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::High < Confidence::ManualOverride);
    }

    #[test]
    fn review_admits_low_confidence_without_changing_fields() {
        let mut d = directive(Confidence::Low);
        assert!(!d.is_admissible(Confidence::Medium));
        let before = d.clone();
        d.mark_reviewed();
        assert!(d.is_admissible(Confidence::Medium));
        assert_eq!(d.confidence, before.confidence);
        assert_eq!(d.target_path, before.target_path);
    }

    #[test]
    fn manual_override_passes_any_floor() {
        assert!(directive(Confidence::ManualOverride).is_admissible(Confidence::High));
    }
}
