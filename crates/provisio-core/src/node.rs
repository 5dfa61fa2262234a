//! Structural units of a parsed document.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::Level;

/// Kind of structural unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Document,
    Part,
    Chapter,
    Title,
    Annex,
    Article,
    Paragraph,
    Point,
    Subpoint,
    Bullet,
    Table,
    List,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Part => "part",
            Self::Chapter => "chapter",
            Self::Title => "title",
            Self::Annex => "annex",
            Self::Article => "article",
            Self::Paragraph => "paragraph",
            Self::Point => "point",
            Self::Subpoint => "subpoint",
            Self::Bullet => "bullet",
            Self::Table => "table",
            Self::List => "list",
        }
    }

    /// Pure grouping nodes. Their spans may overlap descendants and they
    /// carry no raw text of their own.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Document | Self::Part | Self::Chapter | Self::Title)
    }

    pub fn from_level(level: Level) -> Self {
        match level {
            Level::Part => Self::Part,
            Level::Chapter => Self::Chapter,
            Level::Title => Self::Title,
            Level::Annex => Self::Annex,
            Level::Article => Self::Article,
            Level::Paragraph => Self::Paragraph,
            Level::Point => Self::Point,
            Level::Subpoint => Self::Subpoint,
            Level::Bullet => Self::Bullet,
            Level::Table => Self::Table,
            Level::List => Self::List,
        }
    }

    /// Path level of this node type; the root has none.
    pub fn level(&self) -> Option<Level> {
        Some(match self {
            Self::Document => return None,
            Self::Part => Level::Part,
            Self::Chapter => Level::Chapter,
            Self::Title => Level::Title,
            Self::Annex => Level::Annex,
            Self::Article => Level::Article,
            Self::Paragraph => Level::Paragraph,
            Self::Point => Level::Point,
            Self::Subpoint => Level::Subpoint,
            Self::Bullet => Level::Bullet,
            Self::Table => Level::Table,
            Self::List => Level::List,
        })
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural unit with byte offsets into the owning normalized text.
///
/// Offsets are UTF-8 byte offsets and always fall on char boundaries, so
/// `&text[start..end]` is well-formed. For content nodes that slice equals
/// `raw_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionNode {
    pub node_type: NodeType,
    pub path: String,
    /// `None` only for the document root.
    pub parent_path: Option<String>,
    pub label: String,
    /// Position among siblings sharing `parent_path`, from 0.
    pub order_index: u32,
    pub depth: u32,
    pub start: usize,
    pub end: usize,
    pub is_container: bool,
    pub raw_text: Option<String>,
}

impl ProvisionNode {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_content(&self) -> bool {
        !self.is_container
    }
}
