//! Hierarchical provision paths.
//!
//! A path such as `/article:28/paragraph:1/point:a` is derived only from
//! numbering tokens, never from node content, so it stays stable when an
//! amendment rewrites a paragraph's wording but not its number. Segments are
//! always rendered in the fixed [`Level`] order; this construction rule is
//! the one surface format other systems depend on and must not change for
//! unchanged numbering.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sort_key::{provision_key, roman_value};

/// Path of the document root.
pub const ROOT_PATH: &str = "/";

/// Numbering level of a path segment, in fixed hierarchical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
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

impl Level {
    pub const ALL: [Level; 11] = [
        Level::Part,
        Level::Chapter,
        Level::Title,
        Level::Annex,
        Level::Article,
        Level::Paragraph,
        Level::Point,
        Level::Subpoint,
        Level::Bullet,
        Level::Table,
        Level::List,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
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

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == s)
    }

    /// Grouping levels whose heading opens a container node.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Part | Self::Chapter | Self::Title)
    }

    /// Levels whose identifiers may be roman numerals.
    pub fn uses_roman(self) -> bool {
        matches!(
            self,
            Self::Part | Self::Chapter | Self::Title | Self::Annex | Self::Subpoint
        )
    }

    /// Rank used when siblings of different levels are compared.
    ///
    /// Unnumbered-preamble content (recitals, lists) precedes articles and
    /// annexes close the document.
    fn sort_rank(self) -> u8 {
        match self {
            Self::Part => 0,
            Self::Chapter => 1,
            Self::Title => 2,
            Self::Paragraph => 3,
            Self::Point => 4,
            Self::Subpoint => 5,
            Self::Bullet => 6,
            Self::List => 7,
            Self::Table => 8,
            Self::Article => 9,
            Self::Annex => 10,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `level:id` segment of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub level: Level,
    pub id: &'a str,
}

/// Render a map of level identifiers as a canonical path.
///
/// The map's key order is the fixed hierarchical order, so callers may
/// insert levels in any order. An empty map yields the root path.
pub fn build_path(levels: &BTreeMap<Level, String>) -> String {
    if levels.is_empty() {
        return ROOT_PATH.to_string();
    }
    let mut out = String::new();
    for (level, id) in levels {
        out.push('/');
        out.push_str(level.as_str());
        out.push(':');
        out.push_str(id);
    }
    out
}

/// Append one segment to a path.
pub fn child_path(parent: &str, level: Level, id: &str) -> String {
    let base = if parent == ROOT_PATH { "" } else { parent };
    format!("{base}/{}:{id}", level.as_str())
}

/// Split a path into its segments. Returns `None` for malformed paths.
pub fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    if path == ROOT_PATH {
        return Some(Vec::new());
    }
    let rest = path.strip_prefix('/')?;
    rest.split('/')
        .map(|seg| {
            let (level, id) = seg.split_once(':')?;
            if id.is_empty() {
                return None;
            }
            Some(Segment {
                level: Level::parse(level)?,
                id,
            })
        })
        .collect()
}

/// Collect a path's segments back into a level map.
pub fn path_levels(path: &str) -> Option<BTreeMap<Level, String>> {
    let segments = parse_path(path)?;
    Some(
        segments
            .into_iter()
            .map(|s| (s.level, s.id.to_string()))
            .collect(),
    )
}

/// Path with its last segment removed; the root has no parent.
pub fn parent_path(path: &str) -> Option<String> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT_PATH.to_string()),
        Some(i) => Some(path[..i].to_string()),
        None => None,
    }
}

/// Last segment of a path, if any.
pub fn last_segment(path: &str) -> Option<Segment<'_>> {
    parse_path(path)?.pop()
}

/// Replace the identifier of the last segment.
pub fn with_last_id(path: &str, id: &str) -> Option<String> {
    let last = last_segment(path)?;
    let parent = parent_path(path)?;
    Some(child_path(&parent, last.level, id))
}

/// Number of segments.
pub fn depth(path: &str) -> u32 {
    parse_path(path).map(|s| s.len() as u32).unwrap_or(0)
}

/// True if `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT_PATH {
        return path != ROOT_PATH;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Hierarchical comparator: per segment, level rank, then numeric value,
/// then alphabetic suffix; a path sorts before its own descendants.
///
/// Gives "12" < "12a" < "13" and "IX" < "X" on roman levels.
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    match (parse_path(a), parse_path(b)) {
        (Some(sa), Some(sb)) => {
            for (x, y) in sa.iter().zip(sb.iter()) {
                let ord = compare_segments(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            sa.len().cmp(&sb.len()).then_with(|| a.cmp(b))
        }
        // Malformed paths sort after well-formed ones, then bytewise.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_segments(a: &Segment<'_>, b: &Segment<'_>) -> Ordering {
    a.level
        .sort_rank()
        .cmp(&b.level.sort_rank())
        .then_with(|| segment_key(a).cmp(&segment_key(b)))
        .then_with(|| a.id.cmp(b.id))
}

fn segment_key(seg: &Segment<'_>) -> [u32; 3] {
    if seg.level.uses_roman()
        && let Some(v) = roman_value(seg.id)
    {
        return [v, 0, 0];
    }
    provision_key(seg.id)
}
