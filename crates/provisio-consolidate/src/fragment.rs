//! Replacement text re-parsed into units below a scope path.

use std::collections::{HashMap, HashSet};

use provisio_core::path::{Level, is_descendant, last_segment};
use provisio_core::{NodeType, ParserConfig, ProvisionNode};
use provisio_parse::{parse_fragment, segment};

/// One numbered unit found in a replacement block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Unit {
    pub path: String,
    pub node_type: NodeType,
    pub label: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fragment {
    /// Text before the first unit, trimmed. The whole text when there is
    /// no unit at all.
    pub lead: String,
    /// Units in text order, first occurrence of each path only.
    pub units: Vec<Unit>,
}

impl Fragment {
    pub fn parse(text: &str, scope: &str, config: &ParserConfig) -> Self {
        let nodes = parse_fragment(text, scope, config);
        let by_path: HashMap<&str, &ProvisionNode> =
            nodes.iter().map(|n| (n.path.as_str(), n)).collect();
        let segments = segment(text, &nodes);
        let lead = match segments.first() {
            Some(first) => first.separator.trim().to_string(),
            None => text.trim().to_string(),
        };

        let mut seen = HashSet::new();
        let units = segments
            .into_iter()
            .filter(|s| seen.insert(s.path.clone()))
            .filter_map(|s| {
                let node = by_path.get(s.path.as_str())?;
                Some(Unit {
                    node_type: node.node_type,
                    label: node.label.clone(),
                    body: s.body,
                    path: s.path,
                })
            })
            .collect();
        Self { lead, units }
    }

    pub fn position(&self, path: &str) -> Option<usize> {
        self.units.iter().position(|u| u.path == path)
    }

    /// Units strictly below `path`, in text order.
    pub fn below<'f>(&'f self, path: &'f str) -> impl Iterator<Item = &'f Unit> + 'f {
        self.units.iter().filter(move |u| is_descendant(&u.path, path))
    }

    /// First unit directly below `scope`.
    pub fn first_child_of(&self, scope: &str) -> Option<&Unit> {
        self.units
            .iter()
            .find(|u| provisio_core::parent_path(&u.path).as_deref() == Some(scope))
    }
}

/// Label for a unit created without one of its own.
pub(crate) fn default_label(path: &str) -> String {
    let Some(seg) = last_segment(path) else {
        return "Document".to_string();
    };
    match seg.level {
        Level::Article => format!("Article {}", seg.id),
        Level::Annex => format!("Annex {}", seg.id),
        Level::Part => format!("Part {}", seg.id),
        Level::Chapter => format!("Chapter {}", seg.id),
        Level::Title => format!("Title {}", seg.id),
        Level::Table => format!("Table {}", seg.id),
        Level::List => format!("List {}", seg.id),
        Level::Paragraph | Level::Point | Level::Subpoint => format!("({})", seg.id),
        Level::Bullet => "-".to_string(),
    }
}

/// Replace the first whole-token occurrence of `old` on the first line of
/// `text` with `new`, ignoring ASCII case.
pub(crate) fn rewrite_marker(text: &str, old: &str, new: &str) -> String {
    let line_end = text.find('\n').unwrap_or(text.len());
    let haystack = text[..line_end].to_ascii_lowercase();
    let needle = old.to_ascii_lowercase();
    if needle.is_empty() {
        return text.to_string();
    }
    let is_token_char = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    for (pos, _) in haystack.match_indices(&needle) {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + needle.len()..].chars().next();
        if !is_token_char(before) && !is_token_char(after) {
            return format!("{}{}{}", &text[..pos], new, &text[pos + needle.len()..]);
        }
    }
    text.to_string()
}
