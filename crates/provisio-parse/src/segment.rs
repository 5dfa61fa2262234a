//! Split normalized text into per-node segments.
//!
//! Each node owns the text from its start to the start of the next node in
//! document order, minus trailing whitespace. The whitespace in between is
//! kept as the next segment's separator, so concatenating separators and
//! bodies reproduces the text up to trailing whitespace.

use provisio_core::ProvisionNode;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    pub path: String,
    /// Byte offset of `body` in the text.
    pub start: usize,
    /// Text between the previous segment's body and this one's.
    pub separator: String,
    /// The node's own text, excluding its descendants.
    pub body: String,
}

pub fn segment(text: &str, nodes: &[ProvisionNode]) -> Vec<TextSegment> {
    let mut ordered: Vec<&ProvisionNode> = nodes
        .iter()
        .filter(|n| n.start <= n.end && n.end <= text.len())
        .collect();
    ordered.sort_by_key(|n| (n.start, n.depth));

    let mut out = Vec::with_capacity(ordered.len());
    let mut prev_end = 0;
    for (i, node) in ordered.iter().enumerate() {
        let start = node.start.max(prev_end);
        let own_end = ordered
            .get(i + 1)
            .map_or(text.len(), |next| next.start)
            .max(start);
        let body = text[start..own_end].trim_end();
        out.push(TextSegment {
            path: node.path.clone(),
            start,
            separator: text[prev_end..start].to_string(),
            body: body.to_string(),
        });
        prev_end = start + body.len();
    }
    out
}

/// Reassemble segments into text.
pub fn join(segments: &[TextSegment]) -> String {
    let mut out = String::new();
    for s in segments {
        out.push_str(&s.separator);
        out.push_str(&s.body);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build_tree;
    use provisio_core::ParserConfig;

    fn segments(text: &str) -> Vec<TextSegment> {
        let blocks: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        let tree = build_tree(text, &blocks, &ParserConfig::default());
        segment(text, &tree.nodes)
    }

    #[test]
    fn bodies_exclude_children() {
        let text = "Preamble.\n\nArticle 1\n\n(1) First.\n\n(2) Second.\n\nArticle 2\n\nOther.";
        let s = segments(text);
        let view: Vec<(&str, &str, &str)> = s
            .iter()
            .map(|s| (s.path.as_str(), s.separator.as_str(), s.body.as_str()))
            .collect();
        assert_eq!(
            view,
            vec![
                ("/", "", "Preamble."),
                ("/article:1", "\n\n", "Article 1"),
                ("/article:1/paragraph:1", "\n\n", "(1) First."),
                ("/article:1/paragraph:2", "\n\n", "(2) Second."),
                ("/article:2", "\n\n", "Article 2\n\nOther."),
            ]
        );
        assert_eq!(join(&s), text);
    }

    #[test]
    fn document_starting_with_article() {
        let text = "Article 1.\n\nRate is 20%.";
        let s = segments(text);
        assert_eq!(s[0].body, "");
        assert_eq!(s[1].body, text);
        assert_eq!(join(&s), text);
    }
}
