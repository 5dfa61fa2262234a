//! Tree parser: a fold over text blocks in document order.
//!
//! All positional state (open units, per-parent counters, the running
//! cursor) lives in [`ParserState`], which each step consumes and returns.
//! Nothing is shared between runs, so parsing is reentrant.

use std::collections::{BTreeMap, HashMap};

use provisio_core::path::{self, Level, ROOT_PATH, build_path, child_path};
use provisio_core::{
    NodeType, ParserConfig, ProvisionNode, UnparsedSegment, Warning, WarningCode,
};
use tracing::debug;

use crate::locate::{Strategy, locate};
use crate::markers::{
    ArticleMark, ContainerMark, PointMark, PointStyle, contains_marker, is_table_row,
    match_article, match_container, match_paragraph, match_point, match_subpoint, next_letter,
};

/// Nodes, warnings and unparsed segments produced by one fold.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub nodes: Vec<ProvisionNode>,
    pub warnings: Vec<Warning>,
    pub unparsed: Vec<UnparsedSegment>,
}

/// A unit that is still accepting blocks.
#[derive(Debug, Clone)]
struct Open {
    /// Index into `nodes`; `None` for scope entries seeded by a fragment
    /// parse, which are never emitted.
    idx: Option<usize>,
    level: Level,
    id: String,
    path: String,
    style: Option<PointStyle>,
}

/// Accumulator threaded through the fold.
#[derive(Debug, Clone)]
pub struct ParserState<'a> {
    text: &'a str,
    config: &'a ParserConfig,
    cursor: usize,
    stack: Vec<Open>,
    nodes: Vec<ProvisionNode>,
    order: HashMap<String, u32>,
    ordinals: HashMap<(String, Level), u32>,
    warnings: Vec<Warning>,
    unparsed: Vec<UnparsedSegment>,
    has_root: bool,
}

impl<'a> ParserState<'a> {
    /// State for a whole document, seeded with the root node.
    pub fn new(text: &'a str, config: &'a ParserConfig) -> Self {
        let mut state = Self::empty(text, config);
        state.nodes.push(ProvisionNode {
            node_type: NodeType::Document,
            path: ROOT_PATH.to_string(),
            parent_path: None,
            label: "Document".to_string(),
            order_index: 0,
            depth: 0,
            start: 0,
            end: text.len(),
            is_container: true,
            raw_text: None,
        });
        state.has_root = true;
        state
    }

    /// State for a replacement block that lives below `scope`.
    ///
    /// The scope's units are opened but never emitted, so a leading "(2)"
    /// in a paragraph replacement resolves to the target article's
    /// paragraph 2.
    pub fn scoped(text: &'a str, scope: &str, config: &'a ParserConfig) -> Self {
        let mut state = Self::empty(text, config);
        let mut current = ROOT_PATH.to_string();
        for segment in path::parse_path(scope).unwrap_or_default() {
            current = child_path(&current, segment.level, segment.id);
            state.stack.push(Open {
                idx: None,
                level: segment.level,
                id: segment.id.to_string(),
                path: current.clone(),
                style: None,
            });
        }
        state
    }

    fn empty(text: &'a str, config: &'a ParserConfig) -> Self {
        Self {
            text,
            config,
            cursor: 0,
            stack: Vec::new(),
            nodes: Vec::new(),
            order: HashMap::new(),
            ordinals: HashMap::new(),
            warnings: Vec::new(),
            unparsed: Vec::new(),
            has_root: false,
        }
    }

    /// Consume one block.
    pub fn step(mut self, block: &str) -> Self {
        let block = block.trim();
        if block.is_empty() {
            return self;
        }
        let row = self.config.detect_tables && is_table_row(block);
        if !row && self.stack.last().is_some_and(|o| o.level == Level::Table) {
            self.stack.pop();
        }

        let Some(found) = locate(self.text, block, self.cursor, self.config.locate_window) else {
            self.warnings.push(
                Warning::new(
                    WarningCode::BlockNotLocated,
                    format!("block not found in normalized text: {}", preview(block)),
                )
                .at_offset(self.cursor),
            );
            return self;
        };
        if found.strategy != Strategy::Exact {
            debug!(strategy = ?found.strategy, start = found.start, "block located by fallback");
        }
        self.cursor = self.cursor.max(found.end);
        self.classify(block, found.start, found.end, row);
        self
    }

    fn classify(&mut self, block: &str, start: usize, end: usize, row: bool) {
        if let Some(mark) = match_container(block) {
            if mark.level == Level::Annex {
                self.open_annex(mark, block, start, end);
            } else {
                self.open_container(mark, block, start, end);
            }
        } else if let Some(mark) = match_article(block) {
            self.open_article(mark, start, end);
        } else if let Some(id) = match_paragraph(block) {
            self.open_paragraph(id, start, end);
        } else if let Some(id) = match_subpoint(block)
            && self.reads_as_subpoint(&id)
        {
            self.open_subpoint(id, start, end);
        } else if let Some(mark) = match_point(block) {
            self.open_point(mark, start, end);
        } else if row {
            self.table_row(start, end);
        } else {
            self.loose(block, start, end);
        }
    }

    // ── Containers ──

    fn open_container(&mut self, mark: ContainerMark, block: &str, start: usize, end: usize) {
        let rank = nesting_rank(mark.level);
        self.stack
            .retain(|o| o.level.is_container() && nesting_rank(o.level) < rank);

        let id = mark.id.unwrap_or_default();
        let mut levels: BTreeMap<Level, String> = self
            .stack
            .iter()
            .map(|o| (o.level, o.id.clone()))
            .collect();
        levels.insert(mark.level, id.clone());
        let parent = self
            .stack
            .last()
            .map_or_else(|| ROOT_PATH.to_string(), |o| o.path.clone());
        self.emit(mark.level, id, build_path(&levels), parent, block.to_string(), start, end, None);
    }

    fn open_annex(&mut self, mark: ContainerMark, block: &str, start: usize, end: usize) {
        self.stack.clear();
        let id = match mark.id {
            Some(id) => id,
            None => self.next_ordinal(ROOT_PATH, Level::Annex),
        };
        let path = child_path(ROOT_PATH, Level::Annex, &id);
        self.emit(Level::Annex, id, path, ROOT_PATH.to_string(), block.to_string(), start, end, None);
    }

    // ── Content units ──

    fn open_article(&mut self, mark: ArticleMark, start: usize, end: usize) {
        self.stack
            .retain(|o| o.level.is_container() || o.level == Level::Annex);
        let parent = self.path_of(self.deepest(|o| o.level == Level::Annex));
        let path = child_path(&parent, Level::Article, &mark.id);
        let label = format!("Article {}", mark.id);
        self.emit(Level::Article, mark.id, path, parent, label, start, end, None);
    }

    fn open_paragraph(&mut self, id: String, start: usize, end: usize) {
        let anchor = self.deepest(|o| matches!(o.level, Level::Article | Level::Annex));
        self.close_below(anchor);
        let parent = self.path_of(anchor);
        let path = child_path(&parent, Level::Paragraph, &id);
        let label = format!("({id})");
        self.emit(Level::Paragraph, id, path, parent, label, start, end, None);
    }

    /// A roman numeral is a subpoint under an open point unless it is the
    /// letter that would come next ("(i)" after "(h)").
    fn reads_as_subpoint(&self, id: &str) -> bool {
        let Some(pos) = self.deepest(|o| o.level == Level::Point) else {
            return false;
        };
        let point = &self.stack[pos];
        match point.style {
            Some(PointStyle::Number) | Some(PointStyle::Bullet) => true,
            Some(PointStyle::Letter) | None => {
                let mut chars = id.chars();
                let single = chars.next().filter(|_| chars.next().is_none());
                single.is_none() || next_letter(&point.id) != single
            }
        }
    }

    fn open_subpoint(&mut self, id: String, start: usize, end: usize) {
        let anchor = self.deepest(|o| o.level == Level::Point);
        self.close_below(anchor);
        let parent = self.path_of(anchor);
        let path = child_path(&parent, Level::Subpoint, &id);
        let label = format!("({id})");
        self.emit(Level::Subpoint, id, path, parent, label, start, end, None);
    }

    fn open_point(&mut self, mark: PointMark, start: usize, end: usize) {
        match mark.style {
            PointStyle::Bullet => self.open_bullet(mark, start, end),
            PointStyle::Letter => {
                // A letter under a numbered point is one level down.
                if let Some(pos) = self.deepest(|o| o.level == Level::Point)
                    && self.stack[pos].style == Some(PointStyle::Number)
                {
                    self.close_below(Some(pos));
                    let parent = self.stack[pos].path.clone();
                    let id = mark.id.unwrap_or_default();
                    let path = child_path(&parent, Level::Subpoint, &id);
                    self.emit(Level::Subpoint, id, path, parent, mark.token, start, end, None);
                    return;
                }
                self.point_under_unit(mark, start, end);
            }
            PointStyle::Number => self.point_under_unit(mark, start, end),
        }
    }

    fn point_under_unit(&mut self, mark: PointMark, start: usize, end: usize) {
        let anchor = self.deepest(|o| {
            matches!(o.level, Level::Paragraph | Level::Article | Level::Annex)
        });
        self.close_below(anchor);
        let parent = self.path_of(anchor);
        let id = match mark.id {
            Some(id) => id,
            None => self.next_ordinal(&parent, Level::Point),
        };
        let path = child_path(&parent, Level::Point, &id);
        self.emit(Level::Point, id, path, parent, mark.token, start, end, Some(mark.style));
    }

    fn open_bullet(&mut self, mark: PointMark, start: usize, end: usize) {
        let deepest_content = self.deepest(|o| !o.level.is_container());
        let Some(pos) = deepest_content else {
            // Document-level bullets are grouped under a list node.
            let list_id = self.next_ordinal(ROOT_PATH, Level::List);
            let list_path = child_path(ROOT_PATH, Level::List, &list_id);
            let label = format!("List {list_id}");
            self.emit(Level::List, list_id, list_path, ROOT_PATH.to_string(), label, start, end, None);
            self.bullet_under(self.stack.len() - 1, mark, start, end);
            return;
        };

        match (self.stack[pos].level, self.stack[pos].style) {
            (Level::List, _) | (Level::Bullet, _) => {
                let list = self.deepest(|o| o.level == Level::List).unwrap_or(pos);
                self.bullet_under(list, mark, start, end);
            }
            (Level::Point, Some(PointStyle::Bullet)) => self.point_under_unit(mark, start, end),
            (Level::Point | Level::Subpoint, _) => {
                let anchor = self.deepest(|o| matches!(o.level, Level::Point | Level::Subpoint));
                self.bullet_under(anchor.unwrap_or(pos), mark, start, end);
            }
            _ => self.point_under_unit(mark, start, end),
        }
    }

    fn bullet_under(&mut self, pos: usize, mark: PointMark, start: usize, end: usize) {
        self.close_below(Some(pos));
        let parent = self.stack[pos].path.clone();
        let id = self.next_ordinal(&parent, Level::Bullet);
        let path = child_path(&parent, Level::Bullet, &id);
        self.emit(Level::Bullet, id, path, parent, mark.token, start, end, Some(PointStyle::Bullet));
    }

    fn table_row(&mut self, start: usize, end: usize) {
        if self.stack.last().is_some_and(|o| o.level == Level::Table) {
            self.extend_open(end);
            return;
        }
        let anchor = self.deepest(|o| !o.level.is_container());
        self.close_below(anchor);
        let parent = self.path_of(anchor);
        let id = self.next_ordinal(&parent, Level::Table);
        let path = child_path(&parent, Level::Table, &id);
        let label = format!("Table {id}");
        self.emit(Level::Table, id, path, parent, label, start, end, None);
    }

    fn loose(&mut self, block: &str, start: usize, end: usize) {
        // A document-level list ends at the first block that is not a bullet.
        if let Some(pos) = self.stack.iter().position(|o| o.level == Level::List) {
            self.stack.truncate(pos);
        }
        if self.stack.is_empty() {
            if block.chars().count() >= self.config.unparsed_min_chars && !contains_marker(block) {
                self.unparsed.push(UnparsedSegment {
                    start,
                    end,
                    text: self.text[start..end].to_string(),
                    reason: "no structural markers".to_string(),
                });
            }
            return;
        }
        self.extend_open(end);
    }

    // ── Bookkeeping ──

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        level: Level,
        id: String,
        path: String,
        parent: String,
        label: String,
        start: usize,
        end: usize,
        style: Option<PointStyle>,
    ) {
        let counter = self.order.entry(parent.clone()).or_insert(0);
        let order_index = *counter;
        *counter += 1;

        let node_type = NodeType::from_level(level);
        self.nodes.push(ProvisionNode {
            node_type,
            depth: path::depth(&path),
            path: path.clone(),
            parent_path: Some(parent),
            label,
            order_index,
            start,
            end,
            is_container: node_type.is_container(),
            raw_text: None,
        });
        self.stack.push(Open {
            idx: Some(self.nodes.len() - 1),
            level,
            id,
            path,
            style,
        });
        self.extend_open(end);
    }

    /// Every open unit grows to cover the block just assigned.
    fn extend_open(&mut self, end: usize) {
        for open in &self.stack {
            if let Some(idx) = open.idx {
                let node = &mut self.nodes[idx];
                node.end = node.end.max(end);
            }
        }
    }

    fn deepest(&self, pred: impl Fn(&Open) -> bool) -> Option<usize> {
        self.stack.iter().rposition(pred)
    }

    /// Close everything deeper than `pos`; with no anchor only containers
    /// stay open.
    fn close_below(&mut self, pos: Option<usize>) {
        match pos {
            Some(i) => self.stack.truncate(i + 1),
            None => self.stack.retain(|o| o.level.is_container()),
        }
    }

    fn path_of(&self, pos: Option<usize>) -> String {
        pos.map_or_else(|| ROOT_PATH.to_string(), |i| self.stack[i].path.clone())
    }

    fn next_ordinal(&mut self, parent: &str, level: Level) -> String {
        let n = self.ordinals.entry((parent.to_string(), level)).or_insert(0);
        *n += 1;
        n.to_string()
    }

    pub fn finish(mut self) -> Tree {
        if self.has_root
            && let Some(root) = self.nodes.first_mut()
        {
            root.end = self.text.len();
        }
        for node in &mut self.nodes {
            if !node.is_container {
                node.raw_text = Some(self.text[node.start..node.end].to_string());
            }
        }
        Tree {
            nodes: self.nodes,
            warnings: self.warnings,
            unparsed: self.unparsed,
        }
    }
}

/// Containers nest in path order: part, then chapter, then title.
fn nesting_rank(level: Level) -> u8 {
    match level {
        Level::Part => 0,
        Level::Chapter => 1,
        Level::Title => 2,
        _ => 3,
    }
}

fn preview(block: &str) -> String {
    let mut out: String = block.chars().take(60).collect();
    if out.len() < block.len() {
        out.push_str("...");
    }
    out
}

/// Fold a document's blocks into a provision tree over `text`.
pub fn build_tree<S: AsRef<str>>(text: &str, blocks: &[S], config: &ParserConfig) -> Tree {
    blocks
        .iter()
        .fold(ParserState::new(text, config), |state, block| {
            state.step(block.as_ref())
        })
        .finish()
}

/// Parse a replacement block below `scope`. Offsets are into `text`.
///
/// Returns no root node; text before the first marker belongs to the
/// scope itself.
pub fn parse_fragment(text: &str, scope: &str, config: &ParserConfig) -> Vec<ProvisionNode> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .fold(ParserState::scoped(text, scope, config), |state, line| {
            state.step(line)
        })
        .finish()
        .nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(text: &str) -> Tree {
        let blocks: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        build_tree(text, &blocks, &ParserConfig::default())
    }

    fn paths(tree: &Tree) -> Vec<&str> {
        tree.nodes.iter().map(|n| n.path.as_str()).collect()
    }

    fn node<'t>(tree: &'t Tree, path: &str) -> &'t ProvisionNode {
        tree.nodes
            .iter()
            .find(|n| n.path == path)
            .unwrap_or_else(|| panic!("no node {path}"))
    }

    #[test]
    fn single_article() {
        let text = "Article 1.\n\nRate is 20%.";
        let t = tree(text);
        assert_eq!(paths(&t), vec!["/", "/article:1"]);
        let art = node(&t, "/article:1");
        assert_eq!(art.raw_text.as_deref(), Some(text));
        assert_eq!((art.start, art.end), (0, text.len()));
        assert_eq!(art.parent_path.as_deref(), Some("/"));
        assert!(t.warnings.is_empty());
    }

    #[test]
    fn nested_units() {
        let text = "Article 28\n(1) Processors shall:\n(a) act on instructions;\n(i) in writing;\n(ii) documented;\n(b) keep records.\n(2) Second.\nArticle 29\nText.";
        let t = tree(text);
        assert_eq!(
            paths(&t),
            vec![
                "/",
                "/article:28",
                "/article:28/paragraph:1",
                "/article:28/paragraph:1/point:a",
                "/article:28/paragraph:1/point:a/subpoint:i",
                "/article:28/paragraph:1/point:a/subpoint:ii",
                "/article:28/paragraph:1/point:b",
                "/article:28/paragraph:2",
                "/article:29",
            ]
        );
        let b = node(&t, "/article:28/paragraph:1/point:b");
        assert_eq!(b.order_index, 1);
        assert_eq!(b.depth, 3);
        let p1 = node(&t, "/article:28/paragraph:1");
        assert_eq!(p1.raw_text.as_deref().map(|s| s.ends_with("keep records.")), Some(true));
    }

    #[test]
    fn roman_letter_disambiguation() {
        let text = "Article 1\n(h) eighth;\n(i) ninth;\n(j) tenth.";
        let t = tree(text);
        assert!(paths(&t).contains(&"/article:1/point:i"));
        assert!(!paths(&t).iter().any(|p| p.contains("subpoint")));
    }

    #[test]
    fn numbered_points_and_letters_below() {
        let text = "Article 3\n1. First;\n(a) detail;\n2. Second.";
        let t = tree(text);
        assert_eq!(
            paths(&t)[2..],
            ["/article:3/point:1", "/article:3/point:1/subpoint:a", "/article:3/point:2"]
        );
    }

    #[test]
    fn containers_do_not_enter_article_paths() {
        let text = "PART I\nCHAPTER 1 Scope\nArticle 1\nText.\nCHAPTER 2\nArticle 2\nMore.";
        let t = tree(text);
        let ch2 = node(&t, "/part:I/chapter:2");
        assert!(ch2.is_container);
        assert_eq!(ch2.parent_path.as_deref(), Some("/part:I"));
        assert_eq!(node(&t, "/article:2").parent_path.as_deref(), Some("/"));
        let ch1 = node(&t, "/part:I/chapter:1");
        assert!(ch1.end >= node(&t, "/article:1").end);
        assert!(ch1.raw_text.is_none());
    }

    #[test]
    fn annex_scopes_content() {
        let text = "Article 1\nText.\nANNEX\nList of items\n1. first\n2. second";
        let t = tree(text);
        assert!(paths(&t).contains(&"/annex:1"));
        assert!(paths(&t).contains(&"/annex:1/point:2"));
    }

    #[test]
    fn bullets() {
        let text = "- preamble item\n- another\nArticle 1\n(1) Means:\n\u{2022} one;\n\u{2022} two.";
        let t = tree(text);
        let p = paths(&t);
        assert!(p.contains(&"/list:1/bullet:2"));
        assert!(p.contains(&"/article:1/paragraph:1/point:2"));
    }

    #[test]
    fn table_rows_group() {
        let text = "Article 1\nRates:\nA | B\n1 | 2\nAfter table.";
        let t = tree(text);
        let table = node(&t, "/article:1/table:1");
        assert_eq!(table.raw_text.as_deref(), Some("A | B\n1 | 2"));
        assert_eq!(node(&t, "/article:1").end, text.len());
    }

    #[test]
    fn long_preamble_is_unparsed() {
        let long = "Whereas ".repeat(40);
        let text = format!("{}\nArticle 1\nText.", long.trim());
        let t = tree(&text);
        assert_eq!(t.unparsed.len(), 1);
        assert_eq!(t.unparsed[0].start, 0);
    }

    #[test]
    fn unlocated_block_warns() {
        let text = "Article 1.";
        let t = build_tree(text, &["Article 1.", "Article 2."], &ParserConfig::default());
        assert_eq!(t.warnings.len(), 1);
        assert_eq!(t.warnings[0].code, WarningCode::BlockNotLocated);
        assert_eq!(paths(&t), vec!["/", "/article:1"]);
    }

    #[test]
    fn duplicate_numbering_is_emitted() {
        let t = tree("Article 1\nA.\nArticle 1\nB.");
        assert_eq!(paths(&t).iter().filter(|p| **p == "/article:1").count(), 2);
    }

    #[test]
    fn fragment_resolves_within_scope() {
        let nodes = parse_fragment("(2) Rate is 25%.\n(a) reduced;", "/article:5", &ParserConfig::default());
        let p: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(p, vec!["/article:5/paragraph:2", "/article:5/paragraph:2/point:a"]);
        assert_eq!(nodes[0].start, 0);
    }

    #[test]
    fn fragment_without_markers_is_empty() {
        assert!(parse_fragment("Rate is 25%.", "/article:5", &ParserConfig::default()).is_empty());
    }
}
