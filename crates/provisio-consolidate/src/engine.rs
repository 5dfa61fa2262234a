//! Consolidation engine: replay amendment directives over a base tree.
//!
//! The base document is cut into one entry per node (its own text, the
//! whitespace before it and its provenance). Directives splice, rename
//! and drop entries; deleted entries move to a tombstone list. Finalizing
//! orders the surviving siblings by path, joins them back into text and
//! rebuilds nodes and provenance spans with offsets into that text.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use provisio_core::hash::{digest_records, sha256_hex, short_id};
use provisio_core::path::{
    self, Level, ROOT_PATH, child_path, compare_paths, is_descendant, last_segment, parent_path,
};
use provisio_core::{
    AmendmentDirective, ChangeKind, ComputationStatus, ConsolidatedSnapshot, ConsolidationConfig,
    DirectiveKind, NodeType, ParseResult, ParserConfig, ProvenanceSpan, ProvisionNode, Tombstone,
    Warning,
};
use provisio_parse::markers::next_letter;
use provisio_parse::{ParseOutput, coverage, segment, validate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConsolidateError;
use crate::fragment::{Fragment, Unit, default_label, rewrite_marker};

// ── Inputs and outputs ──

/// A usable parse of the document being consolidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseDocument {
    pub result: ParseResult,
    pub nodes: Vec<ProvisionNode>,
    /// Normalized text the node offsets point into.
    pub text: String,
}

impl From<ParseOutput> for BaseDocument {
    fn from(out: ParseOutput) -> Self {
        Self {
            result: out.result,
            nodes: out.nodes,
            text: out.text.text,
        }
    }
}

/// One amending document and the directives extracted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendmentSource {
    pub document_id: String,
    pub content_hash: String,
    pub effective_date: NaiveDate,
    pub publication_date: Option<NaiveDate>,
    pub directives: Vec<AmendmentDirective>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    TargetNotFound,
    SearchTextNotFound,
    PathConflict,
    MissingText,
    MissingPath,
    InvalidTarget,
    BelowConfidence,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetNotFound => "target_not_found",
            Self::SearchTextNotFound => "search_text_not_found",
            Self::PathConflict => "path_conflict",
            Self::MissingText => "missing_text",
            Self::MissingPath => "missing_path",
            Self::InvalidTarget => "invalid_target",
            Self::BelowConfidence => "below_confidence",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directive that was skipped or could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveFailure {
    pub amendment_document_id: String,
    /// Position of the directive in its amendment's directive list.
    pub directive_index: usize,
    pub kind: DirectiveKind,
    pub target_path: String,
    pub reason: FailureReason,
    pub message: String,
}

/// Everything one consolidation run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consolidation {
    pub snapshot: ConsolidatedSnapshot,
    /// Root first, then document order.
    pub nodes: Vec<ProvisionNode>,
    /// Ordered by start offset; together they tile the snapshot text.
    pub provenance: Vec<ProvenanceSpan>,
    pub tombstones: Vec<Tombstone>,
    pub failures: Vec<DirectiveFailure>,
    /// Invariant violations found in the consolidated tree.
    pub warnings: Vec<Warning>,
}

// ── Working state ──

#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    source_document_id: String,
    source_path: Option<String>,
    /// Offsets of separator plus body in the source text.
    source_range: Option<(usize, usize)>,
    change: ChangeKind,
    amended_by: Option<String>,
    previous_text: Option<String>,
}

impl Origin {
    fn inserted(by: &str) -> Self {
        Self {
            source_document_id: by.to_string(),
            source_path: None,
            source_range: None,
            change: ChangeKind::Inserted,
            amended_by: Some(by.to_string()),
            previous_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    path: String,
    node_type: NodeType,
    label: String,
    separator: String,
    body: String,
    origin: Origin,
}

impl Entry {
    /// Swap in new own text, attributing it to `by`. No-op when unchanged.
    fn modify(&mut self, body: String, by: &str) {
        if body == self.body {
            return;
        }
        let previous = std::mem::replace(&mut self.body, body);
        self.origin = match self.origin.change {
            ChangeKind::Inserted => Origin::inserted(by),
            _ => Origin {
                source_document_id: by.to_string(),
                source_path: None,
                source_range: None,
                change: ChangeKind::Modified,
                amended_by: Some(by.to_string()),
                previous_text: Some(previous),
            },
        };
    }

    fn tombstone(self, by: &str) -> Tombstone {
        Tombstone {
            path: self.path,
            node_type: self.node_type,
            label: self.label,
            previous_text: self.body,
            source_document_id: self.origin.source_document_id,
            deleted_by: by.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    reason: FailureReason,
    message: String,
}

impl Failure {
    fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

type Applied = Result<(), Failure>;

struct Replay {
    entries: Vec<Entry>,
    tombstones: Vec<Tombstone>,
    fragment_config: ParserConfig,
}

impl Replay {
    fn seed(base: &BaseDocument) -> Self {
        let segments = segment(&base.text, &base.nodes);
        let entries = segments
            .into_iter()
            .filter_map(|seg| {
                let node = base.nodes.iter().find(|n| n.path == seg.path)?;
                let from = seg.start - seg.separator.len();
                Some(Entry {
                    node_type: node.node_type,
                    label: node.label.clone(),
                    origin: Origin {
                        source_document_id: base.result.document_id.clone(),
                        source_path: Some(seg.path.clone()),
                        source_range: Some((from, seg.start + seg.body.len())),
                        change: ChangeKind::Original,
                        amended_by: None,
                        previous_text: None,
                    },
                    path: seg.path,
                    separator: seg.separator,
                    body: seg.body,
                })
            })
            .collect();
        Self {
            entries,
            tombstones: Vec::new(),
            fragment_config: ParserConfig::default(),
        }
    }

    fn find(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    fn alive(&self, path: &str) -> Result<usize, Failure> {
        self.find(path).ok_or_else(|| {
            Failure::new(FailureReason::TargetNotFound, format!("{path} is not in the document"))
        })
    }

    /// One past the last entry of the subtree rooted at `idx`.
    fn subtree_end(&self, idx: usize) -> usize {
        let root = &self.entries[idx].path;
        idx + 1
            + self.entries[idx + 1..]
                .iter()
                .take_while(|e| is_descendant(&e.path, root))
                .count()
    }

    /// Separator for a new entry: copied from the last sibling of the same
    /// type, else a blank line before large units and a line break otherwise.
    fn separator_for(&self, path: &str, node_type: NodeType) -> String {
        let parent = parent_path(path);
        self.entries
            .iter()
            .rev()
            .find(|e| {
                e.node_type == node_type && !e.separator.is_empty() && parent_path(&e.path) == parent
            })
            .map(|e| e.separator.clone())
            .unwrap_or_else(|| {
                let wide = node_type.is_container()
                    || matches!(node_type, NodeType::Article | NodeType::Annex);
                if wide { "\n\n" } else { "\n" }.to_string()
            })
    }

    fn new_entry(&self, unit: &Unit, by: &str) -> Entry {
        Entry {
            separator: self.separator_for(&unit.path, unit.node_type),
            path: unit.path.clone(),
            node_type: unit.node_type,
            label: unit.label.clone(),
            body: unit.body.clone(),
            origin: Origin::inserted(by),
        }
    }

    fn apply(&mut self, directive: &AmendmentDirective, by: &str) -> Applied {
        match directive.kind {
            DirectiveKind::ReplaceArticle | DirectiveKind::ReplaceParagraph => {
                self.replace(directive, by)
            }
            DirectiveKind::Delete => self.delete(directive, by),
            DirectiveKind::InsertAfter
            | DirectiveKind::InsertBefore
            | DirectiveKind::AddParagraph
            | DirectiveKind::AddPoint => self.insert(directive, by),
            DirectiveKind::Renumber => self.renumber(directive, by),
            DirectiveKind::ReplaceWords => self.replace_words(directive, by),
        }
    }

    // ── Replace ──

    fn replace(&mut self, d: &AmendmentDirective, by: &str) -> Applied {
        let text = required_text(d)?;
        let idx = self.alive(&d.target_path)?;
        let target = d.target_path.as_str();
        let scope = parent_path(target).ok_or_else(|| {
            Failure::new(FailureReason::InvalidTarget, "the document root cannot be replaced")
        })?;
        let fragment = Fragment::parse(text, &scope, &self.fragment_config);

        let own = fragment.position(target).map(|pos| &fragment.units[pos]);
        let children: Vec<&Unit> = fragment.below(target).collect();
        let body = match own {
            Some(unit) => join_lead(&fragment.lead, &unit.body),
            None if !children.is_empty() => fragment.lead.clone(),
            None => text.trim().to_string(),
        };
        if let Some(unit) = own {
            self.entries[idx].label = unit.label.clone();
        }
        self.entries[idx].modify(body, by);

        let end = self.subtree_end(idx);
        let mut old: Vec<Entry> = self.entries.drain(idx + 1..end).collect();
        let mut rebuilt = Vec::with_capacity(children.len());
        for unit in &children {
            let entry = match old.iter().position(|e| e.path == unit.path) {
                Some(pos) => {
                    let mut entry = old.remove(pos);
                    entry.label = unit.label.clone();
                    entry.modify(unit.body.clone(), by);
                    entry
                }
                None => self.new_entry(unit, by),
            };
            rebuilt.push(entry);
        }
        for entry in old {
            debug!(path = %entry.path, "dropped by replacement");
            self.tombstones.push(entry.tombstone(by));
        }
        let mut cursor = idx + 1 + rebuilt.len();
        self.entries.splice(idx + 1..idx + 1, rebuilt);

        // Units beside the target, e.g. a replaced article followed by a
        // newly numbered one.
        let extras = fragment
            .units
            .iter()
            .filter(|u| u.path != target && !is_descendant(&u.path, target));
        for unit in extras {
            match self.find(&unit.path) {
                Some(j) => self.entries[j].modify(unit.body.clone(), by),
                None => {
                    let entry = self.new_entry(unit, by);
                    self.entries.insert(cursor, entry);
                    cursor += 1;
                }
            }
        }
        Ok(())
    }

    // ── Delete ──

    fn delete(&mut self, d: &AmendmentDirective, by: &str) -> Applied {
        let idx = self.alive(&d.target_path)?;
        if d.target_path == ROOT_PATH {
            return Err(Failure::new(
                FailureReason::InvalidTarget,
                "the document root cannot be deleted",
            ));
        }
        let end = self.subtree_end(idx);
        let removed: Vec<Entry> = self.entries.drain(idx..end).collect();
        self.tombstones
            .extend(removed.into_iter().map(|e| e.tombstone(by)));
        Ok(())
    }

    // ── Insert and add ──

    fn insert(&mut self, d: &AmendmentDirective, by: &str) -> Applied {
        let text = required_text(d)?;
        let idx = self.alive(&d.target_path)?;
        let target = d.target_path.as_str();
        let scope = match d.kind {
            DirectiveKind::InsertAfter | DirectiveKind::InsertBefore => {
                parent_path(target).ok_or_else(|| {
                    Failure::new(
                        FailureReason::InvalidTarget,
                        "nothing can be inserted beside the document root",
                    )
                })?
            }
            _ => target.to_string(),
        };
        let fragment = Fragment::parse(text, &scope, &self.fragment_config);

        if d.kind == DirectiveKind::AddParagraph
            && d.new_path.is_none()
            && fragment.units.is_empty()
            && self.takes_subparagraph(idx)
        {
            let body = format!("{}\n{}", self.entries[idx].body, fragment.lead);
            self.entries[idx].modify(body, by);
            return Ok(());
        }

        let new_path = match d
            .new_path
            .clone()
            .or_else(|| fragment.first_child_of(&scope).map(|u| u.path.clone()))
        {
            Some(p) => p,
            None => self.next_free(d.kind, target)?,
        };
        if self.find(&new_path).is_some() {
            return Err(Failure::new(
                FailureReason::PathConflict,
                format!("{new_path} already exists"),
            ));
        }
        let Some(seg) = last_segment(&new_path) else {
            return Err(Failure::new(
                FailureReason::InvalidTarget,
                format!("{new_path} is not a provision path"),
            ));
        };

        let own = fragment.position(&new_path).map(|pos| &fragment.units[pos]);
        let node_type = NodeType::from_level(seg.level);
        let head = Entry {
            separator: self.separator_for(&new_path, node_type),
            label: own.map_or_else(|| default_label(&new_path), |u| u.label.clone()),
            body: match own {
                Some(unit) => join_lead(&fragment.lead, &unit.body),
                None => text.trim().to_string(),
            },
            path: new_path.clone(),
            node_type,
            origin: Origin::inserted(by),
        };
        let mut block = vec![head];
        if own.is_some() {
            let children: Vec<Entry> = fragment
                .below(&new_path)
                .map(|u| self.new_entry(u, by))
                .collect();
            block.extend(children);
        }

        let at = match d.kind {
            DirectiveKind::InsertAfter => self.subtree_end(idx),
            DirectiveKind::InsertBefore => idx,
            _ => self.child_slot(idx, &new_path),
        };
        debug!(path = %new_path, at, units = block.len(), "inserting");
        self.entries.splice(at..at, block);
        Ok(())
    }

    /// Unmarked text added to a unit without numbered children extends the
    /// unit's own text as a new subparagraph.
    fn takes_subparagraph(&self, idx: usize) -> bool {
        match self.entries[idx].node_type {
            NodeType::Paragraph | NodeType::Point | NodeType::Subpoint => true,
            NodeType::Article | NodeType::Annex => self.subtree_end(idx) == idx + 1,
            _ => false,
        }
    }

    /// Insertion index for `new_path` among the children of its parent,
    /// falling back to the end of the target's subtree.
    fn child_slot(&self, target_idx: usize, new_path: &str) -> usize {
        let anchor = parent_path(new_path)
            .and_then(|p| self.find(&p))
            .unwrap_or(target_idx);
        let anchor_path = self.entries[anchor].path.as_str();
        let end = self.subtree_end(anchor);
        (anchor + 1..end)
            .find(|&j| {
                let path = &self.entries[j].path;
                parent_path(path).as_deref() == Some(anchor_path)
                    && compare_paths(path, new_path).is_gt()
            })
            .unwrap_or(end)
    }

    /// Next unused path when neither the directive nor its text names one.
    fn next_free(&self, kind: DirectiveKind, target: &str) -> Result<String, Failure> {
        let missing = || {
            Failure::new(
                FailureReason::MissingPath,
                format!("no path for the new unit near {target}"),
            )
        };
        match kind {
            DirectiveKind::AddParagraph => {
                let mut parent = target.to_string();
                while let Some(seg) = last_segment(&parent)
                    && seg.level >= Level::Paragraph
                {
                    parent = parent_path(&parent).unwrap_or_else(|| ROOT_PATH.to_string());
                }
                let next = self
                    .child_ids(&parent, Level::Paragraph)
                    .iter()
                    .filter_map(|id| id.parse::<u32>().ok())
                    .max()
                    .map_or(1, |n| n + 1);
                Ok(child_path(&parent, Level::Paragraph, &next.to_string()))
            }
            DirectiveKind::AddPoint => {
                let mut ids = self.child_ids(target, Level::Point);
                ids.sort_by(|a, b| {
                    compare_paths(
                        &child_path(target, Level::Point, a),
                        &child_path(target, Level::Point, b),
                    )
                });
                let next = match ids.last() {
                    None => "a".to_string(),
                    Some(last) => match last.parse::<u32>() {
                        Ok(n) => (n + 1).to_string(),
                        Err(_) => next_letter(last).ok_or_else(missing)?.to_string(),
                    },
                };
                Ok(child_path(target, Level::Point, &next))
            }
            DirectiveKind::InsertAfter => {
                let seg = last_segment(target).ok_or_else(missing)?;
                let parent = parent_path(target).ok_or_else(missing)?;
                ('a'..='z')
                    .map(|c| child_path(&parent, seg.level, &format!("{}{c}", seg.id)))
                    .find(|p| self.find(p).is_none())
                    .ok_or_else(missing)
            }
            _ => Err(missing()),
        }
    }

    fn child_ids(&self, parent: &str, level: Level) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| parent_path(&e.path).as_deref() == Some(parent))
            .filter_map(|e| last_segment(&e.path))
            .filter(|s| s.level == level)
            .map(|s| s.id.to_string())
            .collect()
    }

    // ── Renumber ──

    fn renumber(&mut self, d: &AmendmentDirective, by: &str) -> Applied {
        let idx = self.alive(&d.target_path)?;
        let target = d.target_path.clone();
        let new_path = d.new_path.clone().ok_or_else(|| {
            Failure::new(FailureReason::MissingPath, "renumbering without a new number")
        })?;
        let (Some(old_seg), Some(new_seg)) = (last_segment(&target), last_segment(&new_path))
        else {
            return Err(Failure::new(
                FailureReason::InvalidTarget,
                format!("cannot renumber {target} as {new_path}"),
            ));
        };
        if old_seg.level != new_seg.level {
            return Err(Failure::new(
                FailureReason::InvalidTarget,
                format!("{target} and {new_path} are different kinds of unit"),
            ));
        }
        if self.find(&new_path).is_some() {
            return Err(Failure::new(
                FailureReason::PathConflict,
                format!("{new_path} already exists"),
            ));
        }
        let (old_id, new_id) = (old_seg.id.to_string(), new_seg.id.to_string());

        let end = self.subtree_end(idx);
        for entry in &mut self.entries[idx..end] {
            entry.path = format!("{new_path}{}", &entry.path[target.len()..]);
            entry.origin.change = ChangeKind::Renumbered;
            entry.origin.amended_by = Some(by.to_string());
        }
        let head = &mut self.entries[idx];
        let body = rewrite_marker(&head.body, &old_id, &new_id);
        head.label = rewrite_marker(&head.label, &old_id, &new_id);
        head.origin.previous_text = Some(std::mem::replace(&mut head.body, body));
        Ok(())
    }

    // ── Word substitution ──

    fn replace_words(&mut self, d: &AmendmentDirective, by: &str) -> Applied {
        let words = d
            .words
            .as_ref()
            .filter(|w| !w.search.is_empty())
            .ok_or_else(|| Failure::new(FailureReason::MissingText, "no words to substitute"))?;
        let idx = self.alive(&d.target_path)?;
        let end = self.subtree_end(idx);

        let hits: usize = self.entries[idx..end]
            .iter()
            .map(|e| e.body.matches(words.search.as_str()).count())
            .sum();
        if hits == 0 {
            return Err(Failure::new(
                FailureReason::SearchTextNotFound,
                format!("{:?} does not occur in {}", words.search, d.target_path),
            ));
        }
        for entry in &mut self.entries[idx..end] {
            if !entry.body.contains(words.search.as_str()) {
                continue;
            }
            let body = if words.replace.is_empty() {
                entry
                    .body
                    .replace(&format!(" {}", words.search), "")
                    .replace(words.search.as_str(), "")
            } else {
                entry.body.replace(words.search.as_str(), &words.replace)
            };
            entry.modify(body, by);
        }
        debug!(target = %d.target_path, hits, "words substituted");
        Ok(())
    }

    // ── Finalize ──

    fn finish(mut self) -> Finished {
        self.entries = sort_siblings(std::mem::take(&mut self.entries));

        let mut text = String::new();
        let mut body_starts = Vec::with_capacity(self.entries.len());
        let mut provenance = Vec::new();
        for entry in &self.entries {
            let span_start = text.len();
            if !entry.body.is_empty() && !text.is_empty() {
                // A unit that opened the base text has no separator of its
                // own once something is placed before it.
                if entry.separator.is_empty() {
                    text.push_str(&self.separator_for(&entry.path, entry.node_type));
                } else {
                    text.push_str(&entry.separator);
                }
            }
            body_starts.push(text.len());
            text.push_str(&entry.body);
            if text.len() > span_start {
                let origin = &entry.origin;
                provenance.push(ProvenanceSpan {
                    node_path: entry.path.clone(),
                    start: span_start,
                    end: text.len(),
                    source_document_id: origin.source_document_id.clone(),
                    source_path: origin.source_path.clone(),
                    source_start: origin.source_range.map(|r| r.0),
                    source_end: origin.source_range.map(|r| r.1),
                    change: origin.change,
                    amended_by: origin.amended_by.clone(),
                    previous_text: origin.previous_text.clone(),
                });
            }
        }

        let own_end = |i: usize| body_starts[i] + self.entries[i].body.len();
        let mut order: HashMap<String, u32> = HashMap::new();
        let mut nodes = Vec::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            let is_container = entry.node_type.is_container();
            let (start, end) = if entry.path == ROOT_PATH {
                (0, text.len())
            } else if is_container {
                // Containers run until the next container at their level
                // or above, or the next annex.
                let end = self.entries[i + 1..]
                    .iter()
                    .take_while(|e| {
                        !(e.node_type.is_container() && e.node_type <= entry.node_type)
                            && e.node_type != NodeType::Annex
                    })
                    .count();
                let last = (i..=i + end).map(own_end).max().unwrap_or(body_starts[i]);
                (body_starts[i], last)
            } else {
                let end = self.subtree_end(i);
                let last = (i..end).map(own_end).max().unwrap_or(body_starts[i]);
                (body_starts[i], last)
            };
            let parent = parent_path(&entry.path);
            let order_index = match &parent {
                Some(p) => {
                    let counter = order.entry(p.clone()).or_insert(0);
                    *counter += 1;
                    *counter - 1
                }
                None => 0,
            };
            nodes.push(ProvisionNode {
                node_type: entry.node_type,
                path: entry.path.clone(),
                parent_path: parent,
                label: entry.label.clone(),
                order_index,
                depth: path::depth(&entry.path),
                start,
                end,
                is_container,
                raw_text: (!is_container).then(|| text[start..end].to_string()),
            });
        }

        Finished {
            text,
            nodes,
            provenance,
            tombstones: self.tombstones,
        }
    }
}

/// Put sibling subtrees of one level in path order.
///
/// Each level keeps the positions its units held, so container headings
/// and tables stay where the text put them while articles, paragraphs and
/// points are ordered by [`compare_paths`]. Every subtree stays contiguous.
fn sort_siblings(entries: Vec<Entry>) -> Vec<Entry> {
    let mut groups: Vec<Vec<Entry>> = Vec::new();
    for entry in entries {
        if let Some(group) = groups.last_mut()
            && !group[0].node_type.is_container()
            && is_descendant(&entry.path, &group[0].path)
        {
            group.push(entry);
            continue;
        }
        groups.push(vec![entry]);
    }

    let mut by_level: BTreeMap<Option<Level>, Vec<usize>> = BTreeMap::new();
    for (i, group) in groups.iter().enumerate() {
        let level = last_segment(&group[0].path).map(|s| s.level);
        by_level.entry(level).or_default().push(i);
    }
    let mut slots: Vec<Option<Vec<Entry>>> = groups.into_iter().map(Some).collect();
    for indices in by_level.values() {
        let mut sorted: Vec<Vec<Entry>> = indices.iter().filter_map(|&i| slots[i].take()).collect();
        sorted.sort_by(|a, b| compare_paths(&a[0].path, &b[0].path));
        for (&i, group) in indices.iter().zip(sorted) {
            slots[i] = Some(group);
        }
    }

    let mut out = Vec::new();
    for mut group in slots.into_iter().flatten() {
        let rest = group.split_off(1);
        out.extend(group);
        out.extend(sort_siblings(rest));
    }
    out
}

struct Finished {
    text: String,
    nodes: Vec<ProvisionNode>,
    provenance: Vec<ProvenanceSpan>,
    tombstones: Vec<Tombstone>,
}

fn required_text(d: &AmendmentDirective) -> Result<&str, Failure> {
    d.new_text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Failure::new(FailureReason::MissingText, "directive carries no text"))
}

fn join_lead(lead: &str, body: &str) -> String {
    if lead.is_empty() {
        body.to_string()
    } else {
        format!("{lead}\n{body}")
    }
}

// ── Entry point ──

/// Replay the amendments over the base document and build a snapshot.
///
/// Amendments apply in order of effective date, then publication date,
/// then document id; within one amendment directives apply in source
/// order. Per-directive problems are collected as [`DirectiveFailure`]s
/// and only downgrade the snapshot status.
pub fn consolidate(
    document_id: &str,
    base: &BaseDocument,
    amendments: &[AmendmentSource],
    config: &ConsolidationConfig,
) -> Result<Consolidation, ConsolidateError> {
    if document_id.trim().is_empty() {
        return Err(ConsolidateError::EmptyDocumentId);
    }
    if !base.result.is_usable() {
        return Err(ConsolidateError::UnusableBase(base.result.id.clone()));
    }

    let mut ordered: Vec<&AmendmentSource> = amendments
        .iter()
        .filter(|a| config.as_of.is_none_or(|cut| a.effective_date <= cut))
        .collect();
    ordered.sort_by(|a, b| {
        (a.effective_date, a.publication_date, &a.document_id).cmp(&(
            b.effective_date,
            b.publication_date,
            &b.document_id,
        ))
    });

    let meta = &base.result.metadata;
    let effective_date = ordered
        .iter()
        .map(|a| a.effective_date)
        .chain(meta.effective_date)
        .max()
        .or(meta.publication_date)
        .ok_or_else(|| ConsolidateError::NoEffectiveDate(document_id.to_string()))?;

    let mut replay = Replay::seed(base);
    let mut failures = Vec::new();
    'replay: for amendment in &ordered {
        for (index, directive) in amendment.directives.iter().enumerate() {
            let outcome = if directive.is_admissible(config.min_confidence) {
                replay.apply(directive, &amendment.document_id)
            } else {
                Err(Failure::new(
                    FailureReason::BelowConfidence,
                    format!(
                        "confidence {} is below {}",
                        directive.confidence, config.min_confidence
                    ),
                ))
            };
            let Err(failure) = outcome else {
                continue;
            };
            warn!(
                document_id,
                amendment = %amendment.document_id,
                directive = index,
                kind = directive.kind.as_str(),
                target = %directive.target_path,
                reason = failure.reason.as_str(),
                "{}",
                failure.message
            );
            failures.push(DirectiveFailure {
                amendment_document_id: amendment.document_id.clone(),
                directive_index: index,
                kind: directive.kind,
                target_path: directive.target_path.clone(),
                reason: failure.reason,
                message: failure.message,
            });
            if config.strict {
                break 'replay;
            }
        }
    }

    let Finished {
        text,
        nodes,
        provenance,
        tombstones,
    } = replay.finish();
    let warnings = validate(&text, &nodes);

    let fatal = warnings.iter().any(|w| w.code.is_fatal());
    let status = if fatal || (config.strict && !failures.is_empty()) {
        ComputationStatus::Failed
    } else if failures.is_empty() {
        ComputationStatus::Complete
    } else {
        ComputationStatus::Partial
    };

    let content_hash = sha256_hex(&text);
    let tree_hash = digest_records(nodes.iter().map(|n| format!("{}\t{}", n.path, n.len())));
    let mut sources: Vec<String> = std::iter::once(format!(
        "{}\t{}",
        base.result.document_id, base.result.content_hash
    ))
    .chain(
        ordered
            .iter()
            .map(|a| format!("{}\t{}", a.document_id, a.content_hash)),
    )
    .collect();
    sources.sort();
    let fingerprint = digest_records(&sources);

    let date = effective_date.to_string();
    let id = short_id(
        "snap",
        &digest_records([
            document_id,
            date.as_str(),
            fingerprint.as_str(),
            content_hash.as_str(),
        ]),
    );
    let contributing_documents = std::iter::once(base.result.document_id.clone())
        .chain(ordered.iter().map(|a| a.document_id.clone()))
        .collect();

    let snapshot = ConsolidatedSnapshot {
        id,
        document_id: document_id.to_string(),
        effective_date,
        valid_from: effective_date,
        valid_until: None,
        coverage: coverage(&text, &nodes),
        content_hash,
        tree_hash,
        contributing_documents,
        node_count: nodes.len(),
        article_count: nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Article)
            .count(),
        tombstone_count: tombstones.len(),
        status,
        fingerprint,
        text,
    };
    info!(
        document_id,
        snapshot_id = %snapshot.id,
        effective = %snapshot.effective_date,
        status = %snapshot.status,
        amendments = ordered.len(),
        failures = failures.len(),
        tombstones = snapshot.tombstone_count,
        "consolidated"
    );
    Ok(Consolidation {
        snapshot,
        nodes,
        provenance,
        tombstones,
        failures,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_core::{Confidence, ContentClass, WordSubstitution};
    use provisio_parse::parse;

    const BASE: &str = "Act on rates\nof 3 March 2024\n\nArticle 1\n\n(1) Rates are set annually.\n\n(2) The rate is 20%.\n\nArticle 2\n\nOperators shall report.\n\nArticle 3\n\n(a) first;\n(b) second.";

    fn base() -> BaseDocument {
        parse("act", ContentClass::Text, BASE, &ParserConfig::default())
            .unwrap()
            .into()
    }

    fn directive(kind: DirectiveKind, target: &str) -> AmendmentDirective {
        AmendmentDirective {
            source_document_id: "amend".into(),
            source_start: 0,
            source_end: 1,
            kind,
            target_path: target.into(),
            new_text: None,
            words: None,
            new_path: None,
            confidence: Confidence::High,
            reviewed: false,
        }
    }

    fn with_text(mut d: AmendmentDirective, text: &str) -> AmendmentDirective {
        d.new_text = Some(text.into());
        d
    }

    fn replay() -> Replay {
        Replay::seed(&base())
    }

    fn paths(r: &Replay) -> Vec<&str> {
        r.entries.iter().map(|e| e.path.as_str()).collect()
    }

    fn entry<'r>(r: &'r Replay, path: &str) -> &'r Entry {
        &r.entries[r.find(path).unwrap()]
    }

    #[test]
    fn seed_follows_document_order() {
        let r = replay();
        assert_eq!(
            paths(&r),
            vec![
                "/",
                "/article:1",
                "/article:1/paragraph:1",
                "/article:1/paragraph:2",
                "/article:2",
                "/article:3",
                "/article:3/point:a",
                "/article:3/point:b",
            ]
        );
        assert_eq!(r.subtree_end(1), 4);
        assert!(r.entries.iter().all(|e| e.origin.change == ChangeKind::Original));
    }

    #[test]
    fn replace_with_children_tombstones_missing_ones() {
        let mut r = replay();
        let d = with_text(
            directive(DirectiveKind::ReplaceArticle, "/article:1"),
            "Article 1\n\n(1) Rates are set annually.\n\n(3) Rates are published.",
        );
        r.apply(&d, "amend").unwrap();
        assert_eq!(
            &paths(&r)[1..4],
            &["/article:1", "/article:1/paragraph:1", "/article:1/paragraph:3"]
        );
        assert_eq!(entry(&r, "/article:1/paragraph:1").origin.change, ChangeKind::Original);
        assert_eq!(entry(&r, "/article:1/paragraph:3").origin.change, ChangeKind::Inserted);
        assert_eq!(r.tombstones.len(), 1);
        assert_eq!(r.tombstones[0].path, "/article:1/paragraph:2");
        assert_eq!(r.tombstones[0].deleted_by, "amend");
    }

    #[test]
    fn root_is_not_a_valid_target() {
        let mut r = replay();
        let err = r.apply(&directive(DirectiveKind::Delete, "/"), "amend").unwrap_err();
        assert_eq!(err.reason, FailureReason::InvalidTarget);
        let err = r
            .apply(&with_text(directive(DirectiveKind::ReplaceArticle, "/"), "x"), "amend")
            .unwrap_err();
        assert_eq!(err.reason, FailureReason::InvalidTarget);
    }

    #[test]
    fn next_free_paths() {
        let r = replay();
        assert_eq!(
            r.next_free(DirectiveKind::AddParagraph, "/article:1").unwrap(),
            "/article:1/paragraph:3"
        );
        assert_eq!(
            r.next_free(DirectiveKind::AddParagraph, "/article:1/paragraph:1").unwrap(),
            "/article:1/paragraph:3"
        );
        assert_eq!(
            r.next_free(DirectiveKind::AddPoint, "/article:3").unwrap(),
            "/article:3/point:c"
        );
        assert_eq!(
            r.next_free(DirectiveKind::AddPoint, "/article:2").unwrap(),
            "/article:2/point:a"
        );
        assert_eq!(r.next_free(DirectiveKind::InsertAfter, "/article:2").unwrap(), "/article:2a");
        assert_eq!(
            r.next_free(DirectiveKind::InsertBefore, "/article:2").unwrap_err().reason,
            FailureReason::MissingPath
        );
    }

    #[test]
    fn add_point_lands_among_children() {
        let mut r = replay();
        let d = with_text(directive(DirectiveKind::AddPoint, "/article:3"), "(c) third.");
        r.apply(&d, "amend").unwrap();
        assert_eq!(paths(&r).last(), Some(&"/article:3/point:c"));
        assert_eq!(entry(&r, "/article:3/point:c").separator, "\n");

        let mut d = with_text(directive(DirectiveKind::AddPoint, "/article:3"), "(aa) between.");
        d.new_path = Some("/article:3/point:aa".into());
        r.apply(&d, "amend").unwrap();
        assert_eq!(
            &paths(&r)[6..],
            &[
                "/article:3/point:a",
                "/article:3/point:aa",
                "/article:3/point:b",
                "/article:3/point:c"
            ]
        );
    }

    #[test]
    fn unmarked_paragraph_extends_the_unit() {
        let mut r = replay();
        let d = with_text(directive(DirectiveKind::AddParagraph, "/article:2"), "Reports are public.");
        r.apply(&d, "amend").unwrap();
        let e = entry(&r, "/article:2");
        assert!(e.body.ends_with("Operators shall report.\nReports are public."));
        assert_eq!(e.origin.change, ChangeKind::Modified);
    }

    #[test]
    fn existing_path_conflicts() {
        let mut r = replay();
        let mut d = with_text(directive(DirectiveKind::InsertAfter, "/article:1"), "Article 2\n\nDup.");
        d.new_path = Some("/article:2".into());
        assert_eq!(r.apply(&d, "amend").unwrap_err().reason, FailureReason::PathConflict);
    }

    #[test]
    fn renumber_moves_subtree_and_marker() {
        let mut r = replay();
        let mut d = directive(DirectiveKind::Renumber, "/article:3");
        d.new_path = Some("/article:4".into());
        r.apply(&d, "amend").unwrap();
        let head = entry(&r, "/article:4");
        assert!(head.body.starts_with("Article 4"));
        assert_eq!(head.label, "Article 4");
        assert_eq!(head.origin.previous_text.as_deref(), Some("Article 3"));
        let child = entry(&r, "/article:4/point:a");
        assert_eq!(child.origin.change, ChangeKind::Renumbered);
        assert_eq!(child.origin.source_path.as_deref(), Some("/article:3/point:a"));
        assert!(r.find("/article:3").is_none());
    }

    #[test]
    fn word_deletion_drops_leading_space() {
        let mut r = replay();
        let mut d = directive(DirectiveKind::ReplaceWords, "/article:2");
        d.words = Some(WordSubstitution {
            search: "shall".into(),
            replace: String::new(),
        });
        r.apply(&d, "amend").unwrap();
        assert!(entry(&r, "/article:2").body.ends_with("Operators report."));

        let mut miss = directive(DirectiveKind::ReplaceWords, "/article:2");
        miss.words = Some(WordSubstitution {
            search: "never".into(),
            replace: "always".into(),
        });
        assert_eq!(
            r.apply(&miss, "amend").unwrap_err().reason,
            FailureReason::SearchTextNotFound
        );
    }

    #[test]
    fn finish_spans_tile_the_text() {
        let out = replay().finish();
        assert_eq!(out.text, base().text.trim_end());
        let mut cursor = 0;
        for span in &out.provenance {
            assert_eq!(span.start, cursor);
            cursor = span.end;
        }
        assert_eq!(cursor, out.text.len());
        assert!(validate(&out.text, &out.nodes).is_empty());
    }

    #[test]
    fn finish_orders_renumbered_articles() {
        let mut r = replay();
        let mut d = directive(DirectiveKind::Renumber, "/article:1");
        d.new_path = Some("/article:4".into());
        r.apply(&d, "amend").unwrap();
        let out = r.finish();
        let order: Vec<&str> = out.nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "/",
                "/article:2",
                "/article:3",
                "/article:3/point:a",
                "/article:3/point:b",
                "/article:4",
                "/article:4/paragraph:1",
                "/article:4/paragraph:2",
            ]
        );
        assert!(out.text.starts_with("Act on rates\nof 3 March 2024\n\nArticle 2\n"));
        assert!(out.text.ends_with(
            "(b) second.\n\nArticle 4\n\n(1) Rates are set annually.\n\n(2) The rate is 20%."
        ));
        assert!(validate(&out.text, &out.nodes).is_empty());
    }

    #[test]
    fn finish_orders_renumbered_paragraphs() {
        let mut r = replay();
        let mut d = directive(DirectiveKind::Renumber, "/article:1/paragraph:1");
        d.new_path = Some("/article:1/paragraph:3".into());
        r.apply(&d, "amend").unwrap();
        let out = r.finish();
        assert!(out.text.contains(
            "Article 1\n\n(2) The rate is 20%.\n\n(3) Rates are set annually.\n\nArticle 2"
        ));
        let children: Vec<(&str, u32)> = out
            .nodes
            .iter()
            .filter(|n| n.parent_path.as_deref() == Some("/article:1"))
            .map(|n| (n.path.as_str(), n.order_index))
            .collect();
        assert_eq!(
            children,
            vec![("/article:1/paragraph:2", 0), ("/article:1/paragraph:3", 1)]
        );
        assert!(validate(&out.text, &out.nodes).is_empty());
    }
}
