//! Structural invariant checks over one node set and its normalized text.
//!
//! Violations come back as warnings with stable codes; only
//! `duplicate_path` and `no_structural_nodes` make a run unusable.

use std::collections::{BTreeMap, HashMap};

use provisio_core::{ProvisionNode, Warning, WarningCode};

pub fn validate(text: &str, nodes: &[ProvisionNode]) -> Vec<Warning> {
    let mut warnings = Vec::new();
    check_structural(nodes, &mut warnings);
    check_unique_paths(nodes, &mut warnings);
    check_offsets(text, nodes, &mut warnings);
    check_containment(nodes, &mut warnings);
    check_order(nodes, &mut warnings);
    check_sibling_overlap(nodes, &mut warnings);
    warnings
}

fn check_structural(nodes: &[ProvisionNode], warnings: &mut Vec<Warning>) {
    if nodes.iter().all(|n| n.parent_path.is_none()) {
        warnings.push(Warning::new(
            WarningCode::NoStructuralNodes,
            "no structural units were recognized",
        ));
    }
}

fn check_unique_paths(nodes: &[ProvisionNode], warnings: &mut Vec<Warning>) {
    let mut seen: HashMap<&str, &ProvisionNode> = HashMap::new();
    for node in nodes {
        if let Some(first) = seen.get(node.path.as_str()) {
            warnings.push(
                Warning::new(
                    WarningCode::DuplicatePath,
                    format!(
                        "path emitted twice: {}..{} and {}..{}",
                        first.start, first.end, node.start, node.end
                    ),
                )
                .at_path(&node.path)
                .at_offset(node.start),
            );
        } else {
            seen.insert(node.path.as_str(), node);
        }
    }
}

fn check_offsets(text: &str, nodes: &[ProvisionNode], warnings: &mut Vec<Warning>) {
    for node in nodes {
        let in_bounds = node.start <= node.end
            && node.end <= text.len()
            && text.is_char_boundary(node.start)
            && text.is_char_boundary(node.end);
        if !in_bounds {
            warnings.push(
                Warning::new(
                    WarningCode::OffsetMismatch,
                    format!("offsets {}..{} do not slice the text", node.start, node.end),
                )
                .at_path(&node.path)
                .at_offset(node.start),
            );
            continue;
        }
        if let Some(raw) = &node.raw_text
            && text[node.start..node.end] != **raw
        {
            warnings.push(
                Warning::new(
                    WarningCode::OffsetMismatch,
                    "stored raw text differs from the text at its offsets",
                )
                .at_path(&node.path)
                .at_offset(node.start),
            );
        }
    }
}

fn check_containment(nodes: &[ProvisionNode], warnings: &mut Vec<Warning>) {
    let by_path: HashMap<&str, &ProvisionNode> =
        nodes.iter().rev().map(|n| (n.path.as_str(), n)).collect();
    for node in nodes.iter().filter(|n| n.is_content()) {
        let Some(parent) = node.parent_path.as_deref().and_then(|p| by_path.get(p)) else {
            continue;
        };
        if parent.is_content() && (node.start < parent.start || node.end > parent.end) {
            warnings.push(
                Warning::new(
                    WarningCode::ChildOutsideParent,
                    format!(
                        "{}..{} lies outside parent {} at {}..{}",
                        node.start, node.end, parent.path, parent.start, parent.end
                    ),
                )
                .at_path(&node.path)
                .at_offset(node.start),
            );
        }
    }
}

fn siblings(nodes: &[ProvisionNode]) -> BTreeMap<&str, Vec<&ProvisionNode>> {
    let mut groups: BTreeMap<&str, Vec<&ProvisionNode>> = BTreeMap::new();
    for node in nodes {
        if let Some(parent) = node.parent_path.as_deref() {
            groups.entry(parent).or_default().push(node);
        }
    }
    groups
}

fn check_order(nodes: &[ProvisionNode], warnings: &mut Vec<Warning>) {
    for (parent, children) in siblings(nodes) {
        let mut indices: Vec<u32> = children.iter().map(|n| n.order_index).collect();
        indices.sort_unstable();
        let before = indices.len();
        indices.dedup();
        if indices.len() != before {
            warnings.push(
                Warning::new(
                    WarningCode::DuplicateOrderIndex,
                    format!("{} children share an order index", before - indices.len() + 1),
                )
                .at_path(parent),
            );
        }
        if indices.iter().enumerate().any(|(i, &v)| v as usize != i) {
            warnings.push(
                Warning::new(
                    WarningCode::NonContiguousOrder,
                    "sibling order indices are not contiguous from 0",
                )
                .at_path(parent),
            );
        }
    }
}

fn check_sibling_overlap(nodes: &[ProvisionNode], warnings: &mut Vec<Warning>) {
    for (_, children) in siblings(nodes) {
        let mut content: Vec<&ProvisionNode> =
            children.into_iter().filter(|n| n.is_content()).collect();
        content.sort_by_key(|n| (n.start, n.end));
        for pair in content.windows(2) {
            if pair[0].end > pair[1].start {
                warnings.push(
                    Warning::new(
                        WarningCode::SiblingOverlap,
                        format!("overlaps sibling {} ending at {}", pair[0].path, pair[0].end),
                    )
                    .at_path(&pair[1].path)
                    .at_offset(pair[1].start),
                );
            }
        }
    }
}
