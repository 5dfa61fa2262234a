//! Provision tree parsing and amendment directive extraction.
//!
//! [`parse`] runs the whole pipeline for one document version: normalize,
//! split into blocks, fold the blocks into a provision tree, validate the
//! tree against its text and read the heading metadata. The run is a pure
//! function of the input and the [`ParserConfig`]; identical inputs give an
//! identical [`ParseResult`] id.

pub mod directives;
pub mod error;
pub mod locate;
pub mod markers;
pub mod metadata;
pub mod segment;
pub mod tree;
pub mod validate;

use std::collections::BTreeMap;

use provisio_core::hash::{digest_records, short_id};
use provisio_core::result::status_for;
use provisio_core::{
    ContentClass, Coverage, NormalizedText, PARSER_ID, ParseResult, ParserConfig, ParserIdentity,
    ProvisionNode, extract_blocks, normalize,
};
use serde::Serialize;
use tracing::info;

pub use directives::{Extraction, extract_directives};
pub use error::ParseError;
pub use segment::{TextSegment, join, segment};
pub use tree::{Tree, build_tree, parse_fragment};
pub use validate::validate;

/// Everything one parse run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutput {
    pub result: ParseResult,
    /// Root first, then document order.
    pub nodes: Vec<ProvisionNode>,
    pub text: NormalizedText,
}

pub fn parser_identity(config: &ParserConfig) -> Result<ParserIdentity, ParseError> {
    Ok(ParserIdentity {
        parser_id: PARSER_ID.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_fingerprint: config.fingerprint()?,
    })
}

/// Parse one document version into a provision tree.
pub fn parse(
    document_id: &str,
    class: ContentClass,
    raw: &str,
    config: &ParserConfig,
) -> Result<ParseOutput, ParseError> {
    if document_id.trim().is_empty() {
        return Err(ParseError::EmptyDocumentId);
    }
    let parser = parser_identity(config)?;
    let normalized = normalize(raw, class, &config.normalizer);
    let blocks = extract_blocks(raw, class, &config.normalizer);

    let tree = build_tree(&normalized.text, &blocks, config);
    let mut warnings = tree.warnings;
    warnings.extend(validate(&normalized.text, &tree.nodes));
    let metadata = metadata::extract_metadata(&normalized.text);

    let mut nodes = tree.nodes;
    if let (Some(root), Some(title)) = (nodes.first_mut(), metadata.title.as_ref()) {
        root.label = title.clone();
    }

    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();
    for node in &nodes {
        *type_counts.entry(node.node_type.as_str().to_string()).or_default() += 1;
    }
    let char_count = normalized.text.chars().count();
    let coverage = coverage(&normalized.text, &nodes);

    let id = short_id(
        "pr",
        &digest_records([
            document_id,
            parser.parser_id.as_str(),
            parser.version.as_str(),
            parser.config_fingerprint.as_str(),
            normalized.content_hash.as_str(),
        ]),
    );
    let result = ParseResult {
        id,
        document_id: document_id.to_string(),
        parser,
        status: status_for(&warnings),
        warnings,
        unparsed: tree.unparsed,
        metadata,
        text_length: normalized.text.len(),
        char_count,
        content_hash: normalized.content_hash.clone(),
        node_count: nodes.len(),
        max_depth: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
        type_counts,
        coverage,
    };
    info!(
        document_id,
        result_id = %result.id,
        status = %result.status.as_str(),
        nodes = result.node_count,
        warnings = result.warnings.len(),
        unparsed = result.unparsed.len(),
        coverage = result.coverage.percent,
        "parsed"
    );
    Ok(ParseOutput {
        result,
        nodes,
        text: normalized,
    })
}

/// Share of the text covered by the union of all content node spans.
pub fn coverage(text: &str, nodes: &[ProvisionNode]) -> Coverage {
    let mut spans: Vec<(usize, usize)> = nodes
        .iter()
        .filter(|n| n.is_content() && n.start < n.end && n.end <= text.len())
        .map(|n| (n.start, n.end))
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    let chars = merged
        .iter()
        .filter_map(|&(s, e)| text.get(s..e))
        .map(|s| s.chars().count())
        .sum();
    Coverage::new(chars, text.chars().count())
}
