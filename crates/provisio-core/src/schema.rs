//! Arrow schema definitions for parse and consolidation output.
//!
//! A columnar storage collaborator ingests these batches directly; the CLI
//! writes them as Arrow IPC files.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, StringArray, UInt32Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::directive::AmendmentDirective;
use crate::error::CoreError;
use crate::node::ProvisionNode;
use crate::snapshot::ProvenanceSpan;

/// Schema for provision nodes of one parse result or snapshot.
pub fn provision_node_schema() -> Schema {
    Schema::new(vec![
        Field::new("owner_id", DataType::Utf8, false),
        Field::new("node_type", DataType::Utf8, false),
        Field::new("path", DataType::Utf8, false),
        Field::new("parent_path", DataType::Utf8, true),
        Field::new("label", DataType::Utf8, false),
        Field::new("order_index", DataType::UInt32, false),
        Field::new("depth", DataType::UInt32, false),
        Field::new("start_offset", DataType::UInt64, false),
        Field::new("end_offset", DataType::UInt64, false),
        Field::new("is_container", DataType::Boolean, false),
        Field::new("raw_text", DataType::Utf8, true),
    ])
}

/// Schema for extracted amendment directives.
pub fn directive_schema() -> Schema {
    Schema::new(vec![
        Field::new("source_document_id", DataType::Utf8, false),
        Field::new("source_start", DataType::UInt64, false),
        Field::new("source_end", DataType::UInt64, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("target_path", DataType::Utf8, false),
        Field::new("new_text", DataType::Utf8, true),
        Field::new("search_text", DataType::Utf8, true),
        Field::new("replace_text", DataType::Utf8, true),
        Field::new("new_path", DataType::Utf8, true),
        Field::new("confidence", DataType::Utf8, false),
        Field::new("reviewed", DataType::Boolean, false),
    ])
}

/// Schema for provenance spans of one snapshot.
pub fn provenance_schema() -> Schema {
    Schema::new(vec![
        Field::new("snapshot_id", DataType::Utf8, false),
        Field::new("node_path", DataType::Utf8, false),
        Field::new("start_offset", DataType::UInt64, false),
        Field::new("end_offset", DataType::UInt64, false),
        Field::new("source_document_id", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, true),
        Field::new("source_start", DataType::UInt64, true),
        Field::new("source_end", DataType::UInt64, true),
        Field::new("change_kind", DataType::Utf8, false),
        Field::new("amended_by", DataType::Utf8, true),
        Field::new("previous_text", DataType::Utf8, true),
    ])
}

pub fn nodes_to_batch(owner_id: &str, nodes: &[ProvisionNode]) -> Result<RecordBatch, CoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![owner_id; nodes.len()])),
        Arc::new(StringArray::from_iter_values(
            nodes.iter().map(|n| n.node_type.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(nodes.iter().map(|n| n.path.as_str()))),
        Arc::new(StringArray::from(
            nodes.iter().map(|n| n.parent_path.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(nodes.iter().map(|n| n.label.as_str()))),
        Arc::new(UInt32Array::from_iter_values(nodes.iter().map(|n| n.order_index))),
        Arc::new(UInt32Array::from_iter_values(nodes.iter().map(|n| n.depth))),
        Arc::new(UInt64Array::from_iter_values(nodes.iter().map(|n| n.start as u64))),
        Arc::new(UInt64Array::from_iter_values(nodes.iter().map(|n| n.end as u64))),
        Arc::new(BooleanArray::from(
            nodes.iter().map(|n| n.is_container).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            nodes.iter().map(|n| n.raw_text.as_deref()).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(provision_node_schema()),
        columns,
    )?)
}

pub fn directives_to_batch(directives: &[AmendmentDirective]) -> Result<RecordBatch, CoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            directives.iter().map(|d| d.source_document_id.as_str()),
        )),
        Arc::new(UInt64Array::from_iter_values(
            directives.iter().map(|d| d.source_start as u64),
        )),
        Arc::new(UInt64Array::from_iter_values(
            directives.iter().map(|d| d.source_end as u64),
        )),
        Arc::new(StringArray::from_iter_values(
            directives.iter().map(|d| d.kind.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            directives.iter().map(|d| d.target_path.as_str()),
        )),
        Arc::new(StringArray::from(
            directives.iter().map(|d| d.new_text.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            directives
                .iter()
                .map(|d| d.words.as_ref().map(|w| w.search.as_str()))
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            directives
                .iter()
                .map(|d| d.words.as_ref().map(|w| w.replace.as_str()))
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            directives.iter().map(|d| d.new_path.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(
            directives.iter().map(|d| d.confidence.as_str()),
        )),
        Arc::new(BooleanArray::from(
            directives.iter().map(|d| d.reviewed).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(Arc::new(directive_schema()), columns)?)
}

pub fn provenance_to_batch(
    snapshot_id: &str,
    spans: &[ProvenanceSpan],
) -> Result<RecordBatch, CoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![snapshot_id; spans.len()])),
        Arc::new(StringArray::from_iter_values(
            spans.iter().map(|s| s.node_path.as_str()),
        )),
        Arc::new(UInt64Array::from_iter_values(spans.iter().map(|s| s.start as u64))),
        Arc::new(UInt64Array::from_iter_values(spans.iter().map(|s| s.end as u64))),
        Arc::new(StringArray::from_iter_values(
            spans.iter().map(|s| s.source_document_id.as_str()),
        )),
        Arc::new(StringArray::from(
            spans.iter().map(|s| s.source_path.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            spans
                .iter()
                .map(|s| s.source_start.map(|v| v as u64))
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            spans
                .iter()
                .map(|s| s.source_end.map(|v| v as u64))
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(
            spans.iter().map(|s| s.change.as_str()),
        )),
        Arc::new(StringArray::from(
            spans.iter().map(|s| s.amended_by.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            spans.iter().map(|s| s.previous_text.as_deref()).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(Arc::new(provenance_schema()), columns)?)
}
