//! Vertical card display for parse results, directives and snapshots.
//!
//! Each record renders as a `=== id ===` header followed by grouped
//! sections of aligned `name value` rows. Empty sections are skipped.

use std::fmt::Display;

use arrow::record_batch::RecordBatch;
use provisio_consolidate::Consolidation;
use provisio_core::{AmendmentDirective, ConsolidatedSnapshot, UnparsedSegment, Warning};
use provisio_parse::{Extraction, ParseOutput};

const MAX_LIST_ITEMS: usize = 10;
const EXCERPT_CHARS: usize = 60;

// ── Public API ──

/// Print a parse result as a card grouped by section.
pub fn print_parse_card(out: &ParseOutput) {
    let r = &out.result;
    let m = &r.metadata;
    println!("=== {} ===", r.document_id);
    if let Some(title) = &m.title {
        println!("{title}");
    }
    println!();

    print_section(
        "Identity",
        &[
            row("result_id", Some(&r.id)),
            row("parser", Some(&r.parser.parser_id)),
            row("parser_version", Some(&r.parser.version)),
            row("config_fingerprint", Some(short(&r.parser.config_fingerprint))),
            row("content_hash", Some(short(&r.content_hash))),
        ],
    );
    print_section(
        "Metadata",
        &[
            row("instrument_kind", m.instrument_kind.as_ref()),
            row("issue_number", m.issue_number.as_ref()),
            row("item_number", m.item_number.as_ref()),
            row("publication_date", m.publication_date.as_ref()),
            row("effective_date", m.effective_date.as_ref()),
        ],
    );
    let coverage = format!("{} chars ({}%)", r.coverage.chars, r.coverage.percent);
    print_section(
        "Structure",
        &[
            row("status", Some(&r.status)),
            row("nodes", Some(&r.node_count)),
            row("max_depth", Some(&r.max_depth)),
            row("text_length", Some(&r.text_length)),
            row("coverage", Some(&coverage)),
        ],
    );
    let counts: Vec<_> = r
        .type_counts
        .iter()
        .map(|(name, count)| row(name, Some(count)))
        .collect();
    print_section("Node Types", &counts);

    print_warnings(&r.warnings);
    print_unparsed(&r.unparsed);
}

/// Print the directives extracted from one amending document.
pub fn print_extraction(document_id: &str, extraction: &Extraction) {
    println!("=== {document_id} ===");
    println!(
        "{} directives, {} unparsed",
        extraction.directives.len(),
        extraction.unparsed.len()
    );
    println!();
    for (i, d) in extraction.directives.iter().enumerate() {
        print_directive(i, d);
    }
    if !extraction.directives.is_empty() {
        println!();
    }
    print_unparsed(&extraction.unparsed);
}

/// Print a consolidation run: snapshot summary, failures and tombstones.
pub fn print_consolidation_card(run: &Consolidation, show_text: bool) {
    let s = &run.snapshot;
    println!("=== {} ===", s.document_id);
    println!();
    print_snapshot_rows(s);

    if !run.failures.is_empty() {
        println!("Failures ({})", run.failures.len());
        for f in run.failures.iter().take(MAX_LIST_ITEMS) {
            println!(
                "  {}#{:<4} {:<10} {:<30} {}",
                f.amendment_document_id,
                f.directive_index,
                f.kind.as_str(),
                f.target_path,
                f.reason
            );
            println!("      {}", f.message);
        }
        more(run.failures.len());
        println!();
    }

    if !run.tombstones.is_empty() {
        println!("Tombstones ({})", run.tombstones.len());
        for t in run.tombstones.iter().take(MAX_LIST_ITEMS) {
            println!("    {:<30}  deleted by {}", t.path, t.deleted_by);
            let excerpt = excerpt(&t.previous_text);
            if !excerpt.is_empty() {
                println!("      {excerpt}");
            }
        }
        more(run.tombstones.len());
        println!();
    }

    print_warnings(&run.warnings);

    if show_text {
        println!("Text");
        println!("{}", s.text);
        println!();
    }
}

/// Print the identity, window and statistics rows of a snapshot.
pub fn print_snapshot_rows(s: &ConsolidatedSnapshot) {
    let until = s
        .valid_until
        .map(|d| d.to_string())
        .unwrap_or_else(|| "open".to_string());
    print_section(
        "Snapshot",
        &[
            row("snapshot_id", Some(&s.id)),
            row("status", Some(&s.status)),
            row("effective_date", Some(&s.effective_date)),
            row("valid_from", Some(&s.valid_from)),
            row("valid_until", Some(&until)),
            row("contributing_documents", Some(&s.contributing_documents.join(", "))),
        ],
    );
    let coverage = format!("{} chars ({}%)", s.coverage.chars, s.coverage.percent);
    print_section(
        "Statistics",
        &[
            row("nodes", Some(&s.node_count)),
            row("articles", Some(&s.article_count)),
            row("tombstones", Some(&s.tombstone_count)),
            row("coverage", Some(&coverage)),
            row("content_hash", Some(short(&s.content_hash))),
            row("tree_hash", Some(short(&s.tree_hash))),
            row("fingerprint", Some(short(&s.fingerprint))),
        ],
    );
}

/// Print Arrow batches as a table.
pub fn print_table(batches: &[RecordBatch]) -> anyhow::Result<()> {
    if batches.iter().all(|b| b.num_rows() == 0) {
        println!("(no rows)");
        return Ok(());
    }
    arrow::util::pretty::print_batches(batches)?;
    Ok(())
}

// ── Section rendering ──

type Row = (String, Option<String>);

fn row(name: &str, value: Option<&(impl Display + ?Sized)>) -> Row {
    (name.to_string(), value.map(|v| v.to_string()))
}

fn print_section(header: &str, rows: &[Row]) {
    if rows.iter().all(|(_, v)| v.is_none()) {
        return;
    }
    println!("{header}");
    for (name, value) in rows {
        if let Some(value) = value {
            println!("  {:<26} {}", name, value);
        }
    }
    println!();
}

fn print_directive(index: usize, d: &AmendmentDirective) {
    print!("  {:>3}  {:<10} {:<36}", index, d.kind.as_str(), d.target_path);
    print!("  [{}]", d.confidence);
    if let Some(new_path) = &d.new_path {
        print!("  -> {new_path}");
    }
    println!();
    if let Some(words) = &d.words {
        println!("       '{}' -> '{}'", words.search, words.replace);
    }
    if let Some(text) = &d.new_text {
        println!("       {}", excerpt(text));
    }
}

fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("Warnings ({})", warnings.len());
    for w in warnings.iter().take(MAX_LIST_ITEMS) {
        print!("    {:<24}", w.code.as_str());
        if let Some(path) = &w.path {
            print!("  {path}");
        }
        if let Some(offset) = w.offset {
            print!("  @{offset}");
        }
        println!();
        println!("      {}", w.message);
    }
    more(warnings.len());
    println!();
}

fn print_unparsed(segments: &[UnparsedSegment]) {
    if segments.is_empty() {
        return;
    }
    println!("Unparsed ({})", segments.len());
    for u in segments.iter().take(MAX_LIST_ITEMS) {
        println!("    {}..{}  {}", u.start, u.end, u.reason);
        println!("      {}", excerpt(&u.text));
    }
    more(segments.len());
    println!();
}

fn more(len: usize) {
    if len > MAX_LIST_ITEMS {
        println!("    ... and {} more", len - MAX_LIST_ITEMS);
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// First line of `text`, cut to a fixed number of characters.
fn excerpt(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() > EXCERPT_CHARS {
        let cut: String = line.chars().take(EXCERPT_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_takes_first_nonblank_line() {
        assert_eq!(excerpt("\n  Article 2  \nmore"), "Article 2");
        let long = "x".repeat(100);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn short_hash_is_char_safe() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
    }

    #[test]
    fn rows_skip_missing_values() {
        let none: Option<&String> = None;
        assert_eq!(row("a", none), ("a".to_string(), None));
        assert_eq!(row("b", Some(&3)), ("b".to_string(), Some("3".to_string())));
    }
}
