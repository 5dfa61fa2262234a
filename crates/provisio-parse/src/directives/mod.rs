//! Amendment directive extraction.
//!
//! Reads the normalized text of an amending document line by line and
//! turns each recognized instruction into an [`AmendmentDirective`] with
//! its source span, target path, replacement text and confidence tier.
//! Instruction-like lines that no recognizer can resolve are reported as
//! unparsed segments instead of being dropped.

mod clause;
mod recognizers;
mod replacement;

use provisio_core::path::{Level, ROOT_PATH, child_path, last_segment, parent_path};
use provisio_core::{AmendmentDirective, Confidence, DirectiveKind, ExtractorConfig, UnparsedSegment};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ParseError;
use crate::markers::{match_article, match_paragraph, match_point};
use clause::{Clause, Line, Reference, split_lines};
use recognizers::{Draft, RECOGNIZERS, looks_like_instruction};
use replacement::take_replacement;

/// Directives and leftovers from one amending document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    /// Ordered by source offset.
    pub directives: Vec<AmendmentDirective>,
    pub unparsed: Vec<UnparsedSegment>,
}

/// Matches instruction verbs from the configured keyword list.
struct KeywordMatcher(Option<Regex>);

impl KeywordMatcher {
    fn new(keywords: &[String]) -> Result<Self, ParseError> {
        let words: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if words.is_empty() {
            return Ok(Self(None));
        }
        let pattern = format!(
            r"(?i)\b(?:is|are|shall\s+be)\s+(?:hereby\s+)?(?:{})\b",
            words.join("|")
        );
        Ok(Self(Some(Regex::new(&pattern)?)))
    }

    fn is_match(&self, body: &str) -> bool {
        self.0.as_ref().is_some_and(|re| re.is_match(body))
    }
}

fn unparsed(line: Line<'_>, reason: &str) -> UnparsedSegment {
    UnparsedSegment {
        start: line.start,
        end: line.end,
        text: line.text.to_string(),
        reason: reason.to_string(),
    }
}

/// Extract amendment directives from an amending document's text.
pub fn extract_directives(
    document_id: &str,
    text: &str,
    config: &ExtractorConfig,
) -> Result<Extraction, ParseError> {
    if document_id.trim().is_empty() {
        return Err(ParseError::EmptyDocumentId);
    }
    let keywords = KeywordMatcher::new(&config.strong_keywords)?;
    let lines = split_lines(text);
    let is_instruction = |line: Line<'_>| {
        let clause = Clause::prepare(line, None);
        clause.context_change().is_some()
            || looks_like_instruction(clause.body)
            || keywords.is_match(clause.body)
    };

    let mut context: Option<Reference> = None;
    let mut out = Extraction::default();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.is_blank() {
            i += 1;
            continue;
        }
        let clause = Clause::prepare(line, context.as_ref());
        if let Some(next) = clause.context_change() {
            debug!(line = i, context = ?next.as_ref().map(Reference::path), "amendment context");
            context = next;
            i += 1;
            continue;
        }

        let Some(draft) = RECOGNIZERS.iter().find_map(|r| r(&clause)) else {
            if keywords.is_match(clause.body) || looks_like_instruction(clause.body) {
                out.unparsed.push(unparsed(clause.line, "instruction without a resolvable target"));
            }
            i += 1;
            continue;
        };

        if !draft.kind.needs_text() {
            out.directives.push(assemble(document_id, clause.line.start, clause.line.end, draft, None, Confidence::High));
            i += 1;
            continue;
        }

        match take_replacement(text, &lines, i, draft.inline_start, config, is_instruction) {
            Some(rep) => {
                let directive = assemble(
                    document_id,
                    clause.line.start,
                    rep.end,
                    draft,
                    Some(rep.text),
                    rep.confidence,
                );
                out.directives.push(directive);
                i = rep.next_line;
            }
            None => {
                out.unparsed.push(unparsed(clause.line, "instruction without replacement text"));
                i += 1;
            }
        }
    }

    out.directives.sort_by_key(|d| d.source_start);
    info!(
        document_id,
        directives = out.directives.len(),
        unparsed = out.unparsed.len(),
        "directives extracted"
    );
    Ok(out)
}

fn assemble(
    document_id: &str,
    source_start: usize,
    source_end: usize,
    draft: Draft,
    new_text: Option<String>,
    confidence: Confidence,
) -> AmendmentDirective {
    let new_path = draft.new_path.or_else(|| {
        new_text
            .as_deref()
            .and_then(|t| marker_path(draft.kind, &draft.target_path, t))
    });
    AmendmentDirective {
        source_document_id: document_id.to_string(),
        source_start,
        source_end,
        kind: draft.kind,
        target_path: draft.target_path,
        new_text,
        words: draft.words,
        new_path,
        confidence,
        reviewed: false,
    }
}

/// Path of a unit to be created, read from the numbering token on the
/// first line of its text.
fn marker_path(kind: DirectiveKind, target: &str, text: &str) -> Option<String> {
    let mut parent = match kind {
        DirectiveKind::InsertAfter | DirectiveKind::InsertBefore => parent_path(target)?,
        DirectiveKind::AddParagraph | DirectiveKind::AddPoint => target.to_string(),
        _ => return None,
    };
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (level, id) = if let Some(mark) = match_article(first) {
        (Level::Article, mark.id)
    } else if let Some(id) = match_paragraph(first) {
        (Level::Paragraph, id)
    } else if let Some(id) = match_point(first).and_then(|p| p.id) {
        (Level::Point, id)
    } else {
        return None;
    };
    while let Some(seg) = last_segment(&parent)
        && seg.level >= level
    {
        parent = parent_path(&parent).unwrap_or_else(|| ROOT_PATH.to_string());
    }
    Some(child_path(&parent, level, &id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Extraction {
        extract_directives("amending", text, &ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn empty_document_id_is_rejected() {
        assert!(matches!(
            extract_directives(" ", "Article 1 is deleted.", &ExtractorConfig::default()),
            Err(ParseError::EmptyDocumentId)
        ));
    }

    #[test]
    fn single_deletion() {
        let out = extract("Article 8. is deleted.");
        assert_eq!(out.directives.len(), 1);
        let d = &out.directives[0];
        assert_eq!((d.kind, d.target_path.as_str()), (DirectiveKind::Delete, "/article:8"));
        assert_eq!((d.source_start, d.source_end), (0, 22));
        assert_eq!(d.confidence, Confidence::High);
        assert!(out.unparsed.is_empty());
    }

    #[test]
    fn json_uses_snake_case_codes() {
        let out = extract("Article 8. is deleted.");
        let json = serde_json::to_value(&out).unwrap();
        let d = &json["directives"][0];
        assert_eq!(d["kind"], "delete");
        assert_eq!(d["confidence"], "high");
        assert_eq!(d["target_path"], "/article:8");
        assert_eq!(d["reviewed"], false);
    }

    #[test]
    fn context_block_with_quoted_replacement() {
        let text = "Regulation (EU) 2020/1 is amended as follows:\n\n(1) Article 3 is amended as follows:\n\n(a) paragraph 2 is replaced by the following:\n\n\u{2018}2. Rate is 25%.\u{2019};\n\n(b) paragraph 4 is deleted;\n\n(2) Article 7 is repealed.";
        let out = extract(text);
        let summary: Vec<(DirectiveKind, &str)> = out
            .directives
            .iter()
            .map(|d| (d.kind, d.target_path.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (DirectiveKind::ReplaceParagraph, "/article:3/paragraph:2"),
                (DirectiveKind::Delete, "/article:3/paragraph:4"),
                (DirectiveKind::Delete, "/article:7"),
            ]
        );
        let replace = &out.directives[0];
        assert_eq!(replace.new_text.as_deref(), Some("2. Rate is 25%."));
        assert_eq!(replace.confidence, Confidence::High);
        assert_eq!(&text[replace.source_start..replace.source_start + 3], "(a)");
    }

    #[test]
    fn insertion_derives_path_from_text() {
        let text = "The following Article is inserted after Article 5:\n\u{2018}Article 5a\nReporting\nMember States shall report annually.\u{2019}";
        let out = extract(text);
        let d = &out.directives[0];
        assert_eq!(d.kind, DirectiveKind::InsertAfter);
        assert_eq!(d.target_path, "/article:5");
        assert_eq!(d.new_path.as_deref(), Some("/article:5a"));
        assert!(d.new_text.as_deref().unwrap().ends_with("annually."));
    }

    #[test]
    fn inferred_text_and_word_substitution() {
        let text = "(1) Article 2 is replaced by the following:\nArticle 2\nScope is wide.\n(2) in Article 4, the words \"20%\" are replaced by \"25%\".";
        let out = extract(text);
        assert_eq!(out.directives.len(), 2);
        assert_eq!(out.directives[0].new_text.as_deref(), Some("Article 2\nScope is wide."));
        assert_eq!(out.directives[0].confidence, Confidence::Medium);
        let words = out.directives[1].words.as_ref().unwrap();
        assert_eq!((words.search.as_str(), words.replace.as_str()), ("20%", "25%"));
        assert_eq!(out.directives[1].target_path, "/article:4");
    }

    #[test]
    fn unresolvable_instructions_are_reported() {
        let text = "Recital 4 is deleted.\nthe following paragraph is added:\nArticle 9 is replaced by the following:";
        let out = extract(text);
        assert!(out.directives.is_empty());
        let reasons: Vec<&str> = out.unparsed.iter().map(|u| u.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "instruction without a resolvable target",
                "instruction without a resolvable target",
                "instruction without replacement text",
            ]
        );
        assert_eq!(out.unparsed[0].text, "Recital 4 is deleted.");
    }

    #[test]
    fn unparsed_segments_cover_the_whole_source_line() {
        let text = "Article 1 is deleted.\n(2) Recital 4 is deleted.";
        let out = extract(text);
        assert_eq!(out.directives.len(), 1);
        assert_eq!(out.unparsed.len(), 1);
        let segment = &out.unparsed[0];
        assert_eq!((segment.start, segment.end), (22, text.len()));
        assert_eq!(segment.text, "(2) Recital 4 is deleted.");
        assert_eq!(&text[segment.start..segment.end], segment.text);
    }

    #[test]
    fn plain_prose_is_ignored() {
        let out = extract("Whereas:\n\n(1) The rate should be raised.");
        assert_eq!(out, Extraction::default());
    }

    #[test]
    fn marker_paths() {
        assert_eq!(
            marker_path(DirectiveKind::AddPoint, "/article:2/paragraph:1", "(d) new point"),
            Some("/article:2/paragraph:1/point:d".into())
        );
        assert_eq!(
            marker_path(DirectiveKind::AddParagraph, "/article:2/paragraph:1", "(3) More."),
            Some("/article:2/paragraph:3".into())
        );
        assert_eq!(marker_path(DirectiveKind::Delete, "/article:2", "(3) More."), None);
        assert_eq!(
            marker_path(DirectiveKind::AddParagraph, "/article:2/paragraph:1", "More text."),
            None
        );
    }
}
