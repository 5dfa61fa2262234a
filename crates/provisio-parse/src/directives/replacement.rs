//! Replacement text capture: quoted blocks, same-line text, and blocks
//! inferred from the unquoted lines that follow an instruction.

use std::sync::LazyLock;

use provisio_core::{Confidence, ExtractorConfig};
use regex::Regex;

use super::clause::Line;

const OPEN_QUOTES: [char; 5] = ['\'', '\u{2018}', '"', '\u{201c}', '\u{ab}'];
const CLOSE_QUOTES: [char; 5] = ['\'', '\u{2019}', '"', '\u{201d}', '\u{bb}'];

/// Punctuation the amending act puts after a closing quote.
const TRAILERS: [&str; 5] = ["; and", "; or", ";", ".", ","];

/// Lines that end the enacting terms of an amending act.
static TERMINATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:This\s+(?:Regulation|Directive|Decision|Act|Law|Decree|Order)\s+shall\b|Done\s+at\b|For\s+the\s+(?:European\s+Parliament|Council|Commission)\b)",
    )
    .expect("valid terminator regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Replacement {
    pub text: String,
    /// End offset of the last consumed line.
    pub end: usize,
    /// Index of the first line after the replacement.
    pub next_line: usize,
    pub confidence: Confidence,
}

pub(crate) fn is_terminator(line: &str) -> bool {
    TERMINATOR_REGEX.is_match(line.trim())
}

fn starts_with_open_quote(s: &str) -> bool {
    s.trim_start().starts_with(OPEN_QUOTES)
}

fn strip_trailers(s: &str) -> &str {
    let mut s = s.trim_end();
    while let Some(t) = TRAILERS.iter().find(|t| s.ends_with(**t)) {
        s = s[..s.len() - t.len()].trim_end();
    }
    s
}

/// Replacement text for the instruction on `lines[line_idx]`.
///
/// Same-line text wins, then a quoted block on the following lines, then
/// an inferred block when the configuration allows it.
pub(crate) fn take_replacement(
    text: &str,
    lines: &[Line<'_>],
    line_idx: usize,
    inline_start: Option<usize>,
    config: &ExtractorConfig,
    is_instruction: impl Fn(Line<'_>) -> bool,
) -> Option<Replacement> {
    if let Some(start) = inline_start {
        let line = lines[line_idx];
        let inline = &text[start..line.end];
        if starts_with_open_quote(inline) {
            let open = start + (inline.len() - inline.trim_start().len());
            if let Some(quoted) = quoted_block(text, lines, line_idx, open) {
                return Some(quoted);
            }
        }
        return Some(Replacement {
            text: inline.trim().to_string(),
            end: line.end,
            next_line: line_idx + 1,
            confidence: Confidence::Medium,
        });
    }

    let next = (line_idx + 1..lines.len()).find(|&i| !lines[i].is_blank())?;
    let first = lines[next];
    if starts_with_open_quote(first.text) {
        let open = first.start + (first.text.len() - first.text.trim_start().len());
        if let Some(quoted) = quoted_block(text, lines, next, open) {
            return Some(quoted);
        }
    }
    if !config.allow_inferred_text {
        return None;
    }
    infer_block(text, lines, next, config.max_inferred_lines, is_instruction)
}

/// Text between the quote at `open` and the first closing quote that ends
/// a line once trailing punctuation is stripped.
fn quoted_block(text: &str, lines: &[Line<'_>], line_idx: usize, open: usize) -> Option<Replacement> {
    let quote = text[open..].chars().next()?;
    let body_start = open + quote.len_utf8();
    for (k, line) in lines.iter().enumerate().skip(line_idx) {
        let seg_start = line.start.max(body_start);
        if seg_start > line.end {
            continue;
        }
        let segment = strip_trailers(&text[seg_start..line.end]);
        if let Some(c) = segment.chars().last()
            && CLOSE_QUOTES.contains(&c)
        {
            let close = seg_start + segment.len() - c.len_utf8();
            return Some(Replacement {
                text: text[body_start..close].trim().to_string(),
                end: line.end,
                next_line: k + 1,
                confidence: Confidence::High,
            });
        }
    }
    None
}

/// Unquoted lines up to the next instruction or terminator. Single blank
/// lines between them are part of the block.
fn infer_block(
    text: &str,
    lines: &[Line<'_>],
    first: usize,
    max_lines: usize,
    is_instruction: impl Fn(Line<'_>) -> bool,
) -> Option<Replacement> {
    let mut taken = 0;
    let mut last = None;
    let mut truncated = false;
    let mut k = first;
    while k < lines.len() {
        let line = lines[k];
        if line.is_blank() {
            if lines.get(k + 1).is_some_and(|l| !l.is_blank()) {
                k += 1;
                continue;
            }
            break;
        }
        if is_instruction(line) || is_terminator(line.text) {
            break;
        }
        if taken == max_lines {
            truncated = true;
            break;
        }
        taken += 1;
        last = Some(k);
        k += 1;
    }
    let last = last?;
    Some(Replacement {
        text: text[lines[first].start..lines[last].end].trim().to_string(),
        end: lines[last].end,
        next_line: last + 1,
        confidence: if truncated {
            Confidence::Low
        } else {
            Confidence::Medium
        },
    })
}
