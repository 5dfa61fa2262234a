//! Offset resolution: find a block's exact byte range in the normalized text.
//!
//! Three strategies in order: exact search forward from the cursor, exact
//! search in a bounded window around the cursor, then a whitespace-blind
//! search. Every strategy reports offsets into the original text, so
//! `&text[start..end]` is always a valid slice.

/// Which strategy found the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Exact,
    Window,
    Fuzzy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub start: usize,
    pub end: usize,
    pub strategy: Strategy,
}

pub fn locate(text: &str, needle: &str, cursor: usize, window: usize) -> Option<Located> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    let cursor = floor_boundary(text, cursor.min(text.len()));

    if let Some(pos) = text[cursor..].find(needle) {
        let start = cursor + pos;
        return Some(Located {
            start,
            end: start + needle.len(),
            strategy: Strategy::Exact,
        });
    }

    let lo = floor_boundary(text, cursor.saturating_sub(window));
    let hi = ceil_boundary(text, cursor + window + needle.len());
    if let Some(pos) = text[lo..hi].find(needle) {
        let start = lo + pos;
        return Some(Located {
            start,
            end: start + needle.len(),
            strategy: Strategy::Window,
        });
    }

    fuzzy_find(text, needle, lo).map(|(start, end)| Located {
        start,
        end,
        strategy: Strategy::Fuzzy,
    })
}

/// Whitespace-insensitive search from `from` onwards.
///
/// Both sides are compacted by dropping whitespace; a byte map from the
/// compacted haystack back into `text` recovers the original offsets, so
/// the reported range always starts and ends on a char boundary.
fn fuzzy_find(text: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    let compact_needle: String = needle.chars().filter(|c| !c.is_whitespace()).collect();
    if compact_needle.is_empty() {
        return None;
    }

    let mut compact = String::with_capacity(text.len() - from);
    let mut origin: Vec<usize> = Vec::with_capacity(text.len() - from);
    for (i, c) in text[from..].char_indices() {
        if c.is_whitespace() {
            continue;
        }
        compact.push(c);
        for k in 0..c.len_utf8() {
            origin.push(from + i + k);
        }
    }

    let pos = compact.find(&compact_needle)?;
    let last = pos + compact_needle.len() - 1;
    Some((origin[pos], origin[last] + 1))
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, i: usize) -> usize {
    let mut i = i.min(text.len());
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
