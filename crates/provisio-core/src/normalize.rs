//! Text normaliser: markup or extracted text → one canonical text buffer.
//!
//! The output is deterministic and idempotent: normalising already
//! normalised text (as [`ContentClass::Text`]) is a no-op.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NormalizerConfig;
use crate::error::CoreError;
use crate::hash::sha256_hex;

/// Elements whose content is never legal text.
static DROPPED_ELEMENTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["script", "style", "noscript", "template"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("valid dropped element regex")
        })
        .collect()
});

static COMMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

/// Boundary between two adjacent table cells.
static CELL_BOUNDARY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</t[dh]\s*>\s*<t[dh]\b[^>]*>").expect("valid cell boundary regex")
});

static LINE_BREAK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break regex"));

static BLOCK_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|li|ul|ol|tr|h[1-6]|table|thead|tbody|tfoot|section|article|blockquote|title|header|footer|dl|dt|dd|hr|pre|caption)\b[^>]*>",
    )
    .expect("valid block tag regex")
});

static ANY_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid entity regex")
});

/// Kind of content handed to the normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    Html,
    Text,
}

impl ContentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ContentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" | "xhtml" => Ok(Self::Html),
            "text" | "txt" | "plain" => Ok(Self::Text),
            other => Err(CoreError::UnsupportedContentClass(other.to_string())),
        }
    }
}

/// Canonical text plus its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub text: String,
    pub content_hash: String,
}

/// Normalise raw content into the canonical text buffer.
///
/// The output is always plain text. Normalising it again must use
/// [`ContentClass::Text`]: decoded entities such as `&lt;x&gt;` come out as
/// `<x>`, which the HTML class would strip as a tag.
pub fn normalize(raw: &str, class: ContentClass, config: &NormalizerConfig) -> NormalizedText {
    let flattened: Cow<'_, str> = match class {
        ContentClass::Html => Cow::Owned(html_to_text(raw, BreakStyle::Newline)),
        ContentClass::Text => Cow::Borrowed(raw),
    };
    let text = normalize_whitespace(&flattened, config.max_blank_lines);
    let content_hash = sha256_hex(text.as_bytes());
    debug!(class = %class, raw_bytes = raw.len(), bytes = text.len(), "normalized");
    NormalizedText { text, content_hash }
}

/// Split raw content into the text blocks the tree parser walks.
///
/// For text input the blocks are the non-empty lines of the normalised
/// text. For HTML they are the block elements' own text with inner
/// whitespace collapsed, so a `<br>` inside a paragraph yields one block
/// although the normalised text carries a line break there.
pub fn extract_blocks(raw: &str, class: ContentClass, config: &NormalizerConfig) -> Vec<String> {
    match class {
        ContentClass::Text => normalize_whitespace(raw, config.max_blank_lines)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        ContentClass::Html => html_to_text(raw, BreakStyle::Space)
            .split('\n')
            .map(collapse_horizontal)
            .filter(|l| !l.is_empty())
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakStyle {
    Newline,
    Space,
}

fn html_to_text(raw: &str, breaks: BreakStyle) -> String {
    let mut html = COMMENT_REGEX.replace_all(raw, "").into_owned();
    for re in DROPPED_ELEMENTS.iter() {
        html = re.replace_all(&html, "").into_owned();
    }
    let html = CELL_BOUNDARY_REGEX.replace_all(&html, " | ");
    let br = match breaks {
        BreakStyle::Newline => "\n",
        BreakStyle::Space => " ",
    };
    let html = LINE_BREAK_REGEX.replace_all(&html, br);
    let html = BLOCK_TAG_REGEX.replace_all(&html, "\n");
    let html = ANY_TAG_REGEX.replace_all(&html, "");
    decode_entities(&html).into_owned()
}

/// Decode named and numeric character references.
///
/// Unknown references are left untouched.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    ENTITY_REGEX.replace_all(s, |caps: &Captures<'_>| {
        let name = &caps[1];
        let decoded = if let Some(num) = name.strip_prefix('#') {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32).map(String::from)
        } else {
            named_entity(name).map(str::to_string)
        };
        decoded.unwrap_or_else(|| caps[0].to_string())
    })
}

fn named_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "hellip" => "\u{2026}",
        "sect" => "\u{a7}",
        "para" => "\u{b6}",
        "euro" => "\u{20ac}",
        "copy" => "\u{a9}",
        "deg" => "\u{b0}",
        "shy" => "",
        _ => return None,
    })
}

/// Whitespace stage shared by all content classes.
///
/// Unifies line endings, collapses horizontal whitespace runs to one space,
/// trims every line, caps runs of blank lines at `max_blank_lines` and drops
/// leading and trailing blank lines.
pub fn normalize_whitespace(text: &str, max_blank_lines: usize) -> String {
    let unified = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    let mut started = false;

    for line in unified.split(['\n', '\r']).map(collapse_horizontal) {
        if line.is_empty() {
            if started {
                blank_run += 1;
            }
            continue;
        }
        if started {
            out.push('\n');
            for _ in 0..blank_run.min(max_blank_lines) {
                out.push('\n');
            }
        }
        blank_run = 0;
        started = true;
        out.push_str(&line);
    }
    out
}

fn collapse_horizontal(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_space = false;
    for c in line.chars() {
        if is_invisible(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{ad}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NormalizerConfig {
        NormalizerConfig::default()
    }

    #[test]
    fn content_class_parsing() {
        assert_eq!("HTML".parse::<ContentClass>().unwrap(), ContentClass::Html);
        assert_eq!("text".parse::<ContentClass>().unwrap(), ContentClass::Text);
        assert!(matches!(
            "pdf".parse::<ContentClass>(),
            Err(CoreError::UnsupportedContentClass(c)) if c == "pdf"
        ));
    }

    #[test]
    fn collapses_whitespace_and_caps_blank_lines() {
        let raw = "  Article 1.\t\t Scope \r\n\r\n\r\n\r\n(1)  This\u{a0}Regulation applies.\n\n\n";
        let n = normalize(raw, ContentClass::Text, &cfg());
        assert_eq!(n.text, "Article 1. Scope\n\n(1) This Regulation applies.");
    }

    #[test]
    fn idempotent_on_text() {
        let raw = "\n\n Title \n\n\n\nArticle 1\n  (1)   a  b \n\n\n(2) c\u{200b}d\n";
        let once = normalize(raw, ContentClass::Text, &cfg());
        let twice = normalize(&once.text, ContentClass::Text, &cfg());
        assert_eq!(once, twice);
    }

    #[test]
    fn idempotent_after_html() {
        let raw = "<p>Article&nbsp;1</p><p>Rate &amp; tax</p>";
        let once = normalize(raw, ContentClass::Html, &cfg());
        let twice = normalize(&once.text, ContentClass::Text, &cfg());
        assert_eq!(once.text, twice.text);
        assert_eq!(once.content_hash, twice.content_hash);
    }

    #[test]
    fn decoded_markup_survives_renormalizing_as_text() {
        let raw = "<p>Use &lt;x&gt; here</p>";
        let once = normalize(raw, ContentClass::Html, &cfg());
        assert_eq!(once.text, "Use <x> here");
        let twice = normalize(&once.text, ContentClass::Text, &cfg());
        assert_eq!(twice, once);
    }

    #[test]
    fn html_strips_non_content() {
        let raw = r#"<html><head><style>p { color: red }</style><script>var x = "<p>";</script></head>
<body><!-- hidden --><h1>REGULATION (EU) 2016/679</h1>
<p class="ti-art">Article 1</p><p>Rate is <b>20%</b>.<br/>Second line</p>
<table><tr><td>A</td><td>B</td></tr></table></body></html>"#;
        let n = normalize(raw, ContentClass::Html, &cfg());
        assert_eq!(
            n.text,
            "REGULATION (EU) 2016/679\n\nArticle 1\n\nRate is 20%.\nSecond line\n\nA | B"
        );
        assert!(!n.text.contains("color"));
        assert!(!n.text.contains("hidden"));
    }

    #[test]
    fn html_blocks_keep_br_inline() {
        let raw = "<p>Article 1</p><p>Rate is 20%.<br>Second line</p>";
        let blocks = extract_blocks(raw, ContentClass::Html, &cfg());
        assert_eq!(blocks, vec!["Article 1", "Rate is 20%. Second line"]);
    }

    #[test]
    fn text_blocks_are_lines() {
        let blocks = extract_blocks("Article 1.\n\nRate is 20%.", ContentClass::Text, &cfg());
        assert_eq!(blocks, vec!["Article 1.", "Rate is 20%."]);
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(decode_entities("&#8216;x&#x2019; &sect;3 &bogus;"), "\u{2018}x\u{2019} \u{a7}3 &bogus;");
    }

    #[test]
    fn hash_changes_with_content() {
        let a = normalize("Rate is 20%.", ContentClass::Text, &cfg());
        let b = normalize("Rate is 25%.", ContentClass::Text, &cfg());
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }
}
