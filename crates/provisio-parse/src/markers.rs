//! Recognizers for legal numbering tokens at the start of a text block.
//!
//! Every recognizer is a pure function of the block alone. Which one wins
//! when several match is the tree parser's business, not theirs.

use std::sync::LazyLock;

use provisio_core::Level;
use provisio_core::sort_key::roman_value;
use regex::Regex;

/// Longest heading remainder accepted after an article or container number.
/// Anything longer is running prose that happens to start with a reference.
pub const HEADING_MAX_CHARS: usize = 160;

/// Cell separator the normaliser emits for HTML tables.
pub const CELL_SEPARATOR: &str = " | ";

static ARTICLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:article|art\.)\s*(\d+)([A-Za-z]{0,3})\b\s*[.:\-\u{2013}\u{2014}]?\s*(.*)$")
        .expect("valid article regex")
});

static CONTAINER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:(part|chapter|title|annex))\s+([IVXLCDMivxlcdm]+|\d+[A-Za-z]?)\b\s*[.:\-\u{2013}\u{2014}]?\s*(.*)$")
        .expect("valid container regex")
});

static BARE_ANNEX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ANNEX\.?$").expect("valid annex regex"));

static PARAGRAPH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\((\d+)([a-z]{0,2})\)(?:\s|$)").expect("valid paragraph regex")
});

static LETTER_POINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\(([a-z]{1,2})\)|([a-z]{1,2})\))(?:\s|$)").expect("valid point regex")
});

static NUMBER_POINT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})[.)](?:\s|$)").expect("valid numbered point regex"));

static BULLET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-\u{2013}\u{2014}\u{2022}\u{25cf}\u{25aa}\u{25e6}](?:\s|$)")
        .expect("valid bullet regex")
});

static SUBPOINT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(([ivxlcdm]{1,6})\)(?:\s|$)").expect("valid subpoint regex"));

/// Numbering tokens anywhere in a block; such blocks are never reported
/// as unparsed.
static EMBEDDED_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:article|art\.)\s*\d+|(?:^|\s)\(\d+[a-z]?\)\s|(?:^|\s)\([a-z]\)\s")
        .expect("valid embedded marker regex")
});

/// Article heading: "Article 12a", "Art. 5 - Scope".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleMark {
    /// Lowercased identifier, e.g. "12a".
    pub id: String,
    pub heading: Option<String>,
}

/// Part, chapter, title or annex heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMark {
    pub level: Level,
    /// `None` only for a bare "ANNEX" heading.
    pub id: Option<String>,
    pub heading: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointStyle {
    /// "(a)" or "a)".
    Letter,
    /// "1." or "1)".
    Number,
    /// A bullet glyph; the id is assigned by position.
    Bullet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointMark {
    /// `None` for bullets.
    pub id: Option<String>,
    pub style: PointStyle,
    /// The marker as written, e.g. "(a)".
    pub token: String,
}

fn heading_remainder(rest: &str) -> Option<Option<String>> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(None);
    }
    if rest.chars().count() > HEADING_MAX_CHARS {
        return None;
    }
    // A lowercase continuation reads as prose ("Article 5 shall apply").
    if rest.chars().next().is_some_and(|c| c.is_lowercase()) {
        return None;
    }
    Some(Some(rest.to_string()))
}

pub fn match_article(block: &str) -> Option<ArticleMark> {
    let caps = ARTICLE_REGEX.captures(block.trim())?;
    let heading = heading_remainder(caps.get(3).map_or("", |m| m.as_str()))?;
    let id = format!("{}{}", &caps[1], &caps[2]).to_lowercase();
    Some(ArticleMark { id, heading })
}

pub fn match_container(block: &str) -> Option<ContainerMark> {
    let block = block.trim();
    if BARE_ANNEX_REGEX.is_match(block) {
        return Some(ContainerMark {
            level: Level::Annex,
            id: None,
            heading: None,
        });
    }
    let caps = CONTAINER_REGEX.captures(block)?;
    let level = Level::parse(&caps[1].to_lowercase())?;
    let heading = heading_remainder(caps.get(3).map_or("", |m| m.as_str()))?;
    let raw_id = &caps[2];
    // Roman identifiers keep their case; arabic ones are lowercased.
    let id = if roman_value(raw_id).is_some() {
        raw_id.to_uppercase()
    } else {
        raw_id.to_lowercase()
    };
    Some(ContainerMark {
        level,
        id: Some(id),
        heading,
    })
}

pub fn match_paragraph(block: &str) -> Option<String> {
    let caps = PARAGRAPH_REGEX.captures(block.trim_start())?;
    Some(format!("{}{}", &caps[1], &caps[2]))
}

pub fn match_point(block: &str) -> Option<PointMark> {
    let block = block.trim_start();
    if let Some(caps) = LETTER_POINT_REGEX.captures(block) {
        let id = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
        return Some(PointMark {
            id: Some(id),
            style: PointStyle::Letter,
            token: caps[0].trim_end().to_string(),
        });
    }
    if let Some(caps) = NUMBER_POINT_REGEX.captures(block) {
        return Some(PointMark {
            id: Some(caps[1].to_string()),
            style: PointStyle::Number,
            token: caps[0].trim_end().to_string(),
        });
    }
    BULLET_REGEX.find(block).map(|m| PointMark {
        id: None,
        style: PointStyle::Bullet,
        token: m.as_str().trim_end().to_string(),
    })
}

/// Parenthesised lowercase roman numeral. Whether it is a subpoint or a
/// lettered point ("(i)" after "(h)") depends on the open point.
pub fn match_subpoint(block: &str) -> Option<String> {
    let caps = SUBPOINT_REGEX.captures(block.trim_start())?;
    let id = &caps[1];
    roman_value(id).map(|_| id.to_string())
}

pub fn is_table_row(block: &str) -> bool {
    block.contains(CELL_SEPARATOR)
}

/// True if the block starts with, or embeds, any numbering token.
pub fn contains_marker(block: &str) -> bool {
    match_article(block).is_some()
        || match_container(block).is_some()
        || match_paragraph(block).is_some()
        || match_point(block).is_some()
        || EMBEDDED_MARKER_REGEX.is_match(block)
}

/// The letter that would follow a lettered point id, if it is a single letter.
pub fn next_letter(id: &str) -> Option<char> {
    let mut chars = id.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_lowercase() || c == 'z' {
        return None;
    }
    Some((c as u8 + 1) as char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_variants() {
        assert_eq!(
            match_article("Article 1."),
            Some(ArticleMark {
                id: "1".into(),
                heading: None
            })
        );
        let m = match_article("ARTICLE 12A - Definitions").unwrap();
        assert_eq!(m.id, "12a");
        assert_eq!(m.heading.as_deref(), Some("Definitions"));
        assert_eq!(match_article("Art. 5").unwrap().id, "5");
    }

    #[test]
    fn article_rejects_prose() {
        assert!(match_article("Article 5 shall apply from 1 January.").is_none());
        assert!(match_article("Articles 1 to 3").is_none());
        assert!(match_article("Article 12abcd").is_none());
        let long = format!("Article 3 {}", "X".repeat(HEADING_MAX_CHARS + 1));
        assert!(match_article(&long).is_none());
    }

    #[test]
    fn containers() {
        let m = match_container("CHAPTER II General provisions").unwrap();
        assert_eq!(m.level, Level::Chapter);
        assert_eq!(m.id.as_deref(), Some("II"));
        assert_eq!(match_container("ANNEX").unwrap().id, None);
        assert_eq!(match_container("Annex iv").unwrap().id.as_deref(), Some("IV"));
        assert_eq!(match_container("Part 3").unwrap().id.as_deref(), Some("3"));
        assert!(match_container("Chapter II shall apply").is_none());
        assert!(match_container("TITLE").is_none());
    }

    #[test]
    fn paragraphs() {
        assert_eq!(match_paragraph("(1) This Regulation").as_deref(), Some("1"));
        assert_eq!(match_paragraph("(2a)").as_deref(), Some("2a"));
        assert_eq!(match_paragraph("(a) point"), None);
        assert_eq!(match_paragraph("(1)text"), None);
    }

    #[test]
    fn points() {
        let p = match_point("(a) the data").unwrap();
        assert_eq!((p.id.as_deref(), p.style), (Some("a"), PointStyle::Letter));
        assert_eq!(p.token, "(a)");
        let p = match_point("b) other").unwrap();
        assert_eq!(p.id.as_deref(), Some("b"));
        let p = match_point("3. third").unwrap();
        assert_eq!((p.id.as_deref(), p.style), (Some("3"), PointStyle::Number));
        let p = match_point("\u{2022} item").unwrap();
        assert_eq!((p.id, p.style), (None, PointStyle::Bullet));
        assert!(match_point("1.5 tonnes").is_none());
        assert!(match_point("-5 degrees").is_none());
    }

    #[test]
    fn subpoints() {
        assert_eq!(match_subpoint("(iv) text").as_deref(), Some("iv"));
        assert_eq!(match_subpoint("(i)").as_deref(), Some("i"));
        assert_eq!(match_subpoint("(iiii) text"), None);
        assert_eq!(match_subpoint("(a) text"), None);
    }

    #[test]
    fn markers_anywhere() {
        assert!(contains_marker("as referred to in Article 6 of this act"));
        assert!(contains_marker("the conditions in (a) and (b) apply"));
        assert!(!contains_marker("Whereas the Union has competence in this area."));
        assert!(is_table_row("A | B"));
    }

    #[test]
    fn letter_successor() {
        assert_eq!(next_letter("h"), Some('i'));
        assert_eq!(next_letter("z"), None);
        assert_eq!(next_letter("aa"), None);
    }
}
