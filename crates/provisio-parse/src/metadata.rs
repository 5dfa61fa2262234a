//! Document metadata read from the heading lines of the normalized text.

use std::sync::LazyLock;

use chrono::NaiveDate;
use provisio_core::{DocumentMetadata, InstrumentKind};
use regex::{Captures, Regex};

use crate::markers::{match_article, match_container, match_paragraph};

/// Heading lines examined before the first structural unit.
const HEAD_LINES: usize = 8;
/// Most lines one title may span.
const TITLE_LINES: usize = 4;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const DATE_PATTERN: &str = r"(\d{1,2})\s+(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{4})|(\d{1,2})\.(\d{1,2})\.(\d{4})";

static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i){DATE_PATTERN}")).expect("valid date regex"));

static PUBLICATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\bof\s+(?:{DATE_PATTERN})")).expect("valid publication regex")
});

static EFFECTIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:enters?\s+into\s+force|shall\s+apply|applies|in\s+force)\s+(?:on|from|as\s+from)\s+(?:the\s+)?(?:{DATE_PATTERN})"
    ))
    .expect("valid effective date regex")
});

static SERIAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\((?:EU|EC|EEC|Euratom)\)\s*)?(?:No\.?\s*)?\b(\d{2,4})/(\d{1,5})\b")
        .expect("valid serial number regex")
});

static ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bNo\.?\s*(\d{1,6})\b").expect("valid item number regex"));

pub fn extract_metadata(text: &str) -> DocumentMetadata {
    let title = extract_title(text);
    let mut meta = DocumentMetadata {
        effective_date: EFFECTIVE_REGEX.captures(text).and_then(|c| date_from(&c)),
        ..DocumentMetadata::default()
    };
    let Some(title) = title else {
        return meta;
    };

    meta.instrument_kind = title
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .find_map(|w| {
            let w = w.to_lowercase();
            InstrumentKind::ALL.into_iter().find(|k| k.as_str() == w)
        });

    if let Some(caps) = SERIAL_REGEX.captures(&title) {
        meta.issue_number = Some(caps[1].to_string());
        meta.item_number = Some(caps[2].to_string());
    } else if let Some(caps) = ITEM_REGEX.captures(&title) {
        meta.item_number = Some(caps[1].to_string());
    }

    meta.publication_date = PUBLICATION_REGEX
        .captures(&title)
        .or_else(|| DATE_REGEX.captures(&title))
        .and_then(|c| date_from(&c));
    meta.title = Some(title);
    meta
}

/// First heading line, continued while the following lines start in
/// lowercase ("of 27 April 2016", "on the protection of ...").
fn extract_title(text: &str) -> Option<String> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(HEAD_LINES)
        .take_while(|l| !is_structural(l));

    let first = lines.next()?;
    let mut parts = vec![first];
    for line in lines {
        if parts.len() >= TITLE_LINES || !line.chars().next().is_some_and(char::is_lowercase) {
            break;
        }
        parts.push(line);
    }
    Some(parts.join(" "))
}

fn is_structural(line: &str) -> bool {
    match_article(line).is_some() || match_container(line).is_some() || match_paragraph(line).is_some()
}

/// Date from a capture of [`DATE_PATTERN`]: groups 1-3 are the written
/// form, groups 4-6 the dotted form.
fn date_from(caps: &Captures<'_>) -> Option<NaiveDate> {
    let group = |i: usize| caps.get(i).map(|m| m.as_str());
    if let (Some(day), Some(month), Some(year)) = (group(1), group(2), group(3)) {
        let month = MONTHS.iter().position(|m| m.eq_ignore_ascii_case(month))? as u32 + 1;
        return NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?);
    }
    let (day, month, year) = (group(4)?, group(5)?, group(6)?);
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Parse a single date in either supported form.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_REGEX.captures(s).and_then(|c| date_from(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GDPR_HEAD: &str = "REGULATION (EU) 2016/679 OF THE EUROPEAN PARLIAMENT AND OF THE COUNCIL\n\nof 27 April 2016\n\non the protection of natural persons\n\nArticle 1\n\nThis Regulation shall apply from 25 May 2018.";

    #[test]
    fn regulation_heading() {
        let meta = extract_metadata(GDPR_HEAD);
        assert_eq!(
            meta.title.as_deref(),
            Some("REGULATION (EU) 2016/679 OF THE EUROPEAN PARLIAMENT AND OF THE COUNCIL of 27 April 2016 on the protection of natural persons")
        );
        assert_eq!(meta.instrument_kind, Some(InstrumentKind::Regulation));
        assert_eq!(meta.issue_number.as_deref(), Some("2016"));
        assert_eq!(meta.item_number.as_deref(), Some("679"));
        assert_eq!(meta.publication_date, NaiveDate::from_ymd_opt(2016, 4, 27));
        assert_eq!(meta.effective_date, NaiveDate::from_ymd_opt(2018, 5, 25));
    }

    #[test]
    fn dotted_dates_and_item_number() {
        let meta = extract_metadata("Decree No. 12 of 01.02.2020\nArticle 1\nIn force from 1.3.2020.");
        assert_eq!(meta.instrument_kind, Some(InstrumentKind::Decree));
        assert_eq!(meta.issue_number, None);
        assert_eq!(meta.item_number.as_deref(), Some("12"));
        assert_eq!(meta.publication_date, NaiveDate::from_ymd_opt(2020, 2, 1));
        assert_eq!(meta.effective_date, NaiveDate::from_ymd_opt(2020, 3, 1));
    }

    #[test]
    fn no_heading() {
        let meta = extract_metadata("Article 1.\n\nRate is 20%.");
        assert_eq!(meta, DocumentMetadata::default());
    }

    #[test]
    fn single_dates() {
        assert_eq!(parse_date("5 june 2021"), NaiveDate::from_ymd_opt(2021, 6, 5));
        assert_eq!(parse_date("31.02.2021"), None);
    }
}
