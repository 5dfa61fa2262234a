//! Clause preparation: source lines, enumerator and locus stripping, and
//! provision references resolved against the running context.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use provisio_core::path::{Level, build_path};
use provisio_core::sort_key::roman_value;
use regex::Regex;

/// A reference phrase inside an instruction: "Article 5(2)(a)",
/// "point (a) of paragraph 2", "Annex II". Also accepts a trailing
/// full stop or comma ("Article 8.").
pub(crate) const REF: &str = r"(?:(?:Article|Annex|paragraph|point)\s+\S+(?:\s+of\s+(?:Article|Annex|paragraph|point)\s+\S+)*)";

/// The amending act's own enumerators: "(1)", "(a)", "a)", "1.".
static ENUMERATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\(?[0-9a-z]{1,4}\)|\d{1,3}\.)\s+").expect("valid enumerator regex")
});

static LOCUS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^in\s+([^,]+?),\s*").expect("valid locus regex"));

static CONTEXT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(?:is|are)\s+(?:hereby\s+)?amended\s+as\s+follows\s*:?\s*$")
        .expect("valid context regex")
});

static REFERENCE_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:article\s+(?P<article>\d+[a-z]{0,3})|annex\s+(?P<annex>[ivxlcdm]+|\d+)\b|paragraph\s+(?P<paragraph>\d+[a-z]{0,2})|point\s+\(?(?P<point>[0-9a-z]{1,4})\)?)(?P<chain>(?:\([0-9a-z]{1,5}\))*)",
    )
    .expect("valid reference regex")
});

static CHAIN_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([0-9a-z]{1,5})\)").expect("valid chain regex"));

/// One line of the amending text with its byte range (newline excluded).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

impl Line<'_> {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub(crate) fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for piece in text.split('\n') {
        lines.push(Line {
            start,
            end: start + piece.len(),
            text: piece,
        });
        start += piece.len() + 1;
    }
    lines
}

/// A provision reference as a level map, rendered with the path builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Reference {
    levels: BTreeMap<Level, String>,
}

impl Reference {
    pub fn single(level: Level, id: impl Into<String>) -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(level, id.into());
        Self { levels }
    }

    /// Collect every reference token in a phrase; the first mention of a
    /// level wins.
    pub fn parse(phrase: &str) -> Option<Self> {
        let mut levels: BTreeMap<Level, String> = BTreeMap::new();
        for caps in REFERENCE_TOKEN_REGEX.captures_iter(phrase) {
            let (base, id) = if let Some(m) = caps.name("article") {
                (Level::Article, m.as_str().to_lowercase())
            } else if let Some(m) = caps.name("annex") {
                let id = m.as_str();
                let id = if roman_value(id).is_some() {
                    id.to_uppercase()
                } else {
                    id.to_string()
                };
                (Level::Annex, id)
            } else if let Some(m) = caps.name("paragraph") {
                (Level::Paragraph, m.as_str().to_lowercase())
            } else if let Some(m) = caps.name("point") {
                (Level::Point, m.as_str().to_lowercase())
            } else {
                continue;
            };
            levels.entry(base).or_insert(id);

            let mut last = base;
            for item in CHAIN_ITEM_REGEX.captures_iter(caps.name("chain").map_or("", |m| m.as_str())) {
                let id = item[1].to_lowercase();
                let level = match last {
                    Level::Article | Level::Annex if id.starts_with(|c: char| c.is_ascii_digit()) => {
                        Level::Paragraph
                    }
                    Level::Article | Level::Annex | Level::Paragraph => Level::Point,
                    _ => Level::Subpoint,
                };
                levels.entry(level).or_insert(id);
                last = level;
            }
        }
        (!levels.is_empty()).then_some(Self { levels })
    }

    pub fn top(&self) -> Option<Level> {
        self.levels.keys().next().copied()
    }

    pub fn deepest(&self) -> Option<Level> {
        self.levels.keys().next_back().copied()
    }

    /// Fill in the levels above this reference's topmost level from an
    /// enclosing reference. Article and annex references are document-level
    /// and never inherit.
    pub fn inherit(mut self, outer: Option<&Reference>) -> Self {
        let (Some(top), Some(outer)) = (self.top(), outer) else {
            return self;
        };
        if matches!(top, Level::Article | Level::Annex) {
            return self;
        }
        for (level, id) in &outer.levels {
            if *level < top && !level.is_container() {
                self.levels.entry(*level).or_insert_with(|| id.clone());
            }
        }
        self
    }

    pub fn child(mut self, level: Level, id: impl Into<String>) -> Self {
        self.levels.insert(level, id.into());
        self
    }

    pub fn path(&self) -> String {
        build_path(&self.levels)
    }
}

/// One instruction line, prepared for the recognizers.
#[derive(Debug, Clone)]
pub(crate) struct Clause<'a> {
    pub line: Line<'a>,
    /// Instruction text without enumerators or locus.
    pub body: &'a str,
    /// Byte offset of `body` in the amending text.
    pub body_start: usize,
    /// Locus and context combined: the unit the instruction is about when
    /// its own phrase is partial or missing.
    pub scope: Option<Reference>,
}

impl<'a> Clause<'a> {
    pub fn prepare(line: Line<'a>, context: Option<&Reference>) -> Self {
        let mut body = line.text.trim_start();
        for _ in 0..3 {
            match ENUMERATOR_REGEX.find(body) {
                Some(m) => body = &body[m.end()..],
                None => break,
            }
        }
        let mut locus = None;
        if let Some(caps) = LOCUS_REGEX.captures(body) {
            locus = Reference::parse(&caps[1]);
            body = &body[caps[0].len()..];
        }
        let body = body.trim_end();
        let body_start = line.start + (body.as_ptr() as usize - line.text.as_ptr() as usize);
        let scope = match locus {
            Some(locus) => Some(locus.inherit(context)),
            None => context.cloned(),
        };
        Self {
            line,
            body,
            body_start,
            scope,
        }
    }

    /// Resolve a reference phrase against the clause scope.
    pub fn resolve(&self, phrase: &str) -> Option<Reference> {
        Reference::parse(phrase).map(|r| r.inherit(self.scope.as_ref()))
    }

    /// `Some(new_context)` when the line opens an "is amended as follows"
    /// block; the context is `None` when the head names no provision
    /// (e.g. the amended act itself).
    pub fn context_change(&self) -> Option<Option<Reference>> {
        let caps = CONTEXT_REGEX.captures(self.body)?;
        Some(self.resolve(&caps[1]))
    }
}
