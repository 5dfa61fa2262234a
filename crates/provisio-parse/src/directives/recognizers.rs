//! Instruction recognizers, tried in a fixed order. The first that matches
//! a clause decides its directive kind and target.

use std::sync::LazyLock;

use provisio_core::path::{Level, child_path, parent_path, with_last_id};
use provisio_core::sort_key::roman_value;
use provisio_core::{DirectiveKind, WordSubstitution};
use regex::{Captures, Regex};

use super::clause::{Clause, REF, Reference};

const VERB: &str = r"(?:is|are|shall\s+be)\s+(?:hereby\s+)?";
const OPEN_QUOTE: &str = "['\u{2018}\"\u{201c}\u{ab}]";
const CLOSE_QUOTE: &str = "['\u{2019}\"\u{201d}\u{bb}]";
const UNIT: &str = r"(?P<unit>article|annex|paragraph|subparagraph|point)s?(?:\s+(?P<id>\(?[0-9a-z]{1,5}\)?))?";

fn compile(pattern: String) -> Regex {
    Regex::new(&pattern).expect("valid recognizer regex")
}

static WORDS_REPLACE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?:the\s+)?words?\s+{OPEN_QUOTE}(?P<search>.+?){CLOSE_QUOTE}(?:\s+in\s+(?P<ref>{REF}))?\s+{VERB}(?:replaced|substituted)\s+(?:by|with)\s+(?:the\s+words?\s+)?{OPEN_QUOTE}(?P<replace>.*?){CLOSE_QUOTE}"
    ))
});

static WORDS_DELETE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?:the\s+)?words?\s+{OPEN_QUOTE}(?P<search>.+?){CLOSE_QUOTE}(?:\s+in\s+(?P<ref>{REF}))?\s+{VERB}(?:deleted|omitted|removed)\b"
    ))
});

static DELETE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?P<ref>{REF})\s+{VERB}(?:deleted|repealed|removed|omitted)\b"
    ))
});

static DELETE_IMPERATIVE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(format!(r"(?i)^(?:delete|repeal|omit)\s+(?P<ref>{REF})")));

static RENUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?P<ref>{REF})\s+{VERB}renumbered\s+(?:as\s+)?(?P<new>{REF})"
    ))
});

static REPLACE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?P<ref>{REF})\s+(?:{VERB}(?:replaced|substituted)\s+(?:by|with)(?:\s+the\s+following)?(?:\s+(?:text|wording))?|shall\s+read\s+as\s+follows)\s*:?\s*(?P<rest>.*)$"
    ))
});

static INSERT_TRAILING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?:the\s+following\s+(?:new\s+)?)?{UNIT}\s+{VERB}inserted(?:\s+(?P<pos>after|before)\s+(?P<ref>{REF})|\s+in\s+(?P<in>{REF}))?\s*:?\s*(?P<rest>.*)$"
    ))
});

static INSERT_LEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?P<pos>after|before)\s+(?P<ref>{REF}),?\s+(?:the\s+following\s+(?:new\s+)?)?{UNIT}\s+{VERB}inserted\s*:?\s*(?P<rest>.*)$"
    ))
});

static ADD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)^(?:the\s+following\s+(?:new\s+)?)?(?P<unit>paragraph|subparagraph|point|sentence)s?(?:\s+(?P<id>\(?[0-9a-z]{{1,5}}\)?))?\s+{VERB}added(?:\s+(?:to|in|at\s+the\s+end\s+of)\s+(?P<ref>{REF}))?\s*:?\s*(?P<rest>.*)$"
    ))
});

/// What a recognizer read from one clause, before any replacement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Draft {
    pub kind: DirectiveKind,
    pub target_path: String,
    pub new_path: Option<String>,
    pub words: Option<WordSubstitution>,
    /// Byte offset of replacement text on the instruction line itself.
    pub inline_start: Option<usize>,
}

impl Draft {
    fn new(kind: DirectiveKind, target_path: String) -> Self {
        Self {
            kind,
            target_path,
            new_path: None,
            words: None,
            inline_start: None,
        }
    }
}

pub(crate) type Recognizer = fn(&Clause<'_>) -> Option<Draft>;

/// Word replacement comes first: its quoted search text may itself contain
/// the vocabulary of the other recognizers.
pub(crate) const RECOGNIZERS: [Recognizer; 6] = [replace_words, delete, renumber, replace, insert, add];

/// True if any recognizer's pattern matches, regardless of whether a
/// target could be resolved.
pub(crate) fn looks_like_instruction(body: &str) -> bool {
    [
        &*WORDS_REPLACE_REGEX,
        &*WORDS_DELETE_REGEX,
        &*DELETE_REGEX,
        &*DELETE_IMPERATIVE_REGEX,
        &*RENUMBER_REGEX,
        &*REPLACE_REGEX,
        &*INSERT_TRAILING_REGEX,
        &*INSERT_LEADING_REGEX,
        &*ADD_REGEX,
    ]
    .iter()
    .any(|re| re.is_match(body))
}

fn inline_start(clause: &Clause<'_>, caps: &Captures<'_>) -> Option<usize> {
    let rest = caps.name("rest")?;
    (!rest.as_str().trim().is_empty()).then(|| clause.body_start + rest.start())
}

/// Target from an explicit reference, else the clause scope.
fn target(clause: &Clause<'_>, caps: &Captures<'_>, group: &str) -> Option<Reference> {
    match caps.name(group) {
        Some(m) => clause.resolve(m.as_str()),
        None => clause.scope.clone(),
    }
}

fn unit_level(unit: &str) -> Option<Level> {
    match unit.to_lowercase().as_str() {
        "article" => Some(Level::Article),
        "annex" => Some(Level::Annex),
        "paragraph" => Some(Level::Paragraph),
        "point" => Some(Level::Point),
        _ => None,
    }
}

fn normalize_id(raw: &str, level: Option<Level>) -> String {
    let id = raw.trim_matches(|c| c == '(' || c == ')');
    if level == Some(Level::Annex) && roman_value(id).is_some() {
        id.to_uppercase()
    } else {
        id.to_lowercase()
    }
}

/// "5a" follows "5", "ba" follows "b".
fn predecessor_id(id: &str) -> Option<&str> {
    let last = id.chars().last()?;
    (id.len() > 1 && last.is_ascii_lowercase()).then(|| &id[..id.len() - 1])
}

fn replace_words(clause: &Clause<'_>) -> Option<Draft> {
    let (caps, replace) = match WORDS_REPLACE_REGEX.captures(clause.body) {
        Some(caps) => {
            let replace = caps["replace"].to_string();
            (caps, replace)
        }
        None => (WORDS_DELETE_REGEX.captures(clause.body)?, String::new()),
    };
    let target = target(clause, &caps, "ref")?;
    Some(Draft {
        words: Some(WordSubstitution {
            search: caps["search"].to_string(),
            replace,
        }),
        ..Draft::new(DirectiveKind::ReplaceWords, target.path())
    })
}

fn delete(clause: &Clause<'_>) -> Option<Draft> {
    let caps = DELETE_REGEX
        .captures(clause.body)
        .or_else(|| DELETE_IMPERATIVE_REGEX.captures(clause.body))?;
    let target = clause.resolve(&caps["ref"])?;
    Some(Draft::new(DirectiveKind::Delete, target.path()))
}

fn renumber(clause: &Clause<'_>) -> Option<Draft> {
    let caps = RENUMBER_REGEX.captures(clause.body)?;
    let target = clause.resolve(&caps["ref"])?;
    let new = Reference::parse(&caps["new"])?.inherit(Some(&target));
    Some(Draft {
        new_path: Some(new.path()),
        ..Draft::new(DirectiveKind::Renumber, target.path())
    })
}

fn replace(clause: &Clause<'_>) -> Option<Draft> {
    let caps = REPLACE_REGEX.captures(clause.body)?;
    let target = clause.resolve(&caps["ref"])?;
    let kind = match target.deepest() {
        Some(Level::Article | Level::Annex) => DirectiveKind::ReplaceArticle,
        _ => DirectiveKind::ReplaceParagraph,
    };
    Some(Draft {
        inline_start: inline_start(clause, &caps),
        ..Draft::new(kind, target.path())
    })
}

fn insert(clause: &Clause<'_>) -> Option<Draft> {
    let caps = INSERT_LEADING_REGEX
        .captures(clause.body)
        .or_else(|| INSERT_TRAILING_REGEX.captures(clause.body))?;
    let level = unit_level(&caps["unit"]);
    let id = caps.name("id").map(|m| normalize_id(m.as_str(), level));
    let inline = inline_start(clause, &caps);

    if let (Some(pos), Some(anchor)) = (caps.name("pos"), caps.name("ref")) {
        let target = clause.resolve(anchor.as_str())?.path();
        let kind = if pos.as_str().eq_ignore_ascii_case("after") {
            DirectiveKind::InsertAfter
        } else {
            DirectiveKind::InsertBefore
        };
        let new_path = match (level, &id) {
            (Some(level), Some(id)) => parent_path(&target)
                .map(|parent| child_path(&parent, level, id)),
            _ => None,
        };
        return Some(Draft {
            new_path,
            inline_start: inline,
            ..Draft::new(kind, target)
        });
    }

    let scope = target(clause, &caps, "in");
    let draft = match (level, id) {
        (Some(level), Some(id)) => {
            if !matches!(level, Level::Article | Level::Annex) && scope.is_none() {
                return None;
            }
            let new_path = Reference::single(level, id.as_str())
                .inherit(scope.as_ref())
                .path();
            if let Some(base) = predecessor_id(&id) {
                Draft {
                    new_path: Some(new_path.clone()),
                    ..Draft::new(DirectiveKind::InsertAfter, with_last_id(&new_path, base)?)
                }
            } else {
                match level {
                    Level::Article | Level::Annex => {
                        let n: u32 = id.parse().ok().filter(|n| *n > 1)?;
                        Draft {
                            new_path: Some(new_path.clone()),
                            ..Draft::new(
                                DirectiveKind::InsertAfter,
                                with_last_id(&new_path, &(n - 1).to_string())?,
                            )
                        }
                    }
                    Level::Point => Draft {
                        new_path: Some(new_path.clone()),
                        ..Draft::new(DirectiveKind::AddPoint, parent_path(&new_path)?)
                    },
                    _ => Draft {
                        new_path: Some(new_path.clone()),
                        ..Draft::new(DirectiveKind::AddParagraph, parent_path(&new_path)?)
                    },
                }
            }
        }
        (Some(Level::Point), None) => Draft::new(DirectiveKind::AddPoint, scope?.path()),
        (Some(Level::Paragraph) | None, _) => {
            Draft::new(DirectiveKind::AddParagraph, scope?.path())
        }
        (Some(_), None) => return None,
    };
    Some(Draft {
        inline_start: inline,
        ..draft
    })
}

fn add(clause: &Clause<'_>) -> Option<Draft> {
    let caps = ADD_REGEX.captures(clause.body)?;
    let target = target(clause, &caps, "ref")?;
    let unit = caps["unit"].to_lowercase();
    let (kind, level) = if unit == "point" {
        (DirectiveKind::AddPoint, Level::Point)
    } else {
        (DirectiveKind::AddParagraph, Level::Paragraph)
    };
    let new_path = caps
        .name("id")
        .filter(|_| unit == "point" || unit == "paragraph")
        .map(|m| {
            target
                .clone()
                .child(level, normalize_id(m.as_str(), Some(level)))
                .path()
        });
    Some(Draft {
        new_path,
        inline_start: inline_start(clause, &caps),
        ..Draft::new(kind, target.path())
    })
}
