//! Tunable configuration for parsing, directive extraction and consolidation.
//!
//! Every heuristic cutoff lives here rather than in the algorithms, so the
//! thresholds can be tuned per corpus. All sections deserialize from TOML
//! with defaults for omitted keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::directive::Confidence;
use crate::error::CoreError;
use crate::hash::sha256_hex;

/// Identifier reported in every [`ParserIdentity`](crate::ParserIdentity).
pub const PARSER_ID: &str = "provisio-tree";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Longest run of blank lines kept between two text lines.
    pub max_blank_lines: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { max_blank_lines: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub normalizer: NormalizerConfig,
    /// Bytes searched either side of the running cursor when a block is not
    /// found ahead of it.
    pub locate_window: usize,
    /// Loose blocks outside any structural unit at least this many
    /// characters long are reported as unparsed segments.
    pub unparsed_min_chars: usize,
    /// Group consecutive ` | ` rows into table nodes.
    pub detect_tables: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            locate_window: 2048,
            unparsed_min_chars: 280,
            detect_tables: true,
        }
    }
}

impl ParserConfig {
    /// SHA-256 of the canonical JSON form; part of the parser identity.
    pub fn fingerprint(&self) -> Result<String, CoreError> {
        let canonical = serde_json::to_vec(self)?;
        Ok(sha256_hex(canonical))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Longest replacement block inferred from unquoted lines. Hitting the
    /// cap lowers the directive's confidence to `low`.
    pub max_inferred_lines: usize,
    /// Whether unquoted replacement text may be inferred at all. When off,
    /// such directives are reported as unparsed instead.
    pub allow_inferred_text: bool,
    /// Verbs that mark a line as an amendment instruction. A line using one
    /// of them that matches no recognizer is reported as unparsed.
    pub strong_keywords: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_inferred_lines: 12,
            allow_inferred_text: true,
            strong_keywords: [
                "replaced",
                "deleted",
                "inserted",
                "added",
                "repealed",
                "renumbered",
                "substituted",
                "omitted",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Escalate the first per-directive failure into a failed run.
    pub strict: bool,
    /// Directives below this tier are skipped unless manually reviewed.
    pub min_confidence: Confidence,
    /// Point-in-time cut-off: amendments effective after this date are
    /// left out.
    pub as_of: Option<NaiveDate>,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            min_confidence: Confidence::Medium,
            as_of: None,
        }
    }
}

/// Umbrella configuration, loadable from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub parser: ParserConfig,
    pub extractor: ExtractorConfig,
    pub consolidation: ConsolidationConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(s)?)
    }
}
