//! File loading glue between the CLI and the library crates.

use std::path::{Path, PathBuf};

use anyhow::Context;
use provisio_consolidate::AmendmentSource;
use provisio_core::{ContentClass, ExtractorConfig, NormalizerConfig, ParserConfig, normalize};
use provisio_parse::{Extraction, ParseOutput, extract_directives, parse};
use tracing::{debug, warn};

use crate::manifest::{Manifest, ManifestEntry, class_for_path, document_id_for_path};

/// One input document on the command line.
#[derive(Debug, Clone)]
pub struct Source {
    pub path: PathBuf,
    pub document_id: String,
    pub class: ContentClass,
}

impl Source {
    /// Resolve id and class from the file name unless given explicitly.
    pub fn from_path(
        path: &Path,
        document_id: Option<&str>,
        class: Option<ContentClass>,
    ) -> anyhow::Result<Self> {
        let document_id = match document_id {
            Some(id) => id.to_string(),
            None => document_id_for_path(path)?,
        };
        Ok(Self {
            path: path.to_path_buf(),
            document_id,
            class: class.unwrap_or_else(|| class_for_path(path)),
        })
    }

    fn read(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))
    }

    pub fn parse(&self, config: &ParserConfig) -> anyhow::Result<ParseOutput> {
        let raw = self.read()?;
        parse(&self.document_id, self.class, &raw, config)
            .with_context(|| format!("parsing {}", self.path.display()))
    }

    /// Normalize the document and extract its amendment directives.
    pub fn extract(
        &self,
        normalizer: &NormalizerConfig,
        config: &ExtractorConfig,
    ) -> anyhow::Result<(String, Extraction)> {
        let raw = self.read()?;
        let normalized = normalize(&raw, self.class, normalizer);
        let extraction = extract_directives(&self.document_id, &normalized.text, config)
            .with_context(|| format!("extracting directives from {}", self.path.display()))?;
        Ok((normalized.content_hash, extraction))
    }
}

fn amendment_source(
    entry: &ManifestEntry,
    normalizer: &NormalizerConfig,
    config: &ExtractorConfig,
) -> anyhow::Result<AmendmentSource> {
    let source = Source {
        path: entry.path.clone(),
        document_id: entry.document_id.clone(),
        class: entry.content_class(),
    };
    let (content_hash, extraction) = source.extract(normalizer, config)?;
    for segment in &extraction.unparsed {
        warn!(
            amendment = %entry.document_id,
            start = segment.start,
            end = segment.end,
            reason = %segment.reason,
            "unparsed instruction"
        );
    }
    debug!(
        amendment = %entry.document_id,
        directives = extraction.directives.len(),
        "amendment loaded"
    );
    Ok(AmendmentSource {
        document_id: entry.document_id.clone(),
        content_hash,
        effective_date: entry.effective_date,
        publication_date: entry.publication_date,
        directives: extraction.directives,
    })
}

/// Load every amendment listed in a manifest, in manifest order.
pub fn load_amendments(
    manifest_path: &Path,
    normalizer: &NormalizerConfig,
    config: &ExtractorConfig,
) -> anyhow::Result<Vec<AmendmentSource>> {
    let manifest = Manifest::load(manifest_path)?;
    manifest
        .amendments
        .iter()
        .map(|entry| amendment_source(entry, normalizer, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_core::DirectiveKind;

    #[test]
    fn loads_amendments_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("amend.html"),
            "<p>Regulation (EU) 2024/101 is amended as follows:</p><p>(1) Article 3 is deleted.</p>",
        )
        .unwrap();
        let manifest = dir.path().join("amendments.toml");
        std::fs::write(
            &manifest,
            "[[amendment]]\ndocument_id = \"amend\"\npath = \"amend.html\"\neffective_date = \"2025-01-01\"\n",
        )
        .unwrap();

        let amendments = load_amendments(
            &manifest,
            &NormalizerConfig::default(),
            &ExtractorConfig::default(),
        )
        .unwrap();
        assert_eq!(amendments.len(), 1);
        let amendment = &amendments[0];
        assert_eq!(amendment.document_id, "amend");
        assert_eq!(amendment.directives.len(), 1);
        assert_eq!(amendment.directives[0].kind, DirectiveKind::Delete);
        assert_eq!(amendment.directives[0].target_path, "/article:3");
    }

    #[test]
    fn missing_file_names_the_path() {
        let source = Source::from_path(Path::new("/nonexistent/base.txt"), None, None).unwrap();
        assert_eq!(source.document_id, "base");
        let err = source.parse(&ParserConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/base.txt"));
    }
}
