//! Amendment manifests.
//!
//! A manifest lists the amending documents of one base document:
//!
//! ```toml
//! [[amendment]]
//! document_id = "reg-2025-7"
//! path = "amendments/2025-7.html"
//! effective_date = "2025-06-01"
//! publication_date = "2025-05-12"
//! ```
//!
//! Paths are relative to the manifest file. The content class is taken
//! from `class` when given, else from the file extension.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::NaiveDate;
use provisio_core::ContentClass;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "amendment")]
    pub amendments: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestEntry {
    pub document_id: String,
    pub path: PathBuf,
    pub effective_date: NaiveDate,
    pub publication_date: Option<NaiveDate>,
    pub class: Option<ContentClass>,
}

impl ManifestEntry {
    pub fn content_class(&self) -> ContentClass {
        self.class.unwrap_or_else(|| class_for_path(&self.path))
    }
}

impl Manifest {
    /// Read a manifest and resolve its entry paths against its directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let mut manifest = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut manifest.amendments {
            if entry.path.is_relative() {
                entry.path = dir.join(&entry.path);
            }
        }
        Ok(manifest)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = toml::from_str(s)?;
        let mut seen = std::collections::HashSet::new();
        for entry in &manifest.amendments {
            if entry.document_id.trim().is_empty() {
                bail!("amendment with an empty document_id");
            }
            if !seen.insert(entry.document_id.as_str()) {
                bail!("amendment {} is listed twice", entry.document_id);
            }
        }
        Ok(manifest)
    }
}

/// Content class implied by a file extension; plain text when unknown.
pub fn class_for_path(path: &Path) -> ContentClass {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse().ok())
        .unwrap_or(ContentClass::Text)
}

/// Document id implied by a file name: its stem.
pub fn document_id_for_path(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .with_context(|| format!("no document id in file name {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_entries_and_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("amendments.toml");
        std::fs::write(
            &manifest_path,
            r#"
            [[amendment]]
            document_id = "amend-1"
            path = "a1.html"
            effective_date = "2025-01-01"

            [[amendment]]
            document_id = "amend-2"
            path = "a2.txt"
            effective_date = "2026-01-01"
            publication_date = "2025-11-30"
            class = "html"
            "#,
        )
        .unwrap();

        let manifest = Manifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.amendments.len(), 2);
        let first = &manifest.amendments[0];
        assert_eq!(first.path, dir.path().join("a1.html"));
        assert_eq!(first.content_class(), ContentClass::Html);
        assert_eq!(first.publication_date, None);
        let second = &manifest.amendments[1];
        assert_eq!(second.content_class(), ContentClass::Html);
        assert_eq!(second.publication_date, NaiveDate::from_ymd_opt(2025, 11, 30));
    }

    #[test]
    fn empty_manifest_has_no_amendments() {
        assert!(Manifest::from_toml_str("").unwrap().amendments.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Manifest::from_toml_str(
            r#"
            [[amendment]]
            document_id = "a"
            path = "a.txt"
            effective_date = "2025-01-01"

            [[amendment]]
            document_id = "a"
            path = "b.txt"
            effective_date = "2025-02-01"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn ids_and_classes_from_file_names() {
        assert_eq!(document_id_for_path(Path::new("docs/reg-2024-101.html")).unwrap(), "reg-2024-101");
        assert_eq!(class_for_path(Path::new("a.htm")), ContentClass::Html);
        assert_eq!(class_for_path(Path::new("a.md")), ContentClass::Text);
        assert_eq!(class_for_path(Path::new("noext")), ContentClass::Text);
    }
}
