//! Layout options and JSON manifests
//!
//! A manifest lists the documents to bind, in order, with optional display
//! titles and layout overrides:
//!
//! ```json
//! {
//!   "layout": { "page_number_position": "inside", "toc_title": "Contents" },
//!   "entries": [
//!     { "path": "intro.pdf", "title": "Introduction" },
//!     { "path": "chapter-1.pdf" }
//!   ]
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's own directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::layout::PageNumberPosition;
use crate::pagination::BlankPageRule;
use crate::pdf::count_pages;
use crate::registry::EntryRegistry;

/// Default table-of-contents heading
pub const DEFAULT_TOC_TITLE: &str = "Table of Contents";

/// Options for one pagination/assembly run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutOptions {
    /// Pad documents with a blank page according to `blank_page_rule`
    pub insert_empty_page_after_odd_count: bool,
    /// Which predicate triggers a blank page
    pub blank_page_rule: BlankPageRule,
    /// Stamp page numbers onto the merged document
    pub add_page_numbers: bool,
    pub page_number_position: PageNumberPosition,
    /// Heading passed to the catalog template
    pub toc_title: String,
    /// Page-number font size in points
    pub font_size: f32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            insert_empty_page_after_odd_count: true,
            blank_page_rule: BlankPageRule::AfterOddEntry,
            add_page_numbers: true,
            page_number_position: PageNumberPosition::Outside,
            toc_title: DEFAULT_TOC_TITLE.to_string(),
            font_size: 12.0,
        }
    }
}

impl LayoutOptions {
    /// Blank-page rule to plan with, `None` when padding is off
    pub fn blank_pages(&self) -> Option<BlankPageRule> {
        self.insert_empty_page_after_odd_count
            .then_some(self.blank_page_rule)
    }

    /// Position to stamp with, `None` when nothing is stamped
    pub fn stamp_position(&self) -> Option<PageNumberPosition> {
        match self.page_number_position {
            _ if !self.add_page_numbers => None,
            PageNumberPosition::None => None,
            position => Some(position),
        }
    }
}

/// One document listed in a manifest
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub path: PathBuf,
    /// Display title; defaults to the file name without extension
    #[serde(default)]
    pub title: Option<String>,
}

/// Ordered list of documents plus layout overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub layout: Option<LayoutOptions>,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parse a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a manifest file, resolving relative entry paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let text = std::fs::read_to_string(path)?;
        let mut manifest = Self::from_json(&text)?;

        if let Some(base) = path.parent() {
            for entry in &mut manifest.entries {
                if entry.path.is_relative() {
                    entry.path = base.join(&entry.path);
                }
            }
        }

        tracing::debug!(path = %path.display(), entries = manifest.entries.len(), "loaded manifest");
        Ok(manifest)
    }

    /// Manifest listing `paths` in order with default titles
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            layout: None,
            entries: paths
                .into_iter()
                .map(|path| ManifestEntry { path, title: None })
                .collect(),
        }
    }

    /// Read every listed PDF and register it, all or nothing
    ///
    /// Non-PDF files and PDFs without pages are rejected with
    /// [`Error::InvalidInput`] before anything is registered.
    pub fn build_registry(&self) -> Result<EntryRegistry<PathBuf>> {
        let mut items = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let path = &entry.path;
            if !is_pdf(path) {
                tracing::warn!(path = %path.display(), "skipping upload: not a PDF");
                return Err(Error::InvalidInput(format!(
                    "not a PDF file: {}",
                    path.display()
                )));
            }

            let page_count = match count_pages(path) {
                Ok(count) => count,
                Err(Error::EmptyPdf(path)) => {
                    return Err(Error::InvalidInput(format!(
                        "PDF has no pages: {}",
                        path.display()
                    )))
                }
                Err(e) => return Err(e),
            };
            let title = entry.title.clone().unwrap_or_else(|| default_title(path));
            items.push((title, page_count, path.clone()));
        }

        let mut registry = EntryRegistry::new();
        registry.append_all(items)?;
        Ok(registry)
    }
}

/// File name without its last extension
pub fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_options() {
        let options = LayoutOptions::default();
        assert!(options.insert_empty_page_after_odd_count);
        assert_eq!(options.page_number_position, PageNumberPosition::Outside);
        assert_eq!(options.toc_title, "Table of Contents");
        assert_eq!(options.blank_pages(), Some(BlankPageRule::AfterOddEntry));
    }

    #[test]
    fn test_blank_pages_off() {
        let options = LayoutOptions {
            insert_empty_page_after_odd_count: false,
            ..Default::default()
        };
        assert_eq!(options.blank_pages(), None);
    }

    #[test]
    fn test_stamp_position() {
        let mut options = LayoutOptions::default();
        assert_eq!(options.stamp_position(), Some(PageNumberPosition::Outside));

        options.page_number_position = PageNumberPosition::None;
        assert_eq!(options.stamp_position(), None);

        options.page_number_position = PageNumberPosition::Left;
        options.add_page_numbers = false;
        assert_eq!(options.stamp_position(), None);
    }

    #[test]
    fn test_manifest_parsing_with_partial_layout() {
        let manifest = Manifest::from_json(
            r#"{
                "layout": { "page_number_position": "inside", "blank_page_rule": "after-odd-running-total" },
                "entries": [
                    { "path": "a.pdf", "title": "Intro" },
                    { "path": "b.pdf" }
                ]
            }"#,
        )
        .unwrap();

        let layout = manifest.layout.unwrap();
        assert_eq!(layout.page_number_position, PageNumberPosition::Inside);
        assert_eq!(layout.blank_page_rule, BlankPageRule::AfterOddRunningTotal);
        assert_eq!(layout.toc_title, DEFAULT_TOC_TITLE);
        assert_eq!(manifest.entries[0].title.as_deref(), Some("Intro"));
        assert_eq!(manifest.entries[1].title, None);
    }

    #[test]
    fn test_manifest_rejects_unknown_fields() {
        let err = Manifest::from_json(r#"{ "entries": [], "colour": "red" }"#).unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("book.json");
        std::fs::write(&manifest_path, r#"{ "entries": [{ "path": "ch1.pdf" }] }"#).unwrap();

        let manifest = Manifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.entries[0].path, dir.path().join("ch1.pdf"));
    }

    #[test]
    fn test_build_registry_rejects_non_pdf() {
        let manifest = Manifest::from_paths(vec![PathBuf::from("notes.txt")]);
        assert!(matches!(manifest.build_registry(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_default_title_strips_last_extension() {
        assert_eq!(default_title(Path::new("dir/1. Intro.pdf")), "1. Intro");
        assert_eq!(default_title(Path::new("archive.tar.pdf")), "archive.tar");
    }
}
