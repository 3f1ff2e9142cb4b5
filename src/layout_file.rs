//! Pre-extracted layout documents
//!
//! A layout document is the JSON form of what a PDF layout pass produces:
//! per-page text blocks (with line boxes) plus the heading outline. It is
//! stored next to the PDF as `<name>.pdf.layout.json` or `<name>.layout.json`.

use crate::error::{DocsiftError, Result};
use crate::layout::{LayoutSource, OutlineEntry, RawBlock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutPage {
    /// 1-based
    pub page: u32,
    #[serde(default)]
    pub blocks: Vec<RawBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub document: String,
    #[serde(default)]
    pub pages: Vec<LayoutPage>,
    #[serde(default)]
    pub outline: Vec<OutlineEntry>,
}

impl LayoutDocument {
    pub fn from_json(document: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DocsiftError::Layout {
            document: document.to_string(),
            message: format!("invalid layout JSON: {}", e),
        })
    }

    /// Read a layout file
    pub fn load(path: &Path) -> Result<Self> {
        let name = file_name(path);
        let document = name.strip_suffix(".layout.json").unwrap_or(&name).to_string();
        let content = fs::read_to_string(path).map_err(|e| DocsiftError::Layout {
            document: document.clone(),
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json(&document, &content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| DocsiftError::Persistence {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl LayoutSource for LayoutDocument {
    fn document_name(&self) -> &str {
        &self.document
    }

    /// Highest page number with block data. Outline pages do not count:
    /// headings are emitted whatever their page number.
    fn page_count(&self) -> u32 {
        self.pages.iter().map(|p| p.page).max().unwrap_or(0)
    }

    fn outline(&self) -> Result<Vec<OutlineEntry>> {
        Ok(self.outline.clone())
    }

    fn page_blocks(&self, page: u32) -> Result<Vec<RawBlock>> {
        Ok(self
            .pages
            .iter()
            .filter(|p| p.page == page)
            .flat_map(|p| p.blocks.iter().cloned())
            .collect())
    }
}

/// Candidate sidecar paths for a PDF, in lookup order
pub fn sidecar_paths(pdf: &Path) -> Vec<PathBuf> {
    let mut with_ext = pdf.as_os_str().to_owned();
    with_ext.push(".layout.json");
    vec![PathBuf::from(with_ext), pdf.with_extension("layout.json")]
}

/// Existing sidecar for a PDF, if any
pub fn find_sidecar(pdf: &Path) -> Option<PathBuf> {
    sidecar_paths(pdf).into_iter().find(|p| p.is_file())
}

/// True for `*.layout.json` files
pub fn is_layout_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().ends_with(".layout.json"))
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{extract_items, HeadingLevel, LayoutItem};
    use crate::settings::Settings;

    const SAMPLE: &str = r#"{
        "document": "guide.pdf",
        "pages": [
            {"page": 1, "blocks": [
                {"text": "Welcome to the guide", "bbox": [50, 100, 400, 114], "lines": [[50, 100, 400, 114]]}
            ]},
            {"page": 2, "blocks": [
                {"text": "Cuisine overview", "bbox": [50, 80, 400, 94]}
            ]}
        ],
        "outline": [{"text": "Cuisine", "level": "H1", "page": 2}]
    }"#;

    #[test]
    fn test_parse_and_extract() {
        let doc = LayoutDocument::from_json("guide.pdf", SAMPLE).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.outline[0].level, HeadingLevel(1));
        assert!(doc.pages[1].blocks[0].lines.is_empty());

        let stream = extract_items(&doc, &Settings::default()).unwrap();
        assert_eq!(stream.items.len(), 3);
        assert!(matches!(&stream.items[1], LayoutItem::Heading(h) if h.text == "Cuisine"));
        // Page 2 has no lines and inherits page 1's average
        assert_eq!(stream.line_height(2, 12.0), 14.0);
    }

    #[test]
    fn test_outline_page_beyond_pages_does_not_extend_scan() {
        let json = r#"{
            "document": "broken.pdf",
            "pages": [{"page": 1, "blocks": [{"text": "Only page", "bbox": [50, 100, 400, 114]}]}],
            "outline": [{"text": "Corrupt bookmark", "level": "H1", "page": 4294967295}]
        }"#;
        let doc = LayoutDocument::from_json("broken.pdf", json).unwrap();
        assert_eq!(doc.page_count(), 1);

        let stream = extract_items(&doc, &Settings::default()).unwrap();
        assert_eq!(stream.items.len(), 2);
        assert!(matches!(&stream.items[1], LayoutItem::Heading(h) if h.page == u32::MAX));
    }

    #[test]
    fn test_invalid_json_is_layout_error() {
        match LayoutDocument::from_json("x.pdf", "{\"pages\": 3}") {
            Err(DocsiftError::Layout { document, .. }) => assert_eq!(document, "x.pdf"),
            other => panic!("expected layout error, got {:?}", other),
        }
    }

    #[test]
    fn test_sidecar_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("report.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();
        assert!(find_sidecar(&pdf).is_none());

        let short = dir.path().join("report.layout.json");
        fs::write(&short, SAMPLE).unwrap();
        assert_eq!(find_sidecar(&pdf), Some(short));

        let long = dir.path().join("report.pdf.layout.json");
        fs::write(&long, SAMPLE).unwrap();
        assert_eq!(find_sidecar(&pdf), Some(long.clone()));
        assert!(is_layout_file(&long));
        assert!(!is_layout_file(&pdf));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.pdf.layout.json");
        let doc = LayoutDocument::from_json("guide.pdf", SAMPLE).unwrap();
        doc.save(&path).unwrap();
        assert_eq!(LayoutDocument::load(&path).unwrap(), doc);
    }
}
