//! Direct PDF layout reading
//!
//! Characters come from pdf-extract's `OutputDev` callbacks and are grouped
//! into lines (shared baseline) and lines into blocks (small vertical gaps).
//! The outline is read from the PDF bookmarks through lopdf.
//! Coordinates are flipped into top-down page space.

use crate::error::{DocsiftError, Result};
use crate::layout::{BBox, HeadingLevel, LayoutSource, OutlineEntry, RawBlock};
use crate::layout_file::file_name;
use lopdf::Document;
use pdf_extract::{output_doc, MediaBox, OutputDev, OutputError, Transform};
use std::path::Path;

/// Lines closer than this many line heights belong to the same block
const BLOCK_GAP_RATIO: f32 = 0.6;

#[derive(Debug, Clone)]
struct Line {
    text: String,
    bbox: BBox,
    /// Baseline in PDF space, used to detect line changes
    baseline: f64,
    last_end: f64,
    size: f64,
}

#[derive(Default)]
struct BlockCollector {
    pages: Vec<Vec<Line>>,
    page_height: f64,
    current: Option<Line>,
}

impl BlockCollector {
    fn finish_line(&mut self) {
        if let Some(line) = self.current.take() {
            if !line.text.trim().is_empty() {
                if let Some(page) = self.pages.last_mut() {
                    page.push(line);
                }
            }
        }
    }
}

impl OutputDev for BlockCollector {
    fn begin_page(
        &mut self,
        _page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> std::result::Result<(), OutputError> {
        self.page_height = media_box.ury - media_box.lly;
        self.pages.push(Vec::new());
        Ok(())
    }

    fn end_page(&mut self) -> std::result::Result<(), OutputError> {
        self.finish_line();
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> std::result::Result<(), OutputError> {
        let x = trm.m31;
        let y = trm.m32;
        let scale_x = font_size * (trm.m11 + trm.m21);
        let scale_y = font_size * (trm.m12 + trm.m22);
        let size = (scale_x * scale_y).abs().sqrt().max(1.0);

        let same_line = self
            .current
            .as_ref()
            .is_some_and(|l| (l.baseline - y).abs() < l.size * 0.5);
        if !same_line {
            self.finish_line();
        }

        let top = (self.page_height - y - size * 0.8) as f32;
        let bottom = (self.page_height - y + size * 0.2) as f32;
        let right = (x + width * size) as f32;
        let glyph = BBox::new(x as f32, top, right, bottom);

        match self.current.as_mut() {
            Some(line) => {
                if x > line.last_end + size * 0.1 && !line.text.ends_with(' ') {
                    line.text.push(' ');
                }
                line.text.push_str(char);
                line.bbox = line.bbox.union(&glyph);
                line.last_end = x + width * size;
            }
            None => {
                self.current = Some(Line {
                    text: char.to_string(),
                    bbox: glyph,
                    baseline: y,
                    last_end: x + width * size,
                    size,
                });
            }
        }
        Ok(())
    }

    fn begin_word(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> std::result::Result<(), OutputError> {
        self.finish_line();
        Ok(())
    }
}

/// Group a page's lines (in reading order) into blocks
fn group_blocks(lines: Vec<Line>) -> Vec<RawBlock> {
    let mut blocks: Vec<RawBlock> = Vec::new();

    for line in lines {
        let text = line.text.trim().to_string();
        let joins_previous = blocks.last().and_then(|b| b.lines.last()).is_some_and(|prev| {
            let gap = line.bbox.top - prev.bottom;
            gap >= -prev.height() && gap <= prev.height() * BLOCK_GAP_RATIO
        });

        match blocks.last_mut() {
            Some(block) if joins_previous => {
                block.text.push(' ');
                block.text.push_str(&text);
                block.bbox = block.bbox.union(&line.bbox);
                block.lines.push(line.bbox);
            }
            _ => blocks.push(RawBlock { text, bbox: line.bbox, lines: vec![line.bbox] }),
        }
    }

    blocks
}

/// Layout read straight from a PDF file
pub struct PdfLayout {
    name: String,
    pages: Vec<Vec<RawBlock>>,
    outline: Vec<OutlineEntry>,
}

impl PdfLayout {
    pub fn open(path: &Path) -> Result<Self> {
        let name = file_name(path);
        let layout_err = |message: String| DocsiftError::Layout { document: name.clone(), message };

        let doc = Document::load(path).map_err(|e| layout_err(format!("cannot open PDF: {}", e)))?;

        let mut collector = BlockCollector::default();
        output_doc(&doc, &mut collector)
            .map_err(|e| layout_err(format!("text extraction failed: {:?}", e)))?;
        collector.finish_line();

        let pages: Vec<Vec<RawBlock>> = collector.pages.into_iter().map(group_blocks).collect();

        // A PDF without bookmarks simply has no outline
        let outline = match doc.get_toc() {
            Ok(toc) => toc
                .toc
                .into_iter()
                .map(|entry| OutlineEntry {
                    text: entry.title.trim().to_string(),
                    level: HeadingLevel(entry.level.min(u8::MAX as usize) as u8),
                    page: entry.page as u32,
                })
                .filter(|entry| !entry.text.is_empty())
                .collect(),
            Err(e) => {
                tracing::debug!("[PdfLayout] {}: no outline ({:?})", name, e);
                Vec::new()
            }
        };

        tracing::debug!(
            "[PdfLayout] {}: {} pages, {} outline entries",
            name,
            pages.len(),
            outline.len()
        );

        Ok(Self { name, pages, outline })
    }
}

impl LayoutSource for PdfLayout {
    fn document_name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn outline(&self) -> Result<Vec<OutlineEntry>> {
        Ok(self.outline.clone())
    }

    fn page_blocks(&self, page: u32) -> Result<Vec<RawBlock>> {
        Ok(page
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .cloned()
            .unwrap_or_default())
    }
}
