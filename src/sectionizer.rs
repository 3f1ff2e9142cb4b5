//! Document sectionizer
//!
//! Partitions a document's ordered item stream into titled, page-anchored
//! sections. A boundary is either a heading marker, or a same-page vertical
//! gap between two consecutive text blocks that exceeds
//! `gap_multiplier × average line height` of that page.
//!
//! The scan is a fold: one small [`SectionState`] is threaded through the
//! items and completed sections are pushed onto the output as boundaries
//! are crossed. A section is only emitted when it has accumulated text.

use crate::layout::{HeadingLevel, ItemStream, LayoutItem};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};

/// Title of text that precedes the first heading
pub const DOCUMENT_START_TITLE: &str = "Document Start";
/// Title of a section opened by a gap rather than a heading
pub const GAP_SECTION_TITLE: &str = "Content";

/// A contiguous span of document text attributed to one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Source file name
    pub document: String,
    pub page: u32,
    pub title: String,
    pub level: HeadingLevel,
    /// Newline-joined item texts; never empty
    pub text: String,
}

/// What caused a boundary before the current item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Heading,
    Gap,
}

/// Running state of the scan
#[derive(Debug, Clone, PartialEq)]
pub struct SectionState {
    pub title: String,
    pub level: HeadingLevel,
    pub parts: Vec<String>,
    pub start_page: u32,
}

impl Default for SectionState {
    fn default() -> Self {
        Self {
            title: DOCUMENT_START_TITLE.to_string(),
            level: HeadingLevel::NONE,
            parts: Vec::new(),
            start_page: 1,
        }
    }
}

impl SectionState {
    /// Close the accumulated text as a section, if there is any
    fn flush(mut self, document: &str, done: &mut Vec<Section>) -> Self {
        if !self.parts.is_empty() {
            done.push(Section {
                document: document.to_string(),
                page: self.start_page,
                title: self.title.clone(),
                level: self.level,
                text: self.parts.join("\n"),
            });
            self.parts.clear();
        }
        self
    }

    /// Apply `item` after its boundary (if any) has been handled
    fn advance(mut self, item: &LayoutItem, boundary: Option<Boundary>) -> Self {
        match item {
            LayoutItem::Heading(h) => {
                self.title = h.text.clone();
                self.level = h.level;
                self.start_page = h.page;
            }
            LayoutItem::Text(t) => {
                // Level is left as is on gap boundaries
                if boundary == Some(Boundary::Gap) {
                    self.title = GAP_SECTION_TITLE.to_string();
                    self.start_page = t.page;
                }
                self.parts.push(t.text.clone());
            }
        }
        self
    }
}

/// Decide whether a boundary precedes `item`
pub fn detect_boundary(
    prev: Option<&LayoutItem>,
    item: &LayoutItem,
    stream: &ItemStream,
    settings: &Settings,
) -> Option<Boundary> {
    match (prev, item) {
        (_, LayoutItem::Heading(_)) => Some(Boundary::Heading),
        (Some(LayoutItem::Text(p)), LayoutItem::Text(t)) if p.page == t.page => {
            let threshold =
                settings.gap_multiplier * stream.line_height(t.page, settings.fallback_line_height);
            if t.top - p.bottom > threshold {
                Some(Boundary::Gap)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Split one document's item stream into sections, in document order
pub fn sectionize(stream: &ItemStream, settings: &Settings) -> Vec<Section> {
    let document = stream.document.as_str();

    let (state, mut sections) = stream.items.iter().enumerate().fold(
        (SectionState::default(), Vec::new()),
        |(state, mut done), (i, item)| {
            let prev = i.checked_sub(1).map(|j| &stream.items[j]);
            let boundary = detect_boundary(prev, item, stream, settings);
            let state = match boundary {
                Some(_) => state.flush(document, &mut done),
                None => state,
            };
            (state.advance(item, boundary), done)
        },
    );

    let _ = state.flush(document, &mut sections);

    tracing::debug!("[Sectionizer] {}: {} sections", document, sections.len());
    sections
}
