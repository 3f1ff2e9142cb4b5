//! Layout item extraction
//!
//! Flattens a document's pages into one ordered stream of text blocks and
//! heading markers. The PDF reader itself sits behind [`LayoutSource`]; this
//! module only depends on the per-page blocks and the outline it supplies.

use crate::error::Result;
use crate::settings::Settings;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Axis-aligned box in top-down page space (y grows downwards)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.left, b.top, b.right, b.bottom]
    }
}

/// Heading nesting level. Level 0 is the "no heading" sentinel (rendered `H0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HeadingLevel(pub u8);

impl HeadingLevel {
    pub const NONE: HeadingLevel = HeadingLevel(0);

    /// Parse `H1`, `h2` or a bare number
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let digits = s.strip_prefix('H').or_else(|| s.strip_prefix('h')).unwrap_or(s);
        digits.parse::<u8>().ok().map(HeadingLevel)
    }
}

impl fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

impl Serialize for HeadingLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HeadingLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u8),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(HeadingLevel(n)),
            Raw::Text(s) => HeadingLevel::parse(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid heading level '{}'", s))),
        }
    }
}

/// One entry of a document's outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub text: String,
    pub level: HeadingLevel,
    /// 1-based
    pub page: u32,
}

/// A text block as delivered by the layout source, before trimming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub text: String,
    pub bbox: BBox,
    /// Bounding boxes of the block's lines; used for the page's average line height
    #[serde(default)]
    pub lines: Vec<BBox>,
}

/// Page-level layout primitives for one document
pub trait LayoutSource {
    /// Identifier used for every section of this document (the file name)
    fn document_name(&self) -> &str;

    fn page_count(&self) -> u32;

    /// Previously extracted headings with level and 1-based page
    fn outline(&self) -> Result<Vec<OutlineEntry>>;

    /// Text blocks of a 1-based page
    fn page_blocks(&self, page: u32) -> Result<Vec<RawBlock>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub page: u32,
    pub text: String,
    pub top: f32,
    pub bottom: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadingItem {
    pub page: u32,
    pub text: String,
    pub level: HeadingLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutItem {
    Text(TextItem),
    Heading(HeadingItem),
}

impl LayoutItem {
    pub fn page(&self) -> u32 {
        match self {
            LayoutItem::Text(t) => t.page,
            LayoutItem::Heading(h) => h.page,
        }
    }

    /// Vertical sort key. Headings carry no position and sort as if at the page top.
    pub fn sort_top(&self) -> f32 {
        match self {
            LayoutItem::Text(t) => t.top,
            LayoutItem::Heading(_) => 0.0,
        }
    }
}

/// Ordered items of one document plus the average line height of each page that had lines
#[derive(Debug, Clone, Default)]
pub struct ItemStream {
    pub document: String,
    pub items: Vec<LayoutItem>,
    pub line_heights: BTreeMap<u32, f32>,
}

impl ItemStream {
    /// Average line height for `page`: that page's own average, else the most
    /// recent earlier page's, else `fallback`.
    pub fn line_height(&self, page: u32, fallback: f32) -> f32 {
        self.line_heights
            .range(..=page)
            .next_back()
            .map(|(_, h)| *h)
            .unwrap_or(fallback)
    }
}

/// Mean height of all lines in the given blocks, `None` when there are no lines
pub fn average_line_height(blocks: &[RawBlock]) -> Option<f32> {
    let heights: Vec<f32> = blocks
        .iter()
        .flat_map(|b| b.lines.iter().map(BBox::height))
        .collect();

    if heights.is_empty() {
        return None;
    }
    Some(heights.iter().sum::<f32>() / heights.len() as f32)
}

/// Build the ordered item stream for one document
pub fn extract_items(source: &dyn LayoutSource, settings: &Settings) -> Result<ItemStream> {
    let mut stream = ItemStream {
        document: source.document_name().to_string(),
        ..Default::default()
    };

    for page in 1..=source.page_count() {
        let blocks = source.page_blocks(page)?;

        match average_line_height(&blocks) {
            Some(avg) => {
                stream.line_heights.insert(page, avg);
            }
            None => tracing::debug!(
                "[Layout] {} page {}: no text lines, line height falls back to {}",
                stream.document,
                page,
                stream.line_height(page, settings.fallback_line_height)
            ),
        }

        for block in blocks {
            let text = block.text.trim();
            if text.is_empty() {
                continue;
            }
            stream.items.push(LayoutItem::Text(TextItem {
                page,
                text: text.to_string(),
                top: block.bbox.top,
                bottom: block.bbox.bottom,
            }));
        }
    }

    for entry in source.outline()? {
        stream.items.push(LayoutItem::Heading(HeadingItem {
            page: entry.page,
            text: entry.text,
            level: entry.level,
        }));
    }

    // Stable: equal keys keep emission order (text before headings)
    stream.items.sort_by(|a, b| {
        a.page()
            .cmp(&b.page())
            .then_with(|| a.sort_top().total_cmp(&b.sort_top()))
    });

    tracing::debug!(
        "[Layout] {}: {} items over {} pages",
        stream.document,
        stream.items.len(),
        source.page_count()
    );

    Ok(stream)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory layout source for tests
    pub(crate) struct MemSource {
        pub name: String,
        pub pages: Vec<Vec<RawBlock>>,
        pub outline: Vec<OutlineEntry>,
    }

    impl LayoutSource for MemSource {
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
            Ok(self.pages[(page - 1) as usize].clone())
        }
    }

    /// Single-line block spanning `top..top+height`
    pub(crate) fn block(text: &str, top: f32, height: f32) -> RawBlock {
        let bbox = BBox::new(50.0, top, 500.0, top + height);
        RawBlock { text: text.to_string(), bbox, lines: vec![bbox] }
    }

    pub(crate) fn heading(text: &str, level: u8, page: u32) -> OutlineEntry {
        OutlineEntry { text: text.to_string(), level: HeadingLevel(level), page }
    }

    #[test]
    fn test_heading_level_parse_and_display() {
        assert_eq!(HeadingLevel::parse("H2"), Some(HeadingLevel(2)));
        assert_eq!(HeadingLevel::parse("h3"), Some(HeadingLevel(3)));
        assert_eq!(HeadingLevel::parse("1"), Some(HeadingLevel(1)));
        assert_eq!(HeadingLevel::parse("title"), None);
        assert_eq!(HeadingLevel::NONE.to_string(), "H0");
    }

    #[test]
    fn test_heading_level_serde() {
        let entry: OutlineEntry =
            serde_json::from_str(r#"{"text": "Intro", "level": "H1", "page": 2}"#).unwrap();
        assert_eq!(entry.level, HeadingLevel(1));
        let entry: OutlineEntry =
            serde_json::from_str(r#"{"text": "Intro", "level": 3, "page": 2}"#).unwrap();
        assert_eq!(entry.level, HeadingLevel(3));
        assert_eq!(serde_json::to_string(&HeadingLevel(2)).unwrap(), "\"H2\"");
    }

    #[test]
    fn test_empty_blocks_dropped_and_trimmed() {
        let source = MemSource {
            name: "a.pdf".into(),
            pages: vec![vec![block("  hello  ", 10.0, 12.0), block("   ", 30.0, 12.0)]],
            outline: vec![],
        };
        let stream = extract_items(&source, &Settings::default()).unwrap();
        assert_eq!(stream.items.len(), 1);
        match &stream.items[0] {
            LayoutItem::Text(t) => assert_eq!(t.text, "hello"),
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn test_sorted_by_page_then_top_with_headings_first() {
        let source = MemSource {
            name: "a.pdf".into(),
            pages: vec![
                vec![block("second", 200.0, 10.0), block("first", 100.0, 10.0)],
                vec![block("page two", 50.0, 10.0)],
            ],
            outline: vec![heading("Chapter", 1, 2), heading("Intro", 1, 1)],
        };
        let stream = extract_items(&source, &Settings::default()).unwrap();
        let order: Vec<(u32, &str)> = stream
            .items
            .iter()
            .map(|i| match i {
                LayoutItem::Text(t) => (t.page, t.text.as_str()),
                LayoutItem::Heading(h) => (h.page, h.text.as_str()),
            })
            .collect();
        assert_eq!(
            order,
            vec![(1, "Intro"), (1, "first"), (1, "second"), (2, "Chapter"), (2, "page two")]
        );
    }

    #[test]
    fn test_line_height_per_page_with_carry_forward() {
        let source = MemSource {
            name: "a.pdf".into(),
            pages: vec![
                vec![block("a", 0.0, 10.0), block("b", 20.0, 20.0)],
                vec![RawBlock { text: "no lines".into(), bbox: BBox::new(0.0, 0.0, 1.0, 1.0), lines: vec![] }],
                vec![block("c", 0.0, 8.0)],
            ],
            outline: vec![],
        };
        let stream = extract_items(&source, &Settings::default()).unwrap();
        assert_eq!(stream.line_height(1, 12.0), 15.0);
        assert_eq!(stream.line_height(2, 12.0), 15.0);
        assert_eq!(stream.line_height(3, 12.0), 8.0);

        let empty = ItemStream::default();
        assert_eq!(empty.line_height(1, 12.0), 12.0);
    }

    #[test]
    fn test_bbox_serde_as_array() {
        let b: BBox = serde_json::from_str("[1.0, 2.0, 3.0, 4.0]").unwrap();
        assert_eq!(b, BBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(b.height(), 2.0);
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1.0,2.0,3.0,4.0]");
    }
}
