//! Layout config – the intermediate representation between layout computation
//! and PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on each page; `--layout-json` dumps it for inspection.

use serde::{Deserialize, Serialize};

use crate::fonts::ResolvedFont;

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,
    /// Bullet or number drawn in the gutter left of a list item; its
    /// offsets are relative to the box like any other line.
    #[serde(default)]
    pub list_marker: Option<TextLine>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
}

/// One line box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    /// X offset of the line start within the layout box (alignment and
    /// padding included).
    pub x_offset: f32,
    /// Y offset of the line top within the layout box.
    pub y_offset: f32,
    pub height: f32,
    /// Distance from the line top to the baseline.
    pub baseline: f32,
    pub runs: Vec<TextRun>,
}

impl TextLine {
    /// Visible text of the line.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn width(&self) -> f32 {
        self.runs.last().map_or(0.0, |r| r.x_offset + r.width)
    }
}

/// A stretch of text set in one face, size and colour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    /// X offset from the line start.
    pub x_offset: f32,
    pub width: f32,
    pub font: ResolvedFont,
    pub font_size: f32,
    pub color: [f32; 4],
    pub underline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    /// Create an empty A4 layout config.
    pub fn a4() -> Self {
        Self {
            title: Self::default_title(),
            // A4: 210mm × 297mm = 595.28 × 841.89 points
            page_width_pt: 595.28,
            page_height_pt: 841.89,
            pages: Vec::new(),
        }
    }

    pub(crate) fn default_title() -> String {
        "html2pdf output".to_string()
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Every text line on every page, in document order.
    pub fn text_lines(&self) -> Vec<String> {
        fn walk(lbox: &LayoutBox, out: &mut Vec<String>) {
            if let Some(text) = &lbox.text {
                out.extend(text.lines.iter().map(TextLine::text));
            }
            for child in &lbox.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for page in &self.pages {
            for lbox in &page.boxes {
                walk(lbox, &mut out);
            }
        }
        out
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            list_marker: None,
            children: Vec::new(),
        }
    }
}
