//! Pagination – splits a flat list of positioned boxes into pages.
//!
//! Handles:
//! - page boxes from `@page` (size, margins, a taller first-page top margin)
//! - page-break-before / page-break-after hints
//! - table row splitting across pages
//! - text blocks split between lines

use serde::{Deserialize, Serialize};

use crate::document::PageSize;
use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;
use crate::style;

/// Default page margins in points.
pub const PAGE_MARGIN_PT: f32 = 40.0;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Four box edges in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn uniform(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

/// Physical page box and its margins, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: Edges,
    /// Top margin of the first page, when it differs.
    pub first_margin_top: Option<f32>,
}

impl PageGeometry {
    pub fn from_size(size: PageSize) -> Self {
        Self {
            width: size.width_mm * PT_PER_MM,
            height: size.height_mm * PT_PER_MM,
            margin: Edges::uniform(PAGE_MARGIN_PT),
            first_margin_top: None,
        }
    }

    pub fn margin_top(&self, page_index: usize) -> f32 {
        match (page_index, self.first_margin_top) {
            (0, Some(top)) => top,
            _ => self.margin.top,
        }
    }

    pub fn content_width(&self) -> f32 {
        (self.width - self.margin.left - self.margin.right).max(1.0)
    }

    pub fn content_height(&self, page_index: usize) -> f32 {
        (self.height - self.margin_top(page_index) - self.margin.bottom).max(1.0)
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::from_size(PageSize::A4)
    }
}

/// Recursively expand any pure-container box whose height exceeds a single
/// page so its children can be split across pages individually.
fn flatten_for_pagination<'a>(
    boxes: &'a [PositionedBox],
    content_height: f32,
) -> Vec<&'a PositionedBox> {
    let mut result = Vec::new();
    for pbox in boxes {
        if pbox.height > content_height
            && matches!(pbox.content, BoxContent::None)
            && !pbox.children.is_empty()
        {
            result.extend(flatten_for_pagination(&pbox.children, content_height));
        } else {
            result.push(pbox);
        }
    }
    result
}

/// Mutable cursor over the pages being filled.
struct Pager<'g> {
    geometry: &'g PageGeometry,
    pages: Vec<PageLayout>,
    current: PageLayout,
    /// Document-space y at which the current page begins. All
    /// `PositionedBox.y` values are absolute document coordinates, so
    /// `pbox.y - page_start_doc_y` is the y-on-page of any box.
    page_start_doc_y: f32,
}

impl<'g> Pager<'g> {
    fn new(geometry: &'g PageGeometry) -> Self {
        Self {
            geometry,
            pages: Vec::new(),
            current: PageLayout {
                page_index: 0,
                boxes: Vec::new(),
            },
            page_start_doc_y: 0.0,
        }
    }

    fn index(&self) -> usize {
        self.pages.len()
    }

    fn content_height(&self) -> f32 {
        self.geometry.content_height(self.index())
    }

    fn top(&self) -> f32 {
        self.geometry.margin_top(self.index())
    }

    fn y_on_page(&self, doc_y: f32) -> f32 {
        (doc_y - self.page_start_doc_y).max(0.0)
    }

    fn is_empty(&self) -> bool {
        self.current.boxes.is_empty()
    }

    /// Close the current page; the next one starts at `doc_y`.
    fn break_page(&mut self, doc_y: f32) {
        let next = PageLayout {
            page_index: self.pages.len() + 1,
            boxes: Vec::new(),
        };
        self.pages.push(std::mem::replace(&mut self.current, next));
        self.page_start_doc_y = doc_y;
    }

    fn place(&mut self, pbox: &PositionedBox) {
        let abs_y = self.top() + self.y_on_page(pbox.y);
        self.current.boxes.push(build_layout_box(pbox, pbox.x, abs_y));
    }

    fn finish(mut self) -> Vec<PageLayout> {
        if !self.current.boxes.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

/// Convert positioned boxes into a paginated LayoutConfig.
pub fn paginate(boxes: &[PositionedBox], geometry: &PageGeometry, title: &str) -> LayoutConfig {
    let tallest_page = geometry.content_height(0).min(geometry.content_height(1));
    // Expand oversized wrapper divs so their children can paginate individually.
    let flat = flatten_for_pagination(boxes, tallest_page);

    let mut pager = Pager::new(geometry);
    for pbox in flat {
        if pbox.page_break_before && !pager.is_empty() {
            pager.break_page(pbox.y);
        }

        let box_bottom = pager.y_on_page(pbox.y) + pbox.height;
        if box_bottom > pager.content_height() {
            match &pbox.content {
                _ if is_table_like(pbox) && !pbox.page_break_inside_avoid => {
                    split_table_box(pbox, &mut pager);
                    continue;
                }
                BoxContent::Text { lines }
                    if pbox.children.is_empty() && !pbox.page_break_inside_avoid && !lines.is_empty() =>
                {
                    split_text_box(pbox, lines, &mut pager);
                    continue;
                }
                _ if !pager.is_empty() => pager.break_page(pbox.y),
                _ => {}
            }
        }

        pager.place(pbox);

        if pbox.page_break_after {
            pager.break_page(pbox.y + pbox.height);
        }
    }

    LayoutConfig {
        title: title.to_string(),
        page_width_pt: geometry.width,
        page_height_pt: geometry.height,
        pages: pager.finish(),
    }
}

fn is_table_like(pbox: &PositionedBox) -> bool {
    pbox.style.display == style::Display::Table && !pbox.children.is_empty()
}

fn split_table_box(pbox: &PositionedBox, pager: &mut Pager<'_>) {
    for child in &pbox.children {
        let y_on_page = pager.y_on_page(child.y);
        if y_on_page + child.height > pager.content_height() && !pager.is_empty() {
            pager.break_page(child.y);
        }
        pager.place(child);
    }
}

/// Place a text block line by line, continuing on following pages.
fn split_text_box(pbox: &PositionedBox, lines: &[TextLine], pager: &mut Pager<'_>) {
    // Offset inside the box where the next chunk starts.
    let mut origin = 0.0f32;
    let mut top_on_page = pager.y_on_page(pbox.y);
    let mut start = 0usize;

    while start < lines.len() {
        let available = pager.content_height() - top_on_page;
        let mut end = start;
        while end < lines.len() && lines[end].y_offset - origin + lines[end].height <= available {
            end += 1;
        }
        if end == start {
            if pager.is_empty() {
                // A single line taller than the page.
                end = start + 1;
            } else {
                pager.break_page(pbox.y + origin);
                top_on_page = 0.0;
                continue;
            }
        }

        let chunk_bottom = if end == lines.len() {
            pbox.height
        } else {
            lines[end - 1].y_offset + lines[end - 1].height
        };
        let mut lb = build_layout_box(pbox, pbox.x, pager.top() + top_on_page);
        lb.height = (chunk_bottom - origin).max(0.0);
        lb.text = Some(TextContent {
            lines: lines[start..end]
                .iter()
                .map(|line| TextLine {
                    y_offset: line.y_offset - origin,
                    ..line.clone()
                })
                .collect(),
        });
        if start > 0 {
            lb.list_marker = None;
        }
        pager.current.boxes.push(lb);

        if end < lines.len() {
            origin = lines[end].y_offset;
            pager.break_page(pbox.y + origin);
            top_on_page = 0.0;
        }
        start = end;
    }

    // Boxes after this one continue below the last chunk.
    pager.page_start_doc_y = pbox.y + origin - top_on_page;
}

/// Recursively build a LayoutBox tree where every box carries *page-absolute*
/// x/y coordinates (origin = top-left of the physical page).
///
/// For each child, its absolute y is derived by:
///   `child_abs_y = parent_abs_y + (child.y − parent.y)`
/// because PositionedBox.y values are accumulated document-space absolutes,
/// so the difference gives the child's position relative to its parent.
fn build_layout_box(pbox: &PositionedBox, abs_x: f32, abs_y: f32) -> LayoutBox {
    let mut lb = LayoutBox::new(abs_x, abs_y, pbox.width, pbox.height);

    if !pbox.style.background_color.is_transparent() {
        lb.background_color = Some(pbox.style.background_color.to_array());
    }

    if pbox.style.border_width > 0.0 {
        lb.border = Some(BorderStyle {
            width: pbox.style.border_width,
            color: pbox.style.border_color.to_array(),
        });
    }

    match &pbox.content {
        BoxContent::Text { lines } => {
            lb.text = Some(TextContent {
                lines: lines.clone(),
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::None => {}
    }
    lb.list_marker = pbox.marker.clone();

    for child in &pbox.children {
        let child_abs_y = abs_y + (child.y - pbox.y);
        lb.children.push(build_layout_box(child, child.x, child_abs_y));
    }

    lb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontManager;
    use crate::layout::compute_layout;
    use crate::resources::ResourceLoader;
    use crate::style::{style_body, StyleSheet};

    fn layout(html: &str, geometry: &PageGeometry) -> LayoutConfig {
        let doc = crate::dom::Document::parse(html);
        let sheet = StyleSheet::parse(&doc.style_sheet_text());
        let (body_style, styled) = style_body(&doc.body, &sheet);
        let fonts = FontManager::default();
        let resources = ResourceLoader::new(None);
        let boxes = compute_layout(&styled, &body_style, geometry, &fonts, &resources).unwrap();
        paginate(&boxes, geometry, "test")
    }

    #[test]
    fn single_page() {
        let config = layout("<p>Short text</p>", &PageGeometry::default());
        assert_eq!(config.pages.len(), 1);
        assert_eq!(config.title, "test");
    }

    #[test]
    fn multiple_pages() {
        let mut html = String::new();
        for i in 0..80 {
            html.push_str(&format!("<p>Paragraph {} with some text</p>", i));
        }
        let config = layout(&html, &PageGeometry::default());
        assert!(
            config.pages.len() > 1,
            "Expected multiple pages, got {}",
            config.pages.len()
        );
    }

    #[test]
    fn first_page_margin_moves_content_down() {
        let geometry = PageGeometry {
            first_margin_top: Some(130.0),
            ..PageGeometry::default()
        };
        let config = layout("<p>Top</p>", &geometry);
        let first = &config.pages[0].boxes[0];
        assert!((first.y - 130.0).abs() < 0.01, "y = {}", first.y);
    }

    #[test]
    fn later_pages_use_regular_margin() {
        let geometry = PageGeometry {
            first_margin_top: Some(130.0),
            ..PageGeometry::default()
        };
        let html = r#"<p>one</p><p style="page-break-before: always">two</p>"#;
        let config = layout(html, &geometry);
        assert_eq!(config.pages.len(), 2);
        let second = &config.pages[1].boxes[0];
        assert!((second.y - PAGE_MARGIN_PT).abs() < 0.01, "y = {}", second.y);
    }

    #[test]
    fn long_text_is_split_between_lines() {
        let body = "word ".repeat(3000);
        let config = layout(&format!("<p>{body}</p>"), &PageGeometry::default());
        assert!(config.pages.len() > 1);
        let geometry = PageGeometry::default();
        for page in &config.pages {
            for b in &page.boxes {
                assert!(
                    b.y + b.height <= geometry.height - geometry.margin.bottom + 0.5,
                    "box overflows page: y={} h={}",
                    b.y,
                    b.height
                );
            }
        }
    }

    #[test]
    fn geometry_content_box() {
        let g = PageGeometry {
            margin: Edges {
                top: 130.0,
                right: 55.0,
                bottom: 60.0,
                left: 55.0,
            },
            first_margin_top: Some(100.0),
            ..PageGeometry::default()
        };
        assert!((g.content_width() - (g.width - 110.0)).abs() < 0.001);
        assert!((g.content_height(0) - (g.height - 160.0)).abs() < 0.001);
        assert!((g.content_height(3) - (g.height - 190.0)).abs() < 0.001);
    }
}
