//! Layout engine – lowers the styled tree onto Taffy (flexbox / grid), breaks
//! inline content into styled line boxes, and extracts a tree of positioned
//! boxes in document coordinates.
//!
//! Block boxes map to flex columns, table rows to flex rows and cells to
//! growing flex items. Runs of inline content (text, `<b>`, `<a>`, `<br>`, …)
//! are broken into lines at build time against the estimated width of their
//! container; the resulting height is fixed on a Taffy leaf.

use std::collections::{HashMap, HashSet};
use std::fmt;

use taffy::prelude::*;

use crate::dom::Tag;
use crate::error::RenderError;
use crate::fonts::{FontManager, ResolvedFont};
use crate::layout_config::{TextLine, TextRun};
use crate::pagination::PageGeometry;
use crate::resources::{ResourceLoader, PT_PER_PX};
use crate::style::{self, ComputedStyle, StyledNode, TextAlign, TextDecoration};

/// Space between a list marker and the item's border box.
const MARKER_GAP_PT: f32 = 4.0;

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    /// List marker drawn left of the box.
    pub marker: Option<TextLine>,
    pub children: Vec<PositionedBox>,
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    /// Line boxes with offsets relative to the box.
    Text { lines: Vec<TextLine> },
    Image { src: String },
}

// ---------------------------------------------------------------------------
// Inline formatting
// ---------------------------------------------------------------------------

/// A leaf of an inline subtree.
enum Segment<'s> {
    Text {
        text: &'s str,
        style: &'s ComputedStyle,
        underline: bool,
    },
    Break {
        style: &'s ComputedStyle,
    },
}

impl Segment<'_> {
    fn style(&self) -> &ComputedStyle {
        match self {
            Segment::Text { style, .. } | Segment::Break { style } => style,
        }
    }
}

fn collect_segments<'s>(node: &'s StyledNode, underline: bool, out: &mut Vec<Segment<'s>>) {
    match node {
        StyledNode::Text { text, style } => out.push(Segment::Text {
            text,
            style,
            underline: underline || style.text_decoration == TextDecoration::Underline,
        }),
        StyledNode::Element {
            tag: Tag::Br, style, ..
        } => out.push(Segment::Break { style }),
        StyledNode::Element {
            style, children, ..
        } => {
            let underline = underline || style.text_decoration == TextDecoration::Underline;
            for child in children {
                collect_segments(child, underline, out);
            }
        }
    }
}

/// Text, or an inline element whose whole subtree is inline.
fn is_inline_content(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element {
            tag,
            style,
            children,
            ..
        } => *tag != Tag::Img && style.display.is_inline() && children.iter().all(is_inline_content),
    }
}

fn is_collapsible_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r' | '\u{000C}')
}

/// Everything that decides how a run of text is drawn.
#[derive(Debug, Clone, PartialEq)]
struct RunStyle {
    font: ResolvedFont,
    size: f32,
    color: [f32; 4],
    underline: bool,
    line_height: f32,
}

impl RunStyle {
    fn new(fonts: &FontManager, style: &ComputedStyle, underline: bool) -> Self {
        Self {
            font: fonts.resolve(&style.font_family, style.is_bold(), style.is_italic()),
            size: style.font_size,
            color: style.color.to_array(),
            underline,
            line_height: fonts.line_height_px(style.font_size, style.line_height),
        }
    }
}

enum Item {
    /// Pieces with no break opportunity between them.
    Chunk {
        space_before: Option<usize>,
        pieces: Vec<(String, usize)>,
        nowrap: bool,
    },
    Break(usize),
}

fn push_piece(items: &mut Vec<Item>, space: &mut Option<usize>, text: String, idx: usize, nowrap: bool) {
    if space.is_none() {
        if let Some(Item::Chunk { pieces, .. }) = items.last_mut() {
            pieces.push((text, idx));
            return;
        }
    }
    items.push(Item::Chunk {
        space_before: space.take(),
        pieces: vec![(text, idx)],
        nowrap,
    });
}

/// Split segments into words and forced breaks, collapsing white space
/// outside preformatted text.
fn tokenize(segments: &[Segment<'_>]) -> Vec<Item> {
    let mut items = Vec::new();
    let mut space: Option<usize> = None;
    for (idx, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Break { .. } => {
                items.push(Item::Break(idx));
                space = None;
            }
            Segment::Text { text, style, .. } if style.white_space_pre => {
                for (n, part) in text.split('\n').enumerate() {
                    if n > 0 {
                        items.push(Item::Break(idx));
                        space = None;
                    }
                    let part = part.trim_end_matches('\r').replace('\t', "    ");
                    if !part.is_empty() {
                        push_piece(&mut items, &mut space, part, idx, true);
                    }
                }
            }
            Segment::Text { text, .. } => {
                let mut word = String::new();
                for ch in text.chars() {
                    if is_collapsible_space(ch) {
                        if !word.is_empty() {
                            push_piece(&mut items, &mut space, std::mem::take(&mut word), idx, false);
                        }
                        space.get_or_insert(idx);
                    } else {
                        word.push(ch);
                    }
                }
                if !word.is_empty() {
                    push_piece(&mut items, &mut space, word, idx, false);
                }
            }
        }
    }
    items
}

/// The line being filled.
#[derive(Default)]
struct LineBuf {
    runs: Vec<TextRun>,
    styles: Vec<usize>,
    width: f32,
    line_height: f32,
}

impl LineBuf {
    fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    fn push(&mut self, text: &str, idx: usize, width: f32, style: &RunStyle) {
        let same_style = self.runs.last().is_some_and(|run| {
            run.font == style.font
                && run.font_size == style.size
                && run.color == style.color
                && run.underline == style.underline
        });
        if same_style {
            if let Some(run) = self.runs.last_mut() {
                run.text.push_str(text);
                run.width += width;
            }
        } else {
            self.runs.push(TextRun {
                text: text.to_string(),
                x_offset: self.width,
                width,
                font: style.font.clone(),
                font_size: style.size,
                color: style.color,
                underline: style.underline,
            });
        }
        self.styles.push(idx);
        self.width += width;
        self.line_height = self.line_height.max(style.line_height);
    }
}

/// Broken lines of one inline formatting context.
#[derive(Debug, Clone)]
struct TextBlock {
    /// Lines with `x_offset` 0 and `y_offset` from the content top.
    lines: Vec<TextLine>,
    height: f32,
    max_width: f32,
    align: TextAlign,
    inset_left: f32,
    inset_top: f32,
    inset_right: f32,
}

impl TextBlock {
    /// Lines positioned inside a border box of `box_width`.
    fn place(&self, box_width: f32) -> Vec<TextLine> {
        let content_width = (box_width - self.inset_left - self.inset_right).max(0.0);
        self.lines
            .iter()
            .map(|line| {
                let free = (content_width - line.width()).max(0.0);
                let shift = match self.align {
                    TextAlign::Left => 0.0,
                    TextAlign::Center => free / 2.0,
                    TextAlign::Right => free,
                };
                TextLine {
                    x_offset: self.inset_left + shift,
                    y_offset: self.inset_top + line.y_offset,
                    ..line.clone()
                }
            })
            .collect()
    }
}

struct LineBreaker<'f> {
    fonts: &'f FontManager,
    styles: Vec<RunStyle>,
    width: f32,
}

impl<'f> LineBreaker<'f> {
    fn measure(&self, text: &str, idx: usize) -> f32 {
        let style = &self.styles[idx];
        self.fonts.measure_resolved(&style.font, text, style.size)
    }

    fn finish(&self, buf: &mut LineBuf, fallback: usize, y: &mut f32) -> TextLine {
        let line = std::mem::take(buf);
        let (height, baseline) = if line.runs.is_empty() {
            let style = &self.styles[fallback];
            let ascent = self.fonts.ascent(&style.font, style.size);
            (style.line_height, (style.line_height - style.size) / 2.0 + ascent)
        } else {
            let height = line.line_height;
            let baseline = line
                .runs
                .iter()
                .map(|r| (height - r.font_size) / 2.0 + self.fonts.ascent(&r.font, r.font_size))
                .fold(0.0f32, f32::max);
            (height, baseline)
        };
        let out = TextLine {
            x_offset: 0.0,
            y_offset: *y,
            height,
            baseline,
            runs: line.runs,
        };
        *y += height;
        out
    }

    /// Greedy line breaking; `None` when nothing visible is left.
    fn break_lines(&self, items: Vec<Item>) -> Option<Vec<TextLine>> {
        if items.is_empty() {
            return None;
        }
        let mut lines = Vec::new();
        let mut buf = LineBuf::default();
        let mut y = 0.0f32;

        for item in items {
            match item {
                Item::Break(idx) => lines.push(self.finish(&mut buf, idx, &mut y)),
                Item::Chunk {
                    space_before,
                    pieces,
                    nowrap,
                } => {
                    let chunk_width: f32 = pieces.iter().map(|(t, i)| self.measure(t, *i)).sum();
                    let mut space = space_before.filter(|_| !buf.is_empty());
                    if let Some(si) = space {
                        let space_width = self.measure(" ", si);
                        if !nowrap && buf.width + space_width + chunk_width > self.width {
                            let first = buf.styles.first().copied().unwrap_or(si);
                            lines.push(self.finish(&mut buf, first, &mut y));
                            space = None;
                        }
                    }
                    if let Some(si) = space {
                        let w = self.measure(" ", si);
                        buf.push(" ", si, w, &self.styles[si]);
                    }
                    for (text, idx) in &pieces {
                        let w = self.measure(text, *idx);
                        buf.push(text, *idx, w, &self.styles[*idx]);
                    }
                }
            }
        }
        if !buf.is_empty() {
            let first = buf.styles.first().copied().unwrap_or(0);
            lines.push(self.finish(&mut buf, first, &mut y));
        }
        Some(lines)
    }
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

enum NodeContent {
    None,
    Text(TextBlock),
    Image { src: String },
}

struct NodeInfo {
    style: ComputedStyle,
    content: NodeContent,
    marker: Option<TextLine>,
}

fn layout_err(e: impl fmt::Display) -> RenderError {
    RenderError::Layout(e.to_string())
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    resources: &'a ResourceLoader,
    nodes: HashMap<NodeId, NodeInfo>,
    /// Leaves that only reserve the height of their parent's text.
    spacers: HashSet<NodeId>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, resources: &'a ResourceLoader) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            resources,
            nodes: HashMap::new(),
            spacers: HashSet::new(),
        }
    }

    /// Break a run of inline nodes at `width`.
    fn text_block(
        &self,
        nodes: &[&StyledNode],
        block_style: &ComputedStyle,
        width: f32,
    ) -> Option<TextBlock> {
        let mut segments = Vec::new();
        for node in nodes {
            collect_segments(node, false, &mut segments);
        }
        let breaker = LineBreaker {
            fonts: self.fonts,
            styles: segments
                .iter()
                .map(|s| {
                    let underline = matches!(s, Segment::Text { underline: true, .. });
                    RunStyle::new(self.fonts, s.style(), underline)
                })
                .collect(),
            width,
        };
        let lines = breaker.break_lines(tokenize(&segments))?;
        let height = lines.iter().map(|l| l.height).sum();
        let max_width = lines.iter().map(TextLine::width).fold(0.0f32, f32::max);
        Some(TextBlock {
            lines,
            height,
            max_width,
            align: block_style.text_align,
            inset_left: 0.0,
            inset_top: 0.0,
            inset_right: 0.0,
        })
    }

    /// Emit an anonymous text leaf for the pending inline nodes.
    fn flush_inline(
        &mut self,
        pending: &mut Vec<&StyledNode>,
        parent_style: &ComputedStyle,
        width: f32,
        in_row: bool,
        ids: &mut Vec<NodeId>,
    ) -> Result<(), RenderError> {
        if pending.is_empty() {
            return Ok(());
        }
        let block = self.text_block(pending, parent_style, width);
        pending.clear();
        let Some(block) = block else {
            return Ok(());
        };

        let leaf_style = Style {
            size: Size {
                width: if in_row {
                    taffy::Dimension::Length(block.max_width)
                } else {
                    taffy::Dimension::Auto
                },
                height: taffy::Dimension::Length(block.height),
            },
            min_size: Size {
                width: taffy::Dimension::Length(block.max_width.min(width)),
                height: taffy::Dimension::Auto,
            },
            ..Default::default()
        };
        let node = self.taffy.new_leaf(leaf_style).map_err(layout_err)?;
        self.nodes.insert(
            node,
            NodeInfo {
                style: parent_style.inherited(),
                content: NodeContent::Text(block),
                marker: None,
            },
        );
        ids.push(node);
        Ok(())
    }

    fn build_children(
        &mut self,
        parent_tag: &Tag,
        parent_style: &ComputedStyle,
        parent_attrs: Option<&HashMap<String, String>>,
        children: &[StyledNode],
        inner_width: f32,
    ) -> Result<Vec<NodeId>, RenderError> {
        let in_row = lays_out_in_row(parent_tag, parent_style);
        let share = child_share(parent_style, children, inner_width, in_row);

        let mut counter = match parent_tag {
            Tag::Ol => parent_attrs
                .and_then(|a| a.get("start"))
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(1),
            _ => 1,
        };

        let mut ids = Vec::new();
        let mut pending: Vec<&StyledNode> = Vec::new();
        for child in children {
            if is_inline_content(child) {
                pending.push(child);
                continue;
            }
            self.flush_inline(&mut pending, parent_style, share, in_row, &mut ids)?;
            let id = self.build_node(child, inner_width, share)?;

            if let StyledNode::Element {
                tag: Tag::Li,
                style,
                ..
            } = child
            {
                let label = match parent_tag {
                    Tag::Ol => {
                        let label = format!("{counter}.");
                        counter += 1;
                        Some(label)
                    }
                    Tag::Ul => Some("\u{2022}".to_string()),
                    _ => None,
                };
                if let Some(label) = label {
                    let marker = self.list_marker(id, style, &label);
                    if let Some(info) = self.nodes.get_mut(&id) {
                        info.marker = Some(marker);
                    }
                }
            }
            ids.push(id);
        }
        self.flush_inline(&mut pending, parent_style, share, in_row, &mut ids)?;
        Ok(ids)
    }

    /// Marker line aligned with the item's first line.
    fn list_marker(&self, item: NodeId, style: &ComputedStyle, label: &str) -> TextLine {
        let run_style = RunStyle::new(self.fonts, style, false);
        let width = self.fonts.measure_resolved(&run_style.font, label, run_style.size);
        let inset_top = style.padding_top + style.border_width;
        let first_line = match self.nodes.get(&item).map(|i| &i.content) {
            Some(NodeContent::Text(block)) => block.lines.first().map(|l| (l.height, l.baseline)),
            _ => None,
        };
        let (height, baseline) = first_line.unwrap_or_else(|| {
            let ascent = self.fonts.ascent(&run_style.font, run_style.size);
            (
                run_style.line_height,
                (run_style.line_height - run_style.size) / 2.0 + ascent,
            )
        });
        TextLine {
            x_offset: -(width + MARKER_GAP_PT),
            y_offset: inset_top,
            height,
            baseline,
            runs: vec![TextRun {
                text: label.to_string(),
                x_offset: 0.0,
                width,
                font: run_style.font,
                font_size: run_style.size,
                color: run_style.color,
                underline: false,
            }],
        }
    }

    fn build_node(
        &mut self,
        styled: &StyledNode,
        containing: f32,
        auto_width: f32,
    ) -> Result<NodeId, RenderError> {
        match styled {
            StyledNode::Text { style, .. } => {
                // Only reached for stray text handed in directly.
                let mut ids = Vec::new();
                let mut pending = vec![styled];
                self.flush_inline(&mut pending, style, auto_width, false, &mut ids)?;
                match ids.pop() {
                    Some(id) => Ok(id),
                    None => self.taffy.new_leaf(Style::default()).map_err(layout_err),
                }
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => {
                if *tag == Tag::Img {
                    return self.build_image(style, attrs, containing, auto_width);
                }
                self.build_element(tag, style, children, attrs, containing, auto_width)
            }
        }
    }

    fn build_element(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        containing: f32,
        auto_width: f32,
    ) -> Result<NodeId, RenderError> {
        let mut outer = style
            .width
            .resolve(containing)
            .unwrap_or(auto_width - style.margin_left - style.margin_right);
        if let Some(max) = style.max_width.resolve(containing) {
            outer = outer.min(max);
        }
        let inset_left = style.padding_left + style.border_width;
        let inset_right = style.padding_right + style.border_width;
        let inner = (outer - inset_left - inset_right).max(1.0);
        let taffy_style = computed_to_taffy(style, tag);

        // A block holding only inline content is its own text box.
        if !children.is_empty() && children.iter().all(is_inline_content) {
            let inline: Vec<&StyledNode> = children.iter().collect();
            if let Some(mut block) = self.text_block(&inline, style, inner) {
                block.inset_left = inset_left;
                block.inset_right = inset_right;
                block.inset_top = style.padding_top + style.border_width;
                let spacer = self
                    .taffy
                    .new_leaf(Style {
                        size: Size {
                            width: taffy::Dimension::Auto,
                            height: taffy::Dimension::Length(block.height),
                        },
                        min_size: Size {
                            width: taffy::Dimension::Length(block.max_width.min(inner)),
                            height: taffy::Dimension::Auto,
                        },
                        ..Default::default()
                    })
                    .map_err(layout_err)?;
                self.spacers.insert(spacer);
                let node = self
                    .taffy
                    .new_with_children(taffy_style, &[spacer])
                    .map_err(layout_err)?;
                self.nodes.insert(
                    node,
                    NodeInfo {
                        style: style.clone(),
                        content: NodeContent::Text(block),
                        marker: None,
                    },
                );
                return Ok(node);
            }
        }

        let child_ids = self.build_children(tag, style, Some(attrs), children, inner)?;
        let node = self
            .taffy
            .new_with_children(taffy_style, &child_ids)
            .map_err(layout_err)?;
        self.nodes.insert(
            node,
            NodeInfo {
                style: style.clone(),
                content: NodeContent::None,
                marker: None,
            },
        );
        Ok(node)
    }

    /// Size an `<img>` from its declared and intrinsic dimensions, never
    /// wider than the space available to it.
    fn build_image(
        &mut self,
        style: &ComputedStyle,
        attrs: &HashMap<String, String>,
        containing: f32,
        auto_width: f32,
    ) -> Result<NodeId, RenderError> {
        let src = attrs.get("src").map(|s| s.trim().to_string()).unwrap_or_default();
        let intrinsic = if src.is_empty() {
            None
        } else {
            self.resources.image_size(&src)
        }
        .map(|(w, h)| (w as f32 * PT_PER_PX, h as f32 * PT_PER_PX))
        .filter(|(w, h)| *w > 0.0 && *h > 0.0);

        let known_w = style.width.resolve(containing);
        let known_h = match style.height {
            style::Dimension::Pt(v) => Some(v),
            _ => None,
        };
        let (mut width, mut height) = match (known_w, known_h, intrinsic) {
            (Some(w), Some(h), _) => (w, h),
            (Some(w), None, Some((iw, ih))) => (w, w * ih / iw),
            (None, Some(h), Some((iw, ih))) => (h * iw / ih, h),
            (None, None, Some(dims)) => dims,
            (Some(w), None, None) => (w, 0.0),
            (None, Some(h), None) => (0.0, h),
            (None, None, None) => (0.0, 0.0),
        };
        let available = (auto_width - style.margin_left - style.margin_right).max(0.0);
        if width > available && width > 0.0 {
            height *= available / width;
            width = available;
        }

        let taffy_style = Style {
            size: Size {
                width: taffy::Dimension::Length(width),
                height: taffy::Dimension::Length(height),
            },
            margin: margin_rect(style),
            flex_shrink: 0.0,
            ..Default::default()
        };
        let node = self.taffy.new_leaf(taffy_style).map_err(layout_err)?;
        let content = if !src.is_empty() && width > 0.0 && height > 0.0 {
            NodeContent::Image { src }
        } else {
            NodeContent::None
        };
        self.nodes.insert(
            node,
            NodeInfo {
                style: style.clone(),
                content,
                marker: None,
            },
        );
        Ok(node)
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox, RenderError> {
        let layout = self.taffy.layout(node).map_err(layout_err)?;
        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let info = self.nodes.get(&node);
        let style = info.map(|i| i.style.clone()).unwrap_or_default();
        let content = match info.map(|i| &i.content) {
            Some(NodeContent::Text(block)) => BoxContent::Text {
                lines: block.place(layout.size.width),
            },
            Some(NodeContent::Image { src }) => BoxContent::Image { src: src.clone() },
            Some(NodeContent::None) | None => BoxContent::None,
        };

        let mut children = Vec::new();
        for child in self.taffy.children(node).map_err(layout_err)? {
            if !self.spacers.contains(&child) {
                children.push(self.extract(child, x, y)?);
            }
        }

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            page_break_before: style.page_break_before,
            page_break_after: style.page_break_after,
            page_break_inside_avoid: style.page_break_inside_avoid,
            marker: info.and_then(|i| i.marker.clone()),
            style,
            content,
            children,
        })
    }
}

fn lays_out_in_row(tag: &Tag, s: &ComputedStyle) -> bool {
    *tag == Tag::Tr
        || s.display == style::Display::TableRow
        || (s.display == style::Display::Flex && s.flex_direction == style::FlexDirection::Row)
}

/// Width estimate for an auto-width child, used to break its text before
/// Taffy runs.
fn child_share(s: &ComputedStyle, children: &[StyledNode], inner: f32, in_row: bool) -> f32 {
    if in_row {
        let items: Vec<&ComputedStyle> = children
            .iter()
            .filter(|c| !is_inline_content(c))
            .filter_map(|c| match c {
                StyledNode::Element { style, .. } => Some(style),
                StyledNode::Text { .. } => None,
            })
            .collect();
        let fixed: f32 = items.iter().filter_map(|c| c.width.resolve(inner)).sum();
        let autos = items.iter().filter(|c| c.width.resolve(inner).is_none()).count();
        if autos == 0 {
            return inner;
        }
        let gaps = s.gap * items.len().saturating_sub(1) as f32;
        ((inner - fixed - gaps) / autos as f32).max(1.0)
    } else if s.display == style::Display::Grid {
        let cols = s.grid_template_columns.len().max(1);
        ((inner - s.gap * (cols - 1) as f32) / cols as f32).max(1.0)
    } else {
        inner
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: LengthPercentageAuto::Length(s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: LengthPercentageAuto::Length(s.margin_left),
    }
}

fn padding_rect(s: &ComputedStyle) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(s.padding_top),
        right: LengthPercentage::Length(s.padding_right),
        bottom: LengthPercentage::Length(s.padding_bottom),
        left: LengthPercentage::Length(s.padding_left),
    }
}

fn border_rect(s: &ComputedStyle) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(s.border_width),
        right: LengthPercentage::Length(s.border_width),
        bottom: LengthPercentage::Length(s.border_width),
        left: LengthPercentage::Length(s.border_width),
    }
}

fn dim_to_taffy(d: style::Dimension) -> taffy::Dimension {
    match d {
        style::Dimension::Auto => taffy::Dimension::Auto,
        style::Dimension::Pt(v) => taffy::Dimension::Length(v),
        style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
    }
}

fn track_to_taffy(track: style::GridTrack) -> taffy::TrackSizingFunction {
    match track {
        style::GridTrack::Pt(v) => taffy::TrackSizingFunction::from_length(v),
        style::GridTrack::Fr(v) => taffy::TrackSizingFunction::from_flex(v),
        style::GridTrack::Auto => auto(),
    }
}

fn computed_to_taffy(s: &ComputedStyle, tag: &Tag) -> Style {
    let mut ts = Style {
        margin: margin_rect(s),
        padding: padding_rect(s),
        border: border_rect(s),
        ..Default::default()
    };

    // HTML table model: always flex, regardless of computed display.
    let display = match tag {
        Tag::Table => style::Display::Table,
        Tag::Tr => style::Display::TableRow,
        Tag::Td | Tag::Th => style::Display::TableCell,
        _ => s.display,
    };

    match display {
        style::Display::TableRow => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Row;
            ts.align_items = Some(taffy::AlignItems::Stretch);
            ts.size.width = taffy::Dimension::Percent(1.0);
            ts.min_size.width = taffy::Dimension::Length(0.0);
            return ts;
        }
        style::Display::TableCell => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            ts.min_size.width = taffy::Dimension::Length(0.0);
            match s.width {
                style::Dimension::Auto => {
                    // Equal share of what the fixed-width cells leave.
                    ts.flex_grow = 1.0;
                    ts.flex_shrink = 1.0;
                    ts.flex_basis = taffy::Dimension::Length(0.0);
                }
                width => {
                    ts.flex_grow = 0.0;
                    ts.flex_shrink = 0.0;
                    ts.flex_basis = dim_to_taffy(width);
                    ts.size.width = dim_to_taffy(width);
                }
            }
            ts.size.height = dim_to_taffy(s.height);
            return ts;
        }
        style::Display::Table => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            ts.size.width = dim_to_taffy(s.width);
            ts.size.height = dim_to_taffy(s.height);
            ts.min_size.width = taffy::Dimension::Length(0.0);
            ts.max_size.width = dim_to_taffy(s.max_width);
            return ts;
        }
        style::Display::Flex => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = match s.flex_direction {
                style::FlexDirection::Row => taffy::FlexDirection::Row,
                style::FlexDirection::Column => taffy::FlexDirection::Column,
            };
            ts.flex_wrap = match s.flex_wrap {
                style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
            };
            ts.justify_content = Some(match s.justify_content {
                style::JustifyContent::Start => taffy::JustifyContent::Start,
                style::JustifyContent::End => taffy::JustifyContent::End,
                style::JustifyContent::Center => taffy::JustifyContent::Center,
                style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                style::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                style::JustifyContent::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
            });
            ts.align_items = Some(match s.align_items {
                style::AlignItems::Start => taffy::AlignItems::Start,
                style::AlignItems::End => taffy::AlignItems::End,
                style::AlignItems::Center => taffy::AlignItems::Center,
                style::AlignItems::Stretch => taffy::AlignItems::Stretch,
            });
        }
        style::Display::Grid => {
            ts.display = taffy::Display::Grid;
            ts.grid_template_columns = if s.grid_template_columns.is_empty() {
                vec![taffy::TrackSizingFunction::from_flex(1.0)]
            } else {
                s.grid_template_columns.iter().copied().map(track_to_taffy).collect()
            };
        }
        style::Display::None => {
            ts.display = taffy::Display::None;
        }
        // Inline boxes only get here when they contain blocks; lay them out
        // as blocks.
        style::Display::Block
        | style::Display::ListItem
        | style::Display::Inline
        | style::Display::InlineBlock => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
        }
    }

    ts.size = Size {
        width: dim_to_taffy(s.width),
        height: dim_to_taffy(s.height),
    };
    // Allow flex/shrink items to compress below their natural content size
    ts.min_size = Size {
        width: if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
            taffy::Dimension::Length(0.0)
        } else {
            dim_to_taffy(s.min_width)
        },
        height: taffy::Dimension::Auto,
    };
    ts.max_size = Size {
        width: dim_to_taffy(s.max_width),
        height: taffy::Dimension::Auto,
    };
    ts.flex_grow = s.flex_grow;
    ts.flex_shrink = s.flex_shrink;
    ts.gap = Size {
        width: LengthPercentage::Length(s.gap),
        height: LengthPercentage::Length(s.gap),
    };
    ts
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a styled body, returning its top-level positioned
/// boxes in document coordinates (x includes the left page margin, y starts
/// at 0 on an endless first page).
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    body_style: &ComputedStyle,
    geometry: &PageGeometry,
    fonts: &FontManager,
    resources: &ResourceLoader,
) -> Result<Vec<PositionedBox>, RenderError> {
    let content_width = geometry.content_width();
    let b = body_style;
    let inset_left = b.margin_left + b.padding_left + b.border_width;
    let inset_right = b.margin_right + b.padding_right + b.border_width;
    let inner = (content_width - inset_left - inset_right).max(1.0);

    let mut builder = LayoutBuilder::new(fonts, resources);
    let child_ids = builder.build_children(&Tag::Body, body_style, None, styled_nodes, inner)?;

    // The body's own margins and padding become the root's padding.
    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(content_width),
            height: taffy::Dimension::Auto,
        },
        padding: Rect {
            top: LengthPercentage::Length(b.margin_top + b.padding_top + b.border_width),
            right: LengthPercentage::Length(inset_right),
            bottom: LengthPercentage::Length(b.margin_bottom + b.padding_bottom + b.border_width),
            left: LengthPercentage::Length(inset_left),
        },
        ..Default::default()
    };
    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(layout_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(content_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_err)?;

    let root_box = builder.extract(root, geometry.margin.left, 0.0)?;
    log::debug!(
        "layout: {} top-level boxes, document height {:.1}pt",
        root_box.children.len(),
        root_box.height
    );
    Ok(root_box.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::fonts::BuiltinFamily;
    use crate::style::{style_body, StyleSheet};

    fn boxes(html: &str) -> Vec<PositionedBox> {
        let doc = Document::parse(html);
        let sheet = StyleSheet::parse(&doc.style_sheet_text());
        let (body_style, styled) = style_body(&doc.body, &sheet);
        let fonts = FontManager::default();
        let resources = ResourceLoader::new(None);
        compute_layout(&styled, &body_style, &PageGeometry::default(), &fonts, &resources).unwrap()
    }

    fn lines(pbox: &PositionedBox) -> &[TextLine] {
        match &pbox.content {
            BoxContent::Text { lines } => lines,
            other => panic!("expected text, got {other:?}"),
        }
    }

    fn texts(pbox: &PositionedBox) -> Vec<String> {
        lines(pbox).iter().map(TextLine::text).collect()
    }

    #[test]
    fn layout_simple_paragraph() {
        let boxes = boxes("<p>Hello world</p>");
        assert_eq!(boxes.len(), 1);
        let first = &boxes[0];
        assert!(first.width > 0.0, "Box should have width");
        assert!(first.height > 0.0, "Box should have height");
        assert!((first.x - 40.0).abs() < 0.01);
        assert_eq!(texts(first), vec!["Hello world"]);
    }

    #[test]
    fn inline_elements_become_styled_runs() {
        let boxes = boxes(r#"<p>Hello <b>bold</b> <a href="x">link</a></p>"#);
        let line = &lines(&boxes[0])[0];
        assert_eq!(line.text(), "Hello bold link");

        let bold = line.runs.iter().find(|r| r.text == "bold").unwrap();
        assert!(matches!(bold.font, ResolvedFont::Builtin { bold: true, .. }));
        let link = line.runs.iter().find(|r| r.text == "link").unwrap();
        assert!(link.underline);
        assert!(link.color[2] > link.color[0]);
        // Runs follow each other on the line.
        for pair in line.runs.windows(2) {
            assert!((pair[0].x_offset + pair[0].width - pair[1].x_offset).abs() < 0.01);
        }
    }

    #[test]
    fn underline_reaches_nested_inline_text() {
        let boxes = boxes(r#"<p><a href="x"><b>bold link</b></a></p>"#);
        let line = &lines(&boxes[0])[0];
        assert!(line.runs.iter().all(|r| r.underline));
    }

    #[test]
    fn long_text_wraps_within_box() {
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        let boxes = boxes(&format!("<p>{text}</p>"));
        let p = &boxes[0];
        let lines = lines(p);
        assert!(lines.len() > 3);
        for line in lines {
            assert!(line.width() <= p.width + 0.01, "{} > {}", line.width(), p.width);
        }
        let total: f32 = lines.iter().map(|l| l.height).sum();
        assert!((total - p.height).abs() < 0.01);
    }

    #[test]
    fn br_forces_a_line_break() {
        let boxes = boxes("<p>first<br>second</p>");
        assert_eq!(texts(&boxes[0]), vec!["first", "second"]);
    }

    #[test]
    fn pre_keeps_spaces_and_newlines() {
        let boxes = boxes("<pre>a  b\n\tc</pre>");
        assert_eq!(texts(&boxes[0]), vec!["a  b", "    c"]);
        let run = &lines(&boxes[0])[0].runs[0];
        assert!(matches!(
            run.font,
            ResolvedFont::Builtin {
                family: BuiltinFamily::Courier,
                ..
            }
        ));
    }

    #[test]
    fn whitespace_between_blocks_is_dropped() {
        let boxes = boxes("<div>\n  <p>a</p>\n  <p>b</p>\n</div>");
        assert_eq!(boxes[0].children.len(), 2);
    }

    #[test]
    fn mixed_inline_and_block_children() {
        let boxes = boxes("<div>intro<p>para</p>tail</div>");
        let div = &boxes[0];
        assert_eq!(div.children.len(), 3);
        assert_eq!(texts(&div.children[0]), vec!["intro"]);
        assert_eq!(texts(&div.children[2]), vec!["tail"]);
        assert!(div.children[2].y > div.children[1].y);
    }

    #[test]
    fn list_items_get_markers() {
        let boxes = boxes(r#"<ol start="3"><li>x</li><li>y</li></ol><ul><li>z</li></ul>"#);
        let ol = &boxes[0];
        let labels: Vec<String> = ol
            .children
            .iter()
            .map(|li| li.marker.as_ref().unwrap().text())
            .collect();
        assert_eq!(labels, vec!["3.", "4."]);
        let bullet = boxes[1].children[0].marker.as_ref().unwrap();
        assert_eq!(bullet.text(), "\u{2022}");
        assert!(bullet.x_offset < 0.0);
        // The item sits inside the list's left padding.
        assert!(boxes[1].children[0].x > boxes[1].x);
    }

    #[test]
    fn table_cells_share_the_row() {
        let boxes = boxes("<table><tr><td>a</td><td>b</td></tr></table>");
        let row = &boxes[0].children[0];
        assert_eq!(row.children.len(), 2);
        let (a, b) = (&row.children[0], &row.children[1]);
        assert!((a.width - b.width).abs() < 0.5);
        assert!(b.x > a.x);
        assert!((a.y - b.y).abs() < 0.01);
    }

    #[test]
    fn explicit_cell_width_is_honoured() {
        let boxes = boxes(r#"<table style="width: 400pt"><tr><td style="width: 100pt">a</td><td>b</td></tr></table>"#);
        let row = &boxes[0].children[0];
        assert!((row.children[0].width - 100.0).abs() < 0.5);
        assert!((row.children[1].width - 300.0).abs() < 0.5);
    }

    #[test]
    fn flex_row_places_children_side_by_side() {
        let boxes = boxes(
            r#"<div style="display: flex"><div style="flex: 1">A</div><div style="flex: 1">B</div></div>"#,
        );
        let row = &boxes[0];
        assert_eq!(row.children.len(), 2);
        assert!(row.children[1].x > row.children[0].x);
        assert!((row.children[0].y - row.children[1].y).abs() < 0.01);
    }

    #[test]
    fn centered_text_is_offset() {
        let boxes = boxes(r#"<p style="text-align: center">Hi</p>"#);
        let line = &lines(&boxes[0])[0];
        let expected = (boxes[0].width - line.width()) / 2.0;
        assert!((line.x_offset - expected).abs() < 0.01);
    }

    #[test]
    fn padding_offsets_text() {
        let boxes = boxes(r#"<div style="padding: 10pt; border: 2pt solid black">x</div>"#);
        let line = &lines(&boxes[0])[0];
        assert!((line.x_offset - 12.0).abs() < 0.01);
        assert!((line.y_offset - 12.0).abs() < 0.01);
        assert!((boxes[0].height - (line.height + 24.0)).abs() < 0.01);
    }

    #[test]
    fn images_use_intrinsic_size_and_fit_the_page() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        use std::io::Cursor;

        let png = |w: u32, h: u32| {
            let mut out = Cursor::new(Vec::new());
            image::RgbImage::new(w, h)
                .write_to(&mut out, image::ImageFormat::Png)
                .unwrap();
            format!("data:image/png;base64,{}", STANDARD.encode(out.into_inner()))
        };

        let small = boxes(&format!(r#"<img src="{}">"#, png(40, 20)));
        assert!((small[0].width - 30.0).abs() < 0.01);
        assert!((small[0].height - 15.0).abs() < 0.01);
        assert!(matches!(small[0].content, BoxContent::Image { .. }));

        let wide = boxes(&format!(r#"<img src="{}">"#, png(2000, 1000)));
        let content_width = PageGeometry::default().content_width();
        assert!((wide[0].width - content_width).abs() < 0.01);
        assert!((wide[0].height - content_width / 2.0).abs() < 0.01);
    }

    #[test]
    fn display_none_is_skipped() {
        let boxes = boxes(r#"<p style="display: none">hidden</p><p>shown</p>"#);
        assert_eq!(boxes.len(), 1);
        assert_eq!(texts(&boxes[0]), vec!["shown"]);
    }
}
