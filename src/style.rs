//! Style resolver – applies user-agent defaults, `<style>` sheets and inline
//! `style` attributes to produce a flat [`ComputedStyle`] per element.
//!
//! All lengths are in PDF points. CSS units convert as `1px = 0.75pt`,
//! `1in = 72pt`, `1mm = 72/25.4pt`; `em` is relative to the element's font
//! size (to the parent's when resolving `font-size` itself).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::document::{PageOrientation, PageSize};
use crate::dom::{DomNode, ElementNode, Tag};
use crate::pagination::{Edges, PageGeometry, PAGE_MARGIN_PT};

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Grid
    pub grid_template_columns: Vec<GridTrack>,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    /// CSS font-family list as written, e.g. `"Arial, sans-serif"`.
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,
    /// `white-space: pre` / `pre-wrap`: keep spaces and newlines.
    pub white_space_pre: bool,

    // Background
    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

/// Root font size when nothing else is specified.
pub const DEFAULT_FONT_SIZE_PT: f32 = 12.0;

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            grid_template_columns: Vec::new(),
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: DEFAULT_FONT_SIZE_PT,
            font_weight: FontWeight::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.2,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            white_space_pre: false,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

impl ComputedStyle {
    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }

    /// Style with only the inherited (text) properties of `self`.
    pub fn inherited(&self) -> Self {
        Self {
            font_size: self.font_size,
            font_weight: self.font_weight,
            font_family: self.font_family.clone(),
            color: self.color,
            text_align: self.text_align,
            line_height: self.line_height,
            font_style: self.font_style,
            white_space_pre: self.white_space_pre,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Grid,
    Inline,
    InlineBlock,
    ListItem,
    Table,
    TableRow,
    TableCell,
    None,
}

impl Display {
    pub fn is_inline(self) -> bool {
        matches!(self, Display::Inline | Display::InlineBlock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Pt(f32),
    Percent(f32),
}

impl Dimension {
    /// Resolve against the containing width; `None` for `auto`.
    pub fn resolve(self, containing: f32) -> Option<f32> {
        match self {
            Dimension::Auto => None,
            Dimension::Pt(v) => Some(v),
            Dimension::Percent(p) => Some(containing * p / 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridTrack {
    Pt(f32),
    Fr(f32),
    Auto,
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };
    /// Default link colour (#0000ee).
    pub const LINK_BLUE: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.933,
        a: 1.0,
    };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            6 | 8 => {
                let mut c = Self::rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?);
                if hex.len() == 8 {
                    c.a = channel(&hex[6..8])? as f32 / 255.0;
                }
                Some(c)
            }
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Parse `#hex`, `rgb()`/`rgba()` or a basic named colour.
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim().to_ascii_lowercase();
        if v.starts_with('#') {
            return Self::from_hex(&v);
        }
        if let Some(caps) = RGB_RE.captures(&v) {
            let channel = |i: usize| -> Option<f32> {
                let raw = caps.get(i)?.as_str();
                match raw.strip_suffix('%') {
                    Some(pct) => pct.parse::<f32>().ok().map(|p| (p / 100.0).clamp(0.0, 1.0)),
                    None => raw.parse::<f32>().ok().map(|n| (n / 255.0).clamp(0.0, 1.0)),
                }
            };
            let a = match caps.get(4) {
                Some(m) => m.as_str().parse::<f32>().ok()?.clamp(0.0, 1.0),
                None => 1.0,
            };
            return Some(Self {
                r: channel(1)?,
                g: channel(2)?,
                b: channel(3)?,
                a,
            });
        }
        named_color(&v)
    }
}

static RGB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^rgba?\(\s*([\d.]+%?)\s*[,\s]\s*([\d.]+%?)\s*[,\s]\s*([\d.]+%?)\s*(?:[,/]\s*([\d.]+)\s*)?\)$",
    )
    .expect("RGB_RE: hardcoded regex is valid")
});

fn named_color(name: &str) -> Option<Color> {
    let c = match name {
        "black" => Color::BLACK,
        "white" => Color::WHITE,
        "transparent" => Color::TRANSPARENT,
        "red" => Color::rgb(255, 0, 0),
        "green" => Color::rgb(0, 128, 0),
        "lime" => Color::rgb(0, 255, 0),
        "blue" => Color::rgb(0, 0, 255),
        "navy" => Color::rgb(0, 0, 128),
        "yellow" => Color::rgb(255, 255, 0),
        "orange" => Color::rgb(255, 165, 0),
        "purple" => Color::rgb(128, 0, 128),
        "fuchsia" | "magenta" => Color::rgb(255, 0, 255),
        "aqua" | "cyan" => Color::rgb(0, 255, 255),
        "teal" => Color::rgb(0, 128, 128),
        "olive" => Color::rgb(128, 128, 0),
        "maroon" => Color::rgb(128, 0, 0),
        "silver" => Color::rgb(192, 192, 192),
        "gray" | "grey" => Color::rgb(128, 128, 128),
        "darkgray" | "darkgrey" => Color::rgb(169, 169, 169),
        "lightgray" | "lightgrey" => Color::rgb(211, 211, 211),
        _ => return None,
    };
    Some(c)
}

// ---------------------------------------------------------------------------
// Lengths
// ---------------------------------------------------------------------------

const PT_PER_PX: f32 = 0.75;
const PT_PER_IN: f32 = 72.0;
const PT_PER_MM: f32 = 72.0 / 25.4;

/// Parse a CSS length into points. Unitless numbers are pixels.
pub fn parse_length(value: &str, em: f32) -> Option<f32> {
    let v = value.trim().to_ascii_lowercase();
    let (number, factor) = if let Some(n) = v.strip_suffix("px") {
        (n, PT_PER_PX)
    } else if let Some(n) = v.strip_suffix("pt") {
        (n, 1.0)
    } else if let Some(n) = v.strip_suffix("rem") {
        (n, DEFAULT_FONT_SIZE_PT)
    } else if let Some(n) = v.strip_suffix("em") {
        (n, em)
    } else if let Some(n) = v.strip_suffix("mm") {
        (n, PT_PER_MM)
    } else if let Some(n) = v.strip_suffix("cm") {
        (n, PT_PER_MM * 10.0)
    } else if let Some(n) = v.strip_suffix("in") {
        (n, PT_PER_IN)
    } else if let Some(n) = v.strip_suffix("pc") {
        (n, 12.0)
    } else {
        (v.as_str(), PT_PER_PX)
    };
    number.trim().parse::<f32>().ok().map(|n| n * factor)
}

fn parse_dimension(value: &str, em: f32) -> Dimension {
    let v = value.trim();
    if v.eq_ignore_ascii_case("auto") {
        Dimension::Auto
    } else if let Some(pct) = v.strip_suffix('%') {
        pct.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_length(v, em).map(Dimension::Pt).unwrap_or(Dimension::Auto)
    }
}

/// CSS box shorthand (1–4 values) into top/right/bottom/left.
fn parse_edges(value: &str, em: f32) -> Option<[f32; 4]> {
    let parts: Vec<f32> = value
        .split_whitespace()
        .map(|p| {
            if p.eq_ignore_ascii_case("auto") {
                Some(0.0)
            } else {
                parse_length(p, em)
            }
        })
        .collect::<Option<_>>()?;
    match parts[..] {
        [all] => Some([all; 4]),
        [v, h] => Some([v, h, v, h]),
        [t, h, b] => Some([t, h, b, h]),
        [t, r, b, l] => Some([t, r, b, l]),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Style sheets
// ---------------------------------------------------------------------------

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("COMMENT_RE: hardcoded regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One compound selector, e.g. `p.note#intro`.
#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let mut compound = Compound::default();
        let mut rest = s;
        let name_end = rest.find(['.', '#']).unwrap_or(rest.len());
        let name = &rest[..name_end];
        if !name.is_empty() && name != "*" {
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return None;
            }
            compound.tag = Some(name.to_ascii_lowercase());
        }
        rest = &rest[name_end..];
        while !rest.is_empty() {
            let marker = rest.as_bytes()[0];
            let body = &rest[1..];
            let end = body.find(['.', '#']).unwrap_or(body.len());
            let ident = &body[..end];
            if ident.is_empty()
                || !ident
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
            {
                return None;
            }
            match marker {
                b'.' => compound.classes.push(ident.to_string()),
                _ => compound.id = Some(ident.to_string()),
            }
            rest = &body[end..];
        }
        Some(compound)
    }

    fn matches(&self, element: &ElementNode) -> bool {
        if let Some(tag) = &self.tag {
            if *tag != element.name {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        let classes = element.classes();
        self.classes.iter().all(|c| classes.contains(&c.as_str()))
    }
}

/// A complex selector; `parts[0]` is the leftmost compound.
#[derive(Debug, Clone, PartialEq)]
struct Selector {
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    /// Parse a selector; pseudo-classes, attribute selectors and sibling
    /// combinators are unsupported and reject the selector.
    fn parse(s: &str) -> Option<Self> {
        if s.contains([':', '[', '+', '~']) {
            return None;
        }
        let spaced = s.replace('>', " > ");
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;
        for token in spaced.split_whitespace() {
            if token == ">" {
                combinator = Combinator::Child;
                continue;
            }
            parts.push((combinator, Compound::parse(token)?));
            combinator = Combinator::Descendant;
        }
        if parts.is_empty() || combinator == Combinator::Child {
            return None;
        }
        Some(Self { parts })
    }

    fn specificity(&self) -> (u32, u32, u32) {
        self.parts.iter().fold((0, 0, 0), |(a, b, c), (_, part)| {
            (
                a + part.id.is_some() as u32,
                b + part.classes.len() as u32,
                c + part.tag.is_some() as u32,
            )
        })
    }

    /// `ancestors` is ordered root first, nearest parent last.
    fn matches(&self, element: &ElementNode, ancestors: &[&ElementNode]) -> bool {
        let Some(((link, last), rest)) = self.parts.split_last() else {
            return false;
        };
        last.matches(element) && Self::match_rest(rest, Some(*link), ancestors)
    }

    /// Match `parts` (right to left) against `ancestors`, where `link` is the
    /// combinator joining the last of `parts` to what was matched before.
    fn match_rest(
        parts: &[(Combinator, Compound)],
        link: Option<Combinator>,
        ancestors: &[&ElementNode],
    ) -> bool {
        let Some(((next_link, compound), rest)) = parts.split_last() else {
            return true;
        };
        match link {
            Some(Combinator::Child) => match ancestors.split_last() {
                Some((parent, above)) => {
                    compound.matches(parent) && Self::match_rest(rest, Some(*next_link), above)
                }
                None => false,
            },
            _ => (0..ancestors.len()).rev().any(|i| {
                compound.matches(ancestors[i])
                    && Self::match_rest(rest, Some(*next_link), &ancestors[..i])
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    specificity: (u32, u32, u32),
    order: usize,
    declarations: Vec<(String, String)>,
}

/// Raw `@page` settings gathered from a sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRules {
    /// Explicit `size` in points.
    pub size_pt: Option<(f32, f32)>,
    pub orientation: Option<PageOrientation>,
    /// Top, right, bottom, left.
    pub margin: [Option<f32>; 4],
    /// `@page :first { margin-top }`.
    pub first_margin_top: Option<f32>,
}

/// A parsed author style sheet.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<Rule>,
    pub page: PageRules,
}

impl StyleSheet {
    pub fn parse(css: &str) -> Self {
        let mut sheet = StyleSheet::default();
        let cleaned = COMMENT_RE.replace_all(css, "");
        sheet.parse_block(&cleaned);
        sheet
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn parse_block(&mut self, css: &str) {
        let mut rest = css;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            let Some(open) = rest.find(['{', ';']) else {
                break;
            };
            let prelude = rest[..open].trim();
            if rest.as_bytes()[open] == b';' {
                // `@charset`, `@import` and stray statements.
                rest = &rest[open + 1..];
                continue;
            }
            let body_start = open + 1;
            let body_end = matching_brace(rest, open).unwrap_or(rest.len());
            let body = &rest[body_start..body_end.max(body_start)];
            rest = rest.get(body_end + 1..).unwrap_or("");

            let lower = prelude.to_ascii_lowercase();
            if let Some(page_selector) = lower.strip_prefix("@page") {
                self.parse_page_rule(page_selector.trim(), body);
            } else if let Some(query) = lower.strip_prefix("@media") {
                if media_applies(query) {
                    self.parse_block(body);
                }
            } else if lower.starts_with('@') {
                log::debug!("style: skipping unsupported at-rule '{prelude}'");
            } else {
                self.push_rules(prelude, body);
            }
        }
    }

    fn push_rules(&mut self, selectors: &str, body: &str) {
        let declarations = parse_declarations(body);
        if declarations.is_empty() {
            return;
        }
        for raw in selectors.split(',') {
            let Some(selector) = Selector::parse(raw.trim()) else {
                log::debug!("style: ignoring unsupported selector '{}'", raw.trim());
                continue;
            };
            let order = self.rules.len();
            self.rules.push(Rule {
                specificity: selector.specificity(),
                selector,
                order,
                declarations: declarations.clone(),
            });
        }
    }

    fn parse_page_rule(&mut self, selector: &str, body: &str) {
        let first = selector.contains(":first");
        for (prop, value) in parse_declarations(body) {
            if first {
                if prop == "margin-top" {
                    self.page.first_margin_top = parse_length(&value, DEFAULT_FONT_SIZE_PT);
                } else if prop == "margin" {
                    self.page.first_margin_top =
                        parse_edges(&value, DEFAULT_FONT_SIZE_PT).map(|e| e[0]);
                }
                continue;
            }
            match prop.as_str() {
                "size" => self.parse_page_size(&value),
                "margin" => {
                    if let Some(edges) = parse_edges(&value, DEFAULT_FONT_SIZE_PT) {
                        self.page.margin = edges.map(Some);
                    }
                }
                "margin-top" => self.page.margin[0] = parse_length(&value, DEFAULT_FONT_SIZE_PT),
                "margin-right" => self.page.margin[1] = parse_length(&value, DEFAULT_FONT_SIZE_PT),
                "margin-bottom" => self.page.margin[2] = parse_length(&value, DEFAULT_FONT_SIZE_PT),
                "margin-left" => self.page.margin[3] = parse_length(&value, DEFAULT_FONT_SIZE_PT),
                _ => {}
            }
        }
    }

    fn parse_page_size(&mut self, value: &str) {
        let mut lengths = Vec::new();
        for token in value.split_whitespace() {
            match token.to_ascii_lowercase().as_str() {
                "landscape" => self.page.orientation = Some(PageOrientation::Landscape),
                "portrait" => self.page.orientation = Some(PageOrientation::Portrait),
                "auto" => {}
                named => {
                    if let Ok(size) = named.parse::<PageSize>() {
                        self.page.size_pt = Some((size.width_mm * PT_PER_MM, size.height_mm * PT_PER_MM));
                    } else if let Some(len) = parse_length(named, DEFAULT_FONT_SIZE_PT) {
                        lengths.push(len);
                    }
                }
            }
        }
        match lengths[..] {
            [side] => self.page.size_pt = Some((side, side)),
            [w, h] => self.page.size_pt = Some((w, h)),
            _ => {}
        }
    }

    /// Page geometry from `@page` rules, falling back to `default_size` and
    /// [`PAGE_MARGIN_PT`].
    pub fn page_geometry(&self, default_size: PageSize) -> PageGeometry {
        let (mut width, mut height) = self
            .page
            .size_pt
            .unwrap_or((default_size.width_mm * PT_PER_MM, default_size.height_mm * PT_PER_MM));
        match self.page.orientation {
            Some(PageOrientation::Landscape) if width < height => std::mem::swap(&mut width, &mut height),
            Some(PageOrientation::Portrait) if width > height => std::mem::swap(&mut width, &mut height),
            _ => {}
        }
        let [top, right, bottom, left] = self.page.margin.map(|m| m.unwrap_or(PAGE_MARGIN_PT));
        PageGeometry {
            width,
            height,
            margin: Edges {
                top,
                right,
                bottom,
                left,
            },
            first_margin_top: self.page.first_margin_top,
        }
    }

    /// Declarations applying to `element`, lowest precedence first.
    fn matching_declarations(
        &self,
        element: &ElementNode,
        ancestors: &[&ElementNode],
    ) -> Vec<&(String, String)> {
        let mut matched: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.selector.matches(element, ancestors))
            .collect();
        matched.sort_by_key(|r| (r.specificity, r.order));
        matched.iter().flat_map(|r| r.declarations.iter()).collect()
    }
}

fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn media_applies(query: &str) -> bool {
    let query = query.trim();
    query.is_empty() || query.contains("print") || query.contains("all")
}

fn parse_declarations(body: &str) -> Vec<(String, String)> {
    body.split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            let value = value
                .strip_suffix("!important")
                .map_or(value, str::trim_end)
                .to_string();
            (!prop.is_empty() && !value.is_empty()).then_some((prop, value))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element.
///
/// Order: inherited text properties, tag defaults, presentational
/// attributes, sheet rules by specificity, inline `style`.
pub fn resolve_style(
    element: &ElementNode,
    parent: Option<&ComputedStyle>,
    sheet: &StyleSheet,
    ancestors: &[&ElementNode],
) -> ComputedStyle {
    let mut style = parent.map(ComputedStyle::inherited).unwrap_or_default();
    apply_tag_defaults(&mut style, &element.tag, ancestors);
    apply_presentational_attributes(&mut style, element);

    let parent_font_size = parent.map_or(DEFAULT_FONT_SIZE_PT, |p| p.font_size);
    for (prop, value) in sheet.matching_declarations(element, ancestors) {
        apply_css_property(&mut style, prop, value, parent_font_size);
    }
    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline, parent_font_size);
    }
    style
}

/// User-agent defaults, relative to the inherited font size.
fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag, ancestors: &[&ElementNode]) {
    let em = s.font_size;
    let heading = |s: &mut ComputedStyle, scale: f32, margin: f32| {
        s.font_size = em * scale;
        s.font_weight = FontWeight::Bold;
        s.margin_top = em * scale * margin;
        s.margin_bottom = em * scale * margin;
    };
    match tag {
        Tag::H1 => heading(s, 2.0, 0.67),
        Tag::H2 => heading(s, 1.5, 0.83),
        Tag::H3 => heading(s, 1.17, 1.0),
        Tag::H4 => heading(s, 1.0, 1.33),
        Tag::H5 => heading(s, 0.83, 1.67),
        Tag::H6 => heading(s, 0.67, 2.33),
        Tag::P => {
            s.margin_bottom = em;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = em;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = em * 0.2;
        }
        Tag::Blockquote => {
            s.margin_top = em;
            s.margin_bottom = em;
            s.margin_left = 30.0;
            s.margin_right = 30.0;
        }
        Tag::Pre => {
            s.font_family = "Courier".to_string();
            s.white_space_pre = true;
            s.margin_bottom = em;
        }
        Tag::Hr => {
            s.border_width = 0.5;
            s.border_color = Color::rgb(128, 128, 128);
            s.margin_top = em * 0.5;
            s.margin_bottom = em * 0.5;
        }
        Tag::Table => {
            s.display = Display::Table;
            s.margin_bottom = em * 0.5;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 2.0;
            s.padding_right = 4.0;
            s.padding_bottom = 2.0;
            s.padding_left = 4.0;
            let bordered = ancestors
                .iter()
                .rev()
                .find(|a| a.tag == Tag::Table)
                .and_then(|t| t.attributes.get("border"))
                .is_some_and(|b| b.trim().parse::<f32>().map_or(true, |w| w > 0.0));
            if bordered {
                s.border_width = 0.5;
            }
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.text_align = TextAlign::Center;
            }
        }
        Tag::A => {
            s.display = Display::Inline;
            s.color = Color::LINK_BLUE;
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Strong => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Em => {
            s.display = Display::Inline;
            s.font_style = FontStyle::Italic;
        }
        Tag::U => {
            s.display = Display::Inline;
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Code => {
            s.display = Display::Inline;
            s.font_family = "Courier".to_string();
        }
        Tag::Span | Tag::Br | Tag::Unknown(_) => {
            s.display = Display::Inline;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Div | Tag::Body | Tag::Html | Tag::Head => {}
    }
}

/// Legacy HTML attributes editors still emit (`align`, `width`, `bgcolor`, …).
fn apply_presentational_attributes(s: &mut ComputedStyle, element: &ElementNode) {
    let attr = |name: &str| element.attributes.get(name).map(|v| v.trim());
    if let Some(align) = attr("align") {
        match align.to_ascii_lowercase().as_str() {
            "center" => s.text_align = TextAlign::Center,
            "right" => s.text_align = TextAlign::Right,
            "left" => s.text_align = TextAlign::Left,
            _ => {}
        }
    }
    if matches!(element.tag, Tag::Img | Tag::Table | Tag::Td | Tag::Th) {
        if let Some(w) = attr("width") {
            s.width = parse_dimension(w, s.font_size);
        }
        if let Some(h) = attr("height") {
            s.height = parse_dimension(h, s.font_size);
        }
    }
    if let Some(bg) = attr("bgcolor").and_then(Color::parse) {
        s.background_color = bg;
    }
    if element.tag == Tag::Table {
        if let Some(border) = attr("border").and_then(|b| b.parse::<f32>().ok()) {
            s.border_width = border * PT_PER_PX;
        }
    }
}

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str, parent_font_size: f32) {
    for (prop, value) in parse_declarations(style_str) {
        apply_css_property(s, &prop, &value, parent_font_size);
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str, parent_font_size: f32) {
    let em = s.font_size;
    let lower = val.to_ascii_lowercase();
    let v = lower.as_str();
    match prop {
        "display" => {
            s.display = match v {
                "flex" => Display::Flex,
                "grid" => Display::Grid,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "list-item" => Display::ListItem,
                "table" => Display::Table,
                "table-row" => Display::TableRow,
                "table-cell" => Display::TableCell,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match v {
                "row" | "row-reverse" => FlexDirection::Row,
                "column" | "column-reverse" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "flex-wrap" => {
            s.flex_wrap = if v == "wrap" { FlexWrap::Wrap } else { FlexWrap::NoWrap };
        }
        "flex-grow" => {
            if let Ok(n) = v.parse() {
                s.flex_grow = n;
            }
        }
        "flex-shrink" => {
            if let Ok(n) = v.parse() {
                s.flex_shrink = n;
            }
        }
        "flex" => {
            if let Some(Ok(n)) = v.split_whitespace().next().map(str::parse::<f32>) {
                s.flex_grow = n;
                s.flex_shrink = 1.0;
            }
        }
        "justify-content" => {
            s.justify_content = match v {
                "flex-end" | "end" | "right" => JustifyContent::End,
                "center" => JustifyContent::Center,
                "space-between" => JustifyContent::SpaceBetween,
                "space-around" => JustifyContent::SpaceAround,
                "space-evenly" => JustifyContent::SpaceEvenly,
                _ => JustifyContent::Start,
            }
        }
        "align-items" => {
            s.align_items = match v {
                "flex-start" | "start" => AlignItems::Start,
                "flex-end" | "end" => AlignItems::End,
                "center" => AlignItems::Center,
                _ => AlignItems::Stretch,
            }
        }
        "gap" => {
            if let Some(pt) = parse_length(v, em) {
                s.gap = pt;
            }
        }
        "grid-template-columns" => s.grid_template_columns = parse_grid_tracks(v, em),
        "font-size" => {
            if let Some(size) = parse_font_size(v, parent_font_size) {
                s.font_size = size;
            }
        }
        "font-weight" => {
            s.font_weight = match v {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match v {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "font-family" => s.font_family = val.trim().to_string(),
        "font" => apply_font_shorthand(s, val, parent_font_size),
        "color" => {
            if let Some(c) = Color::parse(v) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = v.split_whitespace().find_map(Color::parse) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match v {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "text-decoration" | "text-decoration-line" => {
            s.text_decoration = if v.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            };
        }
        "white-space" => s.white_space_pre = matches!(v, "pre" | "pre-wrap" | "break-spaces"),
        "width" => s.width = parse_dimension(v, em),
        "height" => s.height = parse_dimension(v, em),
        "min-width" => s.min_width = parse_dimension(v, em),
        "max-width" => s.max_width = parse_dimension(v, em),
        "margin" => {
            if let Some([t, r, b, l]) = parse_edges(v, em) {
                s.margin_top = t;
                s.margin_right = r;
                s.margin_bottom = b;
                s.margin_left = l;
            }
        }
        "margin-top" => set_length(&mut s.margin_top, v, em),
        "margin-right" => set_length(&mut s.margin_right, v, em),
        "margin-bottom" => set_length(&mut s.margin_bottom, v, em),
        "margin-left" => set_length(&mut s.margin_left, v, em),
        "padding" => {
            if let Some([t, r, b, l]) = parse_edges(v, em) {
                s.padding_top = t;
                s.padding_right = r;
                s.padding_bottom = b;
                s.padding_left = l;
            }
        }
        "padding-top" => set_length(&mut s.padding_top, v, em),
        "padding-right" => set_length(&mut s.padding_right, v, em),
        "padding-bottom" => set_length(&mut s.padding_bottom, v, em),
        "padding-left" => set_length(&mut s.padding_left, v, em),
        "border" => apply_border_shorthand(s, v, em),
        "border-width" => {
            if let Some([t, ..]) = parse_edges(v, em) {
                s.border_width = t;
            }
        }
        "border-color" => {
            if let Some(c) = Color::parse(v) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if v == "normal" {
                s.line_height = 1.2;
            } else if let Ok(factor) = v.parse::<f32>() {
                s.line_height = factor;
            } else if let Some(pct) = v.strip_suffix('%').and_then(|p| p.parse::<f32>().ok()) {
                s.line_height = pct / 100.0;
            } else if let Some(pt) = parse_length(v, em) {
                s.line_height = pt / s.font_size.max(0.1);
            }
        }
        "break-after" | "page-break-after" => {
            s.page_break_after = v == "always" || v == "page";
        }
        "break-before" | "page-break-before" => {
            s.page_break_before = v == "always" || v == "page";
        }
        "break-inside" | "page-break-inside" => {
            s.page_break_inside_avoid = v == "avoid" || v == "avoid-page";
        }
        _ => {}
    }
}

fn set_length(target: &mut f32, value: &str, em: f32) {
    if value == "auto" {
        *target = 0.0;
    } else if let Some(pt) = parse_length(value, em) {
        *target = pt;
    }
}

fn parse_font_size(value: &str, parent_font_size: f32) -> Option<f32> {
    let keyword = match value {
        "xx-small" => Some(7.0),
        "x-small" => Some(7.5),
        "small" => Some(10.0),
        "medium" => Some(DEFAULT_FONT_SIZE_PT),
        "large" => Some(13.5),
        "x-large" => Some(18.0),
        "xx-large" => Some(24.0),
        "smaller" => Some(parent_font_size / 1.2),
        "larger" => Some(parent_font_size * 1.2),
        _ => None,
    };
    keyword.or_else(|| match value.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f32>().ok().map(|p| parent_font_size * p / 100.0),
        None => parse_length(value, parent_font_size),
    })
}

/// `font: [style] [weight] size[/line-height] family`.
fn apply_font_shorthand(s: &mut ComputedStyle, value: &str, parent_font_size: f32) {
    let mut tokens = value.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let lower = token.to_ascii_lowercase();
        match lower.as_str() {
            "italic" | "oblique" => s.font_style = FontStyle::Italic,
            "bold" | "bolder" | "600" | "700" | "800" | "900" => s.font_weight = FontWeight::Bold,
            "normal" => {}
            _ => {
                let (size, line_height) = lower.split_once('/').unwrap_or((lower.as_str(), ""));
                if let Some(pt) = parse_font_size(size, parent_font_size) {
                    s.font_size = pt;
                    if !line_height.is_empty() {
                        apply_css_property(s, "line-height", line_height, parent_font_size);
                    }
                    let family: Vec<&str> = tokens.by_ref().collect();
                    if !family.is_empty() {
                        s.font_family = family.join(" ");
                    }
                    return;
                }
            }
        }
    }
}

fn apply_border_shorthand(s: &mut ComputedStyle, value: &str, em: f32) {
    if value == "none" || value == "0" {
        s.border_width = 0.0;
        return;
    }
    let mut width = None;
    for token in value.split_whitespace() {
        match token {
            "thin" => width = Some(0.75),
            "medium" => width = Some(2.25),
            "thick" => width = Some(3.75),
            "none" | "hidden" => width = Some(0.0),
            "solid" | "dashed" | "dotted" | "double" | "groove" | "ridge" | "inset" | "outset" => {}
            _ => {
                if let Some(c) = Color::parse(token) {
                    s.border_color = c;
                } else if let Some(pt) = parse_length(token, em) {
                    width = Some(pt);
                }
            }
        }
    }
    s.border_width = width.unwrap_or(2.25);
}

fn parse_grid_tracks(value: &str, em: f32) -> Vec<GridTrack> {
    if let Some(inner) = value.strip_prefix("repeat(").and_then(|v| v.strip_suffix(')')) {
        if let Some((count, track)) = inner.split_once(',') {
            let count = count.trim().parse::<usize>().unwrap_or(1);
            let tracks = parse_grid_tracks(track.trim(), em);
            return tracks.iter().copied().cycle().take(count * tracks.len()).collect();
        }
    }
    value
        .split_whitespace()
        .map(|t| {
            if let Some(fr) = t.strip_suffix("fr") {
                GridTrack::Fr(fr.parse().unwrap_or(1.0))
            } else if let Some(pt) = parse_length(t, em) {
                GridTrack::Pt(pt)
            } else {
                GridTrack::Auto
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (for images src, etc.)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Style a whole body: returns the body's own style and its styled children.
pub fn style_body(body: &ElementNode, sheet: &StyleSheet) -> (ComputedStyle, Vec<StyledNode>) {
    let html = ElementNode::new("html");
    let root = resolve_style(&html, None, sheet, &[]);
    let body_style = resolve_style(body, Some(&root), sheet, &[&html]);
    let mut ancestors = vec![&html, body];
    let children = build_styled_children(&body.children, Some(&body_style), sheet, &mut ancestors);
    (body_style, children)
}

fn build_styled_children<'a>(
    nodes: &'a [DomNode],
    parent_style: Option<&ComputedStyle>,
    sheet: &StyleSheet,
    ancestors: &mut Vec<&'a ElementNode>,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style, sheet, ancestors);
                if style.display == Display::None {
                    continue;
                }
                ancestors.push(e);
                let children = build_styled_children(&e.children, Some(&style), sheet, ancestors);
                ancestors.pop();
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                // Text renders inline: only the inherited properties apply.
                let mut style = parent_style.map(ComputedStyle::inherited).unwrap_or_default();
                if let Some(p) = parent_style {
                    style.text_decoration = p.text_decoration;
                }
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
        }
    }
    result
}
