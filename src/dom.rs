//! Render tree – the renderer's own element tree.
//!
//! Built from an html5ever `RcDom` (never by hand-parsing markup). The
//! conversion keeps what the layout engine understands:
//! - `<style>` text anywhere in the document becomes a style sheet
//! - `<title>` becomes the document title
//! - `thead`/`tbody`/`tfoot` wrappers are dissolved into their table
//! - scripts, templates, foreign (SVG/MathML) content and comments are dropped

use std::collections::HashMap;

use markup5ever_rcdom::{Handle, NodeData};

use crate::markup;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// Layout semantics of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Ul,
    Ol,
    Li,
    Table,
    Tr,
    Td,
    Th,
    Blockquote,
    Pre,
    Hr,
    Span,
    A,
    Strong,
    Em,
    U,
    Code,
    Br,
    Img,
    Body,
    Html,
    Head,
    /// Anything else – laid out like a `<span>`.
    Unknown(String),
}

impl Tag {
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" | "section" | "article" | "header" | "footer" | "main" | "nav" | "aside"
            | "figure" | "figcaption" | "address" | "center" | "dl" | "dt" | "dd" | "form"
            | "fieldset" | "details" | "summary" | "caption" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "blockquote" => Tag::Blockquote,
            "pre" => Tag::Pre,
            "hr" => Tag::Hr,
            "span" => Tag::Span,
            "a" => Tag::A,
            "b" | "strong" => Tag::Strong,
            "i" | "em" | "cite" | "var" | "dfn" => Tag::Em,
            "u" | "ins" => Tag::U,
            "code" | "kbd" | "samp" | "tt" => Tag::Code,
            "br" => Tag::Br,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            other => Tag::Unknown(other.to_string()),
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 | Tag::H5 | Tag::H6)
    }

    pub fn is_block(&self) -> bool {
        self.is_heading()
            || matches!(
                self,
                Tag::Div
                    | Tag::P
                    | Tag::Ul
                    | Tag::Ol
                    | Tag::Li
                    | Tag::Table
                    | Tag::Tr
                    | Tag::Td
                    | Tag::Th
                    | Tag::Blockquote
                    | Tag::Pre
                    | Tag::Hr
                    | Tag::Body
                    | Tag::Html
            )
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Span | Tag::A | Tag::Strong | Tag::Em | Tag::U | Tag::Code | Tag::Br | Tag::Unknown(_)
        )
    }

    pub fn is_table_part(&self) -> bool {
        matches!(self, Tag::Table | Tag::Tr | Tag::Td | Tag::Th)
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    /// Lower-case element name as written (`section`, `b`, …) for selector
    /// matching; `tag` only carries the layout semantics.
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(name: &str) -> Self {
        Self {
            tag: Tag::from_name(name),
            name: name.to_ascii_lowercase(),
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(|s| s.as_str())
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(|s| s.as_str())
    }
}

/// A whole document as the renderer sees it.
#[derive(Debug, Clone)]
pub struct Document {
    pub title: Option<String>,
    /// Contents of every `<style>` element, in document order.
    pub style_sheets: Vec<String>,
    /// The `<body>` element (attributes kept for `body` selectors).
    pub body: ElementNode,
}

impl Document {
    /// Tolerantly parse HTML or XHTML markup.
    pub fn parse(markup: &str) -> Self {
        let dom = markup::parse_html_document(markup);
        Self::from_rcdom(&dom.document)
    }

    /// Convert an html5ever document node.
    pub fn from_rcdom(document: &Handle) -> Self {
        let mut style_sheets = Vec::new();
        collect_style_sheets(document, &mut style_sheets);

        let title = markup::find_element(document, "title")
            .map(|t| markup::text_content(&t).trim().to_string())
            .filter(|t| !t.is_empty());

        let mut body = ElementNode::new("body");
        if let Some(handle) = markup::find_element(document, "body") {
            body.attributes = attributes_of(&handle);
            body.children = convert_children(&handle);
        }

        Self {
            title,
            style_sheets,
            body,
        }
    }

    pub fn body_children(&self) -> &[DomNode] {
        &self.body.children
    }

    /// All style sheets joined into one.
    pub fn style_sheet_text(&self) -> String {
        self.style_sheets.join("\n")
    }
}

/// Parse markup and return the children of its `<body>`.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    Document::parse(html).body.children
}

// ---------------------------------------------------------------------------
// RcDom conversion
// ---------------------------------------------------------------------------

/// Elements whose subtree never reaches layout.
const DROPPED: [&str; 12] = [
    "head", "style", "title", "script", "noscript", "template", "meta", "link", "base", "colgroup",
    "col", "iframe",
];

/// Table sections dissolved into their parent.
const TRANSPARENT: [&str; 3] = ["thead", "tbody", "tfoot"];

fn collect_style_sheets(node: &Handle, out: &mut Vec<String>) {
    if markup::is_html_element(node, "style") {
        out.push(markup::text_content(node));
        return;
    }
    for child in node.children.borrow().iter() {
        collect_style_sheets(child, out);
    }
}

fn attributes_of(node: &Handle) -> HashMap<String, String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|a| (a.name.local.to_string(), a.value.to_string()))
            .collect(),
        _ => HashMap::new(),
    }
}

fn convert_children(node: &Handle) -> Vec<DomNode> {
    let mut out = Vec::new();
    for child in node.children.borrow().iter() {
        convert_into(child, &mut out);
    }
    out
}

fn convert_into(node: &Handle, out: &mut Vec<DomNode>) {
    match &node.data {
        NodeData::Text { contents } => out.push(DomNode::Text(contents.borrow().to_string())),
        NodeData::Element { .. } => {
            let Some(name) = markup::html_element_name(node) else {
                return;
            };
            if DROPPED.contains(&name) {
                return;
            }
            if TRANSPARENT.contains(&name) {
                out.extend(convert_children(node));
                return;
            }
            let mut element = ElementNode::new(name);
            element.attributes = attributes_of(node);
            element.children = convert_children(node);
            out.push(DomNode::Element(element));
        }
        _ => {}
    }
}
