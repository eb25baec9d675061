//! Shared markup plumbing: tolerant html5ever parsing into an `RcDom`, small
//! tree-editing helpers, and the strict XML writer used wherever a tree goes
//! back to text.
//!
//! The writer never balances tags itself. It serializes whatever tree the
//! HTML5 tree builder produced, under XML rules:
//!
//! - void HTML elements are always written self-closed (`<br/>`)
//! - text escapes `&`, `<`, `>` and writes U+00A0 as `&#160;`
//! - attribute values additionally escape `"`
//! - characters that XML 1.0 forbids are dropped
//! - an element whose namespace differs from its parent's gets `xmlns`

use std::cell::RefCell;
use std::rc::Rc;

use html5ever::driver::ParseOpts;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, parse_fragment, QualName};
use markup5ever::{local_name, namespace_url, ns, Attribute, LocalName, Namespace};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// HTML element types that never have content or an end tag.
pub const VOID_ELEMENTS: [&str; 14] = [
    "br", "hr", "img", "meta", "link", "input", "source", "col", "base", "area", "embed",
    "param", "track", "wbr",
];

/// The XHTML namespace URI.
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

pub fn is_void(local: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(local))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a complete (possibly sloppy) HTML document.
pub fn parse_html_document(html: &str) -> RcDom {
    parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

/// A body-content fragment parsed in `<body>` context.
///
/// The `RcDom` is kept alive alongside the fragment: dropping the document
/// node empties every descendant's child list.
pub struct Fragment {
    dom: RcDom,
}

impl Fragment {
    pub fn parse(html: &str) -> Self {
        let dom = parse_fragment(
            RcDom::default(),
            ParseOpts::default(),
            QualName::new(None, ns!(html), local_name!("body")),
            vec![],
        )
        .one(html);
        Self { dom }
    }

    /// The synthetic root whose children are the fragment's top-level nodes.
    pub fn root(&self) -> Handle {
        let first = self.dom.document.children.borrow().first().cloned();
        first.unwrap_or_else(|| self.dom.document.clone())
    }

    /// Serialize the fragment's top-level nodes as XHTML markup.
    pub fn to_markup(&self) -> String {
        serialize_children(&self.root())
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

/// Local name of an HTML-namespace element, `None` for anything else.
pub fn html_element_name(node: &Node) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } if name.ns == ns!(html) => Some(&*name.local),
        _ => None,
    }
}

pub fn is_html_element(node: &Node, local: &str) -> bool {
    html_element_name(node) == Some(local)
}

/// Attribute value by local name.
pub fn attribute(node: &Node, local: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == local)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Text node contents, `None` for non-text nodes.
pub fn text_of(node: &Node) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// Concatenated text of all descendant text nodes.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// First HTML element named `local` in document order (including `node`).
pub fn find_element(node: &Handle, local: &str) -> Option<Handle> {
    if is_html_element(node, local) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, local))
}

/// Create a detached HTML element.
pub fn new_element(local: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(k, v)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*k)),
            value: StrTendril::from(*v),
        })
        .collect();
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(local)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// Create a detached text node.
pub fn new_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// Append `child` to `parent`, fixing up the parent pointer.
pub fn append(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// Replace the whole child list of `parent`.
pub fn set_children(parent: &Handle, children: Vec<Handle>) {
    for child in &children {
        child.parent.set(Some(Rc::downgrade(parent)));
    }
    *parent.children.borrow_mut() = children;
}

// ---------------------------------------------------------------------------
// XML serialization
// ---------------------------------------------------------------------------

/// Serialize the children of `node`, assuming they sit inside an XHTML
/// element (no `xmlns` is emitted for HTML elements).
pub fn serialize_children(node: &Handle) -> String {
    let mut writer = XmlWriter::default();
    let html = ns!(html);
    for child in node.children.borrow().iter() {
        writer.write_node(child, &html);
    }
    writer.out
}

/// Serialize `node` itself as a standalone XML root: an HTML root element
/// carries `xmlns="http://www.w3.org/1999/xhtml"`.
pub fn serialize_root(node: &Handle) -> String {
    let mut writer = XmlWriter::default();
    writer.write_node(node, &ns!());
    writer.out
}

#[derive(Default)]
struct XmlWriter {
    out: String,
}

impl XmlWriter {
    fn write_node(&mut self, node: &Handle, parent_ns: &Namespace) {
        match &node.data {
            NodeData::Document => {
                for child in node.children.borrow().iter() {
                    self.write_node(child, parent_ns);
                }
            }
            NodeData::Element {
                name,
                attrs,
                template_contents,
                ..
            } => {
                let local: &str = &name.local;
                self.out.push('<');
                self.out.push_str(local);
                if name.ns != *parent_ns {
                    self.out.push_str(" xmlns=\"");
                    push_escaped(&mut self.out, &name.ns, true);
                    self.out.push('"');
                }
                self.write_attributes(&attrs.borrow());

                if name.ns == ns!(html) && is_void(local) {
                    self.out.push_str("/>");
                    return;
                }
                self.out.push('>');

                let contents = template_contents.borrow();
                let source = contents.as_ref().unwrap_or(node);
                for child in source.children.borrow().iter() {
                    self.write_node(child, &name.ns);
                }

                self.out.push_str("</");
                self.out.push_str(local);
                self.out.push('>');
            }
            NodeData::Text { contents } => {
                push_escaped(&mut self.out, &contents.borrow(), false);
            }
            NodeData::Comment { contents } => {
                let mut body = contents.replace("--", "- -");
                if body.ends_with('-') {
                    body.push(' ');
                }
                self.out.push_str("<!--");
                push_xml_chars(&mut self.out, &body);
                self.out.push_str("-->");
            }
            NodeData::Doctype { .. } | NodeData::ProcessingInstruction { .. } => {}
        }
    }

    fn write_attributes(&mut self, attrs: &[Attribute]) {
        let mut declared_xlink = false;
        for attr in attrs {
            let local: &str = &attr.name.local;
            if attr.name.ns == ns!(xmlns) || local == "xmlns" || !is_xml_name(local) {
                continue;
            }
            self.out.push(' ');
            if attr.name.ns == ns!(xlink) {
                if !declared_xlink {
                    self.out.push_str("xmlns:xlink=\"");
                    self.out.push_str(XLINK_NAMESPACE);
                    self.out.push_str("\" ");
                    declared_xlink = true;
                }
                self.out.push_str("xlink:");
            } else if attr.name.ns == ns!(xml) {
                self.out.push_str("xml:");
            }
            self.out.push_str(local);
            self.out.push_str("=\"");
            push_escaped(&mut self.out, &attr.value, true);
            self.out.push('"');
        }
    }
}

/// Whether `name` is usable as an unprefixed XML attribute name.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

fn push_xml_chars(out: &mut String, text: &str) {
    out.extend(text.chars().filter(|&c| is_xml_char(c)));
}

/// Escape `text` for XML character data (`attr == false`) or a double-quoted
/// attribute value (`attr == true`).
pub fn push_escaped(out: &mut String, text: &str, attr: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\u{00A0}' => out.push_str("&#160;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
}

/// Escape a string into a fresh `String`.
pub fn escape(text: &str, attr: bool) -> String {
    let mut out = String::with_capacity(text.len());
    push_escaped(&mut out, text, attr);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_round_trip_self_closes_voids() {
        let frag = Fragment::parse("<p>a<br>b<img src=x.png></p>");
        assert_eq!(frag.to_markup(), r#"<p>a<br/>b<img src="x.png"/></p>"#);
    }

    #[test]
    fn text_and_attributes_are_escaped() {
        let frag = Fragment::parse(r#"<a title='say "hi"'>Tom &amp; Jerry &lt;3</a>"#);
        assert_eq!(
            frag.to_markup(),
            r#"<a title="say &quot;hi&quot;">Tom &amp; Jerry &lt;3</a>"#
        );
    }

    #[test]
    fn nbsp_is_numeric() {
        let frag = Fragment::parse("<p>a&nbsp;b</p>");
        assert_eq!(frag.to_markup(), "<p>a&#160;b</p>");
    }

    #[test]
    fn svg_gets_own_namespace() {
        let frag = Fragment::parse(r#"<svg width="10"><rect/></svg>"#);
        let out = frag.to_markup();
        assert!(out.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="10">"#));
        assert!(out.contains("<rect></rect>"));
    }

    #[test]
    fn comments_cannot_break_out() {
        let frag = Fragment::parse("<!-- a -- b -->x");
        assert_eq!(frag.to_markup(), "<!-- a - - b -->x");
    }

    #[test]
    fn invalid_attribute_names_are_dropped() {
        let frag = Fragment::parse(r#"<p "odd"="1" ok="2">t</p>"#);
        assert_eq!(frag.to_markup(), r#"<p ok="2">t</p>"#);
    }

    #[test]
    fn find_and_text_helpers() {
        let dom = parse_html_document("<title>T</title><p>Hello <b>you</b></p>");
        let p = find_element(&dom.document, "p").unwrap();
        assert_eq!(text_content(&p), "Hello you");
        let title = find_element(&dom.document, "title").unwrap();
        assert_eq!(text_content(&title), "T");
    }

    #[test]
    fn built_nodes_serialize() {
        let a = new_element("a", &[("href", "mailto:x@y.z")]);
        append(&a, new_text("x@y.z"));
        let root = new_element("div", &[]);
        set_children(&root, vec![new_text("mail "), a]);
        assert_eq!(
            serialize_children(&root),
            r#"mail <a href="mailto:x@y.z">x@y.z</a>"#
        );
    }
}
