//! Fragment normalizer – turns editor output into body content that survives
//! strict XML parsing.
//!
//! Cheap, anchored fixes (body extraction, the `contenteditable` artifact,
//! the `&nbsp;` entity) are regex/text substitutions. Void-element closing
//! and empty-paragraph collapsing work on a tolerant html5ever parse of the
//! fragment instead of on the raw text.

use std::str::FromStr;
use std::sync::LazyLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use crate::markup::{self, Fragment};

static BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<body(?:\s[^>]*)?>(.*)</body\s*>").expect("BODY_RE: hardcoded regex is valid")
});

static CONTENTEDITABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+contenteditable\s*=\s*(?:"true"|'true'|true\b)"#)
        .expect("CONTENTEDITABLE_RE: hardcoded regex is valid")
});

/// Block elements next to which an empty paragraph is pure noise.
const BLOCK_NEIGHBOURS: [&str; 10] = ["h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "table", "hr"];

/// What a lone empty paragraph turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyParagraphPolicy {
    /// Drop it.
    #[default]
    Remove,
    /// Keep the vertical space: `<p>&#160;</p>`.
    Nbsp,
    /// Replace it with `<br/>`.
    LineBreak,
}

impl FromStr for EmptyParagraphPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remove" | "delete" => Ok(Self::Remove),
            "nbsp" => Ok(Self::Nbsp),
            "br" | "linebreak" | "line-break" => Ok(Self::LineBreak),
            other => Err(format!(
                "unknown empty-paragraph policy '{other}' (expected remove, nbsp or br)"
            )),
        }
    }
}

/// Normalize an HTML document or fragment into clean body content.
///
/// The fragment is parsed in body context, so table-only elements outside a
/// table are dropped by the tree builder: a stray `<col>` disappears instead
/// of being self-closed. Inside a `<table>` it is kept as `<col/>`.
pub fn normalize_fragment(html: &str, policy: EmptyParagraphPolicy) -> String {
    let body = extract_body(html);
    let cleaned = strip_contenteditable(body).replace("&nbsp;", "&#160;");

    let fragment = Fragment::parse(&cleaned);
    collapse_empty_paragraphs(&fragment.root(), policy);
    fragment.to_markup()
}

/// Inner content of `<body>`, or the whole input when there is none.
pub fn extract_body(html: &str) -> &str {
    BODY_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map_or(html, |m| m.as_str())
}

pub fn strip_contenteditable(html: &str) -> String {
    CONTENTEDITABLE_RE.replace_all(html, "").into_owned()
}

// ---------------------------------------------------------------------------
// Empty paragraph collapsing
// ---------------------------------------------------------------------------

fn is_blank_text(node: &Handle) -> bool {
    match &node.data {
        NodeData::Text { contents } => contents.borrow().chars().all(char::is_whitespace),
        _ => false,
    }
}

/// A `<p>` holding nothing but whitespace, non-breaking spaces or `<br>`.
fn is_empty_paragraph(node: &Handle) -> bool {
    markup::is_html_element(node, "p")
        && node
            .children
            .borrow()
            .iter()
            .all(|c| is_blank_text(c) || markup::is_html_element(c, "br"))
}

fn is_block_neighbour(node: &Handle) -> bool {
    markup::html_element_name(node).is_some_and(|n| BLOCK_NEIGHBOURS.contains(&n))
}

fn replacement(policy: EmptyParagraphPolicy) -> Option<Handle> {
    match policy {
        EmptyParagraphPolicy::Remove => None,
        EmptyParagraphPolicy::Nbsp => {
            let p = markup::new_element("p", &[]);
            markup::append(&p, markup::new_text("\u{00A0}"));
            Some(p)
        }
        EmptyParagraphPolicy::LineBreak => Some(markup::new_element("br", &[])),
    }
}

/// Collapse empty paragraphs in every sibling list below `parent`.
fn collapse_empty_paragraphs(parent: &Handle, policy: EmptyParagraphPolicy) {
    let children: Vec<Handle> = parent.children.borrow().clone();
    for child in &children {
        if !is_empty_paragraph(child) {
            collapse_empty_paragraphs(child, policy);
        }
    }

    // Indices of the non-blank siblings; blank text between siblings does
    // not break adjacency.
    let significant: Vec<usize> = (0..children.len())
        .filter(|&i| !is_blank_text(&children[i]))
        .collect();

    let mut rebuilt: Vec<Handle> = Vec::with_capacity(children.len());
    let mut next_kept = 0usize;
    let mut s = 0usize;
    while s < significant.len() {
        if !is_empty_paragraph(&children[significant[s]]) {
            s += 1;
            continue;
        }
        let run_start = s;
        while s < significant.len() && is_empty_paragraph(&children[significant[s]]) {
            s += 1;
        }
        let first = significant[run_start];
        let last = significant[s - 1];
        let run_len = s - run_start;

        let before_is_block = run_start > 0 && is_block_neighbour(&children[significant[run_start - 1]]);
        let after_is_block = s < significant.len() && is_block_neighbour(&children[significant[s]]);

        rebuilt.extend(children[next_kept..first].iter().cloned());
        if !(before_is_block || after_is_block) {
            let substitute = if run_len > 1 {
                Some(markup::new_element("br", &[]))
            } else {
                replacement(policy)
            };
            rebuilt.extend(substitute);
        }
        next_kept = last + 1;
    }
    if next_kept == 0 {
        return;
    }
    rebuilt.extend(children[next_kept..].iter().cloned());
    markup::set_children(parent, rebuilt);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(html: &str) -> String {
        normalize_fragment(html, EmptyParagraphPolicy::Remove)
    }

    #[test]
    fn stray_col_is_dropped_outside_a_table() {
        assert_eq!(norm("<col span=2><p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn body_content_is_extracted() {
        let html = r#"<html><head><title>x</title></head><body class="c">wrapped</body></html>"#;
        assert_eq!(norm(html), "wrapped");
    }

    #[test]
    fn no_body_means_whole_input() {
        assert_eq!(norm("<p>Hello <b>world</b></p>"), "<p>Hello <b>world</b></p>");
        assert_eq!(extract_body("<p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn contenteditable_is_stripped() {
        assert_eq!(
            norm(r#"<div contenteditable="true">x</div><div CONTENTEDITABLE=true>y</div>"#),
            "<div>x</div><div>y</div>"
        );
    }

    #[test]
    fn contenteditable_false_is_kept() {
        assert_eq!(
            strip_contenteditable(r#"<div contenteditable="false">x</div>"#),
            r#"<div contenteditable="false">x</div>"#
        );
    }

    #[test]
    fn nbsp_becomes_numeric() {
        assert_eq!(norm("<p>a&nbsp;b</p>"), "<p>a&#160;b</p>");
    }

    #[test]
    fn void_elements_are_self_closed_in_any_case() {
        let out = norm(r#"<p>a<BR>b<Img SRC="x.png" Alt="X"><hr class=rule><wbr></p>"#);
        assert!(out.contains("<br/>"), "{out}");
        assert!(out.contains(r#"<img src="x.png" alt="X"/>"#), "{out}");
        assert!(out.contains(r#"<hr class="rule"/>"#), "{out}");
        assert!(!out.contains("<BR"), "{out}");
    }

    #[test]
    fn all_body_context_voids_close() {
        for tag in ["br", "hr", "img", "meta", "link", "input", "source", "base", "area", "embed", "param", "track", "wbr"] {
            let out = norm(&format!("<{} data-x=\"1\">", tag.to_uppercase()));
            assert_eq!(out, format!("<{tag} data-x=\"1\"/>"));
        }
    }

    #[test]
    fn normalizer_is_idempotent() {
        let inputs = [
            "<p></p><h1>Title</h1><p> </p><p>&nbsp;</p><ul><li>x<br>y</li></ul><p></p>",
            r#"<body><div contenteditable="true"><p>a<img src=a.png></p><p></p><p>b</p></div></body>"#,
            "<p>a<div>b</div></p>",
        ];
        for policy in [EmptyParagraphPolicy::Remove, EmptyParagraphPolicy::Nbsp, EmptyParagraphPolicy::LineBreak] {
            for input in inputs {
                let once = normalize_fragment(input, policy);
                let twice = normalize_fragment(&once, policy);
                assert_eq!(once, twice, "policy {policy:?}, input {input}");
            }
        }
    }

    #[test]
    fn empty_paragraph_before_heading_is_removed() {
        assert_eq!(norm("<p></p><h1>Title</h1>"), "<h1>Title</h1>");
    }

    #[test]
    fn empty_paragraph_after_block_is_removed() {
        assert_eq!(norm("<ul><li>a</li></ul><p> </p><p>next</p>"), "<ul><li>a</li></ul><p>next</p>");
        assert_eq!(norm("<hr><p><br></p>"), "<hr/>");
    }

    #[test]
    fn consecutive_empty_paragraphs_become_one_break() {
        assert_eq!(norm("<p>  </p><p>  </p>"), "<br/>");
        assert_eq!(norm("<p>a</p><p></p>\n<p>&nbsp;</p><p>b</p>"), "<p>a</p><br/><p>b</p>");
    }

    #[test]
    fn isolated_empty_paragraph_follows_policy() {
        let input = "<p>a</p><p></p><p>b</p>";
        assert_eq!(normalize_fragment(input, EmptyParagraphPolicy::Remove), "<p>a</p><p>b</p>");
        assert_eq!(
            normalize_fragment(input, EmptyParagraphPolicy::Nbsp),
            "<p>a</p><p>&#160;</p><p>b</p>"
        );
        assert_eq!(
            normalize_fragment(input, EmptyParagraphPolicy::LineBreak),
            "<p>a</p><br/><p>b</p>"
        );
    }

    #[test]
    fn nested_sibling_lists_are_collapsed() {
        assert_eq!(
            norm("<div><p></p><h2>x</h2></div><blockquote><p></p><p></p></blockquote>"),
            "<div><h2>x</h2></div><blockquote><br/></blockquote>"
        );
    }

    #[test]
    fn policy_parses_from_cli_words() {
        assert_eq!("nbsp".parse::<EmptyParagraphPolicy>(), Ok(EmptyParagraphPolicy::Nbsp));
        assert_eq!("BR".parse::<EmptyParagraphPolicy>(), Ok(EmptyParagraphPolicy::LineBreak));
        assert_eq!("remove".parse::<EmptyParagraphPolicy>(), Ok(EmptyParagraphPolicy::Remove));
        assert!("keep".parse::<EmptyParagraphPolicy>().is_err());
    }
}
