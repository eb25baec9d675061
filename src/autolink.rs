//! Autolinker – wraps bare e-mail addresses and URLs found in text nodes in
//! anchor elements.
//!
//! Text below `a`, `script`, `style`, `code`, `pre` (and a few other
//! elements whose text is not prose) is never touched, and neither is
//! foreign (SVG/MathML) content. A text node without any match keeps its
//! exact original contents.

use std::sync::LazyLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use crate::markup::{self, Fragment};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}\b")
        .expect("EMAIL_RE: hardcoded regex is valid")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:(?:https?|ftp)://|www\.)[^\s<>"']+"#)
        .expect("URL_RE: hardcoded regex is valid")
});

/// Elements whose text content is never linkified.
const SKIP_ELEMENTS: [&str; 8] = ["a", "script", "style", "code", "pre", "textarea", "button", "title"];

/// Scheme put in front of `www.` matches.
const DEFAULT_SCHEME: &str = "https://";

/// Linkify a body fragment and return its serialized inner markup.
pub fn autolink_fragment(html: &str) -> String {
    let fragment = Fragment::parse(html);
    let root = fragment.root();
    let links = link_children(&root);
    log::debug!("autolink: inserted {links} anchor(s)");
    fragment.to_markup()
}

/// A piece of a text node after link detection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Link { href: String, label: String },
}

fn skips_subtree(node: &Handle) -> bool {
    match &node.data {
        NodeData::Element { .. } => match markup::html_element_name(node) {
            Some(name) => SKIP_ELEMENTS.contains(&name),
            // Foreign content.
            None => true,
        },
        _ => false,
    }
}

/// Rewrite text children of `parent` (recursively); returns the number of
/// anchors inserted.
fn link_children(parent: &Handle) -> usize {
    let children: Vec<Handle> = parent.children.borrow().clone();
    let mut rebuilt = Vec::with_capacity(children.len());
    let mut inserted = 0usize;
    let mut changed = false;

    for child in children {
        if let Some(text) = markup::text_of(&child) {
            let segments = split_links(&text);
            if segments.iter().any(|s| matches!(s, Segment::Link { .. })) {
                for segment in segments {
                    match segment {
                        Segment::Text(t) => rebuilt.push(markup::new_text(&t)),
                        Segment::Link { href, label } => {
                            let anchor = markup::new_element("a", &[("href", &href)]);
                            markup::append(&anchor, markup::new_text(&label));
                            rebuilt.push(anchor);
                            inserted += 1;
                        }
                    }
                }
                changed = true;
                continue;
            }
        } else if !skips_subtree(&child) {
            inserted += link_children(&child);
        }
        rebuilt.push(child);
    }

    if changed {
        markup::set_children(parent, rebuilt);
    }
    inserted
}

/// Split text into plain and link segments: e-mail addresses first, then
/// URLs in the gaps between them. An address that starts inside a URL
/// (query string, userinfo) belongs to that URL.
fn split_links(text: &str) -> Vec<Segment> {
    let urls: Vec<(usize, usize)> = URL_RE
        .find_iter(text)
        .map(|m| (m.start(), m.start() + trim_url_end(m.as_str()).len()))
        .collect();

    let mut segments = Vec::new();
    let mut last = 0usize;
    for m in EMAIL_RE.find_iter(text) {
        if urls.iter().any(|&(start, end)| start < m.start() && m.start() < end) {
            continue;
        }
        split_urls(&text[last..m.start()], &mut segments);
        segments.push(Segment::Link {
            href: format!("mailto:{}", m.as_str()),
            label: m.as_str().to_string(),
        });
        last = m.end();
    }
    split_urls(&text[last..], &mut segments);
    segments
}

fn split_urls(text: &str, segments: &mut Vec<Segment>) {
    let mut last = 0usize;
    for m in URL_RE.find_iter(text) {
        let url = trim_url_end(m.as_str());
        if url.is_empty() {
            continue;
        }
        push_text(segments, &text[last..m.start()]);
        segments.push(Segment::Link {
            href: href_for(url),
            label: url.to_string(),
        });
        last = m.start() + url.len();
    }
    push_text(segments, &text[last..]);
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(prev)) = segments.last_mut() {
        prev.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

fn href_for(url: &str) -> String {
    if url.len() >= 4 && url[..4].eq_ignore_ascii_case("www.") {
        format!("{DEFAULT_SCHEME}{url}")
    } else {
        url.to_string()
    }
}

/// Drop sentence punctuation and unbalanced closing brackets from the end
/// of a URL match.
fn trim_url_end(url: &str) -> &str {
    let mut end = url.len();
    loop {
        let s = &url[..end];
        let Some(last) = s.chars().next_back() else {
            break;
        };
        let drop = match last {
            '.' | ',' | ';' | ':' | '!' | '?' => true,
            ')' => s.matches(')').count() > s.matches('(').count(),
            ']' => s.matches(']').count() > s.matches('[').count(),
            _ => false,
        };
        if !drop {
            break;
        }
        end -= last.len_utf8();
    }
    &url[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_and_www_are_linked() {
        let out = autolink_fragment("<p>Contact: a@b.com or visit www.example.com</p>");
        assert_eq!(
            out,
            r#"<p>Contact: <a href="mailto:a@b.com">a@b.com</a> or visit <a href="https://www.example.com">www.example.com</a></p>"#
        );
    }

    #[test]
    fn scheme_urls_keep_their_href() {
        let out = autolink_fragment("see http://example.org/a?b=1&amp;c=2 now");
        assert_eq!(
            out,
            r#"see <a href="http://example.org/a?b=1&amp;c=2">http://example.org/a?b=1&amp;c=2</a> now"#
        );
    }

    #[test]
    fn code_text_is_untouched() {
        let html = "<code>www.example.com and a@b.com</code>";
        assert_eq!(autolink_fragment(html), html);
    }

    #[test]
    fn excluded_contexts_are_untouched() {
        for html in [
            r#"<a href="/x">www.example.com</a>"#,
            r#"<a href="/x"><b>www.example.com</b></a>"#,
            "<pre>ftp://files.example.com</pre>",
            "<pre><span>a@b.com</span></pre>",
        ] {
            assert_eq!(autolink_fragment(html), html);
        }
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_the_link() {
        let out = autolink_fragment("Go to https://example.com/path.");
        assert_eq!(
            out,
            r#"Go to <a href="https://example.com/path">https://example.com/path</a>."#
        );
    }

    #[test]
    fn balanced_parentheses_survive() {
        let segs = split_links("(see https://en.wikipedia.org/wiki/Rust_(language))");
        assert_eq!(
            segs,
            vec![
                Segment::Text("(see ".into()),
                Segment::Link {
                    href: "https://en.wikipedia.org/wiki/Rust_(language)".into(),
                    label: "https://en.wikipedia.org/wiki/Rust_(language)".into(),
                },
                Segment::Text(")".into()),
            ]
        );
    }

    #[test]
    fn addresses_inside_urls_stay_in_the_url() {
        let out = autolink_fragment("see https://example.com/u?mail=a@b.com now");
        assert_eq!(
            out,
            r#"see <a href="https://example.com/u?mail=a@b.com">https://example.com/u?mail=a@b.com</a> now"#
        );

        let out = autolink_fragment("ftp://user@files.example.org/x");
        assert_eq!(
            out,
            r#"<a href="ftp://user@files.example.org/x">ftp://user@files.example.org/x</a>"#
        );
    }

    #[test]
    fn address_with_www_domain_is_still_mail() {
        let out = autolink_fragment("write to a@www.example.com today");
        assert_eq!(
            out,
            r#"write to <a href="mailto:a@www.example.com">a@www.example.com</a> today"#
        );
    }

    #[test]
    fn uppercase_www_gets_default_scheme() {
        assert_eq!(href_for("WWW.Example.com"), "https://WWW.Example.com");
        assert_eq!(href_for("https://x.io"), "https://x.io");
    }

    #[test]
    fn text_without_matches_is_one_segment() {
        assert_eq!(split_links("plain text"), vec![Segment::Text("plain text".into())]);
    }

    #[test]
    fn sibling_order_is_preserved() {
        let out = autolink_fragment("<div><b>x</b> mail a@b.io <i>y</i></div>");
        assert_eq!(
            out,
            r#"<div><b>x</b> mail <a href="mailto:a@b.io">a@b.io</a> <i>y</i></div>"#
        );
    }
}
