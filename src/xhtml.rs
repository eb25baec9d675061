//! XHTML serializer – tolerant parse of a print document into strict XHTML
//! text, or straight into the renderer's [`Document`] tree.

use std::sync::LazyLock;

use markup5ever_rcdom::Handle;
use regex::Regex;

use crate::dom::Document;
use crate::markup;

static PROLOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(?:<\?xml[^>]*\?>\s*)?(?:<!DOCTYPE[^>]*>)?")
        .expect("PROLOG_RE: hardcoded regex is valid")
});

/// XML declaration written ahead of every serialized document.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// Drop a leading BOM, XML declaration and HTML doctype.
pub fn strip_prolog(html: &str) -> &str {
    let html = html.strip_prefix('\u{FEFF}').unwrap_or(html);
    match PROLOG_RE.find(html) {
        Some(m) => &html[m.end()..],
        None => html,
    }
}

/// Serialize HTML as a well-formed XHTML document with a single
/// `<html xmlns="http://www.w3.org/1999/xhtml">` root.
pub fn to_xhtml(html: &str) -> String {
    let dom = markup::parse_html_document(strip_prolog(html));
    let mut out = String::with_capacity(html.len() + 128);
    out.push_str(XML_DECLARATION);
    out.push('\n');
    match html_root(&dom.document) {
        Some(root) => out.push_str(&markup::serialize_root(&root)),
        // The HTML5 tree builder always creates <html>; keep a valid root regardless.
        None => {
            out.push_str("<html xmlns=\"");
            out.push_str(markup::XHTML_NAMESPACE);
            out.push_str("\"/>");
        }
    }
    log::debug!("xhtml: {} bytes in, {} bytes out", html.len(), out.len());
    out
}

/// Parse HTML into the renderer's tree without a textual round trip.
pub fn to_document(html: &str) -> Document {
    let dom = markup::parse_html_document(strip_prolog(html));
    Document::from_rcdom(&dom.document)
}

/// Parse serialized XHTML back into the renderer's tree.
///
/// The tolerant parser reads `<style>` as raw text, so the entities the
/// serializer wrote there are decoded again.
pub fn from_xhtml(markup: &str) -> Document {
    let mut document = to_document(markup);
    for sheet in &mut document.style_sheets {
        if sheet.contains('&') {
            *sheet = unescape_xml(sheet);
        }
    }
    document
}

fn unescape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|end| {
            let c = match &rest[1..end] {
                "amp" => '&',
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" => '\'',
                num => {
                    let code = match num.strip_prefix("#x").or_else(|| num.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                        None => num.strip_prefix('#')?.parse().ok()?,
                    };
                    char::from_u32(code)?
                }
            };
            Some((c, end + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn html_root(document: &Handle) -> Option<Handle> {
    document
        .children
        .borrow()
        .iter()
        .find(|c| markup::is_html_element(c, "html"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prolog_is_stripped() {
        assert_eq!(strip_prolog("\u{FEFF}<!DOCTYPE html>\n<html></html>"), "\n<html></html>");
        assert_eq!(
            strip_prolog("<?xml version=\"1.0\"?>\n<!doctype html><p>x</p>"),
            "<p>x</p>"
        );
        assert_eq!(strip_prolog("<p>no prolog</p>"), "<p>no prolog</p>");
    }

    #[test]
    fn output_has_one_namespaced_root() {
        let out = to_xhtml("<!DOCTYPE html><html><head><title>T</title></head><body><p>a</p></body></html>");
        assert!(out.starts_with(XML_DECLARATION));
        assert!(out.contains("<html xmlns=\"http://www.w3.org/1999/xhtml\">"));
        assert!(!out.contains("DOCTYPE"));
        assert_eq!(out.matches("<html").count(), 1);
        assert!(out.trim_end().ends_with("</html>"));
    }

    #[test]
    fn void_elements_and_entities() {
        let out = to_xhtml("<p>Fish &amp; chips<br>x&nbsp;y <img src=\"a.png?x=1&y=2\"></p>");
        assert!(out.contains("Fish &amp; chips<br/>"));
        assert!(out.contains("x&#160;y"));
        assert!(out.contains("<img src=\"a.png?x=1&amp;y=2\"/>"));
    }

    #[test]
    fn fragment_without_shell_gets_one() {
        let out = to_xhtml("<p>bare</p>");
        assert!(out.contains("<head></head><body><p>bare</p></body>"));
    }

    #[test]
    fn comments_cannot_break_out() {
        let out = to_xhtml("<p>a<!-- x -- y -->b</p>");
        assert!(out.contains("<!-- x - - y -->"));
    }

    #[test]
    fn svg_gets_its_own_namespace() {
        let out = to_xhtml("<p><svg><circle r=\"1\"/></svg></p>");
        assert!(out.contains("<svg xmlns=\"http://www.w3.org/2000/svg\">"));
    }

    #[test]
    fn style_text_is_escaped() {
        let out = to_xhtml("<style>p > a { color: red; }</style><p>x</p>");
        assert!(out.contains("p &gt; a"));
    }

    #[test]
    fn style_entities_survive_a_round_trip() {
        let xhtml = to_xhtml("<style>p > a::after { content: \"&amp;\"; }</style><p>x</p>");
        let doc = from_xhtml(&xhtml);
        assert_eq!(doc.style_sheets, vec!["p > a::after { content: \"&amp;\"; }".to_string()]);
        assert_eq!(unescape_xml("&#160;&#xA0;&bogus; & x"), "\u{a0}\u{a0}&bogus; & x");
    }

    #[test]
    fn document_tree_matches_markup() {
        let doc = to_document("<!DOCTYPE html><title>Quarterly</title><style>p{}</style><p>x</p>");
        assert_eq!(doc.title.as_deref(), Some("Quarterly"));
        assert_eq!(doc.style_sheets.len(), 1);
        assert_eq!(doc.body_children().len(), 1);
    }
}
