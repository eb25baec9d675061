//! Print document builder – wraps cleaned body content in a full HTML
//! document whose `<style>` block carries the page geometry and font rules.
//!
//! The CSS is passed in explicitly; nothing here keeps state between calls.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::markup::escape;

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Physical page size in millimetres (portrait dimensions).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PageSize {
    pub const A4: Self = Self { width_mm: 210.0, height_mm: 297.0 };
    pub const A5: Self = Self { width_mm: 148.0, height_mm: 210.0 };
    pub const LETTER: Self = Self { width_mm: 215.9, height_mm: 279.4 };
    pub const LEGAL: Self = Self { width_mm: 215.9, height_mm: 355.6 };

    /// Size with `orientation` applied.
    pub fn oriented(self, orientation: PageOrientation) -> Self {
        let (short, long) = if self.width_mm <= self.height_mm {
            (self.width_mm, self.height_mm)
        } else {
            (self.height_mm, self.width_mm)
        };
        match orientation {
            PageOrientation::Portrait => Self { width_mm: short, height_mm: long },
            PageOrientation::Landscape => Self { width_mm: long, height_mm: short },
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

impl FromStr for PageSize {
    type Err = String;

    /// `A4`, `A5`, `Letter`, `Legal`, or `<W>x<H>mm`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(Self::A4),
            "a5" => Ok(Self::A5),
            "letter" => Ok(Self::LETTER),
            "legal" => Ok(Self::LEGAL),
            other => {
                let dims = other.strip_suffix("mm").unwrap_or(other);
                let (w, h) = dims
                    .split_once('x')
                    .ok_or_else(|| format!("invalid page size '{s}'"))?;
                let width_mm: f32 = w.trim().parse().map_err(|_| format!("invalid page width in '{s}'"))?;
                let height_mm: f32 = h.trim().parse().map_err(|_| format!("invalid page height in '{s}'"))?;
                let valid = |v: f32| v.is_finite() && v > 0.0;
                if !valid(width_mm) || !valid(height_mm) {
                    return Err(format!("page size '{s}' must be positive and finite"));
                }
                Ok(Self { width_mm, height_mm })
            }
        }
    }
}

/// Page margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl FromStr for Margins {
    type Err = String;

    /// One, two or four whitespace-separated point values, CSS order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split_whitespace()
            .map(|v| v.trim_end_matches("pt").parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| format!("invalid margins '{s}'"))?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(format!("margins '{s}' must be finite"));
        }
        match values[..] {
            [all] => Ok(Self { top: all, right: all, bottom: all, left: all }),
            [v, h] => Ok(Self { top: v, right: h, bottom: v, left: h }),
            [top, right, bottom, left] => Ok(Self { top, right, bottom, left }),
            _ => Err(format!("margins '{s}' need 1, 2 or 4 values")),
        }
    }
}

/// Page geometry and default typography of the print template.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintStyle {
    pub page_size: PageSize,
    pub orientation: PageOrientation,
    pub margins: Margins,
    /// Top margin of the first page only (room for a letterhead).
    pub first_page_margin_top: Option<f32>,
    /// CSS `font-family` list.
    pub font_family: String,
    /// Body font size in points.
    pub font_size_pt: f32,
}

impl Default for PrintStyle {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            orientation: PageOrientation::Portrait,
            margins: Margins { top: 130.0, right: 55.0, bottom: 60.0, left: 55.0 },
            first_page_margin_top: Some(130.0),
            font_family: "Arial, sans-serif".to_string(),
            font_size_pt: 10.0,
        }
    }
}

impl PrintStyle {
    /// Render the template stylesheet.
    pub fn to_css(&self) -> String {
        let size = self.page_size.oriented(self.orientation);
        let m = &self.margins;
        let mut css = String::new();
        let _ = writeln!(
            css,
            "@page {{ size: {}mm {}mm; margin: {}pt {}pt {}pt {}pt; }}",
            size.width_mm, size.height_mm, m.top, m.right, m.bottom, m.left
        );
        if let Some(top) = self.first_page_margin_top {
            let _ = writeln!(css, "@page :first {{ margin-top: {top}pt; }}");
        }
        css.push_str("html, body { margin: 0; padding: 0; }\n");
        let _ = writeln!(
            css,
            "body {{ font-family: {}; font-size: {}pt; }}",
            self.font_family, self.font_size_pt
        );
        css
    }
}

/// Everything besides the body content that goes into the document shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentParts<'a> {
    /// Base stylesheet, usually [`PrintStyle::to_css`].
    pub css: &'a str,
    /// Caller CSS appended after the base stylesheet.
    pub extra_css: Option<&'a str>,
    pub title: Option<&'a str>,
    /// When set, the body content is wrapped in `<div id="…">`.
    pub container_id: Option<&'a str>,
}

/// Wrap `body` in a complete HTML document.
///
/// CSS is interpolated verbatim; the caller owns its validity.
pub fn build_document(body: &str, parts: &DocumentParts<'_>) -> String {
    let mut html = String::with_capacity(body.len() + parts.css.len() + 256);
    html.push_str("<!DOCTYPE html>\n<html><head>\n<meta charset=\"UTF-8\"/>\n");
    if let Some(title) = parts.title {
        let _ = writeln!(html, "<title>{}</title>", escape(title, false));
    }
    html.push_str("<style>\n");
    html.push_str(parts.css);
    if let Some(extra) = parts.extra_css {
        html.push('\n');
        html.push_str(extra);
    }
    html.push_str("\n</style>\n</head><body>");
    match parts.container_id {
        Some(id) => {
            let _ = write!(html, "<div id=\"{}\">{body}</div>", escape(id, true));
        }
        None => html.push_str(body),
    }
    html.push_str("</body></html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_css_matches_print_template() {
        let css = PrintStyle::default().to_css();
        assert!(css.contains("@page { size: 210mm 297mm; margin: 130pt 55pt 60pt 55pt; }"));
        assert!(css.contains("@page :first { margin-top: 130pt; }"));
        assert!(css.contains("body { font-family: Arial, sans-serif; font-size: 10pt; }"));
    }

    #[test]
    fn landscape_swaps_dimensions() {
        let style = PrintStyle {
            orientation: PageOrientation::Landscape,
            ..PrintStyle::default()
        };
        assert!(style.to_css().contains("size: 297mm 210mm;"));
    }

    #[test]
    fn document_has_charset_style_and_body() {
        let html = build_document(
            "<p>Hi</p>",
            &DocumentParts {
                css: "body { color: red; }",
                extra_css: Some("p { margin: 0; }"),
                title: Some("A & B"),
                container_id: None,
            },
        );
        assert!(html.contains("<meta charset=\"UTF-8\"/>"));
        assert!(html.contains("<title>A &amp; B</title>"));
        let style_start = html.find("<style>").unwrap();
        let base = html.find("body { color: red; }").unwrap();
        let extra = html.find("p { margin: 0; }").unwrap();
        assert!(style_start < base && base < extra);
        assert!(html.contains("<body><p>Hi</p></body>"));
    }

    #[test]
    fn container_wraps_content() {
        let html = build_document(
            "x",
            &DocumentParts {
                css: "",
                container_id: Some("content"),
                ..DocumentParts::default()
            },
        );
        assert!(html.contains(r#"<body><div id="content">x</div></body>"#));
    }

    #[test]
    fn page_size_parsing() {
        assert_eq!("a4".parse::<PageSize>(), Ok(PageSize::A4));
        assert_eq!("Letter".parse::<PageSize>(), Ok(PageSize::LETTER));
        assert_eq!(
            "100x150mm".parse::<PageSize>(),
            Ok(PageSize { width_mm: 100.0, height_mm: 150.0 })
        );
        assert!("huge".parse::<PageSize>().is_err());
        assert!("0x10".parse::<PageSize>().is_err());
        assert!("NaNxNaNmm".parse::<PageSize>().is_err());
        assert!("infx10mm".parse::<PageSize>().is_err());
    }

    #[test]
    fn margins_parsing() {
        assert_eq!(
            "10 20".parse::<Margins>(),
            Ok(Margins { top: 10.0, right: 20.0, bottom: 10.0, left: 20.0 })
        );
        assert_eq!(
            "1pt 2pt 3pt 4pt".parse::<Margins>(),
            Ok(Margins { top: 1.0, right: 2.0, bottom: 3.0, left: 4.0 })
        );
        assert!("1 2 3".parse::<Margins>().is_err());
        assert!("NaN".parse::<Margins>().is_err());
        assert!("10 inf".parse::<Margins>().is_err());
    }
}
