//! PDF render adapter.
//!
//! [`PdfRenderer`] is the seam between the markup pipeline and whatever turns
//! a print document into PDF bytes. [`ForgeRenderer`] is the bundled backend:
//!
//! 1. **Fonts** – load registrations into a [`FontManager`]
//! 2. **Style** – cascade the document's `<style>` blocks and inline styles
//! 3. **Layout** – box layout with Taffy
//! 4. **Paginate** – split into pages using the `@page` geometry
//! 5. **Render** – encode with printpdf and write to the sink

use std::io::Write;

use crate::document::PageSize;
use crate::dom::Document;
use crate::error::RenderError;
use crate::fonts::{FontManager, FontRegistration};
use crate::layout::compute_layout;
use crate::layout_config::LayoutConfig;
use crate::pagination::paginate;
use crate::render::render_pdf;
use crate::resources::ResourceLoader;
use crate::style::{style_body, StyleSheet};
use crate::xhtml;

/// What a renderer is asked to draw.
#[derive(Debug, Clone)]
pub enum RenderSource {
    /// Serialized XHTML text.
    Xhtml {
        markup: String,
        base_url: Option<String>,
    },
    /// An already-parsed document tree.
    Tree {
        document: Document,
        base_url: Option<String>,
    },
}

impl RenderSource {
    fn base_url(&self) -> Option<&str> {
        match self {
            RenderSource::Xhtml { base_url, .. } | RenderSource::Tree { base_url, .. } => {
                base_url.as_deref()
            }
        }
    }

    fn into_document(self) -> Document {
        match self {
            RenderSource::Xhtml { markup, .. } => xhtml::from_xhtml(&markup),
            RenderSource::Tree { document, .. } => document,
        }
    }
}

/// Outcome of a successful render.
#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub pages: usize,
    /// Bytes written to the sink.
    pub bytes: usize,
    /// The paginated layout that was drawn.
    pub layout: LayoutConfig,
}

/// Turns a print document into a PDF byte stream.
pub trait PdfRenderer {
    fn render(&self, source: RenderSource, out: &mut dyn Write) -> Result<RenderSummary, RenderError>;
}

/// Settings for [`ForgeRenderer`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Used when the document's `@page` rule sets no size.
    pub default_page_size: PageSize,
    pub fonts: Vec<FontRegistration>,
    /// Measure text from glyph advances only; `false` shapes registered
    /// fonts with rustybuzz.
    pub fast_mode: bool,
    /// Overrides the document's `<title>` in the PDF metadata.
    pub title: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            default_page_size: PageSize::A4,
            fonts: Vec::new(),
            fast_mode: true,
            title: None,
        }
    }
}

/// The bundled Taffy + printpdf backend.
#[derive(Debug, Clone, Default)]
pub struct ForgeRenderer {
    options: RenderOptions,
}

impl ForgeRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub(crate) fn font_manager(&self) -> Result<FontManager, RenderError> {
        let mut fonts = FontManager::new();
        fonts.set_precise(!self.options.fast_mode);
        for registration in &self.options.fonts {
            fonts.register(registration)?;
        }
        Ok(fonts)
    }

    /// Style, lay out and paginate a document without encoding it.
    pub fn layout(
        &self,
        document: &Document,
        fonts: &FontManager,
        resources: &ResourceLoader,
    ) -> Result<LayoutConfig, RenderError> {
        let sheet = StyleSheet::parse(&document.style_sheet_text());
        let geometry = sheet.page_geometry(self.options.default_page_size);
        log::debug!(
            "adapter: {} style rules, page {:.1}x{:.1}pt",
            sheet.rule_count(),
            geometry.width,
            geometry.height
        );

        let (body_style, styled) = style_body(&document.body, &sheet);
        let boxes = compute_layout(&styled, &body_style, &geometry, fonts, resources)?;

        let title = self
            .options
            .title
            .clone()
            .or_else(|| document.title.clone())
            .unwrap_or_else(LayoutConfig::default_title);
        Ok(paginate(&boxes, &geometry, &title))
    }
}

impl PdfRenderer for ForgeRenderer {
    fn render(&self, source: RenderSource, out: &mut dyn Write) -> Result<RenderSummary, RenderError> {
        let fonts = self.font_manager()?;
        let resources = ResourceLoader::new(source.base_url());
        let document = source.into_document();

        let layout = self.layout(&document, &fonts, &resources)?;
        let bytes = render_pdf(&layout, &fonts, &resources)?;
        out.write_all(&bytes)?;
        out.flush()?;

        log::debug!("adapter: wrote {} pages, {} bytes", layout.pages.len(), bytes.len());
        Ok(RenderSummary {
            pages: layout.pages.len(),
            bytes: bytes.len(),
            layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn render(source: RenderSource, options: RenderOptions) -> (Vec<u8>, RenderSummary) {
        let mut out = Vec::new();
        let summary = ForgeRenderer::new(options).render(source, &mut out).unwrap();
        (out, summary)
    }

    #[test]
    fn tree_source_renders_pdf() {
        let document = Document::parse("<title>Minutes</title><p>Hello</p>");
        let (bytes, summary) = render(
            RenderSource::Tree {
                document,
                base_url: None,
            },
            RenderOptions::default(),
        );
        assert_eq!(&bytes[..5], b"%PDF-");
        assert_eq!(summary.bytes, bytes.len());
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.layout.title, "Minutes");
        assert_eq!(summary.layout.text_lines(), vec!["Hello".to_string()]);
    }

    #[test]
    fn xhtml_source_matches_tree_source() {
        let html = "<p>Same <b>text</b></p>";
        let (_, from_xhtml) = render(
            RenderSource::Xhtml {
                markup: xhtml::to_xhtml(html),
                base_url: None,
            },
            RenderOptions::default(),
        );
        let (_, from_tree) = render(
            RenderSource::Tree {
                document: xhtml::to_document(html),
                base_url: None,
            },
            RenderOptions::default(),
        );
        assert_eq!(from_xhtml.layout.to_json(), from_tree.layout.to_json());
    }

    #[test]
    fn page_rule_overrides_default_size() {
        let document = Document::parse(
            "<style>@page { size: 100mm 50mm; margin: 10pt; }</style><p>x</p>",
        );
        let (_, summary) = render(
            RenderSource::Tree {
                document,
                base_url: None,
            },
            RenderOptions::default(),
        );
        assert!((summary.layout.page_width_pt - 283.46).abs() < 0.1);
        assert!((summary.layout.page_height_pt - 141.73).abs() < 0.1);
    }

    #[test]
    fn default_page_size_applies_without_page_rule() {
        let options = RenderOptions {
            default_page_size: PageSize::LETTER,
            title: Some("Override".into()),
            ..RenderOptions::default()
        };
        let (_, summary) = render(
            RenderSource::Tree {
                document: Document::parse("<title>Ignored</title><p>x</p>"),
                base_url: None,
            },
            options,
        );
        assert!((summary.layout.page_width_pt - 612.0).abs() < 0.1);
        assert_eq!(summary.layout.title, "Override");
    }

    #[test]
    fn unreadable_font_is_a_render_fault() {
        let options = RenderOptions {
            fonts: vec![FontRegistration::from_path("/no/such/font.ttf", "Body")],
            ..RenderOptions::default()
        };
        let mut out = Vec::new();
        let err = ForgeRenderer::new(options)
            .render(
                RenderSource::Tree {
                    document: Document::parse("<p>x</p>"),
                    base_url: None,
                },
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, RenderError::FontRead { .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn garbage_font_bytes_fail_to_parse() {
        let options = RenderOptions {
            fonts: vec![FontRegistration::from_bytes(b"not a font".to_vec(), "Body")],
            ..RenderOptions::default()
        };
        let err = ForgeRenderer::new(options)
            .render(
                RenderSource::Tree {
                    document: Document::parse("<p>x</p>"),
                    base_url: None,
                },
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err, RenderError::FontParse { .. }));
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_reported() {
        let err = ForgeRenderer::default()
            .render(
                RenderSource::Tree {
                    document: Document::parse("<p>x</p>"),
                    base_url: None,
                },
                &mut BrokenSink,
            )
            .unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
