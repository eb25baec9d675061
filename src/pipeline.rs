//! Pipeline – ties together normalization, autolinking, the print template,
//! XHTML serialization and rendering.
//!
//! Every stage takes its inputs as explicit parameters; [`ConvertOptions`]
//! is the only configuration and nothing is cached between calls.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::adapter::{ForgeRenderer, PdfRenderer, RenderOptions, RenderSource, RenderSummary};
use crate::autolink::autolink_fragment;
use crate::document::{build_document, DocumentParts, PrintStyle};
use crate::dom::Document;
use crate::error::{ConvertError, RenderError};
use crate::fonts::FontRegistration;
use crate::layout_config::LayoutConfig;
use crate::normalize::{normalize_fragment, EmptyParagraphPolicy};
use crate::resources::ResourceLoader;
use crate::xhtml;

/// Configuration for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Page geometry and base typography of the print template.
    pub print_style: PrintStyle,
    /// CSS appended after the template stylesheet.
    pub extra_css: Option<String>,
    /// Wrap the body content in `<div id="…">`.
    pub container_id: Option<String>,
    /// Turn bare URLs and e-mail addresses into links.
    pub autolink: bool,
    pub empty_paragraphs: EmptyParagraphPolicy,
    /// Document title (`<title>` and PDF metadata).
    pub title: Option<String>,
    /// Base for relative image paths; `None` or `"-"` is the working directory.
    pub base_url: Option<String>,
    pub fonts: Vec<FontRegistration>,
    /// Advance-width text measurement instead of full shaping.
    pub fast_mode: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            print_style: PrintStyle::default(),
            extra_css: None,
            container_id: None,
            autolink: false,
            empty_paragraphs: EmptyParagraphPolicy::default(),
            title: None,
            base_url: None,
            fonts: Vec::new(),
            fast_mode: true,
        }
    }
}

impl ConvertOptions {
    /// Settings handed to the bundled renderer.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            default_page_size: self.print_style.page_size.oriented(self.print_style.orientation),
            fonts: self.fonts.clone(),
            fast_mode: self.fast_mode,
            title: self.title.clone(),
        }
    }
}

/// Normalized (and optionally autolinked) body content.
pub fn prepare_body(html: &str, opts: &ConvertOptions) -> String {
    let body = normalize_fragment(html, opts.empty_paragraphs);
    if opts.autolink {
        autolink_fragment(&body)
    } else {
        body
    }
}

/// The complete print document around the prepared body.
pub fn prepare_print_document(html: &str, opts: &ConvertOptions) -> String {
    let body = prepare_body(html, opts);
    let css = opts.print_style.to_css();
    build_document(
        &body,
        &DocumentParts {
            css: &css,
            extra_css: opts.extra_css.as_deref(),
            title: opts.title.as_deref(),
            container_id: opts.container_id.as_deref(),
        },
    )
}

/// Print document serialized as strict XHTML.
pub fn prepare_xhtml(html: &str, opts: &ConvertOptions) -> String {
    xhtml::to_xhtml(&prepare_print_document(html, opts))
}

/// Print document as the renderer's tree.
pub fn prepare_document(html: &str, opts: &ConvertOptions) -> Document {
    xhtml::to_document(&prepare_print_document(html, opts))
}

/// Run the whole pipeline and write the PDF to `sink`.
pub fn convert(
    html: &str,
    opts: &ConvertOptions,
    renderer: &dyn PdfRenderer,
    sink: &mut dyn Write,
) -> Result<RenderSummary, RenderError> {
    let document = prepare_document(html, opts);
    log::debug!(
        "pipeline: prepared document ({} top-level nodes, {} style blocks)",
        document.body_children().len(),
        document.style_sheets.len()
    );
    renderer.render(
        RenderSource::Tree {
            document,
            base_url: opts.base_url.clone(),
        },
        sink,
    )
}

/// Convert `input` into `output` with the bundled renderer.
///
/// The output file is created only once the whole PDF is in memory, so a
/// failed run never leaves a partial file behind.
pub fn convert_file(
    input: &Path,
    output: &Path,
    opts: &ConvertOptions,
) -> Result<RenderSummary, ConvertError> {
    let html = fs::read_to_string(input).map_err(|source| ConvertError::Input {
        path: input.to_path_buf(),
        source,
    })?;
    log::info!("pipeline: read '{}' ({} bytes)", input.display(), html.len());

    let renderer = ForgeRenderer::new(opts.render_options());
    let mut pdf = Vec::new();
    let summary = convert(&html, opts, &renderer, &mut pdf)?;

    write_output(output, &pdf)?;
    log::info!(
        "pipeline: wrote '{}' ({} pages, {} bytes)",
        output.display(),
        summary.pages,
        summary.bytes
    );
    Ok(summary)
}

/// Create `path` (and missing parent directories) and write `bytes` to it.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let output_err = |source| ConvertError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(output_err)?;
        }
    }
    let file = File::create(path).map_err(output_err)?;
    finish_output(path, file, bytes)
}

/// Write `bytes` into a freshly created `path`; a partial file is removed
/// when the write fails.
fn finish_output<W: Write>(path: &Path, mut sink: W, bytes: &[u8]) -> Result<(), ConvertError> {
    let written = sink.write_all(bytes).and_then(|()| sink.flush());
    drop(sink);
    if let Err(source) = written {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("could not remove partial output '{}': {e}", path.display());
        }
        return Err(ConvertError::Output {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Layout only, without PDF encoding – useful for tests and `--layout-json`.
pub fn compute_layout_config(html: &str, opts: &ConvertOptions) -> Result<LayoutConfig, RenderError> {
    let renderer = ForgeRenderer::new(opts.render_options());
    let fonts = renderer.font_manager()?;
    let resources = ResourceLoader::new(opts.base_url.as_deref());
    renderer.layout(&prepare_document(html, opts), &fonts, &resources)
}

/// Convenience: default options, PDF bytes in memory.
pub fn generate_pdf_from_html(html: &str) -> Result<Vec<u8>, RenderError> {
    let opts = ConvertOptions::default();
    let mut bytes = Vec::new();
    convert(html, &opts, &ForgeRenderer::new(opts.render_options()), &mut bytes)?;
    Ok(bytes)
}
