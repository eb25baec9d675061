//! # html2pdf-forge – editor HTML → paginated PDF
//!
//! Converts an HTML fragment, typically produced by a rich-text editor, into
//! a PDF. The pipeline stages are:
//!
//! 1. **Normalize** – editor artifacts out, void elements closed ([`normalize`])
//! 2. **Autolink** – bare URLs and e-mail addresses become anchors ([`autolink`])
//! 3. **Template** – wrap in a print document with page CSS ([`document`])
//! 4. **Serialize** – strict XHTML or a render tree ([`xhtml`])
//! 5. **Render** – style, lay out with Taffy, paginate, emit PDF bytes via
//!    printpdf behind the [`adapter::PdfRenderer`] seam
//!
//! [`pipeline`] runs the stages with explicit [`pipeline::ConvertOptions`].

pub mod adapter;
pub mod autolink;
pub mod document;
pub mod dom;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod markup;
pub mod normalize;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod resources;
pub mod style;
pub mod xhtml;

// Re-exports for convenience
pub use adapter::{ForgeRenderer, PdfRenderer, RenderOptions, RenderSource, RenderSummary};
pub use document::{PageOrientation, PageSize, PrintStyle};
pub use error::{ConvertError, RenderError};
pub use normalize::EmptyParagraphPolicy;
pub use pipeline::{convert, convert_file, generate_pdf_from_html, ConvertOptions};
