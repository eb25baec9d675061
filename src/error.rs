//! Error types for the conversion pipeline and the render backend.
//!
//! Every fault is terminal: nothing is retried. [`ConvertError::exit_code`]
//! maps each variant onto the process exit code used by the `html2pdf`
//! binary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_OK: i32 = 0;
/// Exit code for a command-line usage error.
pub const EXIT_USAGE: i32 = 1;
/// Exit code for an input or output file failure.
pub const EXIT_IO: i32 = 2;
/// Exit code for a failure inside the pipeline or the renderer.
pub const EXIT_RENDER: i32 = 3;

/// Failure raised by a [`PdfRenderer`](crate::adapter::PdfRenderer).
#[derive(Debug, Error)]
pub enum RenderError {
    /// A registered font could not be read from disk.
    #[error("failed to read font '{path}'")]
    FontRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Font bytes were read but are not a usable TrueType/OpenType face.
    #[error("font for family '{family}' could not be parsed: {reason}")]
    FontParse { family: String, reason: String },

    /// The layout engine rejected the styled tree.
    #[error("layout failed: {0}")]
    Layout(String),

    /// The PDF encoder rejected the paginated layout.
    #[error("PDF encoding failed: {0}")]
    Encode(String),

    /// Writing the PDF stream to the sink failed.
    #[error("failed to write PDF stream")]
    Io(#[from] io::Error),
}

/// Top-level error of a conversion run.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Wrong argument count or malformed flag.
    #[error("{0}")]
    Usage(String),

    /// The source HTML file could not be read.
    #[error("failed to read '{}'", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The PDF (or a side output) could not be written.
    #[error("failed to write '{}'", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Rendering failed.
    #[error("render failed")]
    Render(#[from] RenderError),
}

impl ConvertError {
    /// Process exit code for this fault.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvertError::Usage(_) => EXIT_USAGE,
            ConvertError::Input { .. } | ConvertError::Output { .. } => EXIT_IO,
            ConvertError::Render(_) => EXIT_RENDER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_fault_kind() {
        let usage = ConvertError::Usage("bad".into());
        assert_eq!(usage.exit_code(), EXIT_USAGE);

        let input = ConvertError::Input {
            path: PathBuf::from("missing.html"),
            source: io::Error::new(io::ErrorKind::NotFound, "nope"),
        };
        assert_eq!(input.exit_code(), EXIT_IO);

        let render = ConvertError::from(RenderError::Encode("boom".into()));
        assert_eq!(render.exit_code(), EXIT_RENDER);
    }

    #[test]
    fn input_error_keeps_source() {
        use std::error::Error as _;
        let err = ConvertError::Input {
            path: PathBuf::from("a.html"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("a.html"));
        assert!(err.source().is_some());
    }
}
