//! Image resource loading.
//!
//! `src` values are resolved in this order:
//! - `data:<mime>;base64,<data>` URIs are decoded in place
//! - absolute `file:` URLs and anything relative to the base URL are read
//!   from disk
//! - remote schemes (`http`, `https`, …) are never fetched
//!
//! A resource that cannot be loaded is logged and skipped; it never fails the
//! render.

use std::env;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use url::Url;

/// Px → pt at the CSS reference density.
pub const PT_PER_PX: f32 = 0.75;

/// Resolves and reads image sources against an optional base URL.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    base: Option<Url>,
}

impl ResourceLoader {
    /// `base` is a `file:` URL, a directory path, or a file path whose
    /// directory is used. `None` and `"-"` mean the working directory.
    pub fn new(base: Option<&str>) -> Self {
        let base = match base.map(str::trim) {
            None | Some("") | Some("-") => env::current_dir()
                .ok()
                .and_then(|dir| Url::from_directory_path(dir).ok()),
            Some(raw) => base_from_str(raw),
        };
        if base.is_none() {
            log::warn!("resources: base URL could not be resolved; relative images will be skipped");
        }
        Self { base }
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Raw bytes of an image source, or `None` when it cannot be loaded.
    pub fn fetch(&self, src: &str) -> Option<Vec<u8>> {
        let src = src.trim();
        if src.is_empty() {
            return None;
        }
        if src.starts_with("data:") {
            return match parse_data_uri(src) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!("resources: skipping image: {e}");
                    None
                }
            };
        }

        let url = match Url::parse(src) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let Some(base) = &self.base else {
                    log::warn!("resources: skipping relative image '{src}' without a base URL");
                    return None;
                };
                match base.join(src) {
                    Ok(url) => url,
                    Err(e) => {
                        log::warn!("resources: skipping image '{src}': {e}");
                        return None;
                    }
                }
            }
            Err(e) => {
                log::warn!("resources: skipping image '{src}': {e}");
                return None;
            }
        };

        if url.scheme() != "file" {
            log::warn!("resources: remote image '{url}' is not fetched");
            return None;
        }
        let path = url.to_file_path().ok()?;
        match fs::read(&path) {
            Ok(bytes) => {
                log::debug!("resources: loaded '{}' ({} bytes)", path.display(), bytes.len());
                Some(bytes)
            }
            Err(e) => {
                log::warn!("resources: cannot read image '{}': {e}", path.display());
                None
            }
        }
    }

    /// Pixel dimensions of an image source without decoding the pixels.
    pub fn image_size(&self, src: &str) -> Option<(u32, u32)> {
        let dims = image_dimensions(&self.fetch(src)?);
        if dims.is_none() {
            log::warn!("resources: unreadable image header for '{}'", preview(src));
        }
        dims
    }
}

/// Pixel dimensions read from an encoded image's header.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn base_from_str(raw: &str) -> Option<Url> {
    if let Ok(url) = Url::parse(raw) {
        // A one-letter "scheme" is a Windows drive letter, not a URL.
        if url.scheme().len() > 1 {
            return Some(url);
        }
    }
    let path = Path::new(raw);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().ok()?.join(path)
    };
    if absolute.is_dir() {
        Url::from_directory_path(&absolute).ok()
    } else {
        Url::from_file_path(&absolute).ok()
    }
}

/// Decode a `data:<mime>;base64,<data>` URI.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| format!("not a data URI: {:?}", preview(src)))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "invalid data URI: missing `,` between header and data".to_string())?;
    if !header.contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64_STD
        .decode(compact)
        .map_err(|e| format!("base64 decode error: {e}"))
}

fn preview(src: &str) -> &str {
    match src.char_indices().nth(80) {
        Some((idx, _)) => &src[..idx],
        None => src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn data_uri_dimensions() {
        let src = format!("data:image/png;base64,{}", BASE64_STD.encode(png_bytes(4, 2)));
        let loader = ResourceLoader::new(None);
        assert_eq!(loader.image_size(&src), Some((4, 2)));
    }

    #[test]
    fn non_base64_data_uri_is_skipped() {
        let loader = ResourceLoader::new(None);
        assert!(loader.fetch("data:image/svg+xml,<svg/>").is_none());
    }

    #[test]
    fn relative_paths_resolve_against_directory_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img/logo.png"), png_bytes(3, 5)).unwrap();

        let loader = ResourceLoader::new(Some(dir.path().to_str().unwrap()));
        assert_eq!(loader.image_size("img/logo.png"), Some((3, 5)));

        let file_url = Url::from_directory_path(dir.path()).unwrap();
        let loader = ResourceLoader::new(Some(file_url.as_str()));
        assert_eq!(loader.image_size("img/logo.png"), Some((3, 5)));
    }

    #[test]
    fn file_base_uses_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.html");
        fs::write(&page, "<p/>").unwrap();
        fs::write(dir.path().join("a.png"), png_bytes(1, 1)).unwrap();

        let loader = ResourceLoader::new(Some(page.to_str().unwrap()));
        assert!(loader.fetch("a.png").is_some());
    }

    #[test]
    fn remote_and_missing_images_are_skipped() {
        let loader = ResourceLoader::new(None);
        assert!(loader.fetch("https://example.com/a.png").is_none());
        assert!(loader.fetch("definitely-missing-image.png").is_none());
        assert!(loader.fetch("").is_none());
    }
}
