//! Font registration and text measurement.
//!
//! Registered fonts are parsed with `ttf-parser` and embedded by the PDF
//! renderer. Anything not registered falls back to one of the PDF base-14
//! families (Helvetica, Times, Courier), measured from built-in advance
//! widths. In precise mode registered fonts are shaped with `rustybuzz` so
//! kerning and ligatures are reflected in line widths.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Where the bytes of a registered font come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A font file bound to a logical CSS family name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRegistration {
    pub source: FontSource,
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontRegistration {
    pub fn from_path(path: impl Into<PathBuf>, family: &str) -> Self {
        Self {
            source: FontSource::Path(path.into()),
            family: family.to_string(),
            bold: false,
            italic: false,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, family: &str) -> Self {
        Self {
            source: FontSource::Bytes(bytes),
            family: family.to_string(),
            bold: false,
            italic: false,
        }
    }

    pub fn with_style(mut self, bold: bool, italic: bool) -> Self {
        self.bold = bold;
        self.italic = italic;
        self
    }
}

impl FromStr for FontRegistration {
    type Err = String;

    /// `<path>=<Family>[:bold|:italic|:bold-italic]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, face) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("font '{s}' must look like <path>=<Family>"))?;
        let (family, variant) = match face.rsplit_once(':') {
            Some((family, variant)) => (family, Some(variant)),
            None => (face, None),
        };
        let (bold, italic) = match variant.map(str::to_ascii_lowercase).as_deref() {
            None | Some("regular") => (false, false),
            Some("bold") => (true, false),
            Some("italic") => (false, true),
            Some("bold-italic") | Some("bolditalic") => (true, true),
            Some(other) => return Err(format!("unknown font variant '{other}' in '{s}'")),
        };
        if path.trim().is_empty() || family.trim().is_empty() {
            return Err(format!("font '{s}' needs both a path and a family"));
        }
        Ok(Self::from_path(path.trim(), family.trim()).with_style(bold, italic))
    }
}

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FontKey {
    /// Lower-cased family name.
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.trim().to_ascii_lowercase(),
            bold,
            italic,
        }
    }
}

/// PDF base-14 families used when no registered font matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinFamily {
    Helvetica,
    Times,
    Courier,
}

impl BuiltinFamily {
    /// Map a CSS family name (generic or well-known) to a base-14 family.
    pub fn from_css_name(name: &str) -> Option<Self> {
        match name {
            "helvetica" | "arial" | "sans-serif" | "verdana" | "tahoma" | "calibri"
            | "segoe ui" | "liberation sans" | "system-ui" => Some(Self::Helvetica),
            "times" | "times new roman" | "serif" | "georgia" | "cambria" | "liberation serif" => {
                Some(Self::Times)
            }
            "courier" | "courier new" | "monospace" | "consolas" | "menlo" | "monaco"
            | "liberation mono" => Some(Self::Courier),
            _ => None,
        }
    }

    /// Heuristic ascent as a fraction of the font size.
    fn ascent(self) -> f32 {
        match self {
            Self::Helvetica => 0.718,
            Self::Times => 0.683,
            Self::Courier => 0.629,
        }
    }
}

/// The face a piece of text will be set in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedFont {
    Embedded(FontKey),
    Builtin {
        family: BuiltinFamily,
        bold: bool,
        italic: bool,
    },
}

/// Manages loaded fonts.
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    /// Shape registered fonts with rustybuzz instead of summing advances.
    precise: bool,
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            precise: false,
        }
    }

    pub fn set_precise(&mut self, precise: bool) {
        self.precise = precise;
    }

    pub fn is_precise(&self) -> bool {
        self.precise
    }

    /// Read and load a registration.
    pub fn register(&mut self, registration: &FontRegistration) -> Result<(), RenderError> {
        let bytes = match &registration.source {
            FontSource::Path(path) => fs::read(path).map_err(|source| RenderError::FontRead {
                path: path.clone(),
                source,
            })?,
            FontSource::Bytes(bytes) => bytes.clone(),
        };
        self.load_font(&registration.family, registration.bold, registration.italic, bytes)
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
    ) -> Result<(), RenderError> {
        let face = ttf_parser::Face::parse(&bytes, 0).map_err(|e| RenderError::FontParse {
            family: family.to_string(),
            reason: e.to_string(),
        })?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            bytes,
        };

        log::debug!("fonts: registered '{family}' (bold={bold}, italic={italic})");
        self.fonts.insert(FontKey::new(family, bold, italic), data);
        Ok(())
    }

    /// Pick a face for a CSS `font-family` list.
    ///
    /// Registered families win (an exact style match first, then the same
    /// family in another style); generic and well-known names map to the
    /// base-14 families; Helvetica is the last resort.
    pub fn resolve(&self, family_list: &str, bold: bool, italic: bool) -> ResolvedFont {
        for raw in family_list.split(',') {
            let name = raw
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .trim()
                .to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            if let Some(key) = self.registered_variant(&name, bold, italic) {
                return ResolvedFont::Embedded(key);
            }
            if let Some(family) = BuiltinFamily::from_css_name(&name) {
                return ResolvedFont::Builtin { family, bold, italic };
            }
        }
        ResolvedFont::Builtin {
            family: BuiltinFamily::Helvetica,
            bold,
            italic,
        }
    }

    fn registered_variant(&self, family: &str, bold: bool, italic: bool) -> Option<FontKey> {
        let candidates = [(bold, italic), (bold, false), (false, italic), (false, false), (true, true)];
        candidates
            .iter()
            .map(|&(b, i)| FontKey::new(family, b, i))
            .find(|k| self.fonts.contains_key(k))
    }

    /// Measure the width of a string at a given font size (in pt).
    pub fn measure_text_width(
        &self,
        text: &str,
        font_size: f32,
        bold: bool,
        italic: bool,
        family: &str,
    ) -> f32 {
        self.measure_resolved(&self.resolve(family, bold, italic), text, font_size)
    }

    pub fn measure_resolved(&self, font: &ResolvedFont, text: &str, font_size: f32) -> f32 {
        match font {
            ResolvedFont::Builtin { family, bold, .. } => {
                builtin_width(*family, *bold, text) * font_size / 1000.0
            }
            ResolvedFont::Embedded(key) => match self.fonts.get(key) {
                Some(data) if self.precise => shaped_width(data, text, font_size)
                    .unwrap_or_else(|| advance_width(data, text, font_size)),
                Some(data) => advance_width(data, text, font_size),
                None => builtin_width(BuiltinFamily::Helvetica, key.bold, text) * font_size / 1000.0,
            },
        }
    }

    /// Measure the line height in pt.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Distance from the top of the em box to the baseline, in pt.
    pub fn ascent(&self, font: &ResolvedFont, font_size: f32) -> f32 {
        match font {
            ResolvedFont::Builtin { family, .. } => family.ascent() * font_size,
            ResolvedFont::Embedded(key) => match self.fonts.get(key) {
                Some(data) if data.units_per_em > 0.0 => data.ascender / data.units_per_em * font_size,
                _ => BuiltinFamily::Helvetica.ascent() * font_size,
            },
        }
    }

    /// Get all loaded font keys, sorted.
    pub fn keys(&self) -> Vec<FontKey> {
        let mut keys: Vec<FontKey> = self.fonts.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get font bytes for embedding in PDF.
    pub fn font_bytes(&self, key: &FontKey) -> Option<&[u8]> {
        self.fonts.get(key).map(|d| d.bytes.as_slice())
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

fn advance_width(data: &FontData, text: &str, font_size: f32) -> f32 {
    let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) else {
        return text.chars().count() as f32 * font_size * 0.5;
    };
    let scale = font_size / data.units_per_em;
    text.chars()
        .map(|ch| match face.glyph_index(ch) {
            Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
            None => font_size * 0.5,
        })
        .sum()
}

fn shaped_width(data: &FontData, text: &str, font_size: f32) -> Option<f32> {
    let face = rustybuzz::Face::from_slice(&data.bytes, 0)?;
    let mut buffer = rustybuzz::UnicodeBuffer::new();
    buffer.push_str(text);
    let glyphs = rustybuzz::shape(&face, &[], buffer);
    let units: i32 = glyphs.glyph_positions().iter().map(|p| p.x_advance).sum();
    Some(units as f32 * font_size / data.units_per_em)
}

/// Helvetica advance widths for U+0020..=U+007E (1/1000 em).
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

/// Width of `text` in 1/1000 em for a base-14 family.
fn builtin_width(family: BuiltinFamily, bold: bool, text: &str) -> f32 {
    if family == BuiltinFamily::Courier {
        return text.chars().count() as f32 * 600.0;
    }
    let base: f32 = text
        .chars()
        .map(|ch| match ch as u32 {
            code @ 0x20..=0x7E => HELVETICA_WIDTHS[(code - 0x20) as usize] as f32,
            0xA0 => 278.0,
            _ => 556.0,
        })
        .sum();
    let family_factor = if family == BuiltinFamily::Times { 0.9 } else { 1.0 };
    let weight_factor = if bold { 1.06 } else { 1.0 };
    base * family_factor * weight_factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_helvetica_width() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("Hello", 10.0, false, false, "Helvetica");
        // H 722 + e 556 + l 222 + l 222 + o 556 = 2278
        assert!((w - 22.78).abs() < 0.01, "{w}");
    }

    #[test]
    fn courier_is_monospaced() {
        let mgr = FontManager::default();
        let narrow = mgr.measure_text_width("iiii", 10.0, false, false, "monospace");
        let wide = mgr.measure_text_width("MMMM", 10.0, false, false, "monospace");
        assert_eq!(narrow, wide);
        assert!((narrow - 24.0).abs() < 0.01);
    }

    #[test]
    fn css_family_lists_resolve_to_builtins() {
        let mgr = FontManager::default();
        assert_eq!(
            mgr.resolve("\"Unknown Font\", Georgia, serif", true, false),
            ResolvedFont::Builtin {
                family: BuiltinFamily::Times,
                bold: true,
                italic: false
            }
        );
        assert!(matches!(
            mgr.resolve("Arial, sans-serif", false, false),
            ResolvedFont::Builtin {
                family: BuiltinFamily::Helvetica,
                ..
            }
        ));
        assert!(matches!(
            mgr.resolve("", false, true),
            ResolvedFont::Builtin { italic: true, .. }
        ));
    }

    #[test]
    fn invalid_font_bytes_are_a_parse_fault() {
        let mut mgr = FontManager::default();
        let err = mgr
            .register(&FontRegistration::from_bytes(b"not a font".to_vec(), "Broken"))
            .unwrap_err();
        assert!(matches!(err, RenderError::FontParse { ref family, .. } if family == "Broken"));
    }

    #[test]
    fn missing_font_file_is_a_read_fault() {
        let mut mgr = FontManager::default();
        let err = mgr
            .register(&FontRegistration::from_path("/definitely/not/here.ttf", "Gone"))
            .unwrap_err();
        assert!(matches!(err, RenderError::FontRead { .. }));
    }

    #[test]
    fn registration_parses_from_cli_syntax() {
        let reg: FontRegistration = "fonts/DejaVuSans-Bold.ttf=DejaVu Sans:bold".parse().unwrap();
        assert_eq!(reg.family, "DejaVu Sans");
        assert!(reg.bold && !reg.italic);
        assert_eq!(reg.source, FontSource::Path(PathBuf::from("fonts/DejaVuSans-Bold.ttf")));

        let plain: FontRegistration = "a.ttf=Body".parse().unwrap();
        assert!(!plain.bold && !plain.italic);

        assert!("a.ttf".parse::<FontRegistration>().is_err());
        assert!("a.ttf=Body:heavy".parse::<FontRegistration>().is_err());
    }
}
