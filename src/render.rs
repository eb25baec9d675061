//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).
//!
//! Registered fonts referenced by the layout are embedded; everything else is
//! set in the base-14 Helvetica, Times or Courier faces.

use std::collections::{BTreeSet, HashMap, HashSet};

use printpdf::*;

use crate::error::RenderError;
use crate::fonts::{BuiltinFamily, FontKey, FontManager, ResolvedFont};
use crate::layout_config::{LayoutBox, LayoutConfig, TextLine};
use crate::resources::{image_dimensions, ResourceLoader};

const MM_PER_PT: f32 = 25.4 / 72.0;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Shared state for drawing one document.
struct Painter<'r> {
    page_height: f32,
    fonts: &'r HashMap<FontKey, FontId>,
    images: &'r HashMap<String, ImageResource>,
}

enum PdfFace {
    Builtin(BuiltinFont),
    Embedded(FontId),
}

/// Render a LayoutConfig into PDF bytes.
///
/// Images that cannot be loaded or decoded are skipped with a warning; a
/// registered font printpdf cannot parse fails the render.
pub fn render_pdf(
    config: &LayoutConfig,
    fonts: &FontManager,
    resources: &ResourceLoader,
) -> Result<Vec<u8>, RenderError> {
    let page_w = Mm(config.page_width_pt * MM_PER_PT);
    let page_h = Mm(config.page_height_pt * MM_PER_PT);

    let mut doc = PdfDocument::new(&config.title);

    // ── Embed the registered faces the layout uses ───────────────────────
    let mut used = BTreeSet::new();
    let mut srcs = HashSet::new();
    for page in &config.pages {
        for lbox in &page.boxes {
            collect_resources(lbox, &mut used, &mut srcs);
        }
    }

    let mut font_ids = HashMap::new();
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    for key in used {
        let Some(bytes) = fonts.font_bytes(&key) else {
            continue;
        };
        let parsed = ParsedFont::from_bytes(bytes, 0, &mut warnings).ok_or_else(|| {
            RenderError::FontParse {
                family: key.family.clone(),
                reason: "the PDF encoder could not parse the font program".to_string(),
            }
        })?;
        log::debug!("render: embedding font '{}' (bold={}, italic={})", key.family, key.bold, key.italic);
        font_ids.insert(key, doc.add_font(&parsed));
    }

    // ── Pre-register all images ────────────────────────────────────────────
    let mut images = HashMap::new();
    for src in srcs {
        let Some(bytes) = resources.fetch(src) else {
            continue;
        };
        let Some((px_width, px_height)) = image_dimensions(&bytes) else {
            log::warn!("render: skipping image, unknown format");
            continue;
        };
        let raw = match RawImage::decode_from_bytes(&bytes, &mut warnings) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("render: skipping image, decode error: {e}");
                continue;
            }
        };
        let xobj_id = doc.add_image(&raw);
        images.insert(
            src.to_string(),
            ImageResource {
                xobj_id,
                px_width,
                px_height,
            },
        );
    }

    // ── Render pages ──────────────────────────────────────────────────────
    let painter = Painter {
        page_height: config.page_height_pt,
        fonts: &font_ids,
        images: &images,
    };
    let mut pages = Vec::with_capacity(config.pages.len().max(1));
    for page_layout in &config.pages {
        let mut ops = Vec::new();
        for lbox in &page_layout.boxes {
            painter.draw_box(&mut ops, lbox);
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }
    let page_count = pages.len();

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if !bytes.starts_with(b"%PDF-") {
        return Err(RenderError::Encode("encoder produced no PDF header".to_string()));
    }
    log::debug!("render: {page_count} page(s), {} bytes", bytes.len());
    Ok(bytes)
}

/// Embedded faces and image sources referenced anywhere in `lbox`.
fn collect_resources<'a>(lbox: &'a LayoutBox, fonts: &mut BTreeSet<FontKey>, srcs: &mut HashSet<&'a str>) {
    let lines = lbox
        .text
        .iter()
        .flat_map(|t| t.lines.iter())
        .chain(lbox.list_marker.iter());
    for line in lines {
        for run in &line.runs {
            if let ResolvedFont::Embedded(key) = &run.font {
                fonts.insert(key.clone());
            }
        }
    }
    if let Some(img) = &lbox.image {
        srcs.insert(img.src.as_str());
    }
    for child in &lbox.children {
        collect_resources(child, fonts, srcs);
    }
}

fn builtin_face(family: BuiltinFamily, bold: bool, italic: bool) -> BuiltinFont {
    match (family, bold, italic) {
        (BuiltinFamily::Helvetica, false, false) => BuiltinFont::Helvetica,
        (BuiltinFamily::Helvetica, true, false) => BuiltinFont::HelveticaBold,
        (BuiltinFamily::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
        (BuiltinFamily::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
        (BuiltinFamily::Times, false, false) => BuiltinFont::TimesRoman,
        (BuiltinFamily::Times, true, false) => BuiltinFont::TimesBold,
        (BuiltinFamily::Times, false, true) => BuiltinFont::TimesItalic,
        (BuiltinFamily::Times, true, true) => BuiltinFont::TimesBoldItalic,
        (BuiltinFamily::Courier, false, false) => BuiltinFont::Courier,
        (BuiltinFamily::Courier, true, false) => BuiltinFont::CourierBold,
        (BuiltinFamily::Courier, false, true) => BuiltinFont::CourierOblique,
        (BuiltinFamily::Courier, true, true) => BuiltinFont::CourierBoldOblique,
    }
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a rectangle, clockwise from the bottom-left.
fn rect_points(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<LinePoint> {
    vec![point(x1, y1), point(x2, y1), point(x2, y2), point(x1, y2)]
}

impl Painter<'_> {
    fn face(&self, font: &ResolvedFont) -> PdfFace {
        match font {
            ResolvedFont::Builtin { family, bold, italic } => {
                PdfFace::Builtin(builtin_face(*family, *bold, *italic))
            }
            ResolvedFont::Embedded(key) => match self.fonts.get(key) {
                Some(id) => PdfFace::Embedded(id.clone()),
                None => PdfFace::Builtin(builtin_face(BuiltinFamily::Helvetica, key.bold, key.italic)),
            },
        }
    }

    /// Recursively render a LayoutBox and its children into PDF ops.
    fn draw_box(&self, ops: &mut Vec<Op>, lbox: &LayoutBox) {
        // PDF origin is bottom-left; layout origin is top-left.
        let top = self.page_height - lbox.y;
        let bottom = top - lbox.height;
        let (left, right) = (lbox.x, lbox.x + lbox.width);

        if let Some(bg) = lbox.background_color {
            ops.push(Op::SetFillColor { col: rgb(bg) });
            ops.push(Op::DrawPolygon {
                polygon: Polygon {
                    rings: vec![PolygonRing {
                        points: rect_points(left, bottom, right, top),
                    }],
                    mode: PaintMode::Fill,
                    winding_order: WindingOrder::NonZero,
                },
            });
        }

        if let Some(border) = &lbox.border {
            // Stroke along the middle of the border band.
            let half = border.width / 2.0;
            ops.push(Op::SetOutlineColor {
                col: rgb(border.color),
            });
            ops.push(Op::SetOutlineThickness {
                pt: Pt(border.width),
            });
            ops.push(Op::DrawLine {
                line: Line {
                    points: rect_points(left + half, bottom + half, right - half, top - half),
                    is_closed: true,
                },
            });
        }

        if let Some(text) = &lbox.text {
            for line in &text.lines {
                self.draw_line(ops, lbox, line);
            }
        }
        if let Some(marker) = &lbox.list_marker {
            self.draw_line(ops, lbox, marker);
        }

        if let Some(img) = &lbox.image {
            if let Some(res) = self.images.get(&img.src) {
                // At dpi=72 printpdf renders 1 px = 1 pt.
                let scale_x = if res.px_width > 0 {
                    img.width / res.px_width as f32
                } else {
                    1.0
                };
                let scale_y = if res.px_height > 0 {
                    img.height / res.px_height as f32
                } else {
                    1.0
                };
                ops.push(Op::UseXobject {
                    id: res.xobj_id.clone(),
                    transform: XObjectTransform {
                        translate_x: Some(Pt(lbox.x)),
                        translate_y: Some(Pt(top - img.height)),
                        dpi: Some(72.0),
                        scale_x: Some(scale_x),
                        scale_y: Some(scale_y),
                        rotate: None,
                    },
                });
            }
        }

        for child in &lbox.children {
            self.draw_box(ops, child);
        }
    }

    fn draw_line(&self, ops: &mut Vec<Op>, lbox: &LayoutBox, line: &TextLine) {
        let baseline = self.page_height - (lbox.y + line.y_offset + line.baseline);
        for run in &line.runs {
            if run.text.trim().is_empty() && !run.underline {
                continue;
            }
            let x = lbox.x + line.x_offset + run.x_offset;

            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point {
                    x: Pt(x),
                    y: Pt(baseline),
                },
            });
            ops.push(Op::SetFillColor { col: rgb(run.color) });
            match self.face(&run.font) {
                PdfFace::Builtin(font) => {
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(run.font_size),
                        font,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(to_winlatin(&run.text))],
                        font,
                    });
                }
                PdfFace::Embedded(font) => {
                    ops.push(Op::SetFontSize {
                        size: Pt(run.font_size),
                        font: font.clone(),
                    });
                    ops.push(Op::WriteText {
                        items: vec![TextItem::Text(run.text.clone())],
                        font,
                    });
                }
            }
            ops.push(Op::EndTextSection);

            if run.underline {
                let y = baseline - run.font_size * 0.1;
                ops.push(Op::SetOutlineThickness {
                    pt: Pt((run.font_size * 0.05).max(0.5)),
                });
                ops.push(Op::SetOutlineColor { col: rgb(run.color) });
                ops.push(Op::DrawLine {
                    line: Line {
                        points: vec![point(x, y), point(x + run.width, y)],
                        is_closed: false,
                    },
                });
            }
        }
    }
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80, // euro
            '\u{201A}' => 0x82, // single low-9 quote
            '\u{201E}' => 0x84, // double low-9 quote
            '\u{2026}' => 0x85, // ellipsis
            '\u{2018}' => 0x91, // left single quote
            '\u{2019}' => 0x92, // right single quote
            '\u{201C}' => 0x93, // left double quote
            '\u{201D}' => 0x94, // right double quote
            '\u{2022}' => 0x95, // bullet
            '\u{2013}' => 0x96, // en dash
            '\u{2014}' => 0x97, // em dash
            '\u{2122}' => 0x99, // trademark
            '\u{00A0}' => 0x20, // no-break space
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for 0x80-0xFF; printpdf passes these
    // bytes straight to the PDF stream, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::{BorderStyle, ImageContent, PageLayout, TextContent, TextRun};

    fn run(text: &str, font: ResolvedFont, underline: bool) -> TextRun {
        TextRun {
            text: text.to_string(),
            x_offset: 0.0,
            width: 30.0,
            font,
            font_size: 10.0,
            color: [0.0, 0.0, 0.0, 1.0],
            underline,
        }
    }

    fn line(runs: Vec<TextRun>) -> TextLine {
        TextLine {
            x_offset: 0.0,
            y_offset: 0.0,
            height: 12.0,
            baseline: 9.0,
            runs,
        }
    }

    #[test]
    fn render_empty_page() {
        let config = LayoutConfig::a4();
        let bytes = render_pdf(&config, &FontManager::default(), &ResourceLoader::new(None)).unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_text_borders_and_markers() {
        let helvetica = ResolvedFont::Builtin {
            family: BuiltinFamily::Helvetica,
            bold: false,
            italic: false,
        };
        let times_bold = ResolvedFont::Builtin {
            family: BuiltinFamily::Times,
            bold: true,
            italic: false,
        };
        let mut lbox = LayoutBox::new(40.0, 40.0, 200.0, 24.0);
        lbox.background_color = Some([0.9, 0.9, 0.9, 1.0]);
        lbox.border = Some(BorderStyle {
            width: 1.0,
            color: [0.0, 0.0, 0.0, 1.0],
        });
        lbox.text = Some(TextContent {
            lines: vec![line(vec![
                run("caf\u{e9} \u{201C}quoted\u{201D}", helvetica.clone(), false),
                run("link", times_bold, true),
            ])],
        });
        lbox.list_marker = Some(line(vec![run("\u{2022}", helvetica, false)]));

        let mut config = LayoutConfig::a4();
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![lbox],
        });
        let bytes = render_pdf(&config, &FontManager::default(), &ResourceLoader::new(None)).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn collects_embedded_fonts_and_images() {
        let key = FontKey::new("Body", false, false);
        let mut lbox = LayoutBox::new(0.0, 0.0, 10.0, 10.0);
        let mut child = LayoutBox::new(0.0, 0.0, 10.0, 10.0);
        child.text = Some(TextContent {
            lines: vec![line(vec![run("x", ResolvedFont::Embedded(key.clone()), false)])],
        });
        child.image = Some(ImageContent {
            src: "a.png".into(),
            width: 10.0,
            height: 10.0,
        });
        lbox.children.push(child);

        let mut fonts = BTreeSet::new();
        let mut srcs = HashSet::new();
        collect_resources(&lbox, &mut fonts, &mut srcs);
        assert!(fonts.contains(&key));
        assert!(srcs.contains("a.png"));
    }

    #[test]
    fn unknown_embedded_key_falls_back_to_helvetica() {
        let fonts = HashMap::new();
        let images = HashMap::new();
        let painter = Painter {
            page_height: 100.0,
            fonts: &fonts,
            images: &images,
        };
        let face = painter.face(&ResolvedFont::Embedded(FontKey::new("Missing", true, false)));
        assert!(matches!(face, PdfFace::Builtin(BuiltinFont::HelveticaBold)));
    }

    #[test]
    fn winlatin_maps_typographic_quotes() {
        let encoded = to_winlatin("\u{201C}a\u{201D}");
        assert_eq!(encoded.as_bytes(), &[0x93, b'a', 0x94]);
    }
}
