//! Embedded DejaVu Sans faces.
//!
//! The same bytes drive text measurement (`ab_glyph`), PNG rasterization (loaded into the
//! `usvg` font database) and, when requested, `@font-face` rules inside SVG output, so
//! label extents match what is drawn regardless of the fonts installed on the host.

use ab_glyph::FontRef;
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::primitives::{FontStyle, FontWeight};

static DEJAVU_REGULAR: &[u8] = include_bytes!("../fonts/DejaVuSans.ttf");
static DEJAVU_BOLD: &[u8] = include_bytes!("../fonts/DejaVuSans-Bold.ttf");
static DEJAVU_OBLIQUE: &[u8] = include_bytes!("../fonts/DejaVuSans-Oblique.ttf");

/// Family name of the embedded faces.
pub const FONT_FAMILY: &str = "DejaVu Sans";

pub struct FontHandle {
    pub regular: FontRef<'static>,
    pub bold: FontRef<'static>,
    pub italic: FontRef<'static>,
}

impl FontHandle {
    pub fn embedded() -> crate::Result<Self> {
        Ok(Self {
            regular: parse(DEJAVU_REGULAR)?,
            bold: parse(DEJAVU_BOLD)?,
            italic: parse(DEJAVU_OBLIQUE)?,
        })
    }

    pub fn select(&self, weight: FontWeight, style: FontStyle) -> &FontRef<'static> {
        match (weight, style) {
            (FontWeight::Bold, _) => &self.bold,
            (_, FontStyle::Italic) => &self.italic,
            _ => &self.regular,
        }
    }

    pub fn regular_bytes() -> &'static [u8] {
        DEJAVU_REGULAR
    }

    pub fn bold_bytes() -> &'static [u8] {
        DEJAVU_BOLD
    }

    pub fn italic_bytes() -> &'static [u8] {
        DEJAVU_OBLIQUE
    }
}

fn parse(bytes: &'static [u8]) -> crate::Result<FontRef<'static>> {
    FontRef::try_from_slice(bytes).map_err(|e| crate::RenderError::Font(e.to_string()))
}

/// SVG `<style>` block declaring the embedded faces as `@font-face` rules.
pub fn svg_font_style() -> String {
    let faces = [
        (DEJAVU_REGULAR, "normal", "normal"),
        (DEJAVU_BOLD, "bold", "normal"),
        (DEJAVU_OBLIQUE, "normal", "italic"),
    ];
    let mut out = String::from("<style>\n");
    for (bytes, weight, style) in faces {
        out.push_str(&format!(
            "@font-face {{\n  font-family: '{FONT_FAMILY}';\n  font-weight: {weight};\n  \
             font-style: {style};\n  src: url('data:font/ttf;base64,{}') format('truetype');\n}}\n",
            STANDARD.encode(bytes)
        ));
    }
    out.push_str("</style>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_glyph::Font;

    #[test]
    fn faces_parse_and_cover_labels() {
        let fonts = FontHandle::embedded().unwrap();
        // Glyph 0 is .notdef; the labels in the plots use Greek and math symbols.
        for ch in ['A', 'μ', 'λ', 'σ', '≥', '±'] {
            assert_ne!(fonts.regular.glyph_id(ch).0, 0, "missing glyph for {ch}");
        }
        assert!(std::ptr::eq(fonts.select(FontWeight::Bold, FontStyle::Italic), &fonts.bold));
        assert!(std::ptr::eq(fonts.select(FontWeight::Regular, FontStyle::Italic), &fonts.italic));
    }

    #[test]
    fn font_face_rules() {
        let css = svg_font_style();
        assert_eq!(css.matches("@font-face").count(), 3);
        assert!(css.contains("font-family: 'DejaVu Sans'"));
        assert!(css.contains("font-style: italic"));
    }
}
