use ab_glyph::{Font, FontRef, ScaleFont};

use crate::font::FontHandle;
use crate::primitives::TextStyle;

#[derive(Debug, Clone, Copy)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
    pub ascent: f64,
}

/// Measure text width and height in points using ab_glyph.
pub fn measure_text(font: &FontRef<'_>, text: &str, size_pt: f64) -> TextMetrics {
    let scale = ab_glyph::PxScale::from(size_pt as f32);
    let scaled = font.as_scaled(scale);

    let mut width: f32 = 0.0;
    let mut prev_glyph_id = None;
    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = prev_glyph_id {
            width += scaled.kern(prev, glyph_id);
        }
        width += scaled.h_advance(glyph_id);
        prev_glyph_id = Some(glyph_id);
    }

    let ascent = scaled.ascent();
    let descent = scaled.descent();

    TextMetrics { width: width as f64, height: (ascent - descent) as f64, ascent: ascent as f64 }
}

/// Measure text in the face selected by `style`.
pub fn measure_styled(fonts: &FontHandle, text: &str, style: &TextStyle) -> TextMetrics {
    measure_text(fonts.select(style.weight, style.style), text, style.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::FontWeight;

    #[test]
    fn measure_hello() {
        let fonts = FontHandle::embedded().unwrap();
        let m = measure_text(&fonts.regular, "Hello", 12.0);
        assert!(m.width > 20.0 && m.width < 40.0, "{}", m.width);
        assert!(m.height > 8.0);
        assert!(m.ascent > 0.0 && m.ascent < m.height);
    }

    #[test]
    fn bold_wider_than_regular() {
        let fonts = FontHandle::embedded().unwrap();
        let regular = TextStyle { size: 12.0, ..Default::default() };
        let bold = TextStyle { weight: FontWeight::Bold, ..regular.clone() };
        let r = measure_styled(&fonts, "Test", &regular);
        let b = measure_styled(&fonts, "Test", &bold);
        assert!(b.width > r.width, "bold {} regular {}", b.width, r.width);
        assert!(
            measure_styled(&fonts, "WWW", &regular).width
                > measure_styled(&fonts, "iii", &regular).width
        );
    }

    #[test]
    fn width_scales_with_size() {
        let fonts = FontHandle::embedded().unwrap();
        let small = measure_text(&fonts.regular, "CL_s+b", 10.0);
        let large = measure_text(&fonts.regular, "CL_s+b", 20.0);
        assert!((large.width - 2.0 * small.width).abs() < 1e-3 * large.width);
        assert_eq!(measure_text(&fonts.regular, "", 10.0).width, 0.0);
    }
}
