use crate::RenderError;
use crate::font::{FONT_FAMILY, FontHandle};

fn options() -> usvg::Options<'static> {
    let mut opt = usvg::Options { font_family: FONT_FAMILY.to_string(), ..Default::default() };
    let fontdb = opt.fontdb_mut();
    fontdb.load_font_data(FontHandle::regular_bytes().to_vec());
    fontdb.load_font_data(FontHandle::bold_bytes().to_vec());
    fontdb.load_font_data(FontHandle::italic_bytes().to_vec());
    fontdb.set_sans_serif_family(FONT_FAMILY);
    opt
}

fn rasterize(svg: &str, dpi: u32) -> crate::Result<tiny_skia::Pixmap> {
    if dpi == 0 {
        return Err(RenderError::Config("output dpi must be > 0".into()));
    }
    let tree =
        usvg::Tree::from_str(svg, &options()).map_err(|e| RenderError::Png(e.to_string()))?;

    let scale = dpi as f32 / 72.0;
    let size = tree.size();
    let w = (size.width() * scale).ceil() as u32;
    let h = (size.height() * scale).ceil() as u32;

    let mut pixmap = tiny_skia::Pixmap::new(w, h)
        .ok_or_else(|| RenderError::Png(format!("cannot allocate {w}x{h} pixmap")))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());
    Ok(pixmap)
}

/// Rasterize an SVG document to PNG bytes at `dpi` (canvas units are points).
///
/// Text is shaped with the embedded faces; host fonts are never consulted.
pub fn svg_to_png(svg: &str, dpi: u32) -> crate::Result<Vec<u8>> {
    rasterize(svg, dpi)?.encode_png().map_err(|e| RenderError::Png(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::color::Color;
    use crate::config::VizConfig;
    use crate::primitives::{FontStyle, FontWeight, Style, TextStyle};

    fn inked(pixmap: &tiny_skia::Pixmap) -> usize {
        pixmap.pixels().iter().filter(|p| p.red() < 128).count()
    }

    #[test]
    fn png_signature_and_size() {
        let mut c = Canvas::new(72.0, 36.0).unwrap();
        c.rect(0.0, 0.0, 36.0, 36.0, &Style::filled(Color::rgb(255, 0, 0)));
        let png = svg_to_png(&c.finish_svg(), 144).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        // IHDR width and height (big endian) follow the 16-byte preamble.
        let w = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
        let h = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
        assert_eq!((w, h), (144, 72));
    }

    #[test]
    fn labels_are_drawn_with_embedded_fonts() {
        // Default family plus the legacy families older configs name.
        for family in ["DejaVu Sans, sans-serif", "Helvetica, Arial, sans-serif", "sans-serif"] {
            let mut c = Canvas::new(200.0, 60.0).unwrap().with_font_family(family);
            c.text(10.0, 30.0, "CLs μ = 1.5", &TextStyle { size: 16.0, ..TextStyle::default() });
            let pixmap = rasterize(&c.finish_svg(), 72).unwrap();
            assert!(inked(&pixmap) > 50, "no text rendered for font-family '{family}'");
        }
    }

    #[test]
    fn bold_and_italic_faces_render() {
        let mut c = Canvas::from_config(&VizConfig::default()).unwrap();
        let bold = TextStyle { size: 14.0, weight: FontWeight::Bold, ..TextStyle::default() };
        let italic = TextStyle { size: 14.0, style: FontStyle::Italic, ..TextStyle::default() };
        c.text(20.0, 40.0, "Observed", &bold);
        c.text(20.0, 80.0, "Expected", &italic);
        assert!(inked(&rasterize(&c.finish_svg(), 72).unwrap()) > 100);
    }

    #[test]
    fn zero_dpi_rejected() {
        assert!(svg_to_png("<svg xmlns=\"http://www.w3.org/2000/svg\"/>", 0).is_err());
    }
}
