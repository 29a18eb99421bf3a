use std::fmt::{self, Write as FmtWrite};

use crate::color::Color;
use crate::config::VizConfig;
use crate::font::{FONT_FAMILY, FontHandle, svg_font_style};
use crate::primitives::*;
use crate::text::{TextMetrics, measure_styled};

/// An SVG element stored for deferred rendering.
#[derive(Debug, Clone)]
enum SvgElement {
    Rect { x: f64, y: f64, w: f64, h: f64, style: Style },
    Line { x1: f64, y1: f64, x2: f64, y2: f64, style: LineStyle },
    Polyline { points: Vec<(f64, f64)>, style: LineStyle },
    Polygon { points: Vec<(f64, f64)>, style: Style },
    Text { x: f64, y: f64, content: String, style: TextStyle, rotate: Option<f64> },
    Path { d: String, style: Style },
    Circle { cx: f64, cy: f64, r: f64, style: Style },
    Group { clip_id: String, children: Vec<SvgElement> },
}

/// Immediate-mode SVG canvas. Coordinates in points (1pt = 1/72").
///
/// Elements drawn between [`Canvas::push_clip`] and [`Canvas::pop_clip`] are grouped under
/// the clip rectangle. Text is measured with the embedded faces of [`FontHandle`].
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    elements: Vec<SvgElement>,
    defs: Vec<String>,
    open_clips: Vec<(String, Vec<SvgElement>)>,
    next_clip_id: usize,
    font_family: String,
    embed_fonts: bool,
    fonts: FontHandle,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> crate::Result<Self> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(crate::RenderError::Layout(format!(
                "invalid canvas size {width} x {height}"
            )));
        }
        Ok(Self {
            width,
            height,
            elements: Vec::new(),
            defs: Vec::new(),
            open_clips: Vec::new(),
            next_clip_id: 0,
            font_family: format!("{FONT_FAMILY}, sans-serif"),
            embed_fonts: false,
            fonts: FontHandle::embedded()?,
        })
    }

    /// Canvas sized, and with fonts set, from `config`.
    pub fn from_config(config: &VizConfig) -> crate::Result<Self> {
        Ok(Self::new(config.figure.width, config.figure.height)?
            .with_font_family(config.font.family.clone())
            .with_embedded_fonts(config.font.embed))
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    /// Write the embedded faces into the SVG as `@font-face` rules.
    pub fn with_embedded_fonts(mut self, embed: bool) -> Self {
        self.embed_fonts = embed;
        self
    }

    pub fn fonts(&self) -> &FontHandle {
        &self.fonts
    }

    // --- Drawing primitives ---

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: &Style) {
        self.push(SvgElement::Rect { x, y, w, h, style: style.clone() });
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, style: &LineStyle) {
        self.push(SvgElement::Line { x1, y1, x2, y2, style: style.clone() });
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], style: &LineStyle) {
        if points.len() < 2 {
            return;
        }
        self.push(SvgElement::Polyline { points: points.to_vec(), style: style.clone() });
    }

    pub fn polygon(&mut self, points: &[(f64, f64)], style: &Style) {
        if points.len() < 3 {
            return;
        }
        self.push(SvgElement::Polygon { points: points.to_vec(), style: style.clone() });
    }

    pub fn text(&mut self, x: f64, y: f64, content: &str, style: &TextStyle) {
        self.push(SvgElement::Text {
            x,
            y,
            content: content.to_string(),
            style: style.clone(),
            rotate: None,
        });
    }

    pub fn text_rotated(&mut self, x: f64, y: f64, content: &str, style: &TextStyle, angle: f64) {
        self.push(SvgElement::Text {
            x,
            y,
            content: content.to_string(),
            style: style.clone(),
            rotate: Some(angle),
        });
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, style: &Style) {
        self.push(SvgElement::Circle { cx, cy, r, style: style.clone() });
    }

    /// Fill between `y_lo` and `y_hi` at the given x positions (bands).
    pub fn fill_between(&mut self, x: &[f64], y_lo: &[f64], y_hi: &[f64], style: &Style) {
        let n = x.len().min(y_lo.len()).min(y_hi.len());
        if n < 2 {
            return;
        }
        let mut d = String::new();
        let _ = write!(d, "M{:.2},{:.2}", x[0], y_hi[0]);
        for i in 1..n {
            let _ = write!(d, " L{:.2},{:.2}", x[i], y_hi[i]);
        }
        for i in (0..n).rev() {
            let _ = write!(d, " L{:.2},{:.2}", x[i], y_lo[i]);
        }
        d.push('Z');
        self.push(SvgElement::Path { d, style: style.clone() });
    }

    /// Vertical error bar with optional caps.
    pub fn error_bar(&mut self, x: f64, y_lo: f64, y_hi: f64, cap_width: f64, style: &LineStyle) {
        self.line(x, y_lo, x, y_hi, style);
        if cap_width > 0.0 {
            let half = cap_width / 2.0;
            self.line(x - half, y_lo, x + half, y_lo, style);
            self.line(x - half, y_hi, x + half, y_hi, style);
        }
    }

    pub fn marker(&mut self, x: f64, y: f64, marker: &MarkerStyle) {
        let style = if marker.fill {
            Style::filled_stroked(marker.color, marker.color, 0.5)
        } else {
            Style::filled_stroked(Color::WHITE, marker.color, 1.0)
        };
        match marker.shape {
            MarkerShape::Circle => self.circle(x, y, marker.size, &style),
            MarkerShape::Square => {
                let s = marker.size;
                self.rect(x - s, y - s, 2.0 * s, 2.0 * s, &style);
            }
        }
    }

    // --- Clip paths ---

    /// Start clipping subsequent drawing to a rectangle. Returns the clip id.
    pub fn push_clip(&mut self, x: f64, y: f64, w: f64, h: f64) -> String {
        let id = format!("clip{}", self.next_clip_id);
        self.next_clip_id += 1;
        self.defs.push(format!(
            r#"<clipPath id="{id}"><rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" /></clipPath>"#
        ));
        self.open_clips.push((id.clone(), Vec::new()));
        id
    }

    pub fn pop_clip(&mut self) {
        if let Some((clip_id, children)) = self.open_clips.pop() {
            self.push(SvgElement::Group { clip_id, children });
        }
    }

    pub fn measure_text(&self, content: &str, style: &TextStyle) -> TextMetrics {
        measure_styled(&self.fonts, content, style)
    }

    fn push(&mut self, elem: SvgElement) {
        match self.open_clips.last_mut() {
            Some((_, children)) => children.push(elem),
            None => self.elements.push(elem),
        }
    }

    // --- SVG output ---

    pub fn finish_svg(&self) -> String {
        let mut out = String::with_capacity(32 * 1024);
        // Writing into a String cannot fail.
        let _ = self.write_svg(&mut out);
        out
    }

    fn write_svg(&self, out: &mut String) -> fmt::Result {
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height,
        )?;
        if self.embed_fonts {
            out.push_str(&svg_font_style());
            out.push('\n');
        }
        if !self.defs.is_empty() {
            out.push_str("<defs>\n");
            for d in &self.defs {
                out.push_str(d);
                out.push('\n');
            }
            out.push_str("</defs>\n");
        }
        writeln!(out, r#"<rect width="{}" height="{}" fill="white" />"#, self.width, self.height)?;

        for elem in &self.elements {
            self.write_element(out, elem)?;
        }
        // Clips left open are closed at the end of the document.
        for (clip_id, children) in &self.open_clips {
            writeln!(out, r#"<g clip-path="url(#{clip_id})">"#)?;
            for child in children {
                self.write_element(out, child)?;
            }
        }
        for _ in &self.open_clips {
            out.push_str("</g>\n");
        }
        out.push_str("</svg>\n");
        Ok(())
    }

    fn write_element(&self, out: &mut String, elem: &SvgElement) -> fmt::Result {
        match elem {
            SvgElement::Rect { x, y, w, h, style } => {
                write!(out, r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}""#)?;
                write_style_attrs(out, style)?;
                out.push_str(" />\n");
            }
            SvgElement::Line { x1, y1, x2, y2, style } => {
                write!(out, r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}""#)?;
                write_line_attrs(out, style)?;
                out.push_str(" />\n");
            }
            SvgElement::Polyline { points, style } => {
                out.push_str(r#"<polyline points=""#);
                write_points(out, points)?;
                out.push_str(r#"" fill="none""#);
                write_line_attrs(out, style)?;
                out.push_str(" />\n");
            }
            SvgElement::Polygon { points, style } => {
                out.push_str(r#"<polygon points=""#);
                write_points(out, points)?;
                out.push('"');
                write_style_attrs(out, style)?;
                out.push_str(" />\n");
            }
            SvgElement::Text { x, y, content, style, rotate } => {
                write!(out, r#"<text x="{x:.2}" y="{y:.2}""#)?;
                let family = &self.font_family;
                write!(out, r#" font-family="{family}" font-size="{:.1}""#, style.size)?;
                write!(out, r#" fill="{}""#, style.color.to_svg_fill())?;
                write!(out, r#" text-anchor="{}""#, style.anchor.as_str())?;
                write!(out, r#" dominant-baseline="{}""#, style.baseline.as_str())?;
                if style.weight == FontWeight::Bold {
                    out.push_str(r#" font-weight="bold""#);
                }
                if style.style == FontStyle::Italic {
                    out.push_str(r#" font-style="italic""#);
                }
                if let Some(angle) = rotate {
                    write!(out, r#" transform="rotate({angle:.1},{x:.2},{y:.2})""#)?;
                }
                out.push('>');
                push_escaped(out, content);
                out.push_str("</text>\n");
            }
            SvgElement::Path { d, style } => {
                write!(out, r#"<path d="{d}""#)?;
                write_style_attrs(out, style)?;
                out.push_str(" />\n");
            }
            SvgElement::Circle { cx, cy, r, style } => {
                write!(out, r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}""#)?;
                write_style_attrs(out, style)?;
                out.push_str(" />\n");
            }
            SvgElement::Group { clip_id, children } => {
                writeln!(out, r#"<g clip-path="url(#{clip_id})">"#)?;
                for child in children {
                    self.write_element(out, child)?;
                }
                out.push_str("</g>\n");
            }
        }
        Ok(())
    }
}

fn write_points(out: &mut String, points: &[(f64, f64)]) -> fmt::Result {
    for (i, (x, y)) in points.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write!(out, "{x:.2},{y:.2}")?;
    }
    Ok(())
}

fn push_escaped(out: &mut String, content: &str) {
    for ch in content.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn write_style_attrs(out: &mut String, style: &Style) -> fmt::Result {
    match &style.fill {
        Some(fill) => write!(out, r#" fill="{}""#, fill.to_svg_fill())?,
        None => out.push_str(r#" fill="none""#),
    }
    if let Some(stroke) = &style.stroke {
        let width = style.stroke_width;
        write!(out, r#" stroke="{}" stroke-width="{width:.2}""#, stroke.to_svg_fill())?;
    }
    if (style.opacity - 1.0).abs() > 1e-4 {
        write!(out, r#" opacity="{:.3}""#, style.opacity)?;
    }
    Ok(())
}

fn write_line_attrs(out: &mut String, style: &LineStyle) -> fmt::Result {
    write!(out, r#" stroke="{}" stroke-width="{:.2}""#, style.color.to_svg_fill(), style.width)?;
    if let Some(dash) = &style.dash {
        write!(out, r#" stroke-dasharray="{dash}""#)?;
    }
    Ok(())
}
