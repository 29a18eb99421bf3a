use crate::canvas::Canvas;
use crate::color::Color;
use crate::layout::margins::PlotArea;
use crate::primitives::*;

pub struct LegendEntry {
    pub label: String,
    pub color: Color,
    pub kind: LegendKind,
}

pub enum LegendKind {
    /// Filled swatch with a border in the entry color.
    Fill,
    /// Line sample with an optional dash pattern.
    Line(Option<String>),
    /// Data marker with a short error bar.
    Marker,
}

/// Draw a legend box in the top-right corner of the plot area.
pub fn draw_legend(
    canvas: &mut Canvas,
    area: &PlotArea,
    entries: &[LegendEntry],
    font_size: f64,
    frame: bool,
) {
    if entries.is_empty() {
        return;
    }

    let row_height = font_size + 4.0;
    let swatch_w = 18.0;
    let swatch_h = font_size - 2.0;
    let gap = 6.0;
    let padding = 6.0;

    let text_style =
        TextStyle { size: font_size * 0.9, baseline: TextBaseline::Central, ..Default::default() };

    let max_w = entries
        .iter()
        .map(|e| canvas.measure_text(&e.label, &text_style).width)
        .fold(0.0_f64, f64::max);

    let legend_w = padding + swatch_w + gap + max_w + padding;
    let legend_h = padding + entries.len() as f64 * row_height + padding;
    let lx = (area.right() - legend_w - 6.0).max(area.left);
    let ly = area.top + 6.0;

    let bg_style = Style {
        fill: Some(Color::rgba(255, 255, 255, 0.9)),
        stroke: frame.then_some(Color::BLACK),
        stroke_width: 0.6,
        opacity: 1.0,
    };
    canvas.rect(lx, ly, legend_w, legend_h, &bg_style);

    for (i, entry) in entries.iter().enumerate() {
        let ey = ly + padding + i as f64 * row_height + row_height / 2.0;
        let sx = lx + padding;

        match &entry.kind {
            LegendKind::Fill => {
                canvas.rect(
                    sx,
                    ey - swatch_h / 2.0,
                    swatch_w,
                    swatch_h,
                    &Style::filled_stroked(entry.color, entry.color, 0.6),
                );
            }
            LegendKind::Line(dash) => {
                let ls = LineStyle { color: entry.color, width: 1.5, dash: dash.clone() };
                canvas.line(sx, ey, sx + swatch_w, ey, &ls);
            }
            LegendKind::Marker => {
                let cx = sx + swatch_w / 2.0;
                canvas.line(
                    cx,
                    ey - swatch_h / 2.0,
                    cx,
                    ey + swatch_h / 2.0,
                    &LineStyle::solid(entry.color, 0.8),
                );
                canvas.marker(cx, ey, &MarkerStyle { color: entry.color, ..Default::default() });
            }
        }

        canvas.text(sx + swatch_w + gap, ey, &entry.label, &text_style);
    }
}
