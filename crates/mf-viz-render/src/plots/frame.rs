use mf_viz::{FrameArtifact, LegendItem, LegendMark, ParamEntry};

use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::VizConfig;
use crate::layout::axes::Axis;
use crate::layout::legend::{self, LegendEntry, LegendKind};
use crate::layout::margins::PlotArea;
use crate::plots::axes_draw::draw_axes;
use crate::primitives::*;
use crate::title::draw_title;

pub fn render(artifact: &FrameArtifact, config: &VizConfig) -> crate::Result<String> {
    if artifact.x_min.is_nan() || artifact.x_max.is_nan() || artifact.x_max <= artifact.x_min {
        return Err(crate::RenderError::Layout(format!(
            "frame range [{}, {}] is empty",
            artifact.x_min, artifact.x_max
        )));
    }

    let mut canvas = Canvas::from_config(config)?;

    let x_axis =
        Axis::exact_linear(artifact.x_min, artifact.x_max, 6).with_label(&artifact.x_label);
    let y_top = match artifact.y_max() {
        m if m > 0.0 && m.is_finite() => m * 1.05,
        _ => 1.0,
    };
    let y_axis = Axis::exact_linear(0.0, y_top, 6).with_label(&artifact.y_label);

    let area = PlotArea::auto(&canvas, &y_axis, &x_axis, !artifact.title.is_empty(), config);
    draw_title(&mut canvas, &artifact.title, config);

    let to_px = |x: f64, y: f64| {
        (
            x_axis.data_to_pixel(x, area.left, area.right()),
            y_axis.data_to_pixel(y, area.bottom(), area.top),
        )
    };

    canvas.push_clip(area.left, area.top, area.width, area.height);

    for curve in artifact.curves.iter().filter(|c| c.filled) {
        let color = Color::parse(&curve.color);
        let mut pts: Vec<(f64, f64)> = Vec::with_capacity(curve.x.len() + 2);
        if let (Some(&first), Some(&last)) = (curve.x.first(), curve.x.last()) {
            pts.push(to_px(first, 0.0));
            pts.extend(curve.x.iter().zip(&curve.y).map(|(&x, &y)| to_px(x, y)));
            pts.push(to_px(last, 0.0));
        }
        canvas.polygon(&pts, &Style::filled_stroked(color.with_alpha(0.6), color, 1.0));
    }

    let data_line = LineStyle::solid(config.colors.data, 0.8);
    let data_marker = MarkerStyle { color: config.colors.data, ..Default::default() };
    for series in &artifact.data {
        for (i, (&x, &y)) in series.x.iter().zip(&series.y).enumerate() {
            let lo = series.yerr_lo.get(i).copied().unwrap_or(0.0);
            let hi = series.yerr_hi.get(i).copied().unwrap_or(0.0);
            let (px, py) = to_px(x, y);
            let (_, py_lo) = to_px(x, (y - lo).max(0.0));
            let (_, py_hi) = to_px(x, y + hi);
            if lo > 0.0 || hi > 0.0 {
                canvas.error_bar(px, py_lo, py_hi, 0.0, &data_line);
            }
            let (px_l, _) = to_px(x - series.x_half_width, y);
            let (px_r, _) = to_px(x + series.x_half_width, y);
            canvas.line(px_l, py, px_r, py, &data_line);
            canvas.marker(px, py, &data_marker);
        }
    }

    for curve in artifact.curves.iter().filter(|c| !c.filled) {
        let pts: Vec<(f64, f64)> =
            curve.x.iter().zip(&curve.y).map(|(&x, &y)| to_px(x, y)).collect();
        canvas.polyline(&pts, &LineStyle::for_kind(curve.line, Color::parse(&curve.color), 1.8));
    }

    canvas.pop_clip();
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, config);

    if !artifact.param_box.is_empty() {
        draw_param_box(&mut canvas, &area, &artifact.param_box, config);
    }

    if config.legend.show {
        let entries: Vec<LegendEntry> =
            artifact.legend.iter().map(|item| legend_entry(artifact, item, config)).collect();
        legend::draw_legend(&mut canvas, &area, &entries, config.font.size, config.legend.frame);
    }

    Ok(canvas.finish_svg())
}

fn legend_entry(
    artifact: &FrameArtifact,
    item: &LegendItem,
    config: &VizConfig,
) -> LegendEntry {
    let curve = artifact.curves.iter().find(|c| c.name == item.series);
    let color = curve.map(|c| Color::parse(&c.color)).unwrap_or(config.colors.data);
    let kind = match item.mark {
        LegendMark::Marker => LegendKind::Marker,
        LegendMark::Fill => LegendKind::Fill,
        LegendMark::Line => {
            let line = curve.map(|c| c.line).unwrap_or_default();
            LegendKind::Line(LineStyle::for_kind(line, color, 1.0).dash)
        }
    };
    LegendEntry { label: item.label.clone(), color, kind }
}

/// Box listing fitted parameters in the top-left corner of the plot area.
fn draw_param_box(canvas: &mut Canvas, area: &PlotArea, params: &[ParamEntry], config: &VizConfig) {
    let style = TextStyle {
        size: config.font.size * 0.85,
        color: config.colors.param_box,
        baseline: TextBaseline::Central,
        ..Default::default()
    };
    let lines: Vec<String> = params.iter().map(format_param).collect();
    let row = style.size + 4.0;
    let padding = 6.0;
    let w = lines.iter().map(|l| canvas.measure_text(l, &style).width).fold(0.0_f64, f64::max)
        + 2.0 * padding;
    let h = lines.len() as f64 * row + 2.0 * padding;
    let x = area.left + 8.0;
    let y = area.top + 8.0;

    canvas.rect(
        x,
        y,
        w,
        h,
        &Style::filled_stroked(Color::WHITE.with_alpha(0.9), config.colors.param_box, 0.6),
    );
    for (i, line) in lines.iter().enumerate() {
        canvas.text(x + padding, y + padding + row * (i as f64 + 0.5), line, &style);
    }
}

/// `name = value ± error`, with the value rounded to the error's second significant digit.
pub(crate) fn format_param(p: &ParamEntry) -> String {
    match p.error {
        Some(err) if err > 0.0 && err.is_finite() => {
            let decimals = (1 - err.log10().floor() as i32).clamp(0, 8) as usize;
            format!("{} = {:.d$} \u{00B1} {:.d$}", p.name, p.value, err, d = decimals)
        }
        _ => format!("{} = {}", p.name, format_plain(p.value)),
    }
}

fn format_plain(v: f64) -> String {
    if v != 0.0 && (v.abs() >= 1e5 || v.abs() < 1e-3) {
        format!("{v:.3e}")
    } else {
        let s = format!("{v:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> FrameArtifact {
        serde_json::from_value(serde_json::json!({
            "title": "A plot of \"x\"",
            "x_label": "x",
            "y_label": "Events / ( 1 )",
            "x_min": 0.0,
            "x_max": 4.0,
            "bin_width": 1.0,
            "data": [{
                "name": "data",
                "x": [0.5, 1.5, 2.5, 3.5],
                "x_half_width": 0.5,
                "y": [4.0, 9.0, 0.0, 2.0],
                "yerr_lo": [1.9, 2.9, 0.0, 1.3],
                "yerr_hi": [3.2, 4.1, 1.8, 2.6],
                "errors": "poisson"
            }],
            "curves": [
                {"name": "model", "x": [0.0, 2.0, 4.0], "y": [5.0, 4.0, 3.0],
                 "color": "violet", "line": "solid", "filled": false},
                {"name": "bkg", "component": "bkg", "x": [0.0, 4.0], "y": [2.0, 2.0],
                 "color": "blue", "line": "dashed", "filled": false},
                {"name": "sig_hist", "x": [0.0, 4.0], "y": [1.0, 1.0],
                 "color": "red", "line": "solid", "filled": true}
            ],
            "param_box": [{"name": "mean", "value": 1.98765, "error": 0.0312}],
            "legend": [
                {"series": "data", "label": "Data", "mark": "marker"},
                {"series": "bkg", "label": "Background only", "mark": "line"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn renders_all_layers() {
        let svg = render(&artifact(), &VizConfig::default()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("A plot of &quot;x&quot;"));
        // Violet model, dashed blue background, filled red histogram pdf.
        assert!(svg.contains("#cc00ff"));
        assert!(svg.contains("stroke-dasharray=\"6 3\""));
        assert!(svg.contains("<polygon"));
        assert_eq!(svg.matches("<circle").count(), 4 + 1);
        assert!(svg.contains("mean = 1.988 \u{00B1} 0.031"));
        assert!(svg.contains("Background only"));
    }

    #[test]
    fn empty_range_is_a_layout_error() {
        let mut art = artifact();
        art.x_max = art.x_min;
        assert!(matches!(
            render(&art, &VizConfig::default()),
            Err(crate::RenderError::Layout(_))
        ));
    }

    #[test]
    fn param_formatting() {
        let p = |value, error| ParamEntry { name: "n".into(), value, error };
        assert_eq!(format_param(&p(100.04, Some(3.1))), "n = 100.0 \u{00B1} 3.1");
        assert_eq!(format_param(&p(125.0, None)), "n = 125");
        assert_eq!(format_param(&p(-0.0123456, None)), "n = -0.0123");
    }
}
