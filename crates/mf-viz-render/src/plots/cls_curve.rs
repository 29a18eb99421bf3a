use mf_viz::ClsCurveArtifact;

use crate::canvas::Canvas;
use crate::config::VizConfig;
use crate::layout::axes::Axis;
use crate::layout::legend::{self, LegendEntry, LegendKind};
use crate::layout::margins::PlotArea;
use crate::plots::axes_draw::draw_axes;
use crate::primitives::*;
use crate::title::draw_title;

/// Scan plot: observed CLs, CLs+b and CLb with the expected CLs band and the `alpha` line.
pub fn render(artifact: &ClsCurveArtifact, config: &VizConfig) -> crate::Result<String> {
    let n = artifact.mu_values.len();
    if n < 2 {
        return Err(crate::RenderError::Layout("CLs scan needs at least 2 points".into()));
    }
    let aligned = [&artifact.cls_obs, &artifact.clsb_obs, &artifact.clb_obs]
        .into_iter()
        .chain(artifact.cls_exp.iter())
        .all(|v| v.len() == n);
    if !aligned {
        return Err(crate::RenderError::Layout("CLs arrays are not aligned with mu_values".into()));
    }

    let mut canvas = Canvas::from_config(config)?;

    let mu_min = artifact.mu_values[0];
    let mu_max = artifact.mu_values[n - 1];
    let x_axis = Axis::exact_linear(mu_min, mu_max, 6).with_label(&artifact.poi_label);
    let y_axis = Axis::exact_linear(0.0, 1.0, 6).with_label("p value");

    let title = format!("{} scan result", artifact.calculator);
    let area = PlotArea::auto(&canvas, &y_axis, &x_axis, true, config);
    draw_title(&mut canvas, &title, config);

    let x_px: Vec<f64> = artifact
        .mu_values
        .iter()
        .map(|&m| x_axis.data_to_pixel(m, area.left, area.right()))
        .collect();
    let y_px = |values: &[f64]| -> Vec<f64> {
        values
            .iter()
            .map(|&c| y_axis.data_to_pixel(c.clamp(0.0, 1.0), area.bottom(), area.top))
            .collect()
    };
    let to_pts =
        |values: &[f64]| -> Vec<(f64, f64)> { x_px.iter().copied().zip(y_px(values)).collect() };

    canvas.push_clip(area.left, area.top, area.width, area.height);

    // cls_exp is ordered [+2, +1, 0, -1, -2] sigma.
    canvas.fill_between(
        &x_px,
        &y_px(&artifact.cls_exp[4]),
        &y_px(&artifact.cls_exp[0]),
        &Style::filled(config.colors.band_2sigma),
    );
    canvas.fill_between(
        &x_px,
        &y_px(&artifact.cls_exp[3]),
        &y_px(&artifact.cls_exp[1]),
        &Style::filled(config.colors.band_1sigma),
    );
    let median = LineStyle::dashed(config.colors.expected, 1.2);
    canvas.polyline(&to_pts(&artifact.cls_exp[2]), &median);

    canvas.polyline(&to_pts(&artifact.clsb_obs), &LineStyle::solid(config.colors.clsb, 1.2));
    canvas.polyline(&to_pts(&artifact.clb_obs), &LineStyle::solid(config.colors.clb, 1.2));

    let obs_pts = to_pts(&artifact.cls_obs);
    canvas.polyline(&obs_pts, &LineStyle::solid(config.colors.observed, 1.5));
    let marker = MarkerStyle { color: config.colors.observed, size: 2.0, ..Default::default() };
    for &(px, py) in &obs_pts {
        canvas.marker(px, py, &marker);
    }

    let alpha_py = y_axis.data_to_pixel(artifact.alpha, area.bottom(), area.top);
    let alpha_line = LineStyle::solid(config.colors.threshold, 1.0);
    canvas.line(area.left, alpha_py, area.right(), alpha_py, &alpha_line);
    let note = TextStyle {
        size: config.font.tick_size * 0.9,
        color: config.colors.threshold,
        anchor: TextAnchor::End,
        ..Default::default()
    };
    let alpha_label = format!("\u{03B1} = {:.3}", artifact.alpha);
    canvas.text(area.right() - 4.0, alpha_py - 4.0, &alpha_label, &note);

    if artifact.obs_limit.is_finite() && x_axis.contains(artifact.obs_limit) {
        let px = x_axis.data_to_pixel(artifact.obs_limit, area.left, area.right());
        let limit_line = LineStyle::dotted(config.colors.observed, 0.8);
        canvas.line(px, area.top, px, area.bottom(), &limit_line);
    }

    canvas.pop_clip();
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, config);

    if config.legend.show {
        let primary = if artifact.use_cls { "Observed CLs" } else { "Observed CLs+b" };
        let entries = [
            LegendEntry {
                label: primary.into(),
                color: config.colors.observed,
                kind: LegendKind::Marker,
            },
            LegendEntry {
                label: "Observed CLs+b".into(),
                color: config.colors.clsb,
                kind: LegendKind::Line(None),
            },
            LegendEntry {
                label: "Observed CLb".into(),
                color: config.colors.clb,
                kind: LegendKind::Line(None),
            },
            LegendEntry {
                label: "Expected CLs - Median".into(),
                color: config.colors.expected,
                kind: LegendKind::Line(Some("6 3".into())),
            },
            LegendEntry {
                label: "Expected CLs \u{00B1} 1\u{03C3}".into(),
                color: config.colors.band_1sigma,
                kind: LegendKind::Fill,
            },
            LegendEntry {
                label: "Expected CLs \u{00B1} 2\u{03C3}".into(),
                color: config.colors.band_2sigma,
                kind: LegendKind::Fill,
            },
        ];
        legend::draw_legend(&mut canvas, &area, &entries, config.font.size, config.legend.frame);
    }

    Ok(canvas.finish_svg())
}
