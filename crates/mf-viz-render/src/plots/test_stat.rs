use mf_viz::{TestStatArtifact, TestStatHistogram};

use crate::canvas::Canvas;
use crate::config::VizConfig;
use crate::layout::axes::Axis;
use crate::layout::legend::{self, LegendEntry, LegendKind};
use crate::layout::margins::PlotArea;
use crate::plots::axes_draw::draw_axes;
use crate::primitives::*;
use crate::title::draw_title;

pub fn render(artifact: &TestStatArtifact, config: &VizConfig) -> crate::Result<String> {
    let edges = &artifact.bin_edges;
    let hists: Vec<&TestStatHistogram> =
        std::iter::once(&artifact.null).chain(artifact.alt.as_ref()).collect();
    if edges.len() < 2 || hists.iter().any(|h| h.density.len() + 1 != edges.len()) {
        return Err(crate::RenderError::Layout(
            "test statistic histograms do not match the bin edges".into(),
        ));
    }

    let mut canvas = Canvas::from_config(config)?;

    let positive = hists.iter().flat_map(|h| h.density.iter().copied()).filter(|&d| d > 0.0);
    let (d_min, d_max) =
        positive.fold((f64::INFINITY, 0.0_f64), |(lo, hi), d| (lo.min(d), hi.max(d)));
    let d_max = if d_max > 0.0 { d_max } else { 1.0 };
    let y_axis = if artifact.log_y {
        let lo = if d_min.is_finite() { d_min * 0.5 } else { d_max * 1e-3 };
        Axis::auto_log(lo, d_max * 2.0)
    } else {
        Axis::exact_linear(0.0, d_max * 1.1, 6)
    }
    .with_label("probability density");
    let x_axis =
        Axis::exact_linear(edges[0], edges[edges.len() - 1], 6).with_label(&artifact.x_label);

    let area = PlotArea::auto(&canvas, &y_axis, &x_axis, !artifact.title.is_empty(), config);
    draw_title(&mut canvas, &artifact.title, config);

    canvas.push_clip(area.left, area.top, area.width, area.height);

    // Right tail of the null distribution beyond the observed value.
    let obs_px = x_axis.data_to_pixel(artifact.observed, area.left, area.right());
    let tail: Vec<(f64, f64)> =
        step_points(edges, &artifact.null.density, &x_axis, &y_axis, &area)
            .into_iter()
            .filter(|&(px, _)| px >= obs_px)
            .collect();
    if let (Some(&(first, _)), Some(&(last, _))) = (tail.first(), tail.last()) {
        let mut poly = vec![(first, area.bottom())];
        poly.extend(tail.iter().copied());
        poly.push((last, area.bottom()));
        canvas.polygon(&poly, &Style::filled(config.colors.null_hist.with_alpha(0.25)));
    }

    let colors = [config.colors.null_hist, config.colors.alt_hist];
    for (hist, color) in hists.iter().zip(colors) {
        let pts = step_points(edges, &hist.density, &x_axis, &y_axis, &area);
        canvas.polyline(&pts, &LineStyle::solid(color, 1.4));
    }

    let observed_line = LineStyle::solid(config.colors.observed, 2.0);
    canvas.line(obs_px, area.top, obs_px, area.bottom(), &observed_line);

    canvas.pop_clip();
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, config);

    let note = TextStyle { size: config.font.size * 0.85, ..Default::default() };
    let mut notes = vec![format!("null p-value = {}", format_p(artifact.null_p_value))];
    if let Some(p) = artifact.alt_p_value {
        notes.push(format!("alt p-value = {}", format_p(p)));
    }
    for (i, text) in notes.iter().enumerate() {
        let y = area.bottom() - 8.0 - (notes.len() - 1 - i) as f64 * (note.size + 4.0);
        canvas.text(area.left + 8.0, y, text, &note);
    }

    if config.legend.show {
        let mut entries: Vec<LegendEntry> = hists
            .iter()
            .zip(colors)
            .map(|(h, color)| LegendEntry {
                label: hist_label(h),
                color,
                kind: LegendKind::Line(None),
            })
            .collect();
        entries.push(LegendEntry {
            label: format!("observed = {:.3}", artifact.observed),
            color: config.colors.observed,
            kind: LegendKind::Line(None),
        });
        legend::draw_legend(&mut canvas, &area, &entries, config.font.size, config.legend.frame);
    }

    Ok(canvas.finish_svg())
}

fn hist_label(h: &TestStatHistogram) -> String {
    if h.n_failed > 0 {
        format!("{} ({} toys, {} failed)", h.label, h.n_toys, h.n_failed)
    } else {
        format!("{} ({} toys)", h.label, h.n_toys)
    }
}

fn format_p(p: f64) -> String {
    if p > 0.0 && p < 1e-3 { format!("{p:.2e}") } else { format!("{p:.4}") }
}

/// Histogram outline as pixel points; empty bins drop to the bottom of the frame.
fn step_points(
    edges: &[f64],
    density: &[f64],
    x_axis: &Axis,
    y_axis: &Axis,
    area: &PlotArea,
) -> Vec<(f64, f64)> {
    let y_of = |d: f64| {
        if d > 0.0 { y_axis.data_to_pixel(d, area.bottom(), area.top) } else { area.bottom() }
    };
    let x_of = |x: f64| x_axis.data_to_pixel(x, area.left, area.right());
    let mut pts = Vec::with_capacity(2 * density.len() + 2);
    pts.push((x_of(edges[0]), area.bottom()));
    for (i, &d) in density.iter().enumerate() {
        let y = y_of(d).min(area.bottom());
        pts.push((x_of(edges[i]), y));
        pts.push((x_of(edges[i + 1]), y));
    }
    pts.push((x_of(edges[density.len()]), area.bottom()));
    pts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(log_y: bool) -> TestStatArtifact {
        TestStatArtifact {
            title: "FrequentistCalculator test statistic distributions".into(),
            x_label: "test statistic".into(),
            bin_edges: (0..=10).map(|i| i as f64 * 0.5).collect(),
            null: TestStatHistogram {
                label: "S+B (nsig = 60)".into(),
                density: vec![1.0, 0.5, 0.25, 0.12, 0.06, 0.03, 0.02, 0.01, 0.0, 0.01],
                n_toys: 500,
                n_failed: 0,
            },
            alt: Some(TestStatHistogram {
                label: "B only".into(),
                density: vec![0.0, 0.0, 0.1, 0.2, 0.4, 0.5, 0.4, 0.2, 0.1, 0.1],
                n_toys: 500,
                n_failed: 3,
            }),
            observed: 2.2,
            null_p_value: 0.0004,
            alt_p_value: Some(0.61),
            log_y,
        }
    }

    #[test]
    fn renders_log_histograms() {
        let svg = render(&artifact(true), &VizConfig::default()).unwrap();
        assert!(svg.contains("B only (500 toys, 3 failed)"));
        assert!(svg.contains("null p-value = 4.00e-4"));
        assert!(svg.contains("observed = 2.200"));
        // Decade tick labels on the log axis.
        assert!(svg.contains("10\u{207B}\u{00B9}"));
        assert_eq!(svg.matches("<polyline").count(), 2);
    }

    #[test]
    fn linear_without_alt() {
        let mut art = artifact(false);
        art.alt = None;
        art.alt_p_value = None;
        let svg = render(&art, &VizConfig::default()).unwrap();
        assert_eq!(svg.matches("<polyline").count(), 1);
        assert!(!svg.contains("alt p-value"));
    }

    #[test]
    fn mismatched_edges_rejected() {
        let mut art = artifact(true);
        art.bin_edges.pop();
        assert!(render(&art, &VizConfig::default()).is_err());
    }
}
