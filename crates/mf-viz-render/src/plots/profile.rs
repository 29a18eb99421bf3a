use mf_viz::ProfileCurveArtifact;

use crate::canvas::Canvas;
use crate::config::VizConfig;
use crate::layout::axes::Axis;
use crate::layout::margins::PlotArea;
use crate::plots::axes_draw::draw_axes;
use crate::primitives::*;
use crate::title::draw_title;

/// Profile likelihood `-log λ(μ)` with the interval threshold and end points.
pub fn render(artifact: &ProfileCurveArtifact, config: &VizConfig) -> crate::Result<String> {
    let n = artifact.mu_values.len();
    if n < 2 || artifact.delta_nll.len() != n {
        return Err(crate::RenderError::Layout(
            "profile curve needs at least 2 aligned points".into(),
        ));
    }

    let mut canvas = Canvas::from_config(config)?;

    let x_axis = Axis::exact_linear(artifact.mu_values[0], artifact.mu_values[n - 1], 6)
        .with_label(&artifact.poi_name);
    let floor = artifact.threshold.map_or(2.0, |t| t * 1.5);
    let y_axis = Axis::exact_linear(0.0, artifact.max_delta_nll().max(floor) * 1.05, 6)
        .with_label("-log \u{03BB}");

    let title = format!("PLL scan of {}", artifact.poi_name);
    let area = PlotArea::auto(&canvas, &y_axis, &x_axis, true, config);
    draw_title(&mut canvas, &title, config);

    canvas.push_clip(area.left, area.top, area.width, area.height);

    let points: Vec<(f64, f64)> = artifact
        .mu_values
        .iter()
        .zip(&artifact.delta_nll)
        .filter(|(_, d)| d.is_finite())
        .map(|(&mu, &d)| {
            (
                x_axis.data_to_pixel(mu, area.left, area.right()),
                y_axis.data_to_pixel(d, area.bottom(), area.top),
            )
        })
        .collect();
    canvas.polyline(&points, &LineStyle::solid(config.colors.clsb, 1.6));

    let note = TextStyle {
        size: config.font.tick_size * 0.9,
        color: config.colors.threshold,
        anchor: TextAnchor::End,
        ..Default::default()
    };
    if let Some(t) = artifact.threshold {
        let py = y_axis.data_to_pixel(t, area.bottom(), area.top);
        let style = LineStyle::dashed(config.colors.threshold, 1.0);
        canvas.line(area.left, py, area.right(), py, &style);
        let label = match artifact.cl {
            Some(cl) => format!("{:.1}% CL", cl * 100.0),
            None => format!("\u{0394} = {t:.3}"),
        };
        canvas.text(area.right() - 4.0, py - 4.0, &label, &note);
    }

    if let Some((lo, hi)) = artifact.interval {
        let style = LineStyle::solid(config.colors.threshold, 1.0);
        let top = artifact
            .threshold
            .map_or(area.top, |t| y_axis.data_to_pixel(t, area.bottom(), area.top));
        for end in [lo, hi].into_iter().filter(|v| v.is_finite()) {
            let px = x_axis.data_to_pixel(end, area.left, area.right());
            canvas.line(px, area.bottom(), px, top, &style);
        }
    }

    let hat = x_axis.data_to_pixel(artifact.mu_hat, area.left, area.right());
    let hat_line = LineStyle::dotted(config.colors.expected, 0.8);
    canvas.line(hat, area.top, hat, area.bottom(), &hat_line);

    canvas.pop_clip();
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, config);

    let summary = match artifact.interval {
        Some((lo, hi)) => format!(
            "{} = {:.3}, interval [{:.3}, {:.3}]",
            artifact.poi_name, artifact.mu_hat, lo, hi
        ),
        None => format!("{} = {:.3}", artifact.poi_name, artifact.mu_hat),
    };
    let summary_style = TextStyle { size: config.font.size * 0.9, ..Default::default() };
    canvas.text(area.left + 8.0, area.top + 8.0 + summary_style.size, &summary, &summary_style);

    Ok(canvas.finish_svg())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ProfileCurveArtifact {
        let curve: Vec<(f64, f64)> = (0..=40)
            .map(|i| i as f64 * 5.0)
            .map(|mu| (mu, 0.5 * ((mu - 100.0) / 20.0).powi(2)))
            .collect();
        ProfileCurveArtifact::new("nsig", 100.0, &curve).unwrap()
    }

    #[test]
    fn curve_without_interval() {
        let svg = render(&artifact(), &VizConfig::default()).unwrap();
        assert!(svg.contains("PLL scan of nsig"));
        assert!(svg.contains("nsig = 100.000"));
        assert_eq!(svg.matches("<polyline").count(), 1);
        assert!(!svg.contains("% CL"));
    }

    #[test]
    fn interval_lines_and_label() {
        let mut art = artifact();
        art.cl = Some(0.95);
        art.threshold = Some(1.92);
        art.interval = Some((60.8, 139.2));
        let svg = render(&art, &VizConfig::default()).unwrap();
        assert!(svg.contains("95.0% CL"));
        assert!(svg.contains("interval [60.800, 139.200]"));
    }

    #[test]
    fn nan_points_are_skipped() {
        let mut art = artifact();
        art.delta_nll[3] = f64::NAN;
        let svg = render(&art, &VizConfig::default()).unwrap();
        assert!(!svg.contains("NaN"));
    }
}
