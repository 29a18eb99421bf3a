use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::VizConfig;
use crate::primitives::*;

/// Draw the plot title centred above the plot area, optionally in a framed box.
pub fn draw_title(canvas: &mut Canvas, title: &str, config: &VizConfig) {
    if title.is_empty() || !config.title.show {
        return;
    }

    let style = TextStyle {
        size: config.font.title_size,
        anchor: TextAnchor::Middle,
        baseline: TextBaseline::Central,
        ..Default::default()
    };
    let cx = canvas.width / 2.0;
    let cy = 8.0 + config.font.title_size;

    if config.title.boxed {
        let w = (canvas.measure_text(title, &style).width + 16.0).min(canvas.width - 8.0);
        let h = config.font.title_size * 1.6;
        canvas.rect(
            cx - w / 2.0,
            cy - h / 2.0,
            w,
            h,
            &Style::filled_stroked(Color::WHITE, Color::BLACK, 0.6),
        );
    }
    canvas.text(cx, cy, title, &style);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_and_hidden_titles() {
        let mut config = VizConfig::default();
        let mut canvas = Canvas::new(300.0, 200.0).unwrap();
        draw_title(&mut canvas, "A plot of \"x\"", &config);
        let svg = canvas.finish_svg();
        assert!(svg.contains("A plot of &quot;x&quot;"));
        assert_eq!(svg.matches("<rect").count(), 2);

        config.title.show = false;
        let mut canvas = Canvas::new(300.0, 200.0).unwrap();
        draw_title(&mut canvas, "hidden", &config);
        assert!(!canvas.finish_svg().contains("hidden"));
    }
}
