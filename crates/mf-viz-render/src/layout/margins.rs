use crate::canvas::Canvas;
use crate::config::VizConfig;
use crate::layout::axes::Axis;
use crate::primitives::TextStyle;

/// Rectangular plot area within the canvas.
#[derive(Debug, Clone, Copy)]
pub struct PlotArea {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PlotArea {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Margins sized from tick labels, axis labels and the title.
    pub fn auto(
        canvas: &Canvas,
        y_axis: &Axis,
        x_axis: &Axis,
        has_title: bool,
        config: &VizConfig,
    ) -> Self {
        let tick_style = TextStyle { size: config.font.tick_size, ..Default::default() };
        let outward = config.axes.tick_direction != "in";
        let tick_extra = if outward { config.axes.tick_length } else { 0.0 };

        let max_tick_w = y_axis
            .tick_labels
            .iter()
            .map(|l| canvas.measure_text(l, &tick_style).width)
            .fold(0.0_f64, f64::max);
        let mut left = 15.0 + tick_extra + max_tick_w + 8.0;
        if !y_axis.label.is_empty() {
            left += config.font.label_size + 8.0;
        }

        let mut bottom = 15.0 + tick_extra + config.font.tick_size + 6.0;
        if !x_axis.label.is_empty() {
            bottom += config.font.label_size + 6.0;
        }

        let top = if has_title && config.title.show {
            config.font.title_size * 2.0 + 12.0
        } else {
            14.0
        };
        let right = 18.0;

        let width = canvas.width - left - right;
        let height = canvas.height - top - bottom;
        Self { left, top, width: width.max(50.0), height: height.max(50.0) }
    }

    /// Baseline x of the rotated y-axis label, inside the left padding.
    pub fn y_label_x(&self, config: &VizConfig) -> f64 {
        15.0 + config.font.label_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_fits_canvas() {
        let config = VizConfig::default();
        let canvas = Canvas::new(504.0, 360.0).unwrap();
        let x = Axis::auto_linear(0.0, 10.0, 6).with_label("x");
        let y = Axis::auto_linear(0.0, 1000.0, 6).with_label("Events");
        let area = PlotArea::auto(&canvas, &y, &x, true, &config);
        assert!(area.left > 20.0);
        assert!(area.right() < canvas.width);
        assert!(area.bottom() < canvas.height);
        let untitled = PlotArea::auto(&canvas, &y, &x, false, &config);
        assert!(untitled.top < area.top);
    }
}
