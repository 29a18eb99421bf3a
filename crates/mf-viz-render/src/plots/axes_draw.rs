use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::VizConfig;
use crate::layout::axes::Axis;
use crate::layout::margins::PlotArea;
use crate::primitives::*;

/// Draw the box frame with ticks, optional grid and axis labels.
pub fn draw_axes(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    config: &VizConfig,
) {
    let frame_style = LineStyle::solid(Color::BLACK, 0.8);
    let major = LineStyle::solid(Color::BLACK, 0.6);
    let minor = LineStyle::solid(Color::BLACK, 0.4);
    let grid_style = LineStyle {
        color: config.grid.color.with_alpha(config.grid.alpha),
        width: 0.5,
        dash: Some("3 3".into()),
    };

    // Ticks point into the frame when `sign` is 1.
    let sign = if config.axes.tick_direction == "in" { 1.0 } else { -1.0 };
    let outward = sign < 0.0;
    let tl = config.axes.tick_length;
    let mtl = config.axes.minor_tick_length;

    draw_frame(canvas, area, &frame_style);

    let x_label_style = TextStyle {
        size: config.font.tick_size,
        anchor: TextAnchor::Middle,
        baseline: TextBaseline::Hanging,
        ..Default::default()
    };
    for (i, &val) in x_axis.tick_positions.iter().enumerate() {
        if !x_axis.contains(val) {
            continue;
        }
        let px = x_axis.data_to_pixel(val, area.left, area.right());
        if config.grid.show {
            canvas.line(px, area.top, px, area.bottom(), &grid_style);
        }
        canvas.line(px, area.bottom(), px, area.bottom() - sign * tl, &major);
        if config.axes.show_top_ticks {
            canvas.line(px, area.top, px, area.top + sign * tl, &major);
        }
        if let Some(label) = x_axis.tick_labels.get(i) {
            let label_y = area.bottom() + 3.0 + if outward { tl } else { 0.0 };
            canvas.text(px, label_y, label, &x_label_style);
        }
    }
    for &val in x_axis.minor_ticks.iter().filter(|v| x_axis.contains(**v)) {
        let px = x_axis.data_to_pixel(val, area.left, area.right());
        canvas.line(px, area.bottom(), px, area.bottom() - sign * mtl, &minor);
        if config.axes.show_top_ticks {
            canvas.line(px, area.top, px, area.top + sign * mtl, &minor);
        }
    }

    let y_label_style = TextStyle {
        size: config.font.tick_size,
        anchor: TextAnchor::End,
        baseline: TextBaseline::Central,
        ..Default::default()
    };
    for (i, &val) in y_axis.tick_positions.iter().enumerate() {
        if !y_axis.contains(val) {
            continue;
        }
        let py = y_axis.data_to_pixel(val, area.bottom(), area.top);
        if config.grid.show {
            canvas.line(area.left, py, area.right(), py, &grid_style);
        }
        canvas.line(area.left, py, area.left + sign * tl, py, &major);
        if config.axes.show_right_ticks {
            canvas.line(area.right(), py, area.right() - sign * tl, py, &major);
        }
        if let Some(label) = y_axis.tick_labels.get(i) {
            let label_x = area.left - 4.0 - if outward { tl } else { 0.0 };
            canvas.text(label_x, py, label, &y_label_style);
        }
    }
    for &val in y_axis.minor_ticks.iter().filter(|v| y_axis.contains(**v)) {
        let py = y_axis.data_to_pixel(val, area.bottom(), area.top);
        canvas.line(area.left, py, area.left + sign * mtl, py, &minor);
        if config.axes.show_right_ticks {
            canvas.line(area.right(), py, area.right() - sign * mtl, py, &minor);
        }
    }

    let label_style =
        TextStyle { size: config.font.label_size, anchor: TextAnchor::End, ..Default::default() };
    if !x_axis.label.is_empty() {
        let label_y = area.bottom()
            + config.font.tick_size
            + config.font.label_size
            + 10.0
            + if outward { tl } else { 0.0 };
        // Axis titles sit at the far end of the axis.
        canvas.text(area.right(), label_y, &x_axis.label, &label_style);
    }
    if !y_axis.label.is_empty() {
        canvas.text_rotated(area.y_label_x(config), area.top, &y_axis.label, &label_style, -90.0);
    }
}

/// Draw the plot frame only.
pub fn draw_frame(canvas: &mut Canvas, area: &PlotArea, style: &LineStyle) {
    canvas.line(area.left, area.top, area.right(), area.top, style);
    canvas.line(area.left, area.bottom(), area.right(), area.bottom(), style);
    canvas.line(area.left, area.top, area.left, area.bottom(), style);
    canvas.line(area.right(), area.top, area.right(), area.bottom(), style);
}
