/// Axis with tick generation and data-to-pixel mapping.
#[derive(Debug, Clone)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub log: bool,
    pub label: String,
    pub tick_positions: Vec<f64>,
    pub tick_labels: Vec<String>,
    pub minor_ticks: Vec<f64>,
}

impl Axis {
    /// Linear axis with "nice number" ticks covering `[data_min, data_max]`.
    pub fn auto_linear(data_min: f64, data_max: f64, target_ticks: usize) -> Self {
        let (nice_min, nice_max, step) = nice_range(data_min, data_max, target_ticks);
        Self::with_ticks(nice_min, nice_max, step)
    }

    /// Linear axis with the exact limits `[min, max]` and nice ticks inside them.
    pub fn exact_linear(min: f64, max: f64, target_ticks: usize) -> Self {
        let (_, _, step) = nice_range(min, max, target_ticks);
        let first = (min / step).ceil() * step;
        let mut ax = Self::with_ticks(first, (max / step).floor() * step, step);
        ax.min = min;
        ax.max = max;
        ax
    }

    fn with_ticks(first: f64, last: f64, step: f64) -> Self {
        let mut ticks = Vec::new();
        let mut labels = Vec::new();
        let n_major = ((last - first) / step).round().max(0.0) as usize;
        for i in 0..=n_major {
            let v = first + step * i as f64;
            ticks.push(v);
            labels.push(format_tick(v, step));
        }

        // Five subdivisions per major step.
        let minor_step = step / 5.0;
        let minor = (0..=n_major * 5)
            .filter(|i| i % 5 != 0)
            .map(|i| first + minor_step * i as f64)
            .collect();

        Self {
            min: first,
            max: last,
            log: false,
            label: String::new(),
            tick_positions: ticks,
            tick_labels: labels,
            minor_ticks: minor,
        }
    }

    /// Logarithmic axis spanning whole decades around `[data_min, data_max]`.
    pub fn auto_log(data_min: f64, data_max: f64) -> Self {
        let lo = data_min.max(1e-20);
        let hi = data_max.max(lo * 10.0);
        let log_min = lo.log10().floor() as i32;
        let log_max = hi.log10().ceil() as i32;

        let mut ticks = Vec::new();
        let mut labels = Vec::new();
        let mut minor = Vec::new();
        for exp in log_min..=log_max {
            let v = 10.0_f64.powi(exp);
            ticks.push(v);
            labels.push(format!("10{}", superscript(exp)));
            if exp < log_max {
                minor.extend((2..=9).map(|m| m as f64 * v));
            }
        }

        Self {
            min: 10.0_f64.powi(log_min),
            max: 10.0_f64.powi(log_max),
            log: true,
            label: String::new(),
            tick_positions: ticks,
            tick_labels: labels,
            minor_ticks: minor,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Map a data value to a pixel coordinate.
    pub fn data_to_pixel(&self, value: f64, px_min: f64, px_max: f64) -> f64 {
        let frac = if self.log {
            let log_min = self.min.max(1e-20).ln();
            let log_max = self.max.max(1e-20).ln();
            (value.max(1e-20).ln() - log_min) / (log_max - log_min)
        } else {
            (value - self.min) / (self.max - self.min)
        };
        px_min + frac * (px_max - px_min)
    }

    /// Whether `value` lies on the axis, allowing for rounding at the ends.
    pub fn contains(&self, value: f64) -> bool {
        let eps = 1e-9 * (self.max - self.min).abs();
        value >= self.min - eps && value <= self.max + eps
    }
}

/// "Nice numbers" tick spacing.
fn nice_range(data_min: f64, data_max: f64, target_ticks: usize) -> (f64, f64, f64) {
    if !data_min.is_finite() || !data_max.is_finite() {
        return (0.0, 1.0, 0.2);
    }
    if (data_max - data_min).abs() < 1e-15 {
        return (data_min - 1.0, data_max + 1.0, 1.0);
    }
    let (lo, hi) = if data_min < data_max { (data_min, data_max) } else { (data_max, data_min) };
    let rough_step = (hi - lo) / (target_ticks.max(2) - 1) as f64;
    let step = nice_step(rough_step);
    ((lo / step).floor() * step, (hi / step).ceil() * step, step)
}

fn nice_step(rough: f64) -> f64 {
    let exp = rough.abs().log10().floor();
    let frac = rough / 10.0_f64.powf(exp);
    let nice_frac = if frac <= 1.5 {
        1.0
    } else if frac <= 3.5 {
        2.0
    } else if frac <= 7.5 {
        5.0
    } else {
        10.0
    };
    nice_frac * 10.0_f64.powf(exp)
}

fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 { 0 } else { (-step.log10().floor()) as usize };
    // Avoid "-0".
    let v = if value.abs() < step * 0.01 { 0.0 } else { value };
    format!("{v:.decimals$}")
}

fn superscript(n: i32) -> String {
    n.to_string()
        .chars()
        .map(|c| match c {
            '-' => '\u{207B}',
            '0' => '\u{2070}',
            '1' => '\u{00B9}',
            '2' => '\u{00B2}',
            '3' => '\u{00B3}',
            '4' => '\u{2074}',
            '5' => '\u{2075}',
            '6' => '\u{2076}',
            '7' => '\u{2077}',
            '8' => '\u{2078}',
            '9' => '\u{2079}',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_linear_basic() {
        let ax = Axis::auto_linear(0.0, 10.0, 6);
        assert!(ax.min <= 0.0 && ax.max >= 10.0);
        assert_eq!(ax.tick_labels.first().map(String::as_str), Some("0"));
        assert_eq!(ax.minor_ticks.len(), (ax.tick_positions.len() - 1) * 4);
    }

    #[test]
    fn exact_linear_keeps_limits() {
        let ax = Axis::exact_linear(80.0, 200.0, 6);
        assert_eq!((ax.min, ax.max), (80.0, 200.0));
        assert!(ax.tick_positions.iter().all(|&t| (80.0..=200.0).contains(&t)));
        assert_eq!(ax.tick_labels[0], "80");
    }

    #[test]
    fn data_to_pixel_linear_and_log() {
        let ax = Axis::auto_linear(0.0, 100.0, 5);
        assert!((ax.data_to_pixel(50.0, 0.0, 500.0) - 250.0).abs() < 1.0);
        let lg = Axis::auto_log(0.01, 1.0);
        assert!((lg.data_to_pixel(0.1, 0.0, 200.0) - 100.0).abs() < 1e-9);
        assert_eq!(lg.tick_labels[0], "10\u{207B}\u{00B2}");
    }

    #[test]
    fn degenerate_ranges() {
        let ax = Axis::auto_linear(3.0, 3.0, 5);
        assert!(ax.min < 3.0 && ax.max > 3.0);
        let ax = Axis::auto_linear(f64::NAN, 1.0, 5);
        assert_eq!((ax.min, ax.max), (0.0, 1.0));
        let lg = Axis::auto_log(0.0, 0.0);
        assert!(lg.max > lg.min);
    }

    #[test]
    fn nice_step_values() {
        assert!((nice_step(3.2) - 2.0).abs() < 1e-9);
        assert!((nice_step(0.7) - 0.5).abs() < 1e-9);
        assert!((nice_step(15.0) - 10.0).abs() < 1e-9);
        assert!((nice_step(4.5) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn tick_formatting() {
        assert_eq!(format_tick(0.25, 0.05), "0.25");
        assert_eq!(format_tick(-1e-17, 0.1), "0.0");
        assert_eq!(format_tick(120.0, 20.0), "120");
    }
}
