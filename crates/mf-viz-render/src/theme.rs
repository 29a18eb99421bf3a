use crate::color::Color;
use crate::config::*;

/// Built-in theme presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTheme {
    /// Classic analysis-canvas look: boxed title, inward ticks on all sides, no grid,
    /// green/yellow expected bands.
    Root,
    /// Light grid, outward ticks, softer palette.
    Modern,
}

impl BuiltinTheme {
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "root" | "" => Ok(Self::Root),
            "modern" => Ok(Self::Modern),
            other => Err(crate::RenderError::Config(format!(
                "unknown theme '{other}' (expected 'root' or 'modern')"
            ))),
        }
    }

    pub fn base_config(self) -> VizConfig {
        match self {
            Self::Root => root(),
            Self::Modern => modern(),
        }
    }
}

fn root() -> VizConfig {
    VizConfig {
        theme: "root".into(),
        figure: FigureConfig::default(),
        font: FontConfig::default(),
        axes: AxesConfig::default(),
        grid: GridConfig::default(),
        title: TitleConfig::default(),
        legend: LegendConfig::default(),
        colors: ColorsConfig::default(),
        output: OutputConfig::default(),
    }
}

fn modern() -> VizConfig {
    VizConfig {
        theme: "modern".into(),
        figure: FigureConfig { width: 518.4, height: 345.6 },
        font: FontConfig { tick_size: 8.5, ..FontConfig::default() },
        axes: AxesConfig {
            tick_direction: "out".into(),
            show_top_ticks: false,
            show_right_ticks: false,
            tick_length: 4.0,
            minor_tick_length: 2.0,
        },
        grid: GridConfig { show: true, ..GridConfig::default() },
        title: TitleConfig { show: true, boxed: false },
        legend: LegendConfig { show: true, frame: false },
        colors: ColorsConfig {
            data: Color::hex("#111827"),
            observed: Color::hex("#111827"),
            expected: Color::hex("#1D4ED8"),
            band_1sigma: Color::hex("#7BD389"),
            band_2sigma: Color::hex("#F2D95C"),
            clsb: Color::hex("#4C78A8"),
            clb: Color::hex("#E45756"),
            threshold: Color::hex("#DC2626"),
            null_hist: Color::hex("#4C78A8"),
            alt_hist: Color::hex("#F58518"),
            param_box: Color::hex("#374151"),
        },
        ..root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_themes() {
        assert_eq!(BuiltinTheme::parse("ROOT").unwrap(), BuiltinTheme::Root);
        assert_eq!(BuiltinTheme::parse("modern").unwrap(), BuiltinTheme::Modern);
        assert!(BuiltinTheme::parse("atlas").is_err());
    }

    #[test]
    fn themes_differ() {
        let r = BuiltinTheme::Root.base_config();
        let m = BuiltinTheme::Modern.base_config();
        assert!(!r.grid.show && m.grid.show);
        assert_eq!(m.output.dpi, r.output.dpi);
    }
}
