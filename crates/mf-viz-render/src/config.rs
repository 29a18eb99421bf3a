use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;

use crate::color::Color;
use crate::theme::BuiltinTheme;

/// Top-level rendering configuration (YAML or programmatic).
///
/// Every section is optional in YAML; missing keys fall back to the selected theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VizConfig {
    pub theme: String,
    pub figure: FigureConfig,
    pub font: FontConfig,
    pub axes: AxesConfig,
    pub grid: GridConfig,
    pub title: TitleConfig,
    pub legend: LegendConfig,
    pub colors: ColorsConfig,
    pub output: OutputConfig,
}

impl Default for VizConfig {
    fn default() -> Self {
        BuiltinTheme::Root.base_config()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureConfig {
    /// Width in points.
    pub width: f64,
    /// Height in points.
    pub height: f64,
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self { width: 504.0, height: 360.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// CSS font-family list written on every text element.
    pub family: String,
    /// Embed the bundled faces in SVG output (PNG output always uses them).
    pub embed: bool,
    pub size: f64,
    pub label_size: f64,
    pub tick_size: f64,
    pub title_size: f64,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: "DejaVu Sans, sans-serif".into(),
            embed: false,
            size: 10.0,
            label_size: 11.0,
            tick_size: 9.0,
            title_size: 12.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AxesConfig {
    /// `"in"` or `"out"`.
    pub tick_direction: String,
    pub show_top_ticks: bool,
    pub show_right_ticks: bool,
    pub tick_length: f64,
    pub minor_tick_length: f64,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            tick_direction: "in".into(),
            show_top_ticks: true,
            show_right_ticks: true,
            tick_length: 6.0,
            minor_tick_length: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub show: bool,
    pub color: Color,
    pub alpha: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { show: false, color: Color::hex("#CBD5E1"), alpha: 0.55 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub show: bool,
    /// Draw the title inside a framed box.
    pub boxed: bool,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self { show: true, boxed: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegendConfig {
    pub show: bool,
    pub frame: bool,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self { show: true, frame: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub data: Color,
    pub observed: Color,
    pub expected: Color,
    pub band_1sigma: Color,
    pub band_2sigma: Color,
    pub clsb: Color,
    pub clb: Color,
    pub threshold: Color,
    pub null_hist: Color,
    pub alt_hist: Color,
    pub param_box: Color,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            data: Color::BLACK,
            observed: Color::BLACK,
            expected: Color::BLACK,
            band_1sigma: Color::rgb(0, 255, 0),
            band_2sigma: Color::rgb(255, 255, 0),
            clsb: Color::rgb(0, 0, 255),
            clb: Color::rgb(255, 0, 0),
            threshold: Color::rgb(255, 0, 0),
            null_hist: Color::rgb(0, 0, 255),
            alt_hist: Color::rgb(255, 0, 0),
            param_box: Color::BLACK,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dpi: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dpi: 144 }
    }
}

/// Resolve a config from optional YAML text: the selected theme's base config with the
/// user's keys merged over it.
pub fn resolve_config(user_yaml: Option<&str>) -> crate::Result<VizConfig> {
    match user_yaml {
        None => Ok(VizConfig::default()),
        Some(yaml) => {
            let value: Value = serde_yaml_ng::from_str(yaml)
                .map_err(|e| crate::RenderError::Config(e.to_string()))?;
            resolve_value(value)
        }
    }
}

/// Same as [`resolve_config`] for an already parsed YAML/JSON tree.
pub fn resolve_value(user: Value) -> crate::Result<VizConfig> {
    let theme = match &user {
        Value::Null => return Ok(VizConfig::default()),
        Value::Mapping(m) => m.get("theme").and_then(Value::as_str).unwrap_or("root").to_string(),
        _ => return Err(crate::RenderError::Config("plot config must be a mapping".into())),
    };
    let base = BuiltinTheme::parse(&theme)?.base_config();
    let mut merged = serde_yaml_ng::to_value(&base)
        .map_err(|e| crate::RenderError::Config(e.to_string()))?;
    merge(&mut merged, user);
    serde_yaml_ng::from_value(merged).map_err(|e| crate::RenderError::Config(e.to_string()))
}

fn merge(base: &mut Value, user: Value) {
    match (base, user) {
        (Value::Mapping(b), Value::Mapping(u)) => {
            for (k, v) in u {
                match b.get_mut(&k) {
                    Some(slot) => merge(slot, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}
