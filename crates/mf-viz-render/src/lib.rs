//! # mf-viz-render
//!
//! Draws `mf-viz` artifacts as SVG and, with the `png` feature, rasterizes them to PNG.
//!
//! Artifacts cross the boundary as JSON so that any producer of the artifact schema (the
//! CLI, a saved run) can be rendered:
//!
//! ```no_run
//! use mf_viz_render::{config::VizConfig, render_svg};
//!
//! let json = std::fs::read_to_string("cls.json").unwrap();
//! let svg = render_svg(&json, "cls", &VizConfig::default()).unwrap();
//! ```

#![warn(clippy::all)]

pub mod canvas;
pub mod color;
pub mod config;
pub mod font;
pub mod layout;
pub mod output;
pub mod plots;
pub mod primitives;
pub mod text;
pub mod theme;
pub mod title;

use config::VizConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown artifact kind: {0}")]
    UnknownKind(String),
    #[error("unsupported output format: {0}")]
    UnknownFormat(String),
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("layout error: {0}")]
    Layout(String),
    #[error("font error: {0}")]
    Font(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "png")]
    #[error("PNG encoding error: {0}")]
    Png(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Artifact kinds accepted by [`render_svg`].
pub const KINDS: &[&str] = &["frame", "cls", "test_stat", "profile"];

/// Render an artifact JSON document to an SVG string.
pub fn render_svg(artifact_json: &str, kind: &str, config: &VizConfig) -> Result<String> {
    let svg = match kind {
        "frame" => {
            let art: mf_viz::FrameArtifact = serde_json::from_str(artifact_json)?;
            plots::frame::render(&art, config)?
        }
        "cls" | "cls_curve" => {
            let art: mf_viz::ClsCurveArtifact = serde_json::from_str(artifact_json)?;
            plots::cls_curve::render(&art, config)?
        }
        "test_stat" => {
            let art: mf_viz::TestStatArtifact = serde_json::from_str(artifact_json)?;
            plots::test_stat::render(&art, config)?
        }
        "profile" => {
            let art: mf_viz::ProfileCurveArtifact = serde_json::from_str(artifact_json)?;
            plots::profile::render(&art, config)?
        }
        other => return Err(RenderError::UnknownKind(other.to_string())),
    };
    Ok(svg)
}

/// Render an artifact JSON document to bytes in `format` (`"svg"` or `"png"`).
pub fn render_to_bytes(
    artifact_json: &str,
    kind: &str,
    format: &str,
    config: &VizConfig,
) -> Result<Vec<u8>> {
    let svg = render_svg(artifact_json, kind, config)?;
    match format.to_ascii_lowercase().as_str() {
        "svg" => Ok(svg.into_bytes()),
        #[cfg(feature = "png")]
        "png" => output::png::svg_to_png(&svg, config.output.dpi),
        other => Err(RenderError::UnknownFormat(other.to_string())),
    }
}

/// Render an artifact JSON document to a file; the format follows the extension
/// (`.svg` when there is none).
pub fn render_to_file(
    artifact_json: &str,
    kind: &str,
    path: &std::path::Path,
    config: &VizConfig,
) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("svg");
    let bytes = render_to_bytes(artifact_json, kind, ext, config)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
        "poi_name": "mu",
        "mu_hat": 1.0,
        "mu_values": [0.0, 1.0, 2.0],
        "delta_nll": [0.5, 0.0, 0.5]
    }"#;

    #[test]
    fn dispatch_by_kind() {
        let svg = render_svg(PROFILE, "profile", &VizConfig::default()).unwrap();
        assert!(svg.contains("PLL scan of mu"));
        assert!(matches!(
            render_svg(PROFILE, "pie", &VizConfig::default()),
            Err(RenderError::UnknownKind(_))
        ));
        assert!(matches!(
            render_svg("{", "profile", &VizConfig::default()),
            Err(RenderError::Deserialize(_))
        ));
    }

    #[test]
    fn unknown_format() {
        assert!(matches!(
            render_to_bytes(PROFILE, "profile", "gif", &VizConfig::default()),
            Err(RenderError::UnknownFormat(_))
        ));
    }

    #[test]
    fn writes_file_by_extension() {
        let path = std::env::temp_dir().join(format!("mf_viz_render_{}.svg", std::process::id()));
        render_to_file(PROFILE, "profile", &path, &VizConfig::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(text.starts_with("<svg"));
    }
}
