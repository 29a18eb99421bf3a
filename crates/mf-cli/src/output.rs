//! Where workflow products go: plots rendered through `mf-viz-render`, workspace files.

use anyhow::{Context, Result};
use mf_viz_render::config::VizConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::CliConfig;

#[derive(Debug, Clone)]
pub struct OutputDir {
    dir: PathBuf,
    format: String,
    viz: VizConfig,
}

impl OutputDir {
    pub fn from_config(cfg: &CliConfig) -> Result<Self> {
        let format = cfg.output.format.to_ascii_lowercase();
        if format != "png" && format != "svg" {
            anyhow::bail!("output.format must be 'png' or 'svg', got '{}'", cfg.output.format);
        }
        std::fs::create_dir_all(&cfg.output.dir)
            .with_context(|| format!("creating output directory {}", cfg.output.dir.display()))?;
        Ok(Self { dir: cfg.output.dir.clone(), format, viz: cfg.viz()? })
    }

    /// Path of a product inside the output directory.
    pub fn path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() { file.to_path_buf() } else { self.dir.join(file) }
    }

    /// Render `artifact` (an `mf-viz` artifact of `kind`) to `<dir>/<stem>.<format>`.
    pub fn save_plot<A: Serialize>(&self, artifact: &A, kind: &str, stem: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.{}", sanitize_file_stem(stem), self.format));
        let json = serde_json::to_string(artifact)?;
        mf_viz_render::render_to_file(&json, kind, &path, &self.viz)
            .with_context(|| format!("rendering {}", path.display()))?;
        tracing::info!(path = %path.display(), kind, "plot saved");
        Ok(path)
    }
}

/// File stem safe for common file systems: whitespace and path separators become `_`.
pub fn sanitize_file_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for c in stem.trim().chars() {
        match c {
            c if c.is_whitespace() => out.push('_'),
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c => out.push(c),
        }
    }
    // Collapse runs left by sequences such as " _".
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    out
}
