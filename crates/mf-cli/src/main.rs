//! massfit CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mf_inference::MaximumLikelihoodEstimator;
use mf_model::{CompiledModel, Workspace};
use std::path::{Path, PathBuf};

mod config;
mod example1;
mod higgs_hist_model;
mod higgs_model;
mod output;
mod report;

use output::OutputDir;

#[derive(Parser)]
#[command(name = "massfit")]
#[command(about = "massfit - signal plus background fits, hypothesis tests and limits")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Settings file (YAML, or JSON by extension). Missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for plots and workspace files (overrides `output.dir`).
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invariant-mass toy study: templates, fits, plots and a profile-likelihood test
    Example1,

    /// Build, generate and fit the extended Higgs model; write the workspace file
    HiggsModel,

    /// Discovery tests, CLs limits and a likelihood interval from a workspace file
    HypothesisTest {
        /// Workspace file. Defaults to `HiggsModel.json` in the output directory.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Workspace name stored in the file
        #[arg(long, default_value = "w")]
        workspace: String,

        /// Model config name
        #[arg(long, default_value = "ModelConfig")]
        model_config: String,

        /// Dataset name
        #[arg(long, default_value = "data")]
        data: String,
    },

    /// Histogram-template model with mock data; write the workspace file
    HiggsHistModel,

    /// Maximum-likelihood fit of a PDF in a workspace file to one of its datasets
    Fit {
        /// Workspace file
        #[arg(short, long)]
        input: PathBuf,

        /// PDF to fit. Defaults to the PDF of `--model-config` when given, else `model`.
        #[arg(long)]
        pdf: Option<String>,

        /// Model config selecting the PDF and the POI
        #[arg(long)]
        model_config: Option<String>,

        /// Dataset name
        #[arg(long, default_value = "data")]
        data: String,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports and JSON.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = config::read_config(cli.config.as_deref())?;
    if let Some(dir) = cli.out_dir {
        cfg.output.dir = dir;
    }

    match cli.command {
        Commands::Example1 => {
            let out = OutputDir::from_config(&cfg)?;
            example1::run(&cfg.example1, &out)
        }
        Commands::HiggsModel => {
            let out = OutputDir::from_config(&cfg)?;
            higgs_model::run(&cfg.higgs_model, &out).map(|_| ())
        }
        Commands::HypothesisTest { file, workspace, model_config, data } => {
            let out = OutputDir::from_config(&cfg)?;
            let file = match file {
                Some(f) => f,
                None => out.path(&cfg.higgs_model.file),
            };
            let inputs = hypothesis_test::Inputs {
                file: &file,
                workspace: &workspace,
                model_config: &model_config,
                data: &data,
            };
            hypothesis_test::run(&inputs, &cfg.hypothesis_test, &out)
        }
        Commands::HiggsHistModel => {
            let out = OutputDir::from_config(&cfg)?;
            higgs_hist_model::run(&cfg.higgs_hist_model, &out).map(|_| ())
        }
        Commands::Fit { input, pdf, model_config, data, output } => {
            cmd_fit(&input, pdf.as_deref(), model_config.as_deref(), &data, output.as_deref())
        }
    }
}

fn cmd_fit(
    input: &Path,
    pdf: Option<&str>,
    model_config: Option<&str>,
    data: &str,
    output: Option<&Path>,
) -> Result<()> {
    let ws = Workspace::read_from_file(input)
        .with_context(|| format!("reading workspace file {}", input.display()))?;

    let (model, poi) = match model_config {
        Some(name) => {
            let mc = ws.model_config(name)?;
            let model = match pdf {
                Some(p) if p != mc.pdf => CompiledModel::from_workspace(&ws, p)?,
                _ => CompiledModel::from_model_config(&ws, mc)?,
            };
            let poi = mc.poi().filter(|p| model.parameter_index(p).is_some());
            let model = match poi {
                Some(p) => model.with_poi(p)?,
                None => model,
            };
            (model, poi.map(str::to_string))
        }
        None => (CompiledModel::from_workspace(&ws, pdf.unwrap_or("model"))?, None),
    };
    let model = model.with_data(ws.data(data)?.clone())?;

    let fit = MaximumLikelihoodEstimator::new()
        .fit(&model)
        .with_context(|| format!("fitting '{}' to '{data}'", model.pdf_name()))?;
    tracing::info!(nll = fit.nll, converged = fit.converged, "fit complete");

    let json = report::fit_json(&fit, model.pdf_name(), data, poi.as_deref());
    write_json(output, json)
}

fn write_json(output: Option<&Path>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
