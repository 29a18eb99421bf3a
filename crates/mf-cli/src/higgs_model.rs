//! `massfit higgs-model`: extended `nsig·Gaussian + nbkg·Exponential` on `x ∈ [80, 200]`.
//! Generates the expected number of events, fits, plots and writes the workspace with its
//! model config for `massfit hypothesis-test`.

use anyhow::{Context, Result};
use mf_inference::MaximumLikelihoodEstimator;
use mf_model::{CompiledModel, Dataset, ModelConfig, Workspace};
use mf_viz::{CurveOptions, DataErrors, FrameArtifact, LegendMark, LineKind};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

use crate::config::HiggsModelSettings;
use crate::output::OutputDir;
use crate::report;

pub fn build_model(ws: &mut Workspace, cfg: &HiggsModelSettings) -> Result<()> {
    ws.factory("Exponential:bkg_pdf(x[80,200], a[-0.01,-0.2,0.01])")?;
    ws.factory("Gaussian:sig_pdf(x, mass[125], sigma[10])")?;
    ws.factory("SUM:model(nsig[0,10000]*sig_pdf, nbkg[0,10000]*bkg_pdf)")?;
    ws.set_value("nsig", cfg.nsig)?;
    ws.set_value("nbkg", cfg.nbkg)?;
    ws.var_mut("x")?.set_bins(cfg.bins)?;
    Ok(())
}

/// Config naming `nsig` as the parameter of interest and `a, nbkg` as nuisances.
pub fn model_config(ws: &mut Workspace) -> Result<ModelConfig> {
    ws.define_set("nuisParams", &["a", "nbkg"])?;
    let nuisance = ws.set("nuisParams")?.to_vec();
    Ok(ModelConfig::new("ModelConfig", "model")
        .with_pois(["nsig"])
        .with_observables(["x"])
        .with_nuisance(nuisance))
}

pub fn run(cfg: &HiggsModelSettings, out: &OutputDir) -> Result<PathBuf> {
    let mut ws = Workspace::new("w");
    build_model(&mut ws, cfg).context("building the Higgs model")?;
    let pdf = CompiledModel::from_workspace(&ws, "model")?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let init: Vec<f64> = pdf.parameters().iter().map(|p| p.init).collect();
    let data: Dataset = pdf.generate_expected(&init, &mut rng)?.into();
    println!("{}", data.describe("data"));
    ws.import_data("data", data.clone())?;

    let pdf = pdf.with_data(data.clone())?;
    let fit = MaximumLikelihoodEstimator::new().fit(&pdf).context("fitting model")?;
    println!("{}", report::fit_table("model", &fit));
    if let Some(corr) = report::correlation_table(&fit) {
        println!("  Correlation matrix\n{corr}");
    }
    ws.apply_fit(&fit.parameter_names, &fit.parameters, &fit.uncertainties)?;

    let mut frame = FrameArtifact::new(ws.var("x")?)?
        .with_title("Gaussian Signal over Exponential Background");
    frame.plot_data("data", &data, DataErrors::Poisson)?;
    frame.plot_model(&pdf, &fit.parameters, CurveOptions::new("model").color("violet"))?;
    frame.plot_model(
        &pdf,
        &fit.parameters,
        CurveOptions::new("background").component("bkg_pdf").color("blue").line(LineKind::Dashed),
    )?;
    frame.plot_model(
        &pdf,
        &fit.parameters,
        CurveOptions::new("signal only").component("sig_pdf").color("red").line(LineKind::Dashed),
    )?;
    frame.param_box_from_fit(&fit);
    frame.add_legend("data", "Data", LegendMark::Marker)?;
    frame.add_legend("model", "Signal + background", LegendMark::Line)?;
    frame.add_legend("background", "Background only", LegendMark::Line)?;
    frame.add_legend("signal only", "Signal only", LegendMark::Line)?;
    out.save_plot(&frame, "frame", "Signal+background_model")?;

    let mc = model_config(&mut ws)?;
    ws.import_model_config(mc)?;

    let path = out.path(&cfg.file);
    ws.write_to_file(&path).with_context(|| format!("writing {}", path.display()))?;
    println!("model written to file {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::PoiModel;

    #[test]
    fn model_config_roles() {
        let cfg = HiggsModelSettings::default();
        let mut ws = Workspace::new("w");
        build_model(&mut ws, &cfg).unwrap();
        let mc = model_config(&mut ws).unwrap();
        assert_eq!(mc.poi(), Some("nsig"));
        assert_eq!(mc.nuisance, vec!["a".to_string(), "nbkg".to_string()]);

        let model = CompiledModel::from_model_config(&ws, &mc).unwrap();
        assert!(model.is_extended());
        assert_eq!(model.poi_index(), model.parameter_index("nsig"));
        let init: Vec<f64> = model.parameters().iter().map(|p| p.init).collect();
        let nu = model.expected_events(&init).unwrap().unwrap();
        assert!((nu - 1100.0).abs() < 1e-9);
    }
}
