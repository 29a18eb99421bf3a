//! `massfit higgs-hist-model`: histogram templates for signal and background, mock data
//! at a chosen signal strength, and the template model `S·sig + B·bkg` with
//! `S = mu·L·binw`, `B = Bscale·L·binw`.

use anyhow::{Context, Result};
use mf_inference::MaximumLikelihoodEstimator;
use mf_model::{BinnedData, CompiledModel, Dataset, ModelConfig, Workspace};
use mf_viz::{CurveOptions, DataErrors, FrameArtifact, LegendMark, LineKind};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

use crate::config::HiggsHistModelSettings;
use crate::output::OutputDir;
use crate::report;

/// Simulated templates and pseudo-data.
pub struct Templates {
    pub x: mf_model::RealVar,
    pub signal: BinnedData,
    pub background: BinnedData,
    pub data: BinnedData,
}

/// Generate the templates and the mock data in a scratch workspace.
pub fn simulate(cfg: &HiggsHistModelSettings) -> Result<Templates> {
    let mut wsim = Workspace::new("wsim");
    wsim.factory("Exponential:bkg_pdf(x[40,400], a[-0.01,-10,0])")?;
    wsim.factory("Gaussian:sig_pdf(x, mass[125,80,400], sigma[5,1,10])")?;
    let binning = wsim.var("x")?.binning()?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let sig = CompiledModel::from_workspace(&wsim, "sig_pdf")?;
    let bkg = CompiledModel::from_workspace(&wsim, "bkg_pdf")?;
    let signal = sig.generate_binned(&init(&sig), Some(cfg.n_signal), &binning, &mut rng)?;
    let background = bkg.generate_binned(&init(&bkg), Some(cfg.n_background), &binning, &mut rng)?;

    wsim.factory(&format!("expr::S('mu*Snom', mu[{}], Snom[{}])", cfg.mu_true, cfg.n_signal))?;
    wsim.factory(&format!("SUM::model(S*sig_pdf, Bnom[{}]*bkg_pdf)", cfg.n_background))?;
    let truth = CompiledModel::from_workspace(&wsim, "model")?;
    let data = truth.generate_binned(&init(&truth), None, &binning, &mut rng)?;
    tracing::info!(
        signal = signal.total(),
        background = background.total(),
        data = data.total(),
        "generated templates and mock data"
    );

    Ok(Templates { x: wsim.var("x")?.clone(), signal, background, data })
}

fn init(model: &CompiledModel) -> Vec<f64> {
    model.parameters().iter().map(|p| p.init).collect()
}

/// Template model over `t`.
pub fn build_model(t: &Templates) -> Result<Workspace> {
    let mut w = Workspace::new("w");
    w.import_var(t.x.clone())?;
    w.import_data("template_sig", t.signal.clone().into())?;
    w.import_data("template_bkg", t.background.clone().into())?;
    w.import_data("observed_data", t.data.clone().into())?;
    w.factory("HistFunc::sig(x, template_sig)")?;
    w.factory("HistFunc::bkg(x, template_bkg)")?;
    // Bin width of the templates; L scales the simulation luminosity to the data.
    w.factory("binw[0.277]")?;
    w.factory("L[1]")?;
    w.factory("expr::S('mu*L*binw', mu[1,-1,6], L, binw[0.277])")?;
    w.factory("expr::B('Bscale*L*binw', Bscale[0,6], L, binw)")?;
    w.factory("ASUM::model(S*sig, B*bkg)")?;
    Ok(w)
}

pub fn model_config() -> ModelConfig {
    let mut mc = ModelConfig::new("ModelConfig", "model")
        .with_pois(["mu"])
        .with_observables(["x"])
        .with_nuisance(["Bscale"]);
    mc.set_snapshot("mu", 1.0);
    mc
}

pub fn run(cfg: &HiggsHistModelSettings, out: &OutputDir) -> Result<PathBuf> {
    let templates = simulate(cfg).context("simulating templates")?;
    let mut w = build_model(&templates).context("building the template model")?;
    let data: Dataset = templates.data.into();

    let model = CompiledModel::from_workspace(&w, "model")?.with_data(data.clone())?;
    let fit = MaximumLikelihoodEstimator::new().fit(&model).context("fitting model")?;
    println!("{}", report::fit_table("model", &fit));
    w.apply_fit(&fit.parameter_names, &fit.parameters, &fit.uncertainties)?;

    let mut frame = FrameArtifact::new(w.var("x")?)?;
    frame.plot_data("data", &data, DataErrors::Poisson)?;
    frame.plot_model(&model, &fit.parameters, CurveOptions::new("model").color("violet"))?;
    frame.plot_model(
        &model,
        &fit.parameters,
        CurveOptions::new("background").component("bkg").color("blue").line(LineKind::Dashed),
    )?;
    frame.plot_model(
        &model,
        &fit.parameters,
        CurveOptions::new("signal only").component("sig").color("red").line(LineKind::Dashed),
    )?;
    frame.add_legend("data", "Data", LegendMark::Marker)?;
    frame.add_legend("model", "Signal + background", LegendMark::Line)?;
    frame.add_legend("background", "Background only", LegendMark::Line)?;
    frame.add_legend("signal only", "Signal only", LegendMark::Line)?;
    out.save_plot(&frame, "frame", "Signal+background_model")?;

    let mc = model_config();
    w.set_value("mu", 1.0)?;
    print!("{mc}");
    w.import_model_config(mc)?;

    let path = out.path(&cfg.file);
    w.write_to_file(&path).with_context(|| format!("writing {}", path.display()))?;
    println!("model written to file {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::LogDensityModel;

    #[test]
    fn templates_and_model() {
        let cfg = HiggsHistModelSettings {
            n_signal: 50.0,
            n_background: 500.0,
            ..HiggsHistModelSettings::default()
        };
        let t = simulate(&cfg).unwrap();
        assert_eq!(t.signal.binning(), t.data.binning());
        assert!(t.background.total() > 300.0);

        let w = build_model(&t).unwrap();
        let model = CompiledModel::from_model_config(&w, &model_config()).unwrap();
        assert!(model.is_extended());
        assert_eq!(model.parameter_names(), vec!["mu".to_string(), "Bscale".to_string()]);
    }

    #[test]
    fn template_fit_recovers_injected_strength() {
        let cfg = HiggsHistModelSettings::default();
        let t = simulate(&cfg).unwrap();
        let w = build_model(&t).unwrap();
        let model = CompiledModel::from_model_config(&w, &model_config())
            .unwrap()
            .with_data(t.data.clone().into())
            .unwrap();
        let fit = MaximumLikelihoodEstimator::new().fit(&model).unwrap();

        assert!(fit.converged, "{}", fit.termination_reason);
        assert!(fit.n_iter > 1);
        let mu = fit.value("mu").unwrap();
        let err = fit.uncertainties[model.parameter_index("mu").unwrap()];
        assert!(err.is_finite() && err > 0.0);
        assert!((mu - cfg.mu_true).abs() < 3.0 * err, "mu = {mu} +/- {err}");
        let bscale = fit.value("Bscale").unwrap();
        assert!((bscale - 1.0).abs() < 0.1, "Bscale = {bscale}");
    }
}
