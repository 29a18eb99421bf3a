//! `massfit example1`: Gaussian signal over an exponential background in the invariant
//! mass, unbinned and template (histogram) versions of the model, three fits and a
//! profile-likelihood test of the no-signal hypothesis.

use anyhow::{Context, Result};
use mf_core::LogDensityModel;
use mf_inference::{MaximumLikelihoodEstimator, ProfileLikelihoodCalculator};
use mf_model::{CompiledModel, Dataset, ModelConfig, RealVar, Workspace};
use mf_viz::{CurveOptions, DataErrors, FrameArtifact, LegendMark, LineKind};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::Example1Settings;
use crate::output::OutputDir;
use crate::report;

const OBS: &str = "invMass";

/// Observable, signal and background shapes, and `model = fsig·signal + (1-fsig)·background`
/// with `fsig = mu · ratioSigEff · fsigExpected`.
pub fn build_model(ws: &mut Workspace, bins: usize) -> Result<()> {
    let mut mass = RealVar::ranged(OBS, 80.0, 200.0)?.with_title("M_{inv}", "GeV");
    mass.set_bins(bins)?;
    ws.import_var(mass)?;

    ws.factory("Exponential::background(invMass, alpha[-0.01,-0.2,0.01])")?;
    ws.factory("Gaussian::signal(invMass, mean[125,90,160], sigma[10,0,20])")?;
    ws.set_constant("mean", true)?;
    ws.set_constant("sigma", true)?;

    ws.factory("mu[1,0,2]")?;
    ws.factory("fsigExpected[0.05,0,1]")?;
    ws.factory("ratioSigEff[1,0,2]")?;
    ws.set_constant("fsigExpected", true)?;
    ws.set_constant("ratioSigEff", true)?;
    ws.factory("prod::fsig(mu, ratioSigEff, fsigExpected)")?;
    ws.factory("SUM::model(fsig*signal, background)")?;
    Ok(())
}

pub fn run(cfg: &Example1Settings, out: &OutputDir) -> Result<()> {
    let mle = MaximumLikelihoodEstimator::new();
    let mut ws = Workspace::new("myWS");
    build_model(&mut ws, cfg.bins).context("building the invariant-mass model")?;

    let background = CompiledModel::from_workspace(&ws, "background")?;
    let signal = CompiledModel::from_workspace(&ws, "signal")?;
    let model = CompiledModel::from_workspace(&ws, "model")?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let bkg_events =
        background.generate(&background.parameter_init(), cfg.n_background, &mut rng)?;
    let sig_events = signal.generate(&signal.parameter_init(), cfg.n_signal, &mut rng)?;
    let data_events = model.generate(&model.parameter_init(), cfg.n_data, &mut rng)?;
    tracing::info!(
        background = bkg_events.n_events(),
        signal = sig_events.n_events(),
        data = data_events.n_events(),
        "generated toy samples"
    );

    let binning = ws.var(OBS)?.binning()?;
    let bkg_hist = bkg_events.binned_clone(&binning)?;
    let sig_hist = sig_events.binned_clone(&binning)?;
    let data_hist = data_events.binned_clone(&binning)?;

    ws.import_data("bkg_hist", bkg_hist.clone().into())?;
    ws.import_data("sig_hist", sig_hist.clone().into())?;
    ws.factory("HistPdf::bkg(invMass, bkg_hist)")?;
    ws.factory("HistPdf::sig(invMass, sig_hist)")?;
    ws.factory("SUM::binned_model(fsig*sig, bkg)")?;
    let data: Dataset = data_events.into();
    ws.import_data("data", data.clone())?;

    let bkg_data: Dataset = bkg_events.into();
    let sig_data: Dataset = sig_events.into();
    let bkg_hist: Dataset = bkg_hist.into();
    let sig_hist: Dataset = sig_hist.into();
    let data_hist: Dataset = data_hist.into();

    // Generated samples against their generating shapes.
    for (shape, sample, color, title, stem) in [
        (
            &background,
            &bkg_data,
            "blue",
            "Background PDF superimposed to generated data",
            "background",
        ),
        (&signal, &sig_data, "red", "Signal PDF superimposed to generated data", "signal"),
    ] {
        let mut frame = FrameArtifact::new(ws.var(OBS)?)?.with_title(title);
        frame.plot_data("data", sample, DataErrors::Poisson)?;
        frame.plot_model(shape, &shape.parameter_init(), CurveOptions::new(stem).color(color))?;
        out.save_plot(&frame, "frame", stem)?;
    }

    for (pdf, sample, color, title, stem) in [
        (
            "bkg",
            &bkg_hist,
            "blue",
            "Background HistPDF superimposed to generated data",
            "background_binned",
        ),
        (
            "sig",
            &sig_hist,
            "red",
            "Signal HistPDF superimposed to generated data",
            "signal_binned",
        ),
    ] {
        let template = CompiledModel::from_workspace(&ws, pdf)?;
        let mut frame = FrameArtifact::new(ws.var(OBS)?)?.with_title(title);
        frame.plot_data("data", sample, DataErrors::Poisson)?;
        frame.plot_model(&template, &[], CurveOptions::new(pdf).color(color).filled())?;
        out.save_plot(&frame, "frame", stem)?;
    }

    // Template model fitted to the binned data.
    let binned_model =
        CompiledModel::from_workspace(&ws, "binned_model")?.with_data(data_hist.clone())?;
    let fit = mle.fit(&binned_model).context("fitting binned_model")?;
    println!("{}", report::fit_table("binned_model", &fit));
    ws.apply_fit(&fit.parameter_names, &fit.parameters, &fit.uncertainties)?;

    let mut frame = FrameArtifact::new(ws.var(OBS)?)?.with_title(
        "An example fit to the signal + background model for binned dataset",
    );
    frame.plot_data("data", &data_hist, DataErrors::Poisson)?;
    frame.plot_model(
        &binned_model,
        &fit.parameters,
        CurveOptions::new("model").color("red").filled(),
    )?;
    frame.plot_model(
        &binned_model,
        &fit.parameters,
        CurveOptions::new("background")
            .component("bkg")
            .color("blue")
            .line(LineKind::Dashed)
            .filled(),
    )?;
    frame.param_box_from_fit(&fit);
    frame.add_legend("data", "Data", LegendMark::Marker)?;
    frame.add_legend("model", "Signal + background", LegendMark::Fill)?;
    frame.add_legend("background", "Background only", LegendMark::Fill)?;
    out.save_plot(&frame, "frame", "model_binned")?;

    // Unbinned signal + background fit.
    let sb_model = CompiledModel::from_workspace(&ws, "model")?.with_data(data.clone())?;
    let fit = mle.fit(&sb_model).context("fitting model")?;
    println!("{}", report::fit_table("model", &fit));
    ws.apply_fit(&fit.parameter_names, &fit.parameters, &fit.uncertainties)?;

    let mut frame = FrameArtifact::new(ws.var(OBS)?)?
        .with_title("An example fit to the signal + background model");
    frame.plot_data("data", &data, DataErrors::Poisson)?;
    frame.plot_model(&sb_model, &fit.parameters, CurveOptions::new("model").color("violet"))?;
    frame.plot_model(
        &sb_model,
        &fit.parameters,
        CurveOptions::new("signal only").component("signal").color("red").line(LineKind::Dashed),
    )?;
    frame.plot_model(
        &sb_model,
        &fit.parameters,
        CurveOptions::new("background")
            .component("background")
            .color("blue")
            .line(LineKind::Dashed),
    )?;
    frame.param_box_from_fit(&fit);
    frame.add_legend("data", "Data", LegendMark::Marker)?;
    frame.add_legend("model", "Signal + background", LegendMark::Line)?;
    frame.add_legend("background", "Background only", LegendMark::Line)?;
    frame.add_legend("signal only", "Signal only", LegendMark::Line)?;
    out.save_plot(&frame, "frame", "signal+background_model")?;

    // Background-only fit: signal strength fixed to zero.
    ws.set_value("mu", 0.0)?;
    ws.set_constant("mu", true)?;
    let b_model = CompiledModel::from_workspace(&ws, "model")?.with_data(data.clone())?;
    let fit = mle.fit(&b_model).context("fitting the background-only model")?;
    println!("{}", report::fit_table("model (mu = 0)", &fit));
    ws.apply_fit(&fit.parameter_names, &fit.parameters, &fit.uncertainties)?;

    let mut frame = FrameArtifact::new(ws.var(OBS)?)?
        .with_title("An example fit to the background-only model");
    frame.plot_data("data", &data, DataErrors::SumW2)?;
    frame.plot_model(&b_model, &fit.parameters, CurveOptions::new("model").color("violet"))?;
    frame.plot_model(
        &b_model,
        &fit.parameters,
        CurveOptions::new("background")
            .component("background")
            .color("blue")
            .line(LineKind::Dashed),
    )?;
    frame.param_box_from_fit(&fit);
    frame.add_legend("data", "Data", LegendMark::Marker)?;
    frame.add_legend("model", "Signal + background", LegendMark::Line)?;
    frame.add_legend("background", "Background only", LegendMark::Line)?;
    out.save_plot(&frame, "frame", "backgroundonly")?;

    // Profile likelihood test of mu = null_mu with mu floating again.
    ws.set_constant("mu", false)?;
    let mc = ModelConfig::new("ModelConfig", "model").with_observables([OBS]).with_pois(["mu"]);
    let test_model = CompiledModel::from_model_config(&ws, &mc)?.with_data(data)?;
    let plc = ProfileLikelihoodCalculator::new(test_model);
    let htr = plc.hypotest(cfg.null_mu).context("profile likelihood hypothesis test")?;

    println!("{}", report::significance_summary(&htr));
    println!("{htr}");
    Ok(())
}
