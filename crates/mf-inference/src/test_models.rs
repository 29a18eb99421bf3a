//! Small models shared by unit tests.

use mf_model::{BinnedData, Binning, CompiledModel, Workspace};

/// Flat background plus a narrow Gaussian signal on `x ∈ [0, 4]`, binned like `observed`.
///
/// POI `nsig` in `[0, 200]`, nuisance `nbkg` in `[0, 500]`.
pub(crate) fn counting_model(observed: &[f64]) -> CompiledModel {
    let mut ws = Workspace::new("w");
    ws.factory("x[0,4]").unwrap();
    ws.factory("Gaussian::sig(x, m[1.5], s[0.3])").unwrap();
    ws.factory("Exponential::bkg(x, c[0])").unwrap();
    ws.factory("SUM::model(nsig[0,0,200]*sig, nbkg[40,0,500]*bkg)").unwrap();
    let binning = Binning::new(0.0, 4.0, observed.len()).unwrap();
    let data = BinnedData::from_counts("x", binning, observed.to_vec()).unwrap();
    CompiledModel::from_workspace(&ws, "model")
        .unwrap()
        .with_poi("nsig")
        .unwrap()
        .with_data(data.into())
        .unwrap()
}

/// Template sum `mu·sig + Bscale·bkg` over four unit bins, fitted to `observed`.
///
/// POI `mu` in `[-1, 6]` starting at 1, `Bscale` in `[0, 6]` starting at 3. Negative
/// `mu` with small `Bscale` leaves the physical region.
pub(crate) fn template_model(observed: &[f64]) -> CompiledModel {
    let mut ws = Workspace::new("w");
    ws.factory("x[0,4]").unwrap();
    let binning = Binning::new(0.0, 4.0, 4).unwrap();
    let sig = BinnedData::from_counts("x", binning, vec![0.0, 2.0, 6.0, 2.0]).unwrap();
    let bkg = BinnedData::from_counts("x", binning, vec![4.0, 4.0, 4.0, 4.0]).unwrap();
    ws.import_data("sig_hist", sig.into()).unwrap();
    ws.import_data("bkg_hist", bkg.into()).unwrap();
    ws.factory("HistFunc::sig(x, sig_hist)").unwrap();
    ws.factory("HistFunc::bkg(x, bkg_hist)").unwrap();
    ws.factory("ASUM::model(mu[1,-1,6]*sig, Bscale[3,0,6]*bkg)").unwrap();
    let data = BinnedData::from_counts("x", binning, observed.to_vec()).unwrap();
    CompiledModel::from_workspace(&ws, "model")
        .unwrap()
        .with_poi("mu")
        .unwrap()
        .with_data(data.into())
        .unwrap()
}
