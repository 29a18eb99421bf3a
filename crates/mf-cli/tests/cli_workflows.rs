use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_massfit"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("massfit_cli_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

/// Small samples and few toys so that every workflow runs in seconds; SVG output avoids
/// depending on system fonts.
const SMALL_CONFIG: &str = "\
output:
  format: svg
example1:
  n_background: 1000
  n_signal: 100
  n_data: 800
hypothesis_test:
  scan_points: 4
  scan_min: 0
  scan_max: 150
  toys_null: 24
  toys_alt: 24
  test_stat_bins: 10
  profile_points: 11
higgs_hist_model:
  n_background: 2000
  n_signal: 100
";

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("massfit.yaml");
    std::fs::write(&path, SMALL_CONFIG).unwrap();
    path
}

fn run(dir: &Path, args: &[&str]) -> Output {
    let cfg = write_config(dir);
    let mut all = vec!["--config", cfg.to_str().unwrap(), "--out-dir", dir.to_str().unwrap()];
    all.extend_from_slice(args);
    Command::new(bin_path())
        .args(&all)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), all, e))
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "command failed\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

fn assert_svg(path: &Path) {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("missing plot {}: {e}", path.display()));
    assert!(text.starts_with("<svg"), "{} is not an SVG document", path.display());
}

#[test]
fn help_lists_workflows() {
    let out = Command::new(bin_path()).arg("--help").output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for cmd in ["example1", "higgs-model", "hypothesis-test", "higgs-hist-model", "fit"] {
        assert!(text.contains(cmd), "help does not mention {cmd}:\n{text}");
    }
}

#[test]
fn hypothesis_test_missing_file_fails() {
    let dir = tmp_dir("missing");
    let out = run(&dir, &["hypothesis-test", "--file", "does_not_exist.json"]);
    assert!(!out.status.success(), "expected failure for a missing workspace file");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("not found"), "stderr: {stderr}");
}

#[test]
fn bad_config_fails() {
    let dir = tmp_dir("badcfg");
    let cfg = dir.join("bad.yaml");
    std::fs::write(&cfg, "hypothesis_tset:\n  toys_null: 3\n").unwrap();
    let out = Command::new(bin_path())
        .args(["--config", cfg.to_str().unwrap(), "higgs-model"])
        .output()
        .unwrap();
    assert!(!out.status.success());
}

#[test]
fn higgs_model_then_fit_and_hypothesis_test() {
    let dir = tmp_dir("higgs");

    let out = run(&dir, &["higgs-model"]);
    assert_success(&out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("data[x] = 1100 entries"), "stdout: {stdout}");
    assert!(stdout.contains("model written to file"));
    let ws_file = dir.join("HiggsModel.json");
    assert!(ws_file.exists());
    assert_svg(&dir.join("Signal+background_model.svg"));

    let fit_json = dir.join("fit.json");
    let out = run(
        &dir,
        &[
            "fit",
            "--input",
            ws_file.to_str().unwrap(),
            "--model-config",
            "ModelConfig",
            "--output",
            fit_json.to_str().unwrap(),
        ],
    );
    assert_success(&out);
    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&fit_json).unwrap()).unwrap();
    assert_eq!(v["poi"], "nsig");
    let names: Vec<&str> =
        v["parameter_names"].as_array().unwrap().iter().map(|n| n.as_str().unwrap()).collect();
    assert_eq!(names, ["nsig", "nbkg", "a"]);
    let nsig = v["bestfit"][0].as_f64().unwrap();
    assert!(nsig > 0.0 && nsig < 400.0, "nsig = {nsig}");
    assert!(v["nll"].as_f64().unwrap().is_finite());

    let out = run(&dir, &["hypothesis-test"]);
    assert_success(&out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Results AsymptoticCalculator"), "stdout: {stdout}");
    assert!(stdout.contains("68.3%  upper limit"));
    assert!(stdout.contains("Run now FrequentistCalculator"));
    assert!(stdout.contains("68% CL interval: ["));
    assert!(stdout.contains("Results ProfileLikelihoodCalculator"));
    for plot in [
        "Brazil_plot_asymptotic.svg",
        "test_statistic_distributions.svg",
        "Brazil_plot_frequentist.svg",
        "Negative_logarithm_of_the_profile_likelihood.svg",
    ] {
        assert_svg(&dir.join(plot));
    }
}

#[test]
fn hypothesis_test_wrong_workspace_name_fails() {
    let dir = tmp_dir("wsname");
    assert_success(&run(&dir, &["higgs-model"]));
    let out = run(&dir, &["hypothesis-test", "--workspace", "combined"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("combined"));
}

#[test]
fn higgs_hist_model_writes_workspace() {
    let dir = tmp_dir("hist");
    let out = run(&dir, &["higgs-hist-model"]);
    assert_success(&out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Parameters of Interest:  (mu)"), "stdout: {stdout}");
    assert!(stdout.contains("Status : converged"), "stdout: {stdout}");
    assert!(stdout.contains("Snapshot:                (mu=1)"));
    assert!(dir.join("HiggsHistModel.json").exists());
    assert_svg(&dir.join("Signal+background_model.svg"));

    let out = run(
        &dir,
        &[
            "fit",
            "--input",
            dir.join("HiggsHistModel.json").to_str().unwrap(),
            "--data",
            "observed_data",
        ],
    );
    assert_success(&out);
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["pdf"], "model");
    assert!(v["poi"].is_null());
    assert_eq!(v["converged"], true);
    assert_eq!(v["parameter_names"][0], "mu");
    let mu = v["bestfit"][0].as_f64().unwrap();
    let err = v["uncertainties"][0].as_f64().unwrap();
    assert!((mu - 1.5).abs() < 3.0 * err, "mu = {mu} +/- {err}");
}

#[test]
fn example1_writes_all_plots() {
    let dir = tmp_dir("example1");
    let out = run(&dir, &["example1"]);
    assert_success(&out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("The p-value for the null hypothesis is"), "stdout: {stdout}");
    assert!(stdout.contains("Which corresponds to a significance of"));
    for plot in [
        "background",
        "signal",
        "background_binned",
        "signal_binned",
        "model_binned",
        "signal+background_model",
        "backgroundonly",
    ] {
        assert_svg(&dir.join(format!("{plot}.svg")));
    }
}
