//! Text and JSON reports printed by the workflows.

use anyhow::Result;
use mf_core::FitResult;
use mf_inference::{HypoTestInverterResult, HypoTestResult, LikelihoodInterval};
use std::fmt::Write as _;

/// Fit summary: status line, minimum, then one row per floating parameter.
pub fn fit_table(title: &str, fit: &FitResult) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "  FitResult: {title}");
    let _ = writeln!(
        s,
        "    Status : {} ({}, {} iterations, {} NLL evaluations)",
        if fit.converged { "converged" } else { "NOT converged" },
        fit.termination_reason,
        fit.n_iter,
        fit.n_fev
    );
    let _ = writeln!(s, "    NLL    : {:.6}", fit.nll);
    let _ = writeln!(s);
    let width = fit.parameter_names.iter().map(String::len).max().unwrap_or(0).max(18);
    let _ = writeln!(s, "    {:>width$}    FinalValue +/-  Error", "Floating Parameter");
    let _ = writeln!(s, "    {:->width$}  --------------------------", "");
    for (i, name) in fit.parameter_names.iter().enumerate() {
        let _ = writeln!(
            s,
            "    {name:>width$}  {:>12.4e} +/- {:>9.2e}",
            fit.parameters[i], fit.uncertainties[i]
        );
    }
    for w in &fit.warnings {
        let _ = writeln!(s, "    warning: {w}");
    }
    s
}

/// Correlation matrix rows, if the covariance is available.
pub fn correlation_table(fit: &FitResult) -> Option<String> {
    fit.covariance.as_ref()?;
    let n = fit.parameters.len();
    let width = fit.parameter_names.iter().map(String::len).max().unwrap_or(0).max(6);
    let mut s = String::new();
    for i in 0..n {
        let _ = write!(s, "    {:>width$} ", fit.parameter_names[i]);
        for j in 0..n {
            match fit.correlation(i, j) {
                Some(r) => {
                    let _ = write!(s, " {r:>7.3}");
                }
                None => s.push_str("       -"),
            }
        }
        s.push('\n');
    }
    Some(s)
}

/// JSON document of a fit, for `massfit fit`.
pub fn fit_json(fit: &FitResult, pdf: &str, data: &str, poi: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "pdf": pdf,
        "data": data,
        "poi": poi,
        "parameter_names": fit.parameter_names,
        "bestfit": fit.parameters,
        "uncertainties": fit.uncertainties,
        "nll": fit.nll,
        "twice_nll": 2.0 * fit.nll,
        "initial_nll": if fit.initial_nll.is_finite() { Some(fit.initial_nll) } else { None },
        "converged": fit.converged,
        "termination_reason": fit.termination_reason,
        "n_iter": fit.n_iter,
        "n_fev": fit.n_fev,
        "n_gev": fit.n_gev,
        "covariance": fit.covariance,
        "warnings": fit.warnings,
    })
}

/// p-value and significance of a hypothesis test, framed by rules.
pub fn significance_summary(result: &HypoTestResult) -> String {
    let rule = "-------------------------------------------------";
    format!(
        "{rule}\nThe p-value for the null hypothesis is {:.6e}\n\
         Which corresponds to a significance of {:.4} sigma\n{rule}\n",
        result.null_p_value,
        result.significance()
    )
}

/// Observed and expected upper limits of a CLs scan.
pub fn limits_report(result: &HypoTestInverterResult, alternate: &str) -> Result<String> {
    let mut s = String::new();
    writeln!(s, "{:.1}%  upper limit : {:.6}", 100.0 * result.cl, result.upper_limit()?)?;
    writeln!(s, "Expected upper limits, using the {alternate} (alternate) model : ")?;
    for (label, n_sigma) in
        [("median", 0), ("-1 sig", -1), ("+1 sig", 1), ("-2 sig", -2), ("+2 sig", 2)]
    {
        writeln!(s, " expected limit ({label}) {:.6}", result.expected_upper_limit(n_sigma)?)?;
    }
    Ok(s)
}

pub fn interval_line(interval: &LikelihoodInterval) -> String {
    format!(
        "{:.0}% CL interval: [ {:.6} ; {:.6} ]",
        100.0 * interval.cl,
        interval.lower,
        interval.upper
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_inference::ClsPoint;

    fn fit() -> FitResult {
        FitResult::new(vec![98.7, 1003.2], vec![14.1, 33.5], -512.25, true, 12, 40, 13)
            .with_names(vec!["nsig".into(), "nbkg".into()])
            .with_covariance(vec![198.81, -100.0, -100.0, 1122.25])
    }

    #[test]
    fn fit_table_lists_parameters() {
        let t = fit_table("model", &fit());
        assert!(t.contains("converged"));
        assert!(t.contains("nsig"));
        assert!(t.contains("9.8700e1"));
        assert!(t.contains("Floating Parameter"));
    }

    #[test]
    fn correlation_matrix_diagonal_is_one() {
        let t = correlation_table(&fit()).unwrap();
        assert_eq!(t.matches("1.000").count(), 2);
        let mut f = fit();
        f.covariance = None;
        assert!(correlation_table(&f).is_none());
    }

    #[test]
    fn json_has_contract_fields() {
        let v = fit_json(&fit(), "model", "data", Some("nsig"));
        assert_eq!(v["bestfit"].as_array().unwrap().len(), 2);
        assert_eq!(v["poi"], "nsig");
        assert!(v["initial_nll"].is_null());
        assert_eq!(v["converged"], true);
    }

    #[test]
    fn limits_report_lines() {
        let points = (0..=10)
            .map(|i| {
                let mu = i as f64;
                let cls = (1.0 - mu / 10.0).max(0.0);
                ClsPoint {
                    mu,
                    cls,
                    clsb: 0.5 * cls,
                    clb: 0.5,
                    q_mu: mu,
                    expected: [cls * 0.6, cls * 0.8, cls, cls * 1.1, cls * 1.2].map(|v| v.min(1.0)),
                }
            })
            .collect();
        let r = HypoTestInverterResult {
            calculator: "test".into(),
            cl: 0.683,
            use_cls: true,
            points,
        };
        let text = limits_report(&r, "B").unwrap();
        assert!(text.starts_with("68.3%  upper limit : 6.83"));
        assert_eq!(text.lines().filter(|l| l.contains("expected limit")).count(), 5);
    }

    #[test]
    fn interval_format() {
        let i = LikelihoodInterval {
            poi_name: "nsig".into(),
            cl: 0.683,
            mu_hat: 98.0,
            nll_hat: 0.0,
            threshold: 0.5,
            lower: 85.5,
            upper: 112.25,
        };
        assert_eq!(interval_line(&i), "68% CL interval: [ 85.500000 ; 112.250000 ]");
    }
}
