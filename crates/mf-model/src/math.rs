//! Small numerical helpers shared by the shape PDFs.

use statrs::function::erf::{erfc, erfc_inv};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Log-probability used in place of `-inf` when an atom has zero probability.
pub const LOG_FLOOR: f64 = -700.0;

/// Standard normal CDF `Φ(z)`.
#[inline]
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Standard normal survival function `1 - Φ(z)`, accurate in the upper tail.
#[inline]
pub fn standard_normal_sf(z: f64) -> f64 {
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

/// Standard normal density `φ(z)`.
#[inline]
pub fn standard_normal_pdf(z: f64) -> f64 {
    standard_normal_logpdf(z).exp()
}

/// `log φ(z)`.
#[inline]
pub fn standard_normal_logpdf(z: f64) -> f64 {
    -0.5 * z * z - LN_SQRT_2PI
}

/// Inverse of the standard normal CDF, `Φ⁻¹(p)` for `p ∈ (0, 1)`.
#[inline]
pub fn standard_normal_quantile(p: f64) -> f64 {
    -std::f64::consts::SQRT_2 * erfc_inv(2.0 * p)
}

/// `P(z1 < Z < z2)` for a standard normal, computed on the tail side that keeps precision.
pub fn standard_normal_interval(z1: f64, z2: f64) -> f64 {
    if z1 >= z2 {
        return 0.0;
    }
    if z1 > 0.0 {
        standard_normal_sf(z1) - standard_normal_sf(z2)
    } else {
        standard_normal_cdf(z2) - standard_normal_cdf(z1)
    }
}

/// `log(exp(a) - exp(b))` for `a > b`.
#[inline]
pub fn log_diff_exp(a: f64, b: f64) -> f64 {
    debug_assert!(a >= b);
    a + (-(b - a).exp()).ln_1p()
}

/// `log Σ exp(x_i)`; returns `-inf` for an empty slice or all `-inf` inputs.
pub fn logsumexp(xs: &[f64]) -> f64 {
    let m = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    m + xs.iter().map(|&x| (x - m).exp()).sum::<f64>().ln()
}
