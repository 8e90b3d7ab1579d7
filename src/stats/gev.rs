//! Generalized Extreme Value distribution.
//!
//! The shape parameter `c` uses the sign convention where `c > 0` gives a
//! bounded upper tail: `F(x) = exp(-(1 - c·z)^(1/c))` with
//! `z = (x - loc) / scale`, and the Gumbel distribution at `c = 0`.

use super::optimize::{minimize, NelderMeadOptions};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Below this |c| the Gumbel limit formulas are used.
const SHAPE_EPS: f64 = 1e-9;

/// Maximum likelihood is searched inside |c| < MAX_SHAPE. For c > 1 the
/// density is unbounded at the support endpoint.
const MAX_SHAPE: f64 = 1.0;

/// A likelihood optimum this close to the shape limit sits on the edge of the
/// search region rather than at a true maximum.
const SHAPE_LIMIT_TOL: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GevParameters {
    pub c: f64,
    pub loc: f64,
    pub scale: f64,
}

impl GevParameters {
    pub fn cdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        if self.c.abs() < SHAPE_EPS {
            return (-(-z).exp()).exp();
        }
        let t = 1.0 - self.c * z;
        if t <= 0.0 {
            // outside the support: above the upper bound (c > 0) or below the lower bound
            return if self.c > 0.0 { 1.0 } else { 0.0 };
        }
        (-t.powf(1.0 / self.c)).exp()
    }

    /// Inverse CDF. `p` must lie in (0, 1).
    pub fn ppf(&self, p: f64) -> f64 {
        let y = -p.ln();
        if self.c.abs() < SHAPE_EPS {
            self.loc - self.scale * y.ln()
        } else {
            self.loc + self.scale * (1.0 - y.powf(self.c)) / self.c
        }
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        if self.c.abs() < SHAPE_EPS {
            return -self.scale.ln() - z - (-z).exp();
        }
        let t = 1.0 - self.c * z;
        if t <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let lt = t.ln();
        -self.scale.ln() + (1.0 / self.c - 1.0) * lt - (lt / self.c).exp()
    }

    pub fn neg_log_likelihood(&self, data: &[f64]) -> f64 {
        if self.scale.is_nan() || self.scale <= 0.0 {
            return f64::INFINITY;
        }
        -data.iter().map(|&x| self.log_pdf(x)).sum::<f64>()
    }

    pub fn is_finite(&self) -> bool {
        self.c.is_finite() && self.loc.is_finite() && self.scale.is_finite()
    }
}

/// Maximum-likelihood fit. The caller is responsible for the minimum sample
/// size; values must be finite.
pub fn fit(data: &[f64]) -> Result<GevParameters> {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let starts = [pwm_estimate(&sorted), Some(gumbel_start(&sorted))];
    let start = starts
        .into_iter()
        .flatten()
        .filter(|p| p.is_finite() && p.scale > 0.0)
        .map(|p| (p, p.neg_log_likelihood(&sorted)))
        .filter(|(_, nll)| nll.is_finite())
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| {
            AppError::InvalidData(
                "Annual maxima have zero spread; cannot estimate a GEV scale".to_string(),
            )
        })?;

    let (start, start_nll) = start;
    debug!(
        "GEV start c={:.4} loc={:.4} scale={:.4} nll={:.4}",
        start.c, start.loc, start.scale, start_nll
    );

    let objective = |theta: &[f64]| {
        if theta[2].abs() >= MAX_SHAPE {
            return f64::INFINITY;
        }
        GevParameters {
            loc: theta[0],
            scale: theta[1].exp(),
            c: theta[2],
        }
        .neg_log_likelihood(&sorted)
    };

    let options = NelderMeadOptions::default();
    let mut theta = vec![start.loc, start.scale.ln(), start.c];
    let mut best_nll = start_nll;
    let mut converged = false;
    let mut iterations = 0;

    // restart from the previous optimum to escape a collapsed simplex
    for _ in 0..2 {
        let steps = [0.1 * theta[1].exp(), 0.1, 0.1];
        let min = minimize(objective, &theta, &steps, &options);
        iterations += min.iterations;
        if min.value.is_finite() && min.value <= best_nll {
            theta = min.x;
            best_nll = min.value;
        }
        converged = min.converged;
    }

    if !converged {
        warn!("GEV likelihood search stopped after {} iterations without converging", iterations);
    }

    let params = GevParameters {
        loc: theta[0],
        scale: theta[1].exp(),
        c: theta[2],
    };
    if !params.is_finite() {
        return Err(AppError::InvalidData(format!(
            "GEV fit produced non-finite parameters: {:?}",
            params
        )));
    }

    if params.c.abs() >= MAX_SHAPE - SHAPE_LIMIT_TOL {
        return shape_limit_fallback(&sorted, &params);
    }

    debug!(
        "GEV fit c={:.4} loc={:.4} scale={:.4} nll={:.4} after {} iterations",
        params.c, params.loc, params.scale, best_nll, iterations
    );
    Ok(params)
}

/// Replace a likelihood fit stuck at the shape limit with the PWM estimate,
/// whose shape is bounded by ±0.9.
fn shape_limit_fallback(sorted: &[f64], stuck: &GevParameters) -> Result<GevParameters> {
    let pwm = pwm_estimate(sorted)
        .filter(|p| p.is_finite() && p.scale > 0.0)
        .ok_or_else(|| {
            AppError::InvalidData(format!(
                "GEV likelihood has no interior optimum (c={:.4}) and no moment estimate exists for {} values",
                stuck.c,
                sorted.len()
            ))
        })?;

    warn!(
        "GEV likelihood optimum hit the shape limit (c={:.4}) on {} values; using PWM estimate c={:.4} loc={:.4} scale={:.4}",
        stuck.c,
        sorted.len(),
        pwm.c,
        pwm.loc,
        pwm.scale
    );
    Ok(pwm)
}

/// Probability-weighted-moment estimate (Hosking, Wallis & Wood, 1985).
/// `sorted` must be in ascending order with at least three values.
pub fn pwm_estimate(sorted: &[f64]) -> Option<GevParameters> {
    let n = sorted.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;

    let (mut b0, mut b1, mut b2) = (0.0, 0.0, 0.0);
    for (i, &x) in sorted.iter().enumerate() {
        let j = i as f64;
        b0 += x;
        b1 += x * j / (nf - 1.0);
        b2 += x * j * (j - 1.0) / ((nf - 1.0) * (nf - 2.0));
    }
    b0 /= nf;
    b1 /= nf;
    b2 /= nf;

    let l2 = 2.0 * b1 - b0;
    let denom = 3.0 * b2 - b0;
    if l2 <= f64::EPSILON * b0.abs().max(1.0) || denom.abs() < f64::EPSILON {
        return None;
    }

    let cc = l2 / denom - std::f64::consts::LN_2 / 3f64.ln();
    let k = (7.8590 * cc + 2.9554 * cc * cc).clamp(-0.9, 0.9);

    if k.abs() < SHAPE_EPS {
        let scale = l2 / std::f64::consts::LN_2;
        return Some(GevParameters {
            c: 0.0,
            loc: b0 - EULER_GAMMA * scale,
            scale,
        });
    }

    let gamma = ln_gamma(1.0 + k).exp();
    let scale = l2 * k / (gamma * (1.0 - 2f64.powf(-k)));
    let loc = b0 + scale * (gamma - 1.0) / k;
    Some(GevParameters { c: k, loc, scale })
}

/// Method-of-moments Gumbel parameters as a c = 0 starting point. Its
/// likelihood is finite for any data.
fn gumbel_start(sorted: &[f64]) -> GevParameters {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let scale = var.sqrt() * 6f64.sqrt() / std::f64::consts::PI;
    GevParameters {
        c: 0.0,
        loc: mean - EULER_GAMMA * scale,
        scale,
    }
}

/// Lanczos approximation (g = 7, n = 9).
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut a = COEFFS[0];
    let t = x + 7.5;
    for (i, &c) in COEFFS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quantile_sample(params: &GevParameters, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| params.ppf((i as f64 + 0.5) / n as f64))
            .collect()
    }

    #[test]
    fn test_ln_gamma() {
        assert!((ln_gamma(1.0)).abs() < 1e-12);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn test_ppf_inverts_cdf() {
        for c in [-0.3, 0.0, 0.2] {
            let params = GevParameters {
                c,
                loc: 60.0,
                scale: 20.0,
            };
            for p in [0.01, 0.5, 0.9, 0.999] {
                let x = params.ppf(p);
                assert!((params.cdf(x) - p).abs() < 1e-10, "c={} p={}", c, p);
            }
        }
    }

    #[test]
    fn test_gumbel_limit_matches_small_shape() {
        let gumbel = GevParameters {
            c: 0.0,
            loc: 40.0,
            scale: 10.0,
        };
        let near = GevParameters { c: 1e-7, ..gumbel };
        assert!((gumbel.ppf(0.99) - near.ppf(0.99)).abs() < 1e-3);
        assert!((gumbel.log_pdf(55.0) - near.log_pdf(55.0)).abs() < 1e-5);
    }

    #[test]
    fn test_log_pdf_outside_support() {
        let params = GevParameters {
            c: 0.5,
            loc: 0.0,
            scale: 1.0,
        };
        // upper bound is loc + scale / c = 2
        assert_eq!(params.log_pdf(3.0), f64::NEG_INFINITY);
        assert_eq!(params.cdf(3.0), 1.0);
    }

    #[test]
    fn test_pwm_estimate_recovers_parameters() {
        let truth = GevParameters {
            c: -0.1,
            loc: 50.0,
            scale: 15.0,
        };
        let sample = quantile_sample(&truth, 500);
        let est = pwm_estimate(&sample).unwrap();
        assert!((est.c - truth.c).abs() < 0.05, "{:?}", est);
        assert!((est.loc - truth.loc).abs() < 1.5, "{:?}", est);
        assert!((est.scale - truth.scale).abs() < 1.5, "{:?}", est);
    }

    #[test]
    fn test_fit_recovers_parameters() {
        let truth = GevParameters {
            c: -0.1,
            loc: 50.0,
            scale: 15.0,
        };
        let sample = quantile_sample(&truth, 300);
        let fitted = fit(&sample).unwrap();
        assert!((fitted.c - truth.c).abs() < 0.1, "{:?}", fitted);
        assert!((fitted.loc - truth.loc).abs() < 3.0, "{:?}", fitted);
        assert!((fitted.scale - truth.scale).abs() < 3.0, "{:?}", fitted);
    }

    #[test]
    fn test_fit_improves_on_start() {
        let data: [f64; 10] = [38.2, 51.0, 44.7, 92.3, 60.1, 47.5, 55.8, 71.4, 40.9, 66.0];
        let mut sorted = data.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let fitted = fit(&data).unwrap();
        let start = pwm_estimate(&sorted).unwrap();
        assert!(fitted.scale > 0.0);
        assert!(fitted.neg_log_likelihood(&data) <= start.neg_log_likelihood(&data) + 1e-9);
    }

    #[test]
    fn test_fit_three_points() {
        let fitted = fit(&[50.0, 70.0, 90.0]).unwrap();
        assert!(fitted.scale > 0.0);
        assert!(fitted.is_finite());
    }

    /// Evenly spaced points push the likelihood to the bounded-tail limit;
    /// the moment estimate is returned instead
    #[test]
    fn test_fit_bounded_tail_limit_uses_pwm() {
        let data = [50.0, 70.0, 90.0];
        let fitted = fit(&data).unwrap();

        assert!(fitted.c.abs() <= 0.9, "{:?}", fitted);
        assert_eq!(Some(fitted), pwm_estimate(&data));
        // 1000-year depth lies above the largest observation
        assert!(fitted.ppf(0.999) > 90.0, "{:?}", fitted);
    }

    /// One outlier pushes the likelihood to the heavy-tail limit
    #[test]
    fn test_fit_heavy_tail_limit_uses_pwm() {
        let data = [10.0, 11.0, 300.0];
        let fitted = fit(&data).unwrap();

        assert!(fitted.c.abs() <= 0.9, "{:?}", fitted);
        assert!(fitted.scale > 0.0);
        assert_eq!(Some(fitted), pwm_estimate(&data));
    }

    #[test]
    fn test_fit_zero_spread_rejected() {
        let result = fit(&[30.0, 30.0, 30.0, 30.0]);
        assert!(matches!(result, Err(AppError::InvalidData(_))));
    }
}
