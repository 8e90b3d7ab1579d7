use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Right-skewed Gumbel (type I extreme value) distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GumbelParameters {
    pub loc: f64,
    pub scale: f64,
}

impl GumbelParameters {
    pub fn cdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        (-(-z).exp()).exp()
    }

    pub fn ppf(&self, p: f64) -> f64 {
        self.loc - self.scale * (-p.ln()).ln()
    }
}

/// Method-of-moments fit from the sample mean and standard deviation.
/// Returns `None` for fewer than two values or zero spread.
pub fn fit_moments(data: &[f64]) -> Option<GumbelParameters> {
    let (mean, std_dev) = mean_std(data)?;
    if std_dev <= 0.0 {
        return None;
    }
    let scale = std_dev * 6f64.sqrt() / std::f64::consts::PI;
    Some(GumbelParameters {
        loc: mean - EULER_GAMMA * scale,
        scale,
    })
}

/// Sample mean and standard deviation (n - 1 denominator).
pub fn mean_std(data: &[f64]) -> Option<(f64, f64)> {
    if data.len() < 2 {
        return None;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}
