pub mod gev;
pub mod gumbel;
pub mod optimize;

pub use gev::GevParameters;
pub use gumbel::GumbelParameters;

use crate::error::{AppError, Result};
use crate::models::{AnnualMaximum, HydroYearObservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Fewer annual maxima than this cannot be fitted meaningfully.
pub const MIN_ANNUAL_MAXIMA: usize = 3;

/// Distribution families understood by name. Only the first two are fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    #[serde(rename = "genextreme")]
    Gev,
    #[serde(rename = "gumbel_r")]
    Gumbel,
}

const UNIMPLEMENTED_FAMILIES: &[&str] = &["gumbel_l", "norm", "lognorm", "weibull_min"];

impl FromStr for Distribution {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "genextreme" | "gev" => Ok(Distribution::Gev),
            "gumbel_r" | "gumbel" => Ok(Distribution::Gumbel),
            other if UNIMPLEMENTED_FAMILIES.contains(&other) => Err(
                AppError::UnsupportedDistribution(format!("'{}' is not implemented", other)),
            ),
            other => Err(AppError::UnsupportedDistribution(format!(
                "unknown distribution '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Gev => write!(f, "genextreme"),
            Distribution::Gumbel => write!(f, "gumbel_r"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution")]
pub enum FittedDistribution {
    #[serde(rename = "genextreme")]
    Gev(GevParameters),
    #[serde(rename = "gumbel_r")]
    Gumbel(GumbelParameters),
}

impl FittedDistribution {
    pub fn ppf(&self, p: f64) -> f64 {
        match self {
            FittedDistribution::Gev(params) => params.ppf(p),
            FittedDistribution::Gumbel(params) => params.ppf(p),
        }
    }

    pub fn cdf(&self, x: f64) -> f64 {
        match self {
            FittedDistribution::Gev(params) => params.cdf(x),
            FittedDistribution::Gumbel(params) => params.cdf(x),
        }
    }

    pub fn distribution(&self) -> Distribution {
        match self {
            FittedDistribution::Gev(_) => Distribution::Gev,
            FittedDistribution::Gumbel(_) => Distribution::Gumbel,
        }
    }

    pub fn gev(&self) -> Option<&GevParameters> {
        match self {
            FittedDistribution::Gev(params) => Some(params),
            _ => None,
        }
    }
}

/// Largest daily value per year label, ascending by label. Years whose
/// maximum is not positive carry no signal and are left out.
pub fn annual_maxima(labeled: &[HydroYearObservation]) -> Vec<AnnualMaximum> {
    let mut maxima: BTreeMap<i32, f64> = BTreeMap::new();
    for obs in labeled {
        if !obs.daily_precipitation_mm.is_finite() {
            continue;
        }
        maxima
            .entry(obs.hydro_year)
            .and_modify(|m| *m = m.max(obs.daily_precipitation_mm))
            .or_insert(obs.daily_precipitation_mm);
    }

    let total = maxima.len();
    let rows: Vec<AnnualMaximum> = maxima
        .into_iter()
        .filter(|(_, max)| *max > 0.0)
        .map(|(year_label, max_daily_precipitation_mm)| AnnualMaximum {
            year_label,
            max_daily_precipitation_mm,
        })
        .collect();

    if rows.len() < total {
        debug!("Dropped {} years with a zero maximum", total - rows.len());
    }
    rows
}

/// Values eligible for fitting: finite and strictly positive.
pub fn fit_sample(maxima: &[AnnualMaximum]) -> Vec<f64> {
    maxima
        .iter()
        .map(|m| m.max_daily_precipitation_mm)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect()
}

pub fn fit_distribution(
    distribution: Distribution,
    maxima: &[AnnualMaximum],
    min_points: usize,
) -> Result<FittedDistribution> {
    let required = min_points.max(MIN_ANNUAL_MAXIMA);
    let sample = fit_sample(maxima);
    if sample.len() < required {
        return Err(AppError::InsufficientData {
            found: sample.len(),
            required,
        });
    }

    let fitted = match distribution {
        Distribution::Gev => FittedDistribution::Gev(gev::fit(&sample)?),
        Distribution::Gumbel => {
            FittedDistribution::Gumbel(gumbel::fit_moments(&sample).ok_or_else(|| {
                AppError::InvalidData(
                    "Annual maxima have zero spread; cannot estimate a Gumbel scale".to_string(),
                )
            })?)
        }
    };

    info!(
        "Fitted {} to {} annual maxima: {:?}",
        distribution,
        sample.len(),
        fitted
    );
    Ok(fitted)
}
